//! # Record Classification Module
//!
//! Sorts each decoded JSON object into one of the two record shapes the
//! instrument emits and tracks the live-tunable sampling interval.
//!
//! ## Record Shapes
//!
//! - **Sensor reading**: an object with both `names` and `temperatures`
//!   keys. Both fields are stored verbatim; the instrument is trusted to
//!   keep them parallel, and nothing here enforces their lengths or types.
//! - **Config event**: any other object, wrapped whole as the payload. A
//!   `sampling_interval_ms` key (integer) updates the process-wide
//!   sampling interval.
//!
//! Timestamps are wall-clock milliseconds assigned at ingestion time, not
//! device time.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::error::{Result, ThermolinkError};

/// One timestamped temperature sample from the instrument
///
/// Immutable once created. `names` and `temperatures` are copied verbatim
/// from the wire without shape validation.
#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    /// Ingestion timestamp, wall-clock milliseconds
    pub timestamp_ms: i64,
    /// Sensor labels, as received
    pub names: Value,
    /// Temperature values parallel to `names`, as received
    pub temperatures: Value,
}

/// One timestamped non-sensor message from the instrument
///
/// Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigEvent {
    /// Ingestion timestamp, wall-clock milliseconds
    pub timestamp_ms: i64,
    /// The whole object as received
    pub payload: Value,
}

impl ConfigEvent {
    /// The `sampling_interval_ms` value carried by this event, if any
    pub fn sampling_interval_ms(&self) -> Option<u64> {
        self.payload.get("sampling_interval_ms").and_then(Value::as_u64)
    }
}

/// A classified instrument record
#[derive(Debug, Clone)]
pub enum Record {
    Sensor(SensorReading),
    Config(ConfigEvent),
}

/// Process-wide live-tunable state
///
/// Shared between the ingestion loop (which updates the sampling interval
/// from config events) and the control surface (which reads it for the
/// retention estimate in the status display).
#[derive(Debug)]
pub struct Tunables {
    sampling_interval_ms: AtomicU64,
}

/// Default instrument sampling interval in milliseconds
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 1000;

impl Default for Tunables {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLING_INTERVAL_MS)
    }
}

impl Tunables {
    /// Create tunables with the given initial sampling interval
    pub fn new(sampling_interval_ms: u64) -> Self {
        Self {
            sampling_interval_ms: AtomicU64::new(sampling_interval_ms),
        }
    }

    /// Current sampling interval in milliseconds
    pub fn sampling_interval_ms(&self) -> u64 {
        self.sampling_interval_ms.load(Ordering::Relaxed)
    }

    /// Atomically replace the sampling interval
    pub fn set_sampling_interval_ms(&self, interval_ms: u64) {
        self.sampling_interval_ms.store(interval_ms, Ordering::Relaxed);
    }

    /// Seconds of history a log of `capacity` entries covers at the
    /// current sampling interval
    pub fn retention_secs(&self, capacity: usize) -> f64 {
        self.sampling_interval_ms() as f64 / 1000.0 * capacity as f64
    }
}

/// Classify a parsed JSON value into a record
///
/// # Arguments
///
/// * `value` - The parsed JSON value (must be an object)
/// * `timestamp_ms` - Ingestion timestamp to stamp onto the record
/// * `tunables` - Updated in place when a config event carries a new
///   sampling interval
///
/// # Errors
///
/// Returns `ThermolinkError::Classify` for non-object values (arrays,
/// scalars). This is reported and skipped by the caller, never fatal.
pub fn classify(value: Value, timestamp_ms: i64, tunables: &Tunables) -> Result<Record> {
    let object = match &value {
        Value::Object(map) => map,
        other => {
            return Err(ThermolinkError::Classify(format!(
                "expected a JSON object, got: {}",
                other
            )))
        }
    };

    if object.contains_key("names") && object.contains_key("temperatures") {
        // Fields are taken verbatim; contains_key above guarantees presence
        let names = value["names"].clone();
        let temperatures = value["temperatures"].clone();
        return Ok(Record::Sensor(SensorReading {
            timestamp_ms,
            names,
            temperatures,
        }));
    }

    let event = ConfigEvent {
        timestamp_ms,
        payload: value,
    };

    if let Some(interval_ms) = event.sampling_interval_ms() {
        tunables.set_sampling_interval_ms(interval_ms);
        info!("Updated sampling interval to {} ms", interval_ms);
    }

    Ok(Record::Config(event))
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
