//! # Bounded Log Store Module
//!
//! Fixed-capacity, insertion-ordered, concurrently accessible logs for the
//! two record streams.
//!
//! Each log is a mutex-guarded ring buffer: appends evict the oldest entry
//! on overflow, readers get point-in-time copies (never live references),
//! and locks are held only for the buffer mutation or copy itself, never
//! across I/O. The two logs have independent locks; only a resize touches
//! both, atomically, under both locks.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, ThermolinkError};
use crate::record::{ConfigEvent, SensorReading};

/// Largest accepted log capacity
pub const MAX_LOG_CAPACITY: usize = 1_000_000;

/// Default log capacity (entries per log)
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug)]
struct LogBuf<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> LogBuf<T> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }
}

/// A fixed-capacity, insertion-ordered log with FIFO eviction
///
/// Single writer (the ingestion loop), any number of concurrent readers.
/// Entries come back from [`snapshot`](Self::snapshot) in exact append
/// order, which is also non-decreasing timestamp order because timestamps
/// are assigned at append time under a single producer.
#[derive(Debug)]
pub struct BoundedLog<T: Clone> {
    inner: Mutex<LogBuf<T>>,
}

impl<T: Clone> BoundedLog<T> {
    /// Create an empty log holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogBuf::new(capacity)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogBuf<T>> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the buffer itself is still structurally sound.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry, evicting the oldest if the log is full
    pub fn append(&self, entry: T) {
        let mut buf = self.lock();
        if buf.entries.len() >= buf.capacity {
            buf.entries.pop_front();
        }
        buf.entries.push_back(entry);
    }

    /// Point-in-time copy of all entries, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Copy of the most recent entry, if any
    pub fn latest(&self) -> Option<T> {
        self.lock().entries.back().cloned()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries, keeping the capacity
    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

/// The pair of logs fed by the ingestion loop
///
/// Sensor readings and config events are buffered independently, but share
/// one capacity setting: resizing replaces both ring buffers together and
/// discards their contents (an accepted lossy reconfiguration).
#[derive(Debug)]
pub struct LogStore {
    sensor: BoundedLog<SensorReading>,
    config: BoundedLog<ConfigEvent>,
    capacity: Mutex<usize>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogStore {
    /// Create a store with the given per-log capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use thermolink::store::LogStore;
    ///
    /// let store = LogStore::new(1000);
    /// assert_eq!(store.capacity(), 1000);
    /// assert!(store.sensor().is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            sensor: BoundedLog::new(capacity),
            config: BoundedLog::new(capacity),
            capacity: Mutex::new(capacity),
        }
    }

    /// The sensor reading log
    pub fn sensor(&self) -> &BoundedLog<SensorReading> {
        &self.sensor
    }

    /// The config event log
    pub fn config(&self) -> &BoundedLog<ConfigEvent> {
        &self.config
    }

    /// Current per-log capacity
    pub fn capacity(&self) -> usize {
        *self.capacity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace both ring buffers with empty ones of the new capacity
    ///
    /// Existing contents are discarded. Both buffer locks are held for the
    /// swap (in a fixed order) so no reader or writer can observe one log
    /// resized and the other not.
    ///
    /// # Errors
    ///
    /// Returns `ThermolinkError::Capacity` if `new_capacity` is zero or
    /// exceeds [`MAX_LOG_CAPACITY`]; the store is left unchanged.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        if new_capacity == 0 || new_capacity > MAX_LOG_CAPACITY {
            return Err(ThermolinkError::Capacity(new_capacity));
        }

        // Lock order: capacity, sensor, config. Everything else takes at
        // most one of these locks, so this cannot deadlock.
        let mut capacity = self.capacity.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sensor = self.sensor.lock();
        let mut config = self.config.lock();

        *sensor = LogBuf::new(new_capacity);
        *config = LogBuf::new(new_capacity);
        *capacity = new_capacity;

        Ok(())
    }
}
