//! # Error Types
//!
//! Custom error types for Thermolink using `thiserror`.
//!
//! The taxonomy mirrors the recovery policy: `Connection` errors trigger
//! backoff and retry, `Link` errors trigger teardown and reconnect, and the
//! per-line errors (`Decode`, `Parse`, `Classify`) are reported and skipped
//! without touching the connection.

use thiserror::Error;

/// Main error type for Thermolink
#[derive(Debug, Error)]
pub enum ThermolinkError {
    /// Serial port could not be opened (triggers backoff + retry)
    #[error("connection error: {0}")]
    Connection(String),

    /// Established serial link failed mid-stream (triggers reconnect)
    #[error("serial link error: {0}")]
    Link(String),

    /// Line was not valid UTF-8; carries the raw bytes
    #[error("invalid UTF-8 line: {0:02X?}")]
    Decode(Vec<u8>),

    /// Line was not valid JSON; carries the raw text
    #[error("unparseable line: {0:?}")]
    Parse(String),

    /// JSON value was not an object and cannot be classified
    #[error("unclassifiable record: {0}")]
    Classify(String),

    /// Outbound command attempted with no live serial link
    #[error("serial port not connected")]
    NotConnected,

    /// Log capacity outside the accepted range
    #[error("invalid log capacity {0}: must be between 1 and 1000000")]
    Capacity(usize),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// CSV export errors
    #[error("CSV export error: {0}")]
    Export(#[from] csv::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Thermolink
pub type Result<T> = std::result::Result<T, ThermolinkError>;
