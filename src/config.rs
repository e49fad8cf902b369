//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::store::MAX_LOG_CAPACITY;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
}

/// In-memory log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
}

/// CSV export configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_read_timeout_ms() -> u64 { 1000 }
fn default_reconnect_interval_ms() -> u64 { 5000 }
fn default_idle_sleep_ms() -> u64 { 10 }

fn default_capacity() -> usize { 1000 }
fn default_sampling_interval_ms() -> u64 { 1000 }

fn default_data_dir() -> String { "sensor_data".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            idle_sleep_ms: default_idle_sleep_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            sampling_interval_ms: default_sampling_interval_ms(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            log: LogConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use thermolink::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults
    ///
    /// A missing file yields the built-in defaults; an unreadable or
    /// invalid file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate serial port configuration
        if self.serial.port.is_empty() {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("serial port cannot be empty")
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("baud_rate must be greater than 0")
            ));
        }

        // Validate timing fields
        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > 10000 {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("read_timeout_ms must be between 1 and 10000")
            ));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("reconnect_interval_ms must be between 1 and 60000")
            ));
        }

        if self.serial.idle_sleep_ms == 0 || self.serial.idle_sleep_ms > 1000 {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("idle_sleep_ms must be between 1 and 1000")
            ));
        }

        // Validate log configuration
        if self.log.capacity == 0 || self.log.capacity > MAX_LOG_CAPACITY {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("log capacity must be between 1 and 1000000")
            ));
        }

        if self.log.sampling_interval_ms == 0 {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("sampling_interval_ms must be greater than 0")
            ));
        }

        // Validate export configuration
        if self.export.data_dir.is_empty() {
            return Err(crate::error::ThermolinkError::Config(
                toml::de::Error::custom("export data_dir cannot be empty")
            ));
        }

        Ok(())
    }
}
