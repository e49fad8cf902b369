//! # Thermolink
//!
//! Serial JSON ingestion and logging for a thermistor-array instrument.
//!
//! This application reads newline-delimited JSON from a serial-connected
//! instrument, classifies each line as a sensor reading or a configuration
//! event, keeps both streams in bounded in-memory logs, and gives the
//! operator an interactive shell for inspection, CSV export, and sending
//! text commands back to the instrument.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::time::Duration;
use tracing::info;

use thermolink::config::Config;
use thermolink::control::{self, ControlHandle};
use thermolink::ingest::{self, IngestSettings};
use thermolink::record::Tunables;
use thermolink::serial::{CommandSender, InstrumentSerial};
use thermolink::store::LogStore;
use tokio_util::sync::CancellationToken;

/// Default configuration file path (first CLI argument overrides it)
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// How long shutdown waits for the ingestion loop to stop
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Main entry point for Thermolink
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (defaults when no file is present)
///    - Create the log store, tunables, and command channel
///    - Spawn the ingestion loop against the configured serial port
///
/// 2. **Main Loop**
///    - Run the interactive operator shell on stdin
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Cancel the ingestion loop and wait (bounded) for it to stop
///    - Clean exit
///
/// # Errors
///
/// Returns error if the configuration file exists but cannot be loaded or
/// fails validation. Serial connection problems are not fatal: the
/// ingestion loop retries with backoff for as long as the process runs.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Thermolink v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;
    info!(
        "Logging instrument data from {} at {} baud (log capacity {})",
        config.serial.port, config.serial.baud_rate, config.log.capacity
    );

    let store = Arc::new(LogStore::new(config.log.capacity));
    let tunables = Arc::new(Tunables::new(config.log.sampling_interval_ms));
    let commands = CommandSender::new();
    let connector = InstrumentSerial::new(&config.serial.port, config.serial.baud_rate);

    let handle = ingest::spawn(
        connector,
        Arc::clone(&store),
        Arc::clone(&tunables),
        commands.clone(),
        IngestSettings::from(&config.serial),
        CancellationToken::new(),
    );

    let control = ControlHandle::new(store, tunables, commands, handle.state_watcher());

    info!("Reader task started. Press Ctrl+C or enter 'q' to stop.");

    tokio::select! {
        _ = control::run_shell(&control, Path::new(&config.export.data_dir)) => {
            info!("Operator requested shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    handle.shutdown(SHUTDOWN_WAIT).await;
    info!("Application stopped.");

    Ok(())
}
