//! # Control Surface Module
//!
//! The operator's view of the running system: log snapshots, clears,
//! capacity resizing, outbound instrument commands, and a status summary,
//! plus the interactive shell that drives them from stdin.
//!
//! Everything here works on snapshots and handles; the ingestion loop is
//! never blocked by operator activity.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::warn;

use crate::error::Result;
use crate::export;
use crate::ingest::LinkState;
use crate::record::{ConfigEvent, SensorReading, Tunables};
use crate::serial::CommandSender;
use crate::store::LogStore;

/// Operator handle over the shared state
///
/// Cheap to clone; every method is safe to call concurrently with the
/// ingestion loop.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    store: Arc<LogStore>,
    tunables: Arc<Tunables>,
    commands: CommandSender,
    link_state: watch::Receiver<LinkState>,
}

/// Point-in-time status summary for the operator
#[derive(Debug, Clone)]
pub struct Status {
    pub link_state: LinkState,
    pub sensor_entries: usize,
    pub config_entries: usize,
    pub capacity: usize,
    pub sampling_interval_ms: u64,
    pub retention_secs: f64,
    pub latest: Option<SensorReading>,
}

impl ControlHandle {
    /// Bundle the shared components into an operator handle
    pub fn new(
        store: Arc<LogStore>,
        tunables: Arc<Tunables>,
        commands: CommandSender,
        link_state: watch::Receiver<LinkState>,
    ) -> Self {
        Self {
            store,
            tunables,
            commands,
            link_state,
        }
    }

    /// Point-in-time copy of the sensor log, oldest first
    pub fn sensor_snapshot(&self) -> Vec<SensorReading> {
        self.store.sensor().snapshot()
    }

    /// Point-in-time copy of the config log, oldest first
    pub fn config_snapshot(&self) -> Vec<ConfigEvent> {
        self.store.config().snapshot()
    }

    /// Remove all sensor readings
    pub fn clear_sensor_log(&self) {
        self.store.sensor().clear();
    }

    /// Remove all config events
    pub fn clear_config_log(&self) {
        self.store.config().clear();
    }

    /// Replace both logs with empty ones of the new capacity
    ///
    /// # Errors
    ///
    /// Returns `ThermolinkError::Capacity` for values outside
    /// `1..=1_000_000`; the logs are left unchanged.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        self.store.resize(new_capacity)
    }

    /// Send a text command to the instrument
    ///
    /// # Errors
    ///
    /// - `NotConnected`: no live serial link
    /// - `Link`: the write failed mid-command
    pub async fn send_command(&self, text: &str) -> Result<()> {
        self.commands.send(text).await
    }

    /// Current instrument sampling interval in milliseconds
    pub fn sampling_interval_ms(&self) -> u64 {
        self.tunables.sampling_interval_ms()
    }

    /// Current connection state of the ingestion loop
    pub fn link_state(&self) -> LinkState {
        *self.link_state.borrow()
    }

    /// Summarize the current state for display
    pub fn status(&self) -> Status {
        let capacity = self.store.capacity();
        Status {
            link_state: self.link_state(),
            sensor_entries: self.store.sensor().len(),
            config_entries: self.store.config().len(),
            capacity,
            sampling_interval_ms: self.tunables.sampling_interval_ms(),
            retention_secs: self.tunables.retention_secs(capacity),
            latest: self.store.sensor().latest(),
        }
    }
}

/// Run the interactive operator shell until `q` or stdin closes
///
/// Commands:
///
/// - `c` - clear the sensor log
/// - `cc` - clear the config log
/// - `s` - save both logs as CSV into `data_dir`
/// - `d` - show log status and the latest reading
/// - `size <n>` - resize both logs (discards contents)
/// - `cmd <text>` - send a text command to the instrument
/// - `r` - reprint the prompt
/// - `q` - quit
pub async fn run_shell(control: &ControlHandle, data_dir: &Path) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_prompt(control);
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // stdin closed
            Err(e) => {
                warn!("Failed to read operator input: {}", e);
                break;
            }
        };

        if !handle_command(control, data_dir, line.trim()).await {
            break;
        }
        print_prompt(control);
    }
}

/// Dispatch one operator command; returns false when the shell should exit
async fn handle_command(control: &ControlHandle, data_dir: &Path, input: &str) -> bool {
    match input {
        "q" => return false,
        "r" | "" => {}
        "c" => {
            control.clear_sensor_log();
            println!("Sensor data log cleared.");
        }
        "cc" => {
            control.clear_config_log();
            println!("Config log cleared.");
        }
        "s" => {
            let sensor = control.sensor_snapshot();
            let config = control.config_snapshot();
            match export::save_snapshots(data_dir, &sensor, &config) {
                Ok(Some((sensor_path, _))) => {
                    println!("Data saved to {}", sensor_path.display());
                }
                Ok(None) => println!("No data to save."),
                Err(e) => println!("Error saving data: {}", e),
            }
        }
        "d" => print_status(control),
        _ if input.starts_with("size ") => {
            match input["size ".len()..].trim().parse::<usize>() {
                Ok(new_capacity) => match control.resize(new_capacity) {
                    Ok(()) => {
                        let retention = control.status().retention_secs;
                        println!(
                            "Data log size set to {}. This will keep ~{:.1} seconds of data.",
                            new_capacity, retention
                        );
                    }
                    Err(e) => println!("{}", e),
                },
                Err(_) => println!("Invalid data size value entry."),
            }
        }
        _ if input.starts_with("cmd ") => {
            let command = input["cmd ".len()..].trim();
            if command.is_empty() {
                println!("Command cannot be empty.");
            } else {
                match control.send_command(command).await {
                    Ok(()) => println!(
                        "Sent command: '{}'. Response will appear in the stream if the instrument replies.",
                        command
                    ),
                    Err(e) => println!("Error sending command: {}", e),
                }
            }
        }
        _ => print_status(control),
    }
    true
}

fn print_status(control: &ControlHandle) {
    let status = control.status();
    println!(
        "\n--- Log Status --- link: {:?}, sensor entries: {}, config entries: {}, capacity: {}",
        status.link_state, status.sensor_entries, status.config_entries, status.capacity
    );
    match &status.latest {
        Some(reading) => match serde_json::to_string(reading) {
            Ok(text) => println!("Latest entry: {}", text),
            Err(e) => println!("Latest entry unavailable: {}", e),
        },
        None => println!("Latest entry: N/A"),
    }
}

fn print_prompt(control: &ControlHandle) {
    let status = control.status();
    println!(
        "\nEnter command:\n\
         (c)lear data log, (cc) clear config log, (r)efresh prompt, (s)ave data and config, (q)uit, (d) latest data\n\
         To change the log capacity use `size <new_size>` (currently {} -> ~{:.1} seconds at {:.1}s sampling)\n\
         To send a remote command use `cmd <device_recognisable_cmd>`",
        status.capacity,
        status.retention_secs,
        status.sampling_interval_ms as f64 / 1000.0,
    );
}
