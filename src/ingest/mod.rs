//! # Ingestion Loop Module
//!
//! The long-running task that feeds the log store from the serial link.
//!
//! This module handles:
//! - The connection state machine (disconnected → connecting → streaming)
//! - Reconnecting with a fixed backoff when the port cannot be opened
//! - Reading with a timeout, idling briefly when no data arrives
//! - Running each line through decode → classify → append, with per-line
//!   errors reported and skipped (they never tear down the connection)
//! - Cooperative, bounded-latency shutdown via a cancellation token
//!
//! Only an explicit shutdown request ends the loop; connection failures
//! are retried forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::{decode_line, parse_json, LineAccumulator};
use crate::error::ThermolinkError;
use crate::record::{classify, now_ms, Record, Tunables};
use crate::serial::{CommandSender, Connect};
use crate::store::LogStore;

/// Connection state of the ingestion loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No link; about to attempt a connection (or waiting out the backoff)
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Link is up and lines are being ingested
    Streaming,
    /// Terminal state after shutdown
    Stopped,
}

/// Timing knobs for the ingestion loop
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    /// How long each read blocks waiting for data
    pub read_timeout: Duration,
    /// Pause after a read times out with no data (avoids busy-spinning)
    pub idle_sleep: Duration,
    /// Fixed delay before retrying a failed connection attempt
    pub reconnect_backoff: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            idle_sleep: Duration::from_millis(10),
            reconnect_backoff: Duration::from_millis(5000),
        }
    }
}

impl From<&crate::config::SerialConfig> for IngestSettings {
    fn from(config: &crate::config::SerialConfig) -> Self {
        Self {
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            idle_sleep: Duration::from_millis(config.idle_sleep_ms),
            reconnect_backoff: Duration::from_millis(config.reconnect_interval_ms),
        }
    }
}

/// Handle to a spawned ingestion loop
///
/// Lets the rest of the process observe the connection state and request a
/// bounded-latency shutdown.
#[derive(Debug)]
pub struct IngestHandle {
    task: JoinHandle<()>,
    state: watch::Receiver<LinkState>,
    token: CancellationToken,
}

impl IngestHandle {
    /// Current connection state
    pub fn link_state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Watcher for connection state changes
    pub fn state_watcher(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Request shutdown and wait (bounded) for the loop to stop
    ///
    /// The cancellation token is level-triggered; the loop observes it at
    /// the top of every iteration and inside every backoff or idle sleep,
    /// so it reaches `Stopped` well within one backoff tick.
    pub async fn shutdown(self, wait: Duration) {
        self.token.cancel();
        match timeout(wait, self.task).await {
            Ok(Ok(())) => debug!("Ingestion loop joined"),
            Ok(Err(e)) => warn!("Ingestion loop task failed: {}", e),
            Err(_) => warn!("Ingestion loop did not stop within {:?}", wait),
        }
    }
}

/// Spawn the ingestion loop on a new task
///
/// # Arguments
///
/// * `connector` - Serial link factory (real port or test fake)
/// * `store` - Log store the loop appends into (sole writer)
/// * `tunables` - Updated when config events carry a new sampling interval
/// * `commands` - Given the write half of each live link for outbound
///   commands
/// * `settings` - Timing knobs
/// * `token` - Cancellation token observed by the loop
pub fn spawn<C: Connect>(
    connector: C,
    store: Arc<LogStore>,
    tunables: Arc<Tunables>,
    commands: CommandSender,
    settings: IngestSettings,
    token: CancellationToken,
) -> IngestHandle {
    let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
    let task_token = token.clone();
    let task = tokio::spawn(async move {
        run(connector, store, tunables, commands, settings, task_token, state_tx).await;
    });

    IngestHandle {
        task,
        state: state_rx,
        token,
    }
}

async fn run<C: Connect>(
    connector: C,
    store: Arc<LogStore>,
    tunables: Arc<Tunables>,
    commands: CommandSender,
    settings: IngestSettings,
    token: CancellationToken,
    state: watch::Sender<LinkState>,
) {
    loop {
        if token.is_cancelled() {
            break;
        }

        let _ = state.send(LinkState::Connecting);
        let link = match connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                warn!(
                    "Connection failed: {}. Retrying in {:?}",
                    e, settings.reconnect_backoff
                );
                let _ = state.send(LinkState::Disconnected);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(settings.reconnect_backoff) => {}
                }
                continue;
            }
        };

        let (mut reader, writer) = tokio::io::split(link);
        commands.install(Box::new(writer)).await;
        let _ = state.send(LinkState::Streaming);

        stream_lines(&mut reader, &store, &tunables, settings, &token).await;

        // Link is down (or shutdown requested); outbound commands must not
        // touch the stale write half.
        commands.disconnect().await;
        let _ = state.send(LinkState::Disconnected);
    }

    commands.disconnect().await;
    let _ = state.send(LinkState::Stopped);
    info!("Ingestion loop stopped");
}

/// Read and ingest lines until the link fails or shutdown is requested
async fn stream_lines<R: AsyncRead + Unpin>(
    reader: &mut R,
    store: &LogStore,
    tunables: &Tunables,
    settings: IngestSettings,
    token: &CancellationToken,
) {
    let mut accumulator = LineAccumulator::new();
    let mut buf = [0u8; 1024];

    loop {
        if token.is_cancelled() {
            return;
        }

        match timeout(settings.read_timeout, reader.read(&mut buf)).await {
            // No data within the timeout; idle briefly
            Err(_) => {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(settings.idle_sleep) => {}
                }
            }
            Ok(Ok(0)) => {
                warn!("Serial link closed by peer");
                return;
            }
            Ok(Ok(n)) => {
                accumulator.push(&buf[..n]);
                drain_lines(&mut accumulator, store, tunables);
            }
            Ok(Err(e)) => {
                warn!("Serial link error: {}", e);
                return;
            }
        }
    }
}

/// Process every complete line currently buffered
fn drain_lines(accumulator: &mut LineAccumulator, store: &LogStore, tunables: &Tunables) {
    loop {
        match accumulator.next_line() {
            Ok(Some(raw)) => process_line(&raw, store, tunables),
            Ok(None) => return,
            Err(ThermolinkError::Decode(bytes)) => {
                warn!("Discarded oversized line fragment ({} bytes)", bytes.len());
            }
            Err(e) => warn!("Line accumulation error: {}", e),
        }
    }
}

/// Decode, classify, and append one raw line
///
/// Every failure here is local to the line: it is reported and the line is
/// dropped, leaving the connection and both logs untouched.
fn process_line(raw: &[u8], store: &LogStore, tunables: &Tunables) {
    let text = match decode_line(raw) {
        Ok(Some(text)) => text,
        Ok(None) => return, // Empty line
        Err(e) => {
            warn!("{}", e);
            return;
        }
    };

    let value = match parse_json(&text) {
        Ok(value) => value,
        Err(_) => {
            // Not JSON: the instrument interleaves plain diagnostic text
            // with its JSON stream. Surface it to the operator as-is.
            info!(target: "instrument", "{}", text);
            return;
        }
    };

    match classify(value, now_ms(), tunables) {
        Ok(Record::Sensor(reading)) => store.sensor().append(reading),
        Ok(Record::Config(event)) => store.config().append(event),
        Err(e) => warn!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::link::fakes::{Attempt, FakeConnector};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    fn fast_settings() -> IngestSettings {
        IngestSettings {
            read_timeout: Duration::from_millis(50),
            idle_sleep: Duration::from_millis(10),
            reconnect_backoff: Duration::from_millis(5000),
        }
    }

    fn spawn_with(
        attempts: Vec<Attempt>,
        settings: IngestSettings,
    ) -> (IngestHandle, Arc<LogStore>, Arc<Tunables>, CommandSender) {
        let store = Arc::new(LogStore::new(100));
        let tunables = Arc::new(Tunables::default());
        let commands = CommandSender::new();
        let handle = spawn(
            FakeConnector::new(attempts),
            Arc::clone(&store),
            Arc::clone(&tunables),
            commands.clone(),
            settings,
            CancellationToken::new(),
        );
        (handle, store, tunables, commands)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(10), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Condition not reached in time");
    }

    #[test]
    fn test_process_line_sensor_reading() {
        let store = LogStore::new(10);
        let tunables = Tunables::default();

        process_line(br#"{"names":["A"],"temperatures":[21.5]}"#, &store, &tunables);

        let snap = store.sensor().snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].names, json!(["A"]));
        assert!(store.config().is_empty());
    }

    #[test]
    fn test_process_line_config_event_updates_interval() {
        let store = LogStore::new(10);
        let tunables = Tunables::default();

        process_line(br#"{"sampling_interval_ms":500}"#, &store, &tunables);

        assert_eq!(store.config().len(), 1);
        assert!(store.sensor().is_empty());
        assert_eq!(tunables.sampling_interval_ms(), 500);
    }

    #[test]
    fn test_process_line_bad_input_leaves_logs_unchanged() {
        let store = LogStore::new(10);
        let tunables = Tunables::default();

        process_line(b"DEBUG: boot ok", &store, &tunables); // Plain text
        process_line(b"[1,2,3]", &store, &tunables); // Non-object JSON
        process_line(&[0xFF, 0xFE], &store, &tunables); // Invalid UTF-8
        process_line(b"", &store, &tunables); // Empty

        assert!(store.sensor().is_empty());
        assert!(store.config().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_appends_records() {
        let (link, mut peer) = tokio::io::duplex(4096);
        let (handle, store, _tunables, commands) =
            spawn_with(vec![Attempt::Link(link)], fast_settings());

        peer.write_all(b"{\"names\":[\"A\"],\"temperatures\":[21.5]}\n")
            .await
            .unwrap();
        peer.write_all(b"ESP-IDF boot message\n").await.unwrap();
        peer.write_all(b"{\"status\":\"ok\"}\n").await.unwrap();

        wait_until(|| store.sensor().len() == 1 && store.config().len() == 1).await;
        assert_eq!(handle.link_state(), LinkState::Streaming);
        assert!(commands.is_connected().await);

        handle.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_failure_reconnects_and_resumes() {
        let (link_a, mut peer_a) = tokio::io::duplex(4096);
        let (link_b, mut peer_b) = tokio::io::duplex(4096);
        let (handle, store, _tunables, _commands) =
            spawn_with(vec![Attempt::Link(link_a), Attempt::Link(link_b)], fast_settings());

        peer_a
            .write_all(b"{\"names\":[\"A\"],\"temperatures\":[20.0]}\n")
            .await
            .unwrap();
        wait_until(|| store.sensor().len() == 1).await;

        // Kill the first link; the loop should reconnect on its own
        drop(peer_a);

        let mut watcher = handle.state_watcher();
        watcher
            .wait_for(|s| *s == LinkState::Streaming)
            .await
            .unwrap();

        peer_b
            .write_all(b"{\"names\":[\"A\"],\"temperatures\":[21.0]}\n")
            .await
            .unwrap();
        wait_until(|| store.sensor().len() == 2).await;

        // Entries read before the failure are neither duplicated nor lost
        let snap = store.sensor().snapshot();
        assert_eq!(snap[0].temperatures, json!([20.0]));
        assert_eq!(snap[1].temperatures, json!([21.0]));

        handle.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_is_prompt() {
        // Every connection attempt is refused, so the loop sits in backoff
        let (handle, _store, _tunables, _commands) = spawn_with(vec![], fast_settings());

        let mut watcher = handle.state_watcher();
        watcher
            .wait_for(|s| *s == LinkState::Disconnected)
            .await
            .unwrap();

        let before = tokio::time::Instant::now();
        handle.shutdown(Duration::from_secs(5)).await;

        // Cancellation interrupts the 5s backoff sleep
        assert!(before.elapsed() < Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reaches_stopped_and_disconnects_commands() {
        let (link, _peer) = tokio::io::duplex(4096);
        let (handle, _store, _tunables, commands) =
            spawn_with(vec![Attempt::Link(link)], fast_settings());

        let mut watcher = handle.state_watcher();
        watcher
            .wait_for(|s| *s == LinkState::Streaming)
            .await
            .unwrap();

        let mut stopped_watcher = handle.state_watcher();
        handle.shutdown(Duration::from_secs(5)).await;

        stopped_watcher
            .wait_for(|s| *s == LinkState::Stopped)
            .await
            .unwrap();
        assert!(!commands.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_reach_instrument_while_streaming() {
        let (link, mut peer) = tokio::io::duplex(4096);
        let (handle, _store, _tunables, commands) =
            spawn_with(vec![Attempt::Link(link)], fast_settings());

        let mut watcher = handle.state_watcher();
        watcher
            .wait_for(|s| *s == LinkState::Streaming)
            .await
            .unwrap();

        commands.send("get temps").await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = tokio::io::AsyncReadExt::read(&mut peer, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"get temps\n");

        handle.shutdown(Duration::from_secs(5)).await;
    }
}
