//! Streaming connection lifecycle.
//!
//! Owns the WebSocket connection to the monitoring backend: connect, parse
//! inbound snapshots, reconnect after a fixed delay on unintentional drops,
//! and tear down cleanly on an intentional close. Accepted snapshots are
//! forwarded over an mpsc channel; the connection state is observable
//! through a watch channel for status display.

use crate::error::DashError;
use crate::message::{ClientMetadata, TrafficPush, TrafficSnapshot};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been opened yet
    Idle,
    /// Connection attempt (or timed reconnect) in progress
    Connecting,
    /// Streaming connection established
    Connected,
    /// Unintentional drop; a reconnect is scheduled
    Disconnected,
    /// Intentionally closed; no reconnect until `open()` is called again
    Closed,
}

impl ConnectionState {
    /// Short label for the status line.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "IDLE",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Closed => "CLOSED",
        }
    }
}

/// Streaming connection configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket URL of the monitoring backend
    pub url: String,
    /// Fixed delay before reconnecting after an unintentional drop
    pub reconnect_delay: Duration,
    /// Buffer size of the snapshot channel
    pub channel_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            reconnect_delay: Duration::from_secs(2),
            channel_buffer_size: 64,
        }
    }
}

impl StreamConfig {
    /// Create a new configuration with a custom URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// URL from `TRAFFIC_DASH_WS_URL`, with a localhost fallback.
    pub fn from_env() -> Self {
        let url = std::env::var("TRAFFIC_DASH_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:8000/ws".to_string());
        Self::new(url)
    }

    /// Set the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the snapshot channel buffer size.
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }
}

/// One accepted snapshot, already validated at the schema boundary.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub snapshot: TrafficSnapshot,
    pub metadata: ClientMetadata,
}

/// Owns the streaming connection lifecycle.
///
/// Every `open()` bumps a generation counter captured by the spawned socket
/// task; a task whose generation has been superseded stops touching shared
/// state, so a reconnect scheduled before an intentional close can never
/// resurrect the connection.
pub struct ConnectionManager {
    config: StreamConfig,
    update_tx: mpsc::Sender<SnapshotUpdate>,
    state_tx: watch::Sender<ConnectionState>,
    generation: Arc<AtomicU64>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl ConnectionManager {
    /// Create a manager plus the receivers for snapshots and state changes.
    pub fn new(
        config: StreamConfig,
    ) -> (
        Self,
        mpsc::Receiver<SnapshotUpdate>,
        watch::Receiver<ConnectionState>,
    ) {
        let (update_tx, update_rx) = mpsc::channel(config.channel_buffer_size);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let manager = Self {
            config,
            update_tx,
            state_tx,
            generation: Arc::new(AtomicU64::new(0)),
            shutdown_tx: None,
        };

        (manager, update_rx, state_rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Open the streaming connection. No-op if it is already open.
    pub fn open(&mut self) {
        if self.shutdown_tx.is_some() {
            debug!("open() called while connection is already open");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        info!(url = %self.config.url, generation, "opening streaming connection");

        tokio::spawn(run_stream(
            self.config.clone(),
            self.update_tx.clone(),
            self.state_tx.clone(),
            Arc::clone(&self.generation),
            generation,
            shutdown_rx,
        ));
    }

    /// Intentionally close the connection, cancelling any pending reconnect.
    /// The state becomes `Closed` and stays there until `open()` is called.
    pub fn close(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            debug!("close() called while connection is not open");
            return;
        };

        // Supersede the running task before signalling it, so even a racing
        // reconnect attempt observes the stale generation and gives up.
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _ = shutdown_tx.try_send(());
        let _ = self.state_tx.send(ConnectionState::Closed);
        info!("streaming connection closed intentionally");
    }
}

/// Publish a state change, unless the task has been superseded. The
/// generation check runs inside the watch send so a task racing an
/// intentional close can never overwrite the `Closed` state.
fn set_state(
    state_tx: &watch::Sender<ConnectionState>,
    generation: &AtomicU64,
    my_generation: u64,
    state: ConnectionState,
) -> bool {
    let mut current = false;
    state_tx.send_if_modified(|slot| {
        current = generation.load(Ordering::SeqCst) == my_generation;
        if current {
            *slot = state;
        }
        current
    });
    current
}

/// Socket task: connect, read frames, reconnect after the fixed delay.
async fn run_stream(
    config: StreamConfig,
    update_tx: mpsc::Sender<SnapshotUpdate>,
    state_tx: watch::Sender<ConnectionState>,
    generation: Arc<AtomicU64>,
    my_generation: u64,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        if !set_state(&state_tx, &generation, my_generation, ConnectionState::Connecting) {
            return;
        }

        let connected = tokio::select! {
            result = connect_async(&config.url) => result,
            _ = shutdown_rx.recv() => return,
        };

        match connected {
            Ok((ws_stream, _)) => {
                info!(url = %config.url, "connected to traffic stream");
                if !set_state(&state_tx, &generation, my_generation, ConnectionState::Connected) {
                    return;
                }

                let (_, mut read) = ws_stream.split();

                loop {
                    tokio::select! {
                        frame = read.next() => {
                            match frame {
                                Some(Ok(Message::Text(text))) => {
                                    let forwarded = forward_snapshot(
                                        &text,
                                        &update_tx,
                                        &generation,
                                        my_generation,
                                    )
                                    .await;
                                    if forwarded.is_err() {
                                        // Superseded, or the receiver dropped
                                        // because the application is shutting
                                        // down.
                                        return;
                                    }
                                }
                                Some(Ok(Message::Close(_))) => {
                                    info!("server closed the traffic stream");
                                    break;
                                }
                                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                                    // Heartbeats are handled by tungstenite.
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    error!(error = %DashError::Socket(e.to_string()), "traffic stream error");
                                    break;
                                }
                                None => break,
                            }
                        }
                        _ = shutdown_rx.recv() => return,
                    }
                }

                if !set_state(&state_tx, &generation, my_generation, ConnectionState::Disconnected) {
                    return;
                }
            }
            Err(e) => {
                error!(url = %config.url, error = %e, "failed to connect to traffic stream");
                if !set_state(&state_tx, &generation, my_generation, ConnectionState::Disconnected) {
                    return;
                }
            }
        }

        // Single fixed-delay reconnect per drop; an intentional close lands
        // here as a shutdown signal and cancels it.
        debug!(delay = ?config.reconnect_delay, "scheduling reconnect");
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown_rx.recv() => return,
        }
    }
}

/// Validate one text frame and forward it. A parse failure drops the single
/// malformed message and keeps the connection open. `Err` means the task
/// should stop: either its generation has been superseded by an intentional
/// close, so an in-flight frame must not reach the update channel, or the
/// receiver is gone.
async fn forward_snapshot(
    raw: &str,
    update_tx: &mpsc::Sender<SnapshotUpdate>,
    generation: &AtomicU64,
    my_generation: u64,
) -> Result<(), ()> {
    if generation.load(Ordering::SeqCst) != my_generation {
        debug!("dropping frame from superseded stream task");
        return Err(());
    }
    match TrafficPush::parse(raw) {
        Ok(push) => {
            let (snapshot, metadata) = push.into_domain();
            update_tx
                .send(SnapshotUpdate { snapshot, metadata })
                .await
                .map_err(|_| {
                    warn!("snapshot receiver dropped, stopping stream task");
                })
        }
        Err(error) => {
            let preview = raw.get(..raw.len().min(200)).unwrap_or(raw);
            warn!(%error, raw = preview, "dropping malformed push message");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_config_builder() {
        let config = StreamConfig::new("ws://localhost:9000/ws")
            .with_reconnect_delay(Duration::from_secs(5))
            .with_channel_buffer_size(16);

        assert_eq!(config.url, "ws://localhost:9000/ws");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.channel_buffer_size, 16);
    }

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.url, "ws://127.0.0.1:8000/ws");
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_forward_snapshot_drops_malformed() {
        let (tx, mut rx) = mpsc::channel(4);
        let generation = AtomicU64::new(1);

        assert!(forward_snapshot("not json at all", &tx, &generation, 1).await.is_ok());
        assert!(forward_snapshot(r#"{"hosts": {}}"#, &tx, &generation, 1).await.is_ok());
        assert!(rx.try_recv().is_err());

        forward_snapshot(
            r#"{"traffic": {"10.0.0.1": {"http": {"in": 1, "out": 2}}}}"#,
            &tx,
            &generation,
            1,
        )
        .await
        .unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update.snapshot["10.0.0.1"]["http"].outbound, 2);
    }

    #[tokio::test]
    async fn test_forward_snapshot_superseded_task_sends_nothing() {
        // An intentional close bumps the generation while a frame is still in
        // flight; the stale task must stop without touching the channel.
        let (tx, mut rx) = mpsc::channel(4);
        let generation = AtomicU64::new(2);

        let result = forward_snapshot(
            r#"{"traffic": {"10.0.0.1": {"http": {"in": 1, "out": 2}}}}"#,
            &tx,
            &generation,
            1,
        )
        .await;

        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_before_open_is_a_no_op() {
        let (mut manager, _updates, state_rx) = ConnectionManager::new(StreamConfig::default());
        manager.close();
        assert_eq!(*state_rx.borrow(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_lifecycle_against_local_server() {
        // Minimal in-process WebSocket server: accept one client, push one
        // good frame and one malformed frame.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::text("definitely not a snapshot")).await.unwrap();
            ws.send(Message::text(
                r#"{"traffic": {"10.0.0.1": {"http": {"in": 100, "out": 50}}}}"#,
            ))
            .await
            .unwrap();
            // Keep the connection open until the client goes away.
            while ws.next().await.is_some() {}
        });

        let config = StreamConfig::new(format!("ws://{addr}"))
            .with_reconnect_delay(Duration::from_millis(50));
        let (mut manager, mut updates, state_rx) = ConnectionManager::new(config);
        assert_eq!(manager.state(), ConnectionState::Idle);

        manager.open();

        // The malformed frame is dropped; the valid snapshot arrives.
        let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("snapshot channel closed");
        assert_eq!(update.snapshot["10.0.0.1"]["http"].inbound, 100);
        assert_eq!(manager.state(), ConnectionState::Connected);

        // Intentional close lands in Closed and stays there past the
        // reconnect delay.
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*state_rx.borrow(), ConnectionState::Closed);
    }
}
