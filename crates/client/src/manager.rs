//! Connection manager.
//!
//! Owns the single transport connection, its lifecycle and statistics,
//! and the reconnection policy. In mock mode no transport exists:
//! outbound traffic is routed to the mock source and the state reads
//! `Connected`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulseboard_mock::MockSource;
use pulseboard_protocol::{ClientRequest, PingOptions};

use crate::reconnection::reconnect_loop;
use crate::types::{ConnectionState, ConnectionStats, ReconnectConfig};
use crate::ws::WsTransport;

/// Correlation entries older than this are pruned; the server is not
/// going to answer them.
const SENT_AT_TTL: Duration = Duration::from_secs(60);

/// Manages the transport connection to the dashboard backend.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    url: String,
    pub(crate) reconnect: ReconnectConfig,
    transport: Arc<Mutex<Option<WsTransport>>>,
    inbound_tx: mpsc::Sender<Value>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    stats_tx: Arc<watch::Sender<ConnectionStats>>,
    /// Failed attempts since the last successful open.
    pub(crate) attempt: Arc<AtomicU32>,
    /// Set by `disconnect` to suppress auto-reconnect until the next
    /// explicit `connect`.
    manual_disconnect: Arc<AtomicBool>,
    mock_mode: Arc<AtomicBool>,
    mock: MockSource,
    sent_at: Arc<std::sync::Mutex<HashMap<String, Instant>>>,
    reconnect_slot: Arc<std::sync::Mutex<Option<(u64, CancellationToken)>>>,
    reconnect_gen: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub(crate) fn new(
        url: impl Into<String>,
        reconnect: ReconnectConfig,
        inbound_tx: mpsc::Sender<Value>,
        mock: MockSource,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (stats_tx, _) = watch::channel(ConnectionStats::default());
        Self {
            url: url.into(),
            reconnect,
            transport: Arc::new(Mutex::new(None)),
            inbound_tx,
            state_tx: Arc::new(state_tx),
            stats_tx: Arc::new(stats_tx),
            attempt: Arc::new(AtomicU32::new(0)),
            manual_disconnect: Arc::new(AtomicBool::new(false)),
            mock_mode: Arc::new(AtomicBool::new(false)),
            mock,
            sent_at: Arc::new(std::sync::Mutex::new(HashMap::new())),
            reconnect_slot: Arc::new(std::sync::Mutex::new(None)),
            reconnect_gen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Observable connection state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Observable connection statistics.
    pub fn connection_stats(&self) -> watch::Receiver<ConnectionStats> {
        self.stats_tx.subscribe()
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Snapshot of the current statistics.
    pub fn current_stats(&self) -> ConnectionStats {
        *self.stats_tx.borrow()
    }

    pub fn is_mock_mode(&self) -> bool {
        self.mock_mode.load(Ordering::SeqCst)
    }

    /// Opens the connection. No-op while already connecting/connected or
    /// in mock mode. A failed attempt schedules reconnection when
    /// enabled.
    pub async fn connect(&self) {
        if self.is_mock_mode() {
            info!("mock mode active, no live connection attempted");
            return;
        }
        let state = self.current_state();
        if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
            debug!(?state, "connect ignored");
            return;
        }
        self.manual_disconnect.store(false, Ordering::SeqCst);
        self.cancel_reconnect();

        if !self.try_connect().await && self.should_reconnect() {
            self.schedule_reconnect();
        }
    }

    /// Closes the connection and suppresses auto-reconnect until the
    /// next explicit `connect`. Idempotent.
    pub async fn disconnect(&self) {
        info!("manual disconnect");
        self.manual_disconnect.store(true, Ordering::SeqCst);
        self.cancel_reconnect();
        self.close_transport().await;
        self.stats_tx.send_modify(|s| s.attempting = 0);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Drops any existing transport and dials fresh, resetting the
    /// attempt counter. In mock mode this is a no-op: there is nothing
    /// real to reconnect.
    pub async fn force_reconnect(&self) {
        if self.is_mock_mode() {
            info!("mock mode active, reconnect skipped");
            return;
        }
        info!("forced reconnect");
        self.manual_disconnect.store(false, Ordering::SeqCst);
        self.attempt.store(0, Ordering::SeqCst);
        self.cancel_reconnect();
        self.close_transport().await;
        self.set_state(ConnectionState::Disconnected);
        self.connect().await;
    }

    /// Sends a core request. Delivery is best-effort: failures are
    /// logged, never returned.
    pub async fn send(&self, request: &ClientRequest) {
        match serde_json::to_value(request) {
            Ok(value) => self.send_raw(value).await,
            Err(e) => error!(error = %e, "failed to encode request"),
        }
    }

    /// Sends an arbitrary JSON message (feature-specific requests travel
    /// through here, opaque to the core).
    ///
    /// In mock mode the message goes to the mock source. Live: written
    /// if the transport is open, otherwise dropped with a warning and a
    /// connection attempt is triggered unless one is already in flight.
    pub async fn send_raw(&self, message: Value) {
        if let Some(id) = message
            .get("options")
            .and_then(|o| o.get("requestId"))
            .and_then(Value::as_str)
        {
            self.note_sent(id);
        }

        if self.is_mock_mode() {
            self.mock.handle_request(&message);
            return;
        }

        let guard = self.transport.lock().await;
        match guard.as_ref() {
            Some(transport) if transport.is_open() => {
                debug!("sending message");
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(e) = transport.send_text(text).await {
                            warn!(error = %e, "send failed, message dropped");
                        }
                    }
                    Err(e) => error!(error = %e, "failed to encode message"),
                }
            }
            _ => {
                drop(guard);
                warn!("not connected, message dropped");
                if self.current_state() != ConnectionState::Connecting {
                    let manager = self.clone();
                    tokio::spawn(async move { manager.connect().await });
                }
            }
        }
    }

    /// Sends an application-level ping; the pong is matched back by
    /// request id and its round-trip time logged.
    pub async fn ping(&self) -> String {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.send(&ClientRequest::Ping {
            options: PingOptions {
                request_id: request_id.clone(),
            },
        })
        .await;
        request_id
    }

    /// Switches between mock and live operation. Idempotent.
    ///
    /// Enabling tears down any live transport and reports `Connected`
    /// immediately. Disabling stops the mock source and dials the real
    /// server; if that fails, the client stays in the live reconnect
    /// regime — it never falls back into mock mode on its own.
    pub async fn set_mock_mode(&self, enabled: bool) {
        if self.mock_mode.swap(enabled, Ordering::SeqCst) == enabled {
            return;
        }
        info!(enabled, "mock mode toggled");

        if enabled {
            self.cancel_reconnect();
            self.close_transport().await;
            self.mock.start();
            self.attempt.store(0, Ordering::SeqCst);
            self.stats_tx.send_modify(|s| {
                s.opened += 1;
                s.attempting = 0;
            });
            self.set_state(ConnectionState::Connected);
        } else {
            self.mock.stop();
            self.set_state(ConnectionState::Disconnected);
            self.connect().await;
        }
    }

    /// Shuts the manager down: no reconnects, transport closed, mock
    /// stopped.
    pub async fn shutdown(&self) {
        self.manual_disconnect.store(true, Ordering::SeqCst);
        self.cancel_reconnect();
        self.close_transport().await;
        self.mock.stop();
        self.set_state(ConnectionState::Disconnected);
        info!("connection manager shut down");
    }

    // --- internals ---

    /// One dial attempt. Updates state and statistics; does not schedule
    /// anything.
    pub(crate) async fn try_connect(&self) -> bool {
        let attempting = self.attempt.load(Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Connecting);
        self.stats_tx.send_modify(|s| s.attempting = attempting);
        info!(url = %self.url, attempt = attempting, "connecting");

        match WsTransport::connect(&self.url, self.inbound_tx.clone()).await {
            Ok(transport) => {
                let manager = self.clone();
                transport
                    .set_close_callback(Box::new(move || {
                        let manager = manager.clone();
                        tokio::spawn(async move { manager.handle_connection_lost().await });
                    }))
                    .await;
                *self.transport.lock().await = Some(transport);
                self.attempt.store(0, Ordering::SeqCst);
                self.stats_tx.send_modify(|s| {
                    s.opened += 1;
                    s.attempting = 0;
                });
                self.set_state(ConnectionState::Connected);
                info!("connection established");
                true
            }
            Err(e) => {
                warn!(error = %e, attempt = attempting, "connection attempt failed");
                // An error is logged, counted, and then treated as a
                // close: the caller decides whether to schedule.
                self.stats_tx.send_modify(|s| {
                    s.errored += 1;
                    s.closed += 1;
                });
                self.set_state(ConnectionState::Error);
                self.set_state(ConnectionState::Disconnected);
                false
            }
        }
    }

    /// Handles an unexpected transport close (the intentional paths
    /// never fire the close callback).
    pub(crate) async fn handle_connection_lost(&self) {
        self.transport.lock().await.take();
        warn!("connection lost");
        self.stats_tx.send_modify(|s| s.closed += 1);
        self.set_state(ConnectionState::Disconnected);
        if self.should_reconnect() {
            self.schedule_reconnect();
        }
    }

    fn should_reconnect(&self) -> bool {
        self.reconnect.enabled
            && !self.manual_disconnect.load(Ordering::SeqCst)
            && !self.is_mock_mode()
    }

    fn schedule_reconnect(&self) {
        let token = CancellationToken::new();
        let generation = self.reconnect_gen.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut slot = self.reconnect_slot.lock().unwrap();
            if slot.is_some() {
                return; // A loop is already running.
            }
            *slot = Some((generation, token.clone()));
        }
        let manager = self.clone();
        tokio::spawn(async move { reconnect_loop(manager, token, generation).await });
    }

    fn cancel_reconnect(&self) {
        if let Some((_, token)) = self.reconnect_slot.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// Clears the reconnect slot at loop exit, unless a newer loop owns
    /// it.
    pub(crate) fn clear_reconnect_slot(&self, generation: u64) {
        let mut slot = self.reconnect_slot.lock().unwrap();
        if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
            *slot = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn reconnect_pending(&self) -> bool {
        self.reconnect_slot.lock().unwrap().is_some()
    }

    async fn close_transport(&self) {
        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await;
            self.stats_tx.send_modify(|s| s.closed += 1);
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                debug!(from = ?state, to = ?next, "connection state changed");
                *state = next;
                true
            }
        });
    }

    fn note_sent(&self, request_id: &str) {
        let mut sent = self.sent_at.lock().unwrap();
        sent.retain(|_, at| at.elapsed() < SENT_AT_TTL);
        sent.insert(request_id.to_owned(), Instant::now());
    }

    /// Matches an echoed request id back to its send instant and logs
    /// the round-trip time.
    pub(crate) fn note_reply(&self, request_id: &str) {
        if let Some(at) = self.sent_at.lock().unwrap().remove(request_id) {
            info!(
                request_id,
                elapsed_ms = at.elapsed().as_millis() as u64,
                "response received"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nothing listens on the discard port; dials fail fast.
    const DEAD_URL: &str = "ws://127.0.0.1:9";

    fn manager(reconnect: ReconnectConfig) -> (ConnectionManager, mpsc::Receiver<Value>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let mock = MockSource::new(inbound_tx.clone());
        (
            ConnectionManager::new(DEAD_URL, reconnect, inbound_tx, mock),
            inbound_rx,
        )
    }

    fn no_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            enabled: false,
            ..ReconnectConfig::default()
        }
    }

    #[tokio::test]
    async fn initial_state() {
        let (mgr, _rx) = manager(no_reconnect());
        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
        assert_eq!(mgr.current_stats(), ConnectionStats::default());
        assert!(!mgr.is_mock_mode());
    }

    #[tokio::test]
    async fn failed_connect_counts_and_settles_disconnected() {
        let (mgr, _rx) = manager(no_reconnect());
        mgr.connect().await;

        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
        let stats = mgr.current_stats();
        assert_eq!(stats.errored, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.opened, 0);
        assert!(!mgr.reconnect_pending(), "reconnect disabled");
    }

    #[tokio::test]
    async fn failed_connect_schedules_reconnect_when_enabled() {
        let (mgr, _rx) = manager(ReconnectConfig::default());
        mgr.connect().await;
        assert!(mgr.reconnect_pending());

        // Manual disconnect cancels the pending loop.
        mgr.disconnect().await;
        assert!(!mgr.reconnect_pending());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (mgr, _rx) = manager(no_reconnect());
        mgr.disconnect().await;
        mgr.disconnect().await;
        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn mock_mode_reports_connected_without_transport() {
        let (mgr, _rx) = manager(no_reconnect());
        mgr.set_mock_mode(true).await;

        assert!(mgr.is_mock_mode());
        assert_eq!(mgr.current_state(), ConnectionState::Connected);
        assert_eq!(mgr.current_stats().opened, 1);

        // Redundant enable changes nothing.
        mgr.set_mock_mode(true).await;
        assert_eq!(mgr.current_stats().opened, 1);
    }

    #[tokio::test]
    async fn connect_is_noop_in_mock_mode() {
        let (mgr, _rx) = manager(no_reconnect());
        mgr.set_mock_mode(true).await;
        mgr.connect().await;
        // Still synthetically connected; no dial happened.
        assert_eq!(mgr.current_state(), ConnectionState::Connected);
        assert_eq!(mgr.current_stats().errored, 0);
    }

    #[tokio::test]
    async fn send_in_mock_mode_reaches_mock_source() {
        let (mgr, mut inbound_rx) = manager(no_reconnect());
        mgr.set_mock_mode(true).await;

        mgr.send(&ClientRequest::register(
            "health-metrics",
            Default::default(),
            "health-metrics-reg-1-1",
        ))
        .await;

        // The mock source acks on the inbound seam.
        let ack = tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
            .await
            .expect("ack within mock delay")
            .unwrap();
        assert_eq!(ack["action"], "registration-ack");
        assert_eq!(ack["stream"], "health-metrics");
    }

    #[tokio::test]
    async fn leaving_mock_mode_with_dead_server_stays_live() {
        let (mgr, _rx) = manager(no_reconnect());
        mgr.set_mock_mode(true).await;
        mgr.set_mock_mode(false).await;

        // The dial failed; the client stays in the live regime instead of
        // silently falling back to mock.
        assert!(!mgr.is_mock_mode());
        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_while_disconnected_drops_and_dials() {
        let (mgr, _rx) = manager(no_reconnect());
        mgr.send_raw(serde_json::json!({"action": "getMetricsByType"}))
            .await;

        // The triggered dial runs in the background and fails against the
        // dead URL; wait for it to settle.
        let mut state_rx = mgr.connection_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if mgr.current_stats().errored > 0 {
                    break;
                }
                let _ = state_rx.changed().await;
            }
        })
        .await
        .expect("background dial should have failed");
    }

    #[tokio::test]
    async fn shutdown_is_clean_and_repeatable() {
        let (mgr, _rx) = manager(ReconnectConfig::default());
        mgr.connect().await;
        mgr.shutdown().await;
        mgr.shutdown().await;
        assert!(!mgr.reconnect_pending());
        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
    }
}
