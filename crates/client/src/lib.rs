//! Stream transport client for the pulseboard dashboard.
//!
//! One WebSocket connection multiplexes every named data channel the
//! dashboard consumes. This crate owns the client side of that wire:
//! connection lifecycle and reconnection backoff, per-channel
//! demultiplexing, registration acknowledgement tracking, and switching
//! between the live backend and the local mock producer.
//!
//! [`StreamClient`] is the explicitly-constructed context object: it
//! owns the [`ConnectionManager`], [`ChannelRouter`] and
//! [`RegistrationTracker`] and wires their seams together. There are no
//! global singletons; lifecycle is `new` → [`StreamClient::start`] →
//! [`StreamClient::shutdown`].

pub mod demux;
pub mod manager;
pub mod registration;
pub mod types;
pub mod ws;

mod pumps;
mod reconnection;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pulseboard_mock::MockSource;
use pulseboard_protocol::{ClientRequest, ServerMessage, StreamOptions};

pub use demux::{ChannelRouter, ChannelSubscription, route_to_channel};
pub use manager::ConnectionManager;
pub use registration::{RegistrationRecord, RegistrationTracker};
pub use types::{ConnectionState, ConnectionStats, ReconnectConfig};
pub use ws::WsError;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the dashboard backend.
    pub url: String,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
    /// Start in mock mode instead of dialing the backend.
    pub mock_mode: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".into(),
            reconnect: ReconnectConfig::default(),
            mock_mode: false,
        }
    }
}

/// The client context: connection manager, channel router and
/// registration tracker, wired together.
///
/// Must be created inside a tokio runtime. Consumers read state through
/// the exposed watch receivers and channel subscriptions; all mutation
/// goes through the methods here. Every subscription and watch receiver
/// must be dropped by its owner — leaked ones keep their forwarding
/// tasks alive until shutdown.
pub struct StreamClient {
    manager: ConnectionManager,
    router: ChannelRouter,
    tracker: RegistrationTracker,
    cancel: CancellationToken,
    start_in_mock: bool,
}

impl StreamClient {
    pub fn new(config: ClientConfig) -> Self {
        let cancel = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Value>(256);
        let (outbound_tx, outbound_rx) = mpsc::channel::<ClientRequest>(64);

        let mock = MockSource::new(inbound_tx.clone());
        let manager =
            ConnectionManager::new(&config.url, config.reconnect, inbound_tx, mock);
        let router = ChannelRouter::new(256, cancel.child_token());
        let tracker = RegistrationTracker::new(outbound_tx, cancel.child_token());

        tracker.spawn_reregistration(manager.connection_stats());

        tokio::spawn(route_inbound(
            manager.clone(),
            router.clone(),
            tracker.clone(),
            inbound_rx,
            cancel.child_token(),
        ));
        tokio::spawn(forward_outbound(
            manager.clone(),
            outbound_rx,
            cancel.child_token(),
        ));

        Self {
            manager,
            router,
            tracker,
            cancel,
            start_in_mock: config.mock_mode,
        }
    }

    /// Brings the client up: dials the backend, or activates the mock
    /// source when configured to start offline.
    pub async fn start(&self) {
        if self.start_in_mock {
            self.manager.set_mock_mode(true).await;
        } else {
            self.manager.connect().await;
        }
    }

    /// Stops every task, closes the transport and silences the mock
    /// source. Subscriptions drain and then end.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.manager.shutdown().await;
    }

    // --- connection ---

    pub async fn connect(&self) {
        self.manager.connect().await;
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    pub async fn force_reconnect(&self) {
        self.manager.force_reconnect().await;
    }

    /// Observable connection state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.connection_state()
    }

    /// Observable connection statistics.
    pub fn connection_stats(&self) -> watch::Receiver<ConnectionStats> {
        self.manager.connection_stats()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.manager.current_state()
    }

    pub async fn set_mock_mode(&self, enabled: bool) {
        self.manager.set_mock_mode(enabled).await;
    }

    pub fn is_mock_mode(&self) -> bool {
        self.manager.is_mock_mode()
    }

    /// Application-level ping; returns the request id used.
    pub async fn ping(&self) -> String {
        self.manager.ping().await
    }

    /// Sends a feature-specific request, opaque to the core.
    pub async fn send_raw(&self, message: Value) {
        self.manager.send_raw(message).await;
    }

    // --- channels ---

    /// Opens a live view of one channel and announces the subscription
    /// to the producer.
    pub fn subscribe(&self, channel: &str) -> ChannelSubscription {
        let subscription = self.router.subscribe(channel);
        let manager = self.manager.clone();
        let request = ClientRequest::Subscribe {
            channel: channel.to_owned(),
        };
        tokio::spawn(async move { manager.send(&request).await });
        subscription
    }

    // --- registration ---

    /// Declares interest in a stream; returns the request id
    /// immediately. Confirmation arrives through the registration
    /// observables.
    pub fn register_for_stream(&self, channel: &str, options: StreamOptions) -> String {
        self.tracker.register_for_stream(channel, options)
    }

    /// Observable set of confirmed streams.
    pub fn registered_streams(&self) -> watch::Receiver<std::collections::BTreeSet<String>> {
        self.tracker.registered_streams()
    }

    /// Observable registration flag for one stream.
    pub fn watch_stream(&self, channel: &str) -> watch::Receiver<bool> {
        self.tracker.watch_stream(channel)
    }

    pub fn is_registered(&self, channel: &str) -> bool {
        self.tracker.is_registered(channel)
    }

    /// Latest registration attempt metadata for a channel.
    pub fn registration_record(&self, channel: &str) -> Option<RegistrationRecord> {
        self.tracker.record(channel)
    }
}

/// Classifies each inbound message once and dispatches it: acks feed the
/// tracker, pongs close the latency loop, everything routable fans out
/// to channel subscribers.
async fn route_inbound(
    manager: ConnectionManager,
    router: ChannelRouter,
    tracker: RegistrationTracker,
    mut inbound_rx: mpsc::Receiver<Value>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            value = inbound_rx.recv() => {
                let Some(value) = value else { break };
                let msg = ServerMessage::classify(value);
                if let Some(id) = msg.request_id() {
                    manager.note_reply(id);
                }
                match msg {
                    ServerMessage::RegistrationAck(ack) => tracker.handle_ack(&ack),
                    ServerMessage::Pong(pong) => {
                        debug!(
                            request_id = pong.request_id.as_deref().unwrap_or(""),
                            timestamp = pong.timestamp.as_deref().unwrap_or(""),
                            "pong received"
                        );
                    }
                    ServerMessage::Data(value) => router.publish(value),
                    ServerMessage::Unknown(value) => {
                        debug!(?value, "unroutable frame dropped");
                    }
                }
            }
        }
    }
}

/// Drains the registration tracker's outbound seam into the manager.
async fn forward_outbound(
    manager: ConnectionManager,
    mut outbound_rx: mpsc::Receiver<ClientRequest>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = outbound_rx.recv() => {
                let Some(request) = request else { break };
                manager.send(&request).await;
            }
        }
    }
}
