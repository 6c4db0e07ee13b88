//! The mock source: answers outbound requests and runs the emission tasks.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulseboard_protocol::constants::{MOCK_ACK_DELAY, MOCK_FIRST_PAYLOAD_DELAY};

use crate::generators;

/// Local substitute producer.
///
/// Synthesized messages are injected into the same inbound seam the live
/// transport feeds, so the router, demultiplexer and registration tracker
/// cannot tell the difference. Channel names survive [`stop`](Self::stop):
/// re-enabling mock mode resumes emission for everything previously
/// activated.
#[derive(Clone)]
pub struct MockSource {
    inner: Arc<Inner>,
}

struct Inner {
    inbound_tx: mpsc::Sender<Value>,
    active: AtomicBool,
    /// Channels that have been registered, subscribed, or otherwise
    /// activated. Emission tasks exist only for members with a generator.
    channels: std::sync::Mutex<HashSet<String>>,
    /// Root token for the current activation; cancelled by `stop`.
    cancel: std::sync::Mutex<Option<CancellationToken>>,
}

impl MockSource {
    pub fn new(inbound_tx: mpsc::Sender<Value>) -> Self {
        Self {
            inner: Arc::new(Inner {
                inbound_tx,
                active: AtomicBool::new(false),
                channels: std::sync::Mutex::new(HashSet::new()),
                cancel: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Starts emission. Idempotent: a second call while active changes
    /// nothing and spawns no duplicate tasks.
    pub fn start(&self) {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            debug!("mock source already active");
            return;
        }
        let root = CancellationToken::new();
        *self.inner.cancel.lock().unwrap() = Some(root.clone());

        let known: Vec<String> = self
            .inner
            .channels
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect();
        for channel in &known {
            self.spawn_emission(channel, &root);
        }
        info!(channels = known.len(), "mock data source started");
    }

    /// Stops all emission tasks. Idempotent. Activated channel names are
    /// kept for a later `start`.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(root) = self.inner.cancel.lock().unwrap().take() {
            root.cancel();
        }
        info!("mock data source stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Channels currently activated for emission.
    pub fn active_channels(&self) -> Vec<String> {
        self.inner.channels.lock().unwrap().iter().cloned().collect()
    }

    /// Interprets an outbound request while mock mode is active.
    ///
    /// `register` is acknowledged after a short delay and starts the
    /// channel's periodic emission; `subscribe` starts emission without an
    /// ack; `ping` gets a `pong`. Anything else is dropped with a debug
    /// log — feature requests have no mock implementation.
    pub fn handle_request(&self, request: &Value) {
        if !self.is_active() {
            debug!("mock source inactive, dropping request");
            return;
        }

        match request.get("action").and_then(Value::as_str) {
            Some("register") => {
                let Some(stream) = request.get("stream").and_then(Value::as_str) else {
                    warn!("register request without stream field");
                    return;
                };
                let request_id = request
                    .get("options")
                    .and_then(|o| o.get("requestId"))
                    .and_then(Value::as_str)
                    .map(str::to_owned);

                info!(stream, "mock registration");
                self.activate_channel(stream);

                if let Some(request_id) = request_id {
                    let ack = json!({
                        "action": "registration-ack",
                        "success": true,
                        "stream": stream,
                        "requestId": request_id,
                        "message": format!("registered for {stream} stream (mock)")
                    });
                    self.inject_after(MOCK_ACK_DELAY, ack);
                }
                self.send_first_payload(stream);
            }
            Some("subscribe") => {
                let Some(channel) = request.get("channel").and_then(Value::as_str) else {
                    warn!("subscribe request without channel field");
                    return;
                };
                debug!(channel, "mock subscription");
                self.activate_channel(channel);
                self.send_first_payload(channel);
            }
            Some("ping") => {
                let request_id = request
                    .get("options")
                    .and_then(|o| o.get("requestId"))
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let pong = json!({
                    "action": "pong",
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "requestId": request_id,
                    "message": "connection healthy (mock)"
                });
                self.inject_after(MOCK_ACK_DELAY, pong);
            }
            action => {
                debug!(?action, "mock source ignoring request");
            }
        }
    }

    /// Adds a channel to the active set, spawning its emission task when
    /// it is new and has a generator.
    fn activate_channel(&self, channel: &str) {
        let newly_added = self.inner.channels.lock().unwrap().insert(channel.to_owned());
        if !newly_added {
            return; // Emission already running (or will start with the source).
        }
        if !generators::supported(channel) {
            debug!(channel, "no mock generator for channel");
            return;
        }
        if let Some(root) = self.current_root() {
            self.spawn_emission(channel, &root);
        }
    }

    fn send_first_payload(&self, channel: &str) {
        if !generators::supported(channel) {
            return; // Gap already logged by activate_channel.
        }
        let channel = channel.to_owned();
        let inbound_tx = self.inner.inbound_tx.clone();
        let Some(root) = self.current_root() else { return };
        tokio::spawn(async move {
            tokio::select! {
                _ = root.cancelled() => {}
                _ = tokio::time::sleep(MOCK_FIRST_PAYLOAD_DELAY) => {
                    if let Some(payload) = generators::generate(&channel) {
                        inject(&inbound_tx, envelope(&channel, payload)).await;
                    }
                }
            }
        });
    }

    fn inject_after(&self, delay: std::time::Duration, message: Value) {
        let inbound_tx = self.inner.inbound_tx.clone();
        let Some(root) = self.current_root() else { return };
        tokio::spawn(async move {
            tokio::select! {
                _ = root.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    inject(&inbound_tx, message).await;
                }
            }
        });
    }

    fn spawn_emission(&self, channel: &str, root: &CancellationToken) {
        if !generators::supported(channel) {
            return;
        }
        let channel = channel.to_owned();
        let inbound_tx = self.inner.inbound_tx.clone();
        let cancel = root.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(generators::cadence(&channel));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the immediate first tick.

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(payload) = generators::generate(&channel) {
                            inject(&inbound_tx, envelope(&channel, payload)).await;
                        }
                    }
                }
            }
        });
    }

    fn current_root(&self) -> Option<CancellationToken> {
        self.inner.cancel.lock().unwrap().clone()
    }
}

fn envelope(channel: &str, payload: Value) -> Value {
    json!({ "channel": channel, "data": payload })
}

async fn inject(inbound_tx: &mpsc::Sender<Value>, message: Value) {
    if inbound_tx.send(message).await.is_err() {
        debug!("inbound channel closed, dropping synthetic message");
    }
}
