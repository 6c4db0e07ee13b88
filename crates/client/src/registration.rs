//! Stream registration tracking.
//!
//! Declares interest in a channel to the backend, confirms the
//! declaration was acknowledged, retries on timeout with jitter, and
//! exposes the live set of confirmed channels. Requests leave through an
//! outbound channel seam wired to the connection manager by the client
//! context, which keeps the tracker drivable in isolation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulseboard_protocol::constants::{
    REGISTRATION_ACK_TIMEOUT, REGISTRATION_RETRY_BASE, REGISTRATION_RETRY_JITTER,
};
use pulseboard_protocol::{ClientRequest, RegistrationAck, StreamOptions};

use crate::types::ConnectionStats;

/// One registration attempt for a channel.
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub request_id: String,
    pub sent_at: Instant,
    pub acknowledged: bool,
    pub retry_count: u32,
}

struct TrackedRegistration {
    record: RegistrationRecord,
    options: StreamOptions,
    /// Cancels the pending ack watcher when the registration is
    /// superseded.
    watcher: CancellationToken,
}

/// Tracks which streams the backend has confirmed.
#[derive(Clone)]
pub struct RegistrationTracker {
    outbound_tx: mpsc::Sender<ClientRequest>,
    records: Arc<std::sync::Mutex<HashMap<String, TrackedRegistration>>>,
    registered_tx: Arc<watch::Sender<BTreeSet<String>>>,
    cancel: CancellationToken,
}

impl RegistrationTracker {
    pub(crate) fn new(outbound_tx: mpsc::Sender<ClientRequest>, cancel: CancellationToken) -> Self {
        let (registered_tx, _) = watch::channel(BTreeSet::new());
        Self {
            outbound_tx,
            records: Arc::new(std::sync::Mutex::new(HashMap::new())),
            registered_tx: Arc::new(registered_tx),
            cancel,
        }
    }

    /// Declares interest in a stream. Returns the request id immediately;
    /// confirmation arrives later through [`registered_streams`]
    /// (Self::registered_streams).
    ///
    /// Calling again for the same channel supersedes the previous
    /// attempt.
    pub fn register_for_stream(&self, channel: &str, options: StreamOptions) -> String {
        self.register_attempt(channel, options, 0)
    }

    fn register_attempt(&self, channel: &str, options: StreamOptions, retry_count: u32) -> String {
        let request_id = registration_request_id(channel);
        let watcher = self.cancel.child_token();
        {
            let mut records = self.records.lock().unwrap();
            if let Some(previous) = records.get(channel) {
                previous.watcher.cancel();
            }
            records.insert(
                channel.to_owned(),
                TrackedRegistration {
                    record: RegistrationRecord {
                        request_id: request_id.clone(),
                        sent_at: Instant::now(),
                        acknowledged: false,
                        retry_count,
                    },
                    options: options.clone(),
                    watcher: watcher.clone(),
                },
            );
        }

        let request = ClientRequest::register(channel, options.clone(), request_id.clone());
        if self.outbound_tx.try_send(request).is_err() {
            // Outbound congestion; the ack watcher will retry.
            warn!(channel, "outbound queue full, registration request dropped");
        }
        debug!(channel, request_id = %request_id, retry_count, "registration request sent");

        let tracker = self.clone();
        let channel = channel.to_owned();
        let id = request_id.clone();
        tokio::spawn(async move {
            tracker.ack_watch(channel, options, id, retry_count, watcher).await;
        });

        request_id
    }

    /// Waits for the registration to be acknowledged, retrying on
    /// timeout. Retries are unbounded: for a long-lived dashboard,
    /// eventual registration beats giving up, and the per-cycle warning
    /// is the operator-visible signal.
    async fn ack_watch(
        &self,
        channel: String,
        options: StreamOptions,
        request_id: String,
        retry_count: u32,
        cancel: CancellationToken,
    ) {
        let mut registered_rx = self.registered_tx.subscribe();

        let acknowledged = async {
            loop {
                if self.attempt_acknowledged(&channel, &request_id) {
                    return true;
                }
                if registered_rx.changed().await.is_err() {
                    return false; // Tracker gone.
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {}
            outcome = tokio::time::timeout(REGISTRATION_ACK_TIMEOUT, acknowledged) => {
                match outcome {
                    Ok(_) => {}
                    Err(_) => {
                        warn!(
                            channel = %channel,
                            request_id = %request_id,
                            retry_count,
                            "registration not acknowledged within {:?}, retrying",
                            REGISTRATION_ACK_TIMEOUT
                        );
                        let jitter_ms = rand::thread_rng()
                            .gen_range(0..REGISTRATION_RETRY_JITTER.as_millis() as u64);
                        let delay =
                            REGISTRATION_RETRY_BASE + std::time::Duration::from_millis(jitter_ms);
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {
                                self.register_attempt(&channel, options, retry_count + 1);
                            }
                        }
                    }
                }
            }
        }
    }

    fn attempt_acknowledged(&self, channel: &str, request_id: &str) -> bool {
        self.records
            .lock()
            .unwrap()
            .get(channel)
            .is_some_and(|t| t.record.request_id == request_id && t.record.acknowledged)
    }

    /// Processes an acknowledgement from the backend (or mock source).
    pub(crate) fn handle_ack(&self, ack: &RegistrationAck) {
        if !ack.success {
            warn!(
                stream = %ack.stream,
                request_id = %ack.request_id,
                message = ack.message.as_deref().unwrap_or(""),
                "registration rejected by server"
            );
            return;
        }

        {
            let mut records = self.records.lock().unwrap();
            match records.get_mut(&ack.stream) {
                Some(tracked) if tracked.record.request_id == ack.request_id => {
                    if tracked.record.acknowledged {
                        debug!(stream = %ack.stream, "duplicate acknowledgement ignored");
                        return;
                    }
                    tracked.record.acknowledged = true;
                }
                Some(_) => {
                    debug!(
                        stream = %ack.stream,
                        request_id = %ack.request_id,
                        "acknowledgement for superseded registration ignored"
                    );
                    return;
                }
                None => {
                    debug!(stream = %ack.stream, "acknowledgement for unknown stream ignored");
                    return;
                }
            }
        }

        info!(stream = %ack.stream, request_id = %ack.request_id, "stream registered");
        // send_modify (not send_if_modified): ack watchers key off the
        // notification even when the visible set is unchanged, e.g. after
        // a re-registration of an already-listed channel.
        self.registered_tx.send_modify(|set| {
            set.insert(ack.stream.clone());
        });
    }

    /// Observable view of the confirmed channel set.
    pub fn registered_streams(&self) -> watch::Receiver<BTreeSet<String>> {
        self.registered_tx.subscribe()
    }

    /// Snapshot: is this channel currently confirmed?
    pub fn is_registered(&self, channel: &str) -> bool {
        self.registered_tx.borrow().contains(channel)
    }

    /// Observable projection for a single channel. The forwarder task
    /// stops when the tracker shuts down or every receiver is dropped.
    pub fn watch_stream(&self, channel: &str) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(self.is_registered(channel));
        let mut set_rx = self.registered_tx.subscribe();
        let channel = channel.to_owned();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = set_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let registered = set_rx.borrow_and_update().contains(&channel);
                        if tx.send(registered).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }

    /// The latest registration attempt for a channel, if any.
    pub fn record(&self, channel: &str) -> Option<RegistrationRecord> {
        self.records
            .lock()
            .unwrap()
            .get(channel)
            .map(|t| t.record.clone())
    }

    /// Re-registers every known channel whenever a new connection is
    /// opened. Keyed on the monotonic `opened` counter rather than state
    /// transitions, so a coalesced watch update cannot hide a
    /// reconnect. No state is cleared: re-registration is additive and
    /// idempotent on the remote side by contract.
    pub(crate) fn spawn_reregistration(&self, mut stats_rx: watch::Receiver<ConnectionStats>) {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut last_opened = stats_rx.borrow().opened;
            loop {
                tokio::select! {
                    _ = tracker.cancel.cancelled() => break,
                    changed = stats_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let opened = stats_rx.borrow_and_update().opened;
                        if opened > last_opened {
                            last_opened = opened;
                            tracker.reregister_all();
                        }
                    }
                }
            }
        });
    }

    fn reregister_all(&self) {
        let known: Vec<(String, StreamOptions)> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, t)| (channel.clone(), t.options.clone()))
            .collect();
        if known.is_empty() {
            return;
        }
        info!(count = known.len(), "re-registering streams after reconnect");
        for (channel, options) in known {
            self.register_attempt(&channel, options, 0);
        }
    }
}

/// `"{channel}-reg-{unix_millis}-{random}"` — unique enough to correlate
/// an ack with its attempt, readable enough to grep in server logs.
fn registration_request_id(channel: &str) -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("{channel}-reg-{millis}-{suffix}")
}
