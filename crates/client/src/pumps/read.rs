//! WebSocket read pump — parses and forwards inbound frames.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use pulseboard_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_READ_DEADLINE};

use crate::ws::CloseCallback;

/// Reads frames from the WebSocket and forwards parsed JSON values.
///
/// Maintains a read deadline: if *nothing* arrives within
/// [`WS_READ_DEADLINE`] (no pong, no payload), the connection is
/// considered dead and the pump exits, firing the close callback. Any
/// inbound frame resets the deadline. Cancellation (an intentional
/// close) exits without firing the callback.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound_tx: mpsc::Sender<Value>,
    on_close: CloseCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_READ_DEADLINE);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            () = &mut deadline => {
                warn!("read deadline expired, connection considered dead");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + WS_READ_DEADLINE);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_frame(&text, &inbound_tx).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {} // Binary — this protocol is text-only.
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if let Some(cb) = on_close.lock().await.as_ref() {
        cb();
    }
}

/// Parses a text frame and forwards it. Malformed or oversized frames are
/// dropped with a warning — never an error to the connection.
async fn handle_text_frame(text: &str, inbound_tx: &mpsc::Sender<Value>) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    if inbound_tx.send(value).await.is_err() {
        debug!("inbound channel closed, dropping message");
    }
}
