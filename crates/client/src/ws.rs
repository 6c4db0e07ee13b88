//! WebSocket transport for the dashboard stream connection.
//!
//! Owns the socket and its three pumps (read, write, keepalive ping).
//! Inbound frames are parsed to JSON and handed to the client's inbound
//! seam; the close callback fires once when the connection dies for any
//! reason other than an intentional [`WsTransport::close`].

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;

use pulseboard_protocol::constants::WS_MAX_MESSAGE_SIZE;

/// Errors from the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

/// Callback fired once when the connection is lost unexpectedly.
pub(crate) type CloseCallback = Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>;

/// A live WebSocket connection to the dashboard backend.
pub struct WsTransport {
    write_tx: mpsc::Sender<tungstenite::Message>,
    on_close: CloseCallback,
    cancel: tokio_util::sync::CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
}

impl WsTransport {
    /// Dials the server and spawns the pumps.
    ///
    /// Parsed inbound frames are delivered on `inbound_tx` in transport
    /// order. Use [`set_close_callback`](Self::set_close_callback) to be
    /// notified of unexpected disconnects.
    pub async fn connect(url: &str, inbound_tx: mpsc::Sender<Value>) -> Result<Self, WsError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let on_close: CloseCallback = Arc::new(Mutex::new(None));
        let cancel = tokio_util::sync::CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let on_close = on_close.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read, inbound_tx, on_close, write_tx, cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        Ok(Self {
            write_tx,
            on_close,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        })
    }

    /// Sets the callback for unexpected disconnection. Intentional
    /// [`close`](Self::close) does not fire it.
    pub async fn set_close_callback(&self, cb: Box<dyn Fn() + Send + Sync>) {
        *self.on_close.lock().await = Some(cb);
    }

    /// Whether the write side is still accepting messages.
    pub fn is_open(&self) -> bool {
        !self.write_tx.is_closed()
    }

    /// Sends a JSON text frame.
    pub async fn send_text(&self, text: String) -> Result<(), WsError> {
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| WsError::Closed)
    }

    /// Gracefully closes the connection. Suppresses the close callback.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}
