//! Push socket connection.
//!
//! Opens a single websocket connection on a background task and reports
//! its lifecycle (`Open`, `Message`, `Closed`) through an mpsc channel.
//! Reconnection policy belongs to the caller: when the socket closes the
//! task exits and a new [`StreamSocket`] must be connected.
//!
//! # Example
//!
//! ```rust,ignore
//! use ayla_api::websocket::{SocketEvent, StreamSocket};
//! use tokio_util::sync::CancellationToken;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let socket = StreamSocket::connect(url, tx, CancellationToken::new());
//!
//! while let Some(event) = rx.recv().await {
//!     if let SocketEvent::Message(text) = event {
//!         if text == "1|Z" {
//!             socket.send(text)?;
//!         }
//!     }
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame, protocol::frame::coding::CloseCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

/// Close code reported when the connection fails without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;

// ── Events ───────────────────────────────────────────────────────────

/// Lifecycle notifications from a socket. `Closed` is delivered exactly
/// once per socket, including when the connect attempt itself fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Closed { code: u16, reason: String },
}

enum Outbound {
    Text(String),
    Close,
}

// ── StreamSocket ─────────────────────────────────────────────────────

/// Handle to a running push socket.
pub struct StreamSocket {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl StreamSocket {
    /// Spawn the connection task. Returns immediately; the handshake runs
    /// in the background and reports `Open` or `Closed` on `events`.
    pub fn connect(
        url: Url,
        events: mpsc::UnboundedSender<SocketEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let closed = match run_socket(&url, &events, outbound_rx, &task_cancel).await {
                Ok(closed) => closed,
                Err(e) => {
                    tracing::warn!(error = %e, "push socket failed");
                    SocketEvent::Closed {
                        code: ABNORMAL_CLOSE,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = events.send(closed);
        });

        Self { outbound, cancel }
    }

    /// Queue a text frame.
    pub fn send(&self, text: impl Into<String>) -> Result<(), Error> {
        self.outbound
            .send(Outbound::Text(text.into()))
            .map_err(|_| Error::WebSocketClosed {
                code: ABNORMAL_CLOSE,
                reason: "socket task has exited".into(),
            })
    }

    /// Send a close frame and let the task wind down.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Drop the connection immediately.
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StreamSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Connection lifecycle ─────────────────────────────────────────────

/// Connect, then pump frames until either side closes. Returns the
/// `Closed` event to report.
async fn run_socket(
    url: &Url,
    events: &mpsc::UnboundedSender<SocketEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: &CancellationToken,
) -> Result<SocketEvent, Error> {
    tracing::info!(host = url.host_str().unwrap_or_default(), "connecting push socket");

    let connect = tokio_tungstenite::connect_async(url.as_str());
    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return Ok(SocketEvent::Closed { code: 1000, reason: "cancelled".into() });
        }
        result = connect => result.map_err(|e| Error::WebSocketConnect(e.to_string()))?,
    };

    tracing::info!("push socket connected");
    let _ = events.send(SocketEvent::Open);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(SocketEvent::Closed { code: 1000, reason: "cancelled".into() });
            }
            msg = outbound.recv() => {
                match msg {
                    Some(Outbound::Text(text)) => {
                        write
                            .send(tungstenite::Message::text(text))
                            .await
                            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                    }
                    Some(Outbound::Close) | None => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client closed".into(),
                        };
                        let _ = write.send(tungstenite::Message::Close(Some(frame))).await;
                        return Ok(SocketEvent::Closed { code: 1000, reason: "client closed".into() });
                    }
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        tracing::trace!(len = text.len(), "push frame");
                        let _ = events.send(SocketEvent::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (1005, String::new()),
                            |cf| (u16::from(cf.code), cf.reason.as_str().to_owned()),
                        );
                        tracing::info!(code, reason = %reason, "push socket close frame received");
                        return Ok(SocketEvent::Closed { code, reason });
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("push socket stream ended");
                        return Ok(SocketEvent::Closed { code: ABNORMAL_CLOSE, reason: "stream ended".into() });
                    }
                    _ => {
                        // Binary, Ping, Pong, Frame -- tungstenite answers pings itself
                    }
                }
            }
        }
    }
}
