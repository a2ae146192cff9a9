/// One protocol exchange against the recognition service.
///
/// `ExchangeSession` is the seam between the worker loop and the wire. Two
/// strategies implement it:
///   - `PacedExchange`   250 ms chunks gated by a `ChunkPacer`, one reply per chunk
///   - `UnpacedExchange` back-to-back blocks, `eof` sentinel, one consolidated reply
///
/// Both own exactly one WebSocket connection per call and close it on every
/// exit path: normal closure on success, internal error otherwise.

mod paced;
mod unpaced;

pub use paced::PacedExchange;
pub use unpaced::UnpacedExchange;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use asr_protocol::audio::AudioPayload;
use asr_protocol::messages::{Handshake, RecognitionResponse, SessionConfig};

use crate::error::ExchangeError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Protocol variant used by every worker of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Paced,
    Unpaced,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paced => "paced",
            Self::Unpaced => "unpaced",
        }
    }
}

/// Everything a session needs besides the audio itself.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// Full `ws://` or `wss://` URL of the recognition endpoint
    pub url: String,
    pub config: SessionConfig,
    /// Pacing step between chunk permits (paced mode)
    pub step: Duration,
    /// Deadline for each connect, read and write; `None` waits forever
    pub io_timeout: Option<Duration>,
}

/// A completed exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The response treated as final
    pub response: RecognitionResponse,
    pub elapsed: Duration,
    /// Binary audio frames written, including a resent final chunk
    pub chunks_sent: u32,
}

#[async_trait]
pub trait ExchangeSession: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one full exchange for `payload` over a fresh connection.
    async fn run(&self, payload: &AudioPayload) -> Result<Exchange, ExchangeError>;
}

/// Build the strategy selected by `mode`.
pub fn build(mode: SessionMode, settings: ExchangeSettings) -> Arc<dyn ExchangeSession> {
    match mode {
        SessionMode::Paced => Arc::new(PacedExchange::new(settings)),
        SessionMode::Unpaced => Arc::new(UnpacedExchange::new(settings)),
    }
}

// ── Wire helpers shared by both strategies ──────────────────────────────

async fn with_deadline<T, F>(timeout: Option<Duration>, op: &str, fut: F) -> Result<T, ExchangeError>
where
    F: Future<Output = Result<T, ExchangeError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ExchangeError::Transport(format!("{op} timed out after {limit:?}")))?,
        None => fut.await,
    }
}

async fn connect(settings: &ExchangeSettings) -> Result<WsStream, ExchangeError> {
    let attempt = async {
        connect_async(settings.url.as_str())
            .await
            .map(|(ws, _response)| ws)
            .map_err(|e| ExchangeError::Connect(e.to_string()))
    };

    match settings.io_timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| ExchangeError::Connect(format!("timed out after {limit:?}")))?,
        None => attempt.await,
    }
}

async fn send_handshake(ws: &mut WsStream, settings: &ExchangeSettings) -> Result<(), ExchangeError> {
    let json = Handshake::new(settings.config).to_json();
    let send = async {
        ws.send(Message::Text(json))
            .await
            .map_err(|e| ExchangeError::Handshake(e.to_string()))
    };

    match settings.io_timeout {
        Some(limit) => tokio::time::timeout(limit, send)
            .await
            .map_err(|_| ExchangeError::Handshake(format!("timed out after {limit:?}")))?,
        None => send.await,
    }
}

async fn send_binary(ws: &mut WsStream, chunk: &[u8], timeout: Option<Duration>) -> Result<(), ExchangeError> {
    with_deadline(timeout, "write chunk", async {
        ws.send(Message::Binary(chunk.to_vec()))
            .await
            .map_err(|e| ExchangeError::transport("write chunk", e))
    })
    .await
}

async fn send_text(ws: &mut WsStream, text: &str, timeout: Option<Duration>) -> Result<(), ExchangeError> {
    with_deadline(timeout, "write text", async {
        ws.send(Message::Text(text.to_owned()))
            .await
            .map_err(|e| ExchangeError::transport("write text", e))
    })
    .await
}

/// Next data frame, skipping control frames.
async fn read_frame(ws: &mut WsStream, timeout: Option<Duration>) -> Result<Message, ExchangeError> {
    with_deadline(timeout, "read", async {
        loop {
            match ws.next().await {
                Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => return Ok(msg),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".into());
                    return Err(ExchangeError::transport("read", format!("closed by service ({reason})")));
                }
                Some(Ok(_)) => continue, // Ping, Pong, Frame
                Some(Err(e)) => return Err(ExchangeError::transport("read", e)),
                None => return Err(ExchangeError::transport("read", "connection ended")),
            }
        }
    })
    .await
}

async fn read_response(ws: &mut WsStream, timeout: Option<Duration>) -> Result<RecognitionResponse, ExchangeError> {
    let frame = read_frame(ws, timeout).await?;
    RecognitionResponse::from_slice(&frame.into_data())
        .map_err(|e| ExchangeError::transport("decode response", e))
}

/// Close with 1000 on success, 1011 on any failure path. Errors while closing
/// are not part of the exchange outcome. Flushing the close frame is bounded
/// by the I/O deadline; on expiry the stream is dropped as is.
async fn close(mut ws: WsStream, success: bool, timeout: Option<Duration>) {
    let frame = CloseFrame {
        code: if success { CloseCode::Normal } else { CloseCode::Error },
        reason: "".into(),
    };
    let result = with_deadline(timeout, "close", async {
        ws.close(Some(frame))
            .await
            .map_err(|e| ExchangeError::transport("close", e))
    })
    .await;
    if let Err(e) = result {
        debug!("Close handshake failed: {}", e);
    }
}
