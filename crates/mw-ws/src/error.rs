//! Feed transport error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Frame parse error: {0}")]
    ParseError(String),

    #[error("Reconnect attempts exhausted after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
