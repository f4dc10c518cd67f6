use tokio_tungstenite::tungstenite;
use xpanel_protocol::ProtocolError;

/// Errors from the live connection.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("invalid handshake header: {0}")]
    Header(#[from] tungstenite::http::header::InvalidHeaderValue),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connect cancelled")]
    Cancelled,

    #[error("connection closed")]
    Closed,
}
