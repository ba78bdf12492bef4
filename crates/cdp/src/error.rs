use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdpError>;

#[derive(Debug, Error)]
pub enum CdpError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("devtools endpoint unreachable: {0}")]
    Endpoint(String),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error in {method}: {message}")]
    Protocol { method: String, message: String },

    #[error("page script threw: {0}")]
    Script(String),

    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { ms: u64, what: String },

    #[error("devtools connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
