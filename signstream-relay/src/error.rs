use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("not connected")]
    NotConnected,

    #[error("offline buffer full, message rejected")]
    BufferFull,

    #[error("acknowledgement timed out for message {message_id}")]
    AckTimeout { message_id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("reconnect attempts exhausted after {attempts}")]
    ReconnectExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, RelayError>;
