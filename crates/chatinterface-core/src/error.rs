use thiserror::Error;

/// Errors produced by the chatinterface protocol and session layers.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("no pending message with id {0}")]
    UnknownCorrelation(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("failed to reconnect to server after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("failed to fetch messages for: {}", .failed.join(", "))]
    PartialFetch { failed: Vec<String> },

    #[error("snapshot load failed: {0}")]
    SnapshotFailed(String),

    #[error("no active conversation selected")]
    NoActivePeer,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Codec(e.to_string())
    }
}

impl ChatError {
    /// Whether a reconnect attempt could plausibly fix this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatError::Network(_) | ChatError::NotConnected | ChatError::Http(_)
        )
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
