use crate::session::SessionState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SlackError>;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(String),

    /// Non-success status from a handshake call. Carries the response body.
    #[error("handshake failed: status={status} body={body}")]
    Handshake { status: u16, body: String },

    #[error("slack api error: {0}")]
    Api(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("frame decode error: {0}")]
    Decode(String),

    #[error("invalid command pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("outbound queue is closed")]
    QueueClosed,

    #[error("outbound queue is full")]
    QueueFull,

    /// Identifiers belong to the queue consumer; producers must leave them unset.
    #[error("outbound message already carries identifier {0}")]
    IdAlreadyAssigned(u64),

    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("session already started")]
    AlreadyStarted,
}

impl From<reqwest::Error> for SlackError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SlackError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
