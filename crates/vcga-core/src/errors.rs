use std::path::PathBuf;

/// Core error type for the auto-responder.
///
/// Adapter crates map their specific errors into this type so the poll loop
/// can tell contained, per-message failures apart from retryable transport ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No readable snapshot, or the readable ones held zero valid records.
    #[error("record load error: {0}")]
    Load(String),

    /// Bridge unreachable or timed out.
    #[error("bridge transport error: {0}")]
    Transport(String),

    /// Bridge answered with a status that retrying cannot fix.
    #[error("delivery rejected by bridge (status {status})")]
    DeliveryRejected { status: u16 },

    /// Bridge answered with a server error; the message was not re-sent.
    #[error("delivery deferred after bridge server error (status {status})")]
    DeliveryDeferred { status: u16 },

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bridge unavailable: {0}")]
    BridgeUnavailable(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Transport-level failures are the only ones worth another attempt.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
