use thiserror::Error;

/// Core error type for streamchat.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum StreamChatError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend could not be reached at all (connect or send failure).
    #[error("backend unreachable: {endpoint}")]
    Unreachable { endpoint: String },

    /// The initiating request returned a non-success status. Reported before
    /// any stream events are produced.
    #[error("transport error from {endpoint}: {status} {message}")]
    Transport {
        endpoint: String,
        status: String,
        message: String,
    },

    /// A single frame payload could not be decoded. The reader logs and
    /// skips these; they never abort a stream.
    #[error("frame decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, StreamChatError>;
