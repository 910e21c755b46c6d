use thiserror::Error;

/// Unrecoverable framing failures.
///
/// Malformed headers are resynchronized inside the codec and never surface
/// here; these variants mean the stream can no longer be trusted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame header exceeds {limit} bytes without a newline ({buffered} bytes buffered)")]
    HeaderTooLong { buffered: usize, limit: usize },
    #[error("frame body is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to bind debuggee listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("debuggee session already started")]
    AlreadyStarted,

    #[error("debuggee connection closed")]
    ConnectionClosed,
}

pub type Result<T, E = WireError> = std::result::Result<T, E>;
