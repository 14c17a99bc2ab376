//! Error types for the stream engine

use thiserror::Error;

/// Result type alias using `StreamError`
pub type Result<T> = std::result::Result<T, StreamError>;

/// Stream engine errors
///
/// Only lookup misses (`Core(NotFound)`) escape `StreamEngine::open`;
/// every other variant is absorbed into the state machine and surfaced
/// through diagnostics.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Filesystem errors (lookup miss or unreadable resource)
    #[error(transparent)]
    Core(#[from] cantus_core::CoreError),

    /// Decoding failed, at construction or mid-stream
    #[error("Decode error: {0}")]
    Decode(String),

    /// Source cannot seek to the requested frame
    #[error("Invalid seek target: frame {0}")]
    InvalidSeek(u64),

    /// Signature recognized, but no backend for it is compiled in
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// Hardware output could not be initialized
    #[error("Audio output error: {0}")]
    Output(String),
}

impl StreamError {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether this is a filesystem lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_not_found())
    }
}
