//! Source error types.

use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

/// Errors returned while fetching a page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Network unreachable, connection reset, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The explorer answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// The response lacks the page count or its body cannot be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid source url: {0}")]
    InvalidUrl(String),
}

impl SourceError {
    /// Whether the next poll tick should simply retry the same page.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. })
    }
}
