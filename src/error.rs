//! Error types for gqlstore.
//!
//! All errors are strongly typed using thiserror. They are `Clone` because a
//! single transport failure is fanned out to every caller waiting on the
//! same deduplicated fetch.

use thiserror::Error;

/// Transport errors reported by a `NetworkLayer` or while normalizing its
/// response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never reached the server.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    /// The server answered with an error.
    #[error("Server error (code {code}): {message}")]
    ServerError {
        code: u32,
        message: String,
    },

    /// The payload does not have the shape of the query.
    #[error("Malformed response for '{query}': {reason}")]
    MalformedResponse {
        query: String,
        reason: String,
    },

    /// The transport dropped the request without answering.
    #[error("Request was dropped before it was settled")]
    Aborted,
}

/// Top-level error type for gqlstore.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A fetch failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The store was built without a required component.
    #[error("Missing store component: {component}")]
    MissingComponent {
        component: String,
    },

    /// An observation stream has no sender left.
    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    /// A blocking receive timed out.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

impl StoreError {
    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type alias for gqlstore operations.
pub type StoreResult<T> = Result<T, StoreError>;
