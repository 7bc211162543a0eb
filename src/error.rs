//! Error types for slice and store operations.
//!
//! Every variant here describes a programming or configuration mistake.
//! Nothing is retried; errors propagate to the caller of the failing
//! operation and the store state is left exactly as it was.

use thiserror::Error;

/// Errors that can occur while building slices or operating a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid setup: empty or malformed slice name, duplicate case or slice.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The action was routed to a slice that has no case for its type.
    #[error("action {action_type} not found")]
    ActionNotFound { action_type: String },

    /// No slice owns the namespace prefix of the action type.
    #[error("unknown slice: {slice}")]
    UnknownSlice { slice: String },

    /// A dispatch (or state replacement) was attempted while another
    /// dispatch was still in flight on the same thread.
    #[error("reentrant dispatch of {action_type} while another dispatch is in flight")]
    ReentrantDispatch { action_type: String },

    /// A replacement state does not match the store's slice layout.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Returns true if this error was raised while building slices or the
    /// store, as opposed to by an operation on a live store.
    pub fn is_setup_error(&self) -> bool {
        matches!(self, StoreError::Configuration(_))
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        StoreError::Configuration(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
