//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur when interacting with a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the store API.
    #[error("store error: {error} - {message}")]
    Api { error: String, message: String },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A unique index rejected a write.
    #[error("duplicate key on index: {index}")]
    DuplicateKey { index: String },

    /// An index definition is malformed. Fatal at load time.
    #[error("invalid index definition: {0}")]
    InvalidIndex(String),
}
