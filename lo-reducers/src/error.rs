//! Error types for the reducer engine

use thiserror::Error;

/// Errors raised while processing events
#[derive(Error, Debug)]
pub enum Error {
    /// Key-value store failure (unavailable store, bad stored JSON)
    #[error("Store error: {0}")]
    Store(#[from] lo_common::Error),

    /// A reducer needed a field the event does not carry
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A stored blob belongs to a different reducer
    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// State could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An edit command does not fit the document it is applied to
    #[error("Reconstruction error: {0}")]
    Reconstruct(String),

    /// No reducer registered under this name
    #[error("Unknown reducer: {0}")]
    UnknownReducer(String),

    /// Log file I/O
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for the reducer engine
pub type Result<T> = std::result::Result<T, Error>;
