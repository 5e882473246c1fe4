//! Common error types for the learning observer

use thiserror::Error;

/// Common result type for learning observer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the learning observer crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Pool exhaustion and shutdown mean the store is out of reach, not broken
#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => Error::Unavailable("connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => Error::Unavailable("connection pool closed".to_string()),
            other => Error::Database(other),
        }
    }
}
