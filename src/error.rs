//! Error types for streamtail
//!
//! This module provides the error handling for the library, including:
//! - The crate-wide [`Error`] type and [`Result`] alias
//! - [`SourceError`], the failure taxonomy of an external stream source
//! - [`DatabaseError`] for the SQLite offset store

use crate::types::ItemType;
use thiserror::Error;

/// Result type alias for streamtail operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for streamtail
///
/// Each variant carries enough context to tell which reader, setting, or
/// store operation failed.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "consumption_limit")
        key: Option<String>,
    },

    /// Offset store operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Retrieval from a stream source failed
    #[error("stream source error: {0}")]
    Source(#[from] SourceError),

    /// An injected converter rejected an item
    #[error("failed to convert {item_type} item: {reason}")]
    Conversion {
        /// Item-type whose converter failed
        item_type: ItemType,
        /// Why the conversion failed
        reason: String,
    },

    /// A stream reader terminated with a fatal error
    #[error("{reader} failed: {reason}")]
    ReaderFailed {
        /// Name of the reader that failed
        reader: String,
        /// The fatal error that terminated the reader
        reason: String,
    },

    /// The task is already running; stop it before starting again
    #[error("source task already started")]
    AlreadyStarted,

    /// Operation not valid in the reader's current state
    #[error("cannot {operation} {reader} in state {state}")]
    InvalidState {
        /// Name of the reader
        reader: String,
        /// The operation that was attempted (e.g., "start")
        operation: String,
        /// The state that prevents the operation
        state: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failures raised by an external stream source
///
/// `Unauthorized` is the single recoverable class: the source's client is
/// expected to have refreshed its credential by the time the call is repeated.
/// Everything else terminates the reader that owns the source.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The upstream rejected the request's credential (HTTP 401 or equivalent)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any non-recoverable retrieval failure
    #[error("{0}")]
    Fatal(String),

    /// The source can never produce another item
    #[error("stream closed")]
    Closed,
}

/// Offset store errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be mapped back to a partition key
    #[error("corrupt offset row: {0}")]
    CorruptRow(String),
}
