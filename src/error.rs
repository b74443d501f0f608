//! Error types for convo-mirror
//!
//! The taxonomy follows the three failure sources a fetch can hit:
//! - the remote service answering with a structured failure ([`Error::RemoteApi`])
//! - I/O failing before any structured answer ([`Error::Transport`], [`Error::Network`])
//! - the storage collaborator failing ([`Error::Storage`], [`Error::Sqlx`])
//!
//! Registry bookkeeping failures ([`RegistryError`]) and configuration problems
//! have their own variants. None of these are retried by the engine.

use crate::types::{CorrelationId, TaskId};
use thiserror::Error;

/// Result type alias for convo-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for convo-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// The remote API reported a structured failure (e.g. `channel_not_found`, `ratelimited`)
    #[error("remote API error: {code}")]
    RemoteApi {
        /// Machine-readable error code returned by the remote service
        code: String,
    },

    /// I/O failure before a structured response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP client error (connect, timeout, body decode)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Storage collaborator failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Task registry bookkeeping failure
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "limits.history.concurrency")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to connect to the database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Writing file bytes to disk failed
    #[error("failed to write file {file_id}: {reason}")]
    FileWriteFailed {
        /// Remote id of the file being saved
        file_id: String,
        /// The reason the write failed
        reason: String,
    },
}

/// Task registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The correlation group is not open (never opened, already quiescent, or abandoned)
    #[error("correlation group {correlation_id} is not open")]
    UnknownGroup {
        /// The correlation id that was looked up
        correlation_id: CorrelationId,
    },

    /// A completion was reported for a task that was never registered
    #[error("task {task_id} was never registered in correlation group {correlation_id}")]
    UnknownTask {
        /// The correlation id of the group
        correlation_id: CorrelationId,
        /// The task id that was completed
        task_id: TaskId,
    },

    /// A completion was reported twice for the same task
    #[error("task {task_id} in correlation group {correlation_id} already completed")]
    AlreadyCompleted {
        /// The correlation id of the group
        correlation_id: CorrelationId,
        /// The task id that was completed again
        task_id: TaskId,
    },

    /// Registering another task would exceed the per-group outstanding cap
    #[error("correlation group {correlation_id} reached {limit} outstanding tasks")]
    TooManyOutstanding {
        /// The correlation id of the group
        correlation_id: CorrelationId,
        /// The configured cap
        limit: usize,
    },
}

impl Error {
    /// Whether this error came from the remote side (structured or transport)
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteApi { .. } | Error::Transport(_) | Error::Network(_)
        )
    }

    /// Whether this error came from the storage collaborator
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Sqlx(_))
    }
}
