//! Error types for forgepool operations.

use thiserror::Error;

/// Result type used throughout forgepool.
pub type PoolResult<T> = Result<T, PoolError>;

/// Main error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A task attempt failed during handler execution
    #[error("Task execution failed: {message}")]
    TaskFailed {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An attempt exceeded its timeout
    #[error("Task attempt timed out after {timeout:?}")]
    Timeout {
        /// The per-attempt timeout that elapsed
        timeout: std::time::Duration,
    },

    /// No handler registered for a task kind
    #[error("No handler registered for task kind '{kind}'")]
    HandlerNotFound {
        /// The task kind that had no handler
        kind: String,
    },

    /// The pool has been terminated
    #[error("Pool is closed")]
    PoolClosed,

    /// A task with the same id is already queued or in flight
    #[error("Task '{id}' is already pending in the pool")]
    DuplicateTask {
        /// The conflicting task id
        id: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PoolError {
    /// Create a task failure from a message alone.
    pub fn task_failure(message: impl Into<String>) -> Self {
        Self::TaskFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a task failure wrapping an underlying error.
    pub fn task_failure_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TaskFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}
