//! Error types shared across Eventide crates.

use thiserror::Error;

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum EventideError {
    /// The scheduler was asked to mutate its queue before the cold-start load.
    #[error("scheduler not initialized")]
    NotInitialized,

    /// `start()` was called before a previous `stop()` finished.
    #[error("scheduler is stopping")]
    Stopping,

    #[error("event id mismatch: expected '{expected}', got '{actual}'")]
    IdMismatch { expected: String, actual: String },

    #[error("directory error: {0}")]
    Directory(String),

    #[error("notifier error: {0}")]
    Notifier(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EventideError>;
