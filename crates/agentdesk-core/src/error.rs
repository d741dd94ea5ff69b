//! Error types shared across Agentdesk crates.

use thiserror::Error;

/// Result alias used by library code.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Top-level error returned by every public scheduler operation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Descriptor is missing fields or has the wrong shape for its declared type.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Config file could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The recurrence resolver could not produce a next occurrence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Invalid time '{0}' (expected HH:MM)")]
    InvalidTime(String),

    #[error("Unknown day '{0}'")]
    UnknownDay(String),

    #[error("Day of month {0} out of range (1-28)")]
    DayOutOfRange(u32),

    #[error("No representable occurrence after {0}")]
    OutOfRange(String),
}

/// A collaborator call failed while firing a task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{action} failed: {message}")]
    Failed { action: String, message: String },

    #[error("{action} reported failure")]
    Rejected { action: String },

    #[error("{action} timed out after {secs}s")]
    TimedOut { action: String, secs: u64 },
}

/// The task record store could not read or persist records.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialize(String),

    #[error("Store database error: {0}")]
    Database(String),
}
