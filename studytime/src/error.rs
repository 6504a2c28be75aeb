//! Error types for the timer engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by timer store commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// A command reached the store before a state was loaded into it.
    #[error("Invalid timer state: {0}")]
    InvalidState(&'static str),
}

/// Errors raised while reading or writing the persisted snapshot.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read snapshot from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write snapshot to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised when talking to the timer service task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Timer service has shut down")]
    Closed,
}

pub type Result<T, E = TimerError> = std::result::Result<T, E>;
