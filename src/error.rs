use std::path::PathBuf;

use thiserror::Error;

/// Failures of a probe or download run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// URL could not be resolved or the probe returned nothing
    #[error("Failed to get video information")]
    Metadata { reason: String },

    /// Anything that went wrong during download or post-processing
    #[error("{0}")]
    Download(String),

    /// Cancellation was observed at a progress callback
    #[error("Download cancelled")]
    Cancelled,
}

/// The worker's task ended without reporting an outcome, e.g. after a panic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Download worker stopped unexpectedly")]
pub struct WorkerLost;

/// A status string that is neither `completed` nor `failed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown history status {0:?}")]
pub struct UnknownStatus(pub String);

/// History log failures; the log itself is left untouched
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("history database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("history location unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("no history record with id {0}")]
    NotFound(i64),
}

/// Reasons the controller refuses a start intent
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntentError {
    #[error("A download is already in progress")]
    Busy,

    #[error("Please enter a video URL")]
    EmptyUrl,

    #[error("The specified save path is invalid: {}", .0.display())]
    InvalidDirectory(PathBuf),
}
