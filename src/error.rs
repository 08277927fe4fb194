//! Error types for media-dl
//!
//! Only manager-contract violations (submitting a blank URL, starting a second
//! run, ...) surface as [`Error`]. Anything that goes wrong inside a backend call
//! is contained at the worker slot and reported as a
//! [`TaskOutcome::Failed`](crate::types::TaskOutcome::Failed) event instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::FailureKind;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Submitted URL was blank
    #[error("URL must not be empty")]
    EmptyUrl,

    /// Submitted URL is already queued or in flight
    #[error("URL is already queued or downloading: {url}")]
    DuplicateUrl {
        /// The duplicated URL
        url: String,
    },

    /// Destination directory cannot be used for output
    #[error("invalid destination {path}: {reason}")]
    InvalidDestination {
        /// The rejected path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Start requested with nothing pending
    #[error("queue is empty")]
    EmptyQueue,

    /// Start requested while a run is active
    #[error("a run is already active")]
    AlreadyRunning,

    /// Concurrency limit outside the supported range
    #[error("concurrency limit {requested} is outside 1..={max}")]
    InvalidConcurrency {
        /// The requested limit
        requested: usize,
        /// The hard ceiling
        max: usize,
    },

    /// Shutdown in progress - not accepting new submissions
    #[error("shutdown in progress: not accepting new submissions")]
    ShuttingDown,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_downloads")
        key: Option<String>,
    },

    /// Backend error surfaced outside a task (e.g. calling a backend directly)
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by a media backend
///
/// Cancellation is deliberately absent: a backend that observes the
/// cancellation flag returns [`FetchOutcome::Cancelled`](crate::backend::FetchOutcome::Cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Metadata extraction failed
    #[error("probe failed: {0}")]
    Probe(String),

    /// Transfer failed
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The external backend tool could not be run
    #[error("backend tool error: {0}")]
    Tool(String),
}

impl BackendError {
    /// Failure category recorded on the task outcome
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            BackendError::Probe(_) => FailureKind::Probe,
            BackendError::Fetch(_) => FailureKind::Fetch,
            BackendError::Tool(_) => FailureKind::Tool,
        }
    }

    /// The backend's message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            BackendError::Probe(m) | BackendError::Fetch(m) | BackendError::Tool(m) => m,
        }
    }
}
