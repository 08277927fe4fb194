//! Traits and types for media backends

use async_trait::async_trait;

use super::context::FetchContext;
use crate::error::BackendError;
use crate::types::MediaMetadata;

/// How a fetch call ended when it did not fail
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The media was written to the destination directory
    Completed,
    /// The backend observed the cancellation flag and stopped
    Cancelled,
}

/// Trait for media-fetch backends
///
/// A backend probes metadata and performs the transfer for one URL. It owns
/// transport-level retries, partial-file cleanup and output naming; the queue
/// only needs this narrow contract.
///
/// Cancellation is cooperative. A backend must call
/// [`FetchContext::is_cancelled`] before starting network I/O and periodically
/// during the transfer, returning [`FetchOutcome::Cancelled`] as soon as it
/// observes `true`.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use media_dl::backend::{FetchContext, FetchOutcome, MediaBackend, ProgressUpdate};
/// use media_dl::{BackendError, MediaMetadata};
///
/// struct Instant;
///
/// #[async_trait]
/// impl MediaBackend for Instant {
///     async fn probe(&self, url: &str) -> Result<MediaMetadata, BackendError> {
///         Ok(MediaMetadata { title: url.to_string(), duration_seconds: 0 })
///     }
///
///     async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, BackendError> {
///         if ctx.is_cancelled() {
///             return Ok(FetchOutcome::Cancelled);
///         }
///         ctx.on_progress(ProgressUpdate::bytes(1, Some(1)));
///         Ok(FetchOutcome::Completed)
///     }
///
///     fn name(&self) -> &'static str {
///         "instant"
///     }
/// }
/// ```
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Extract metadata (title, duration) without downloading
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Probe`] if the URL cannot be resolved, or
    /// [`BackendError::Tool`] if the backend itself cannot run.
    async fn probe(&self, url: &str) -> Result<MediaMetadata, BackendError>;

    /// Download `ctx.url()` into `ctx.dest_dir()`
    ///
    /// Progress is reported through [`FetchContext::on_progress`].
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Fetch`] if the transfer fails, or
    /// [`BackendError::Tool`] if the backend itself cannot run.
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, BackendError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
