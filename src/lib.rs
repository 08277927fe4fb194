//! # media-dl
//!
//! Bounded-concurrency download queue for media URLs.
//!
//! URLs are submitted to a FIFO queue and processed by a fixed number of
//! worker slots. Each slot probes a URL for metadata and then fetches it
//! through a pluggable [`MediaBackend`](backend::MediaBackend) (by default the
//! external `yt-dlp` tool). Every state change is published as an [`Event`].
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Contained failures** - A failing or panicking backend call only fails its own task
//! - **Cooperative cancellation** - Running tasks are asked to stop and report back
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, Event, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::TaskFinished { url, outcome, .. } = event {
//!                 println!("{url}: {outcome:?}");
//!             }
//!         }
//!     });
//!
//!     downloader.submit("https://example.com/watch?v=abc").await?;
//!     downloader.start(2, "downloads").await?;
//!     downloader.wait_for_idle().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Media-fetch backends
pub mod backend;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Download history sinks
pub mod history;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use backend::{FetchContext, FetchOutcome, MediaBackend, ProgressUpdate, YtDlpBackend};
pub use config::{BackendConfig, Config, HistoryConfig, MAX_CONCURRENT_DOWNLOADS};
pub use downloader::MediaDownloader;
pub use error::{BackendError, Error, Result};
pub use history::{HistorySink, JsonHistory, MemoryHistory};
pub use types::{
    Event, FailureKind, HistoryEntry, MediaMetadata, OutcomeKind, QueueStats, TaskId, TaskInfo,
    TaskOutcome, TaskState,
};

/// Run until a termination signal arrives, then shut the downloader down.
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     downloader.submit("https://example.com/watch?v=abc").await?;
///     downloader.start_with_config().await?;
///
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                result = tokio::signal::ctrl_c() => log_ctrl_c(result),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            log_ctrl_c(tokio::signal::ctrl_c().await);
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    log_ctrl_c(tokio::signal::ctrl_c().await);
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::info!("Received SIGINT signal (Ctrl+C)"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
