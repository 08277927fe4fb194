//! Media-fetch backends
//!
//! The queue delegates metadata probing and the actual transfer to a
//! [`MediaBackend`]. Two implementations are provided:
//!
//! - [`YtDlpBackend`]: drives the external `yt-dlp` executable
//! - [`UnavailableBackend`]: stand-in when no binary is found; every task fails
//!   with a descriptive message
//!
//! Each backend call receives a [`FetchContext`] bound to one task. Progress is
//! reported as [`ProgressUpdate`]s and cancellation is polled through the
//! context.
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::backend;
//! use media_dl::config::BackendConfig;
//!
//! let backend = backend::from_config(&BackendConfig::default());
//! println!("using backend: {}", backend.name());
//! ```

mod context;
mod progress;
mod traits;
mod unavailable;
mod ytdlp;

use std::sync::Arc;

use crate::config::BackendConfig;

pub(crate) use context::WorkerMessage;
pub use context::FetchContext;
pub use progress::ProgressUpdate;
pub use traits::{FetchOutcome, MediaBackend};
pub use unavailable::UnavailableBackend;
pub use ytdlp::YtDlpBackend;

/// Pick a backend from configuration
///
/// Uses yt-dlp when an explicit path is configured or the binary is found on
/// PATH, otherwise falls back to [`UnavailableBackend`].
pub fn from_config(options: &BackendConfig) -> Arc<dyn MediaBackend> {
    match YtDlpBackend::from_config(options) {
        Some(ytdlp) => {
            tracing::info!(path = %ytdlp.binary_path().display(), "Using yt-dlp backend");
            Arc::new(ytdlp)
        }
        None => {
            tracing::warn!("yt-dlp not found, downloads will fail until it is configured");
            Arc::new(UnavailableBackend)
        }
    }
}
