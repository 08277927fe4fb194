//! Backend used when no yt-dlp binary could be located

use async_trait::async_trait;

use super::context::FetchContext;
use super::traits::{FetchOutcome, MediaBackend};
use crate::error::BackendError;
use crate::types::MediaMetadata;

/// Stand-in backend when yt-dlp is unavailable
///
/// Submissions are still accepted; every task fails with a
/// [`BackendError::Tool`] explaining how to configure the binary. Keeps the
/// queue usable (and its failures visible per task) instead of refusing to
/// construct the downloader.
///
/// # Examples
///
/// ```
/// use media_dl::backend::{MediaBackend, UnavailableBackend};
///
/// # #[tokio::main]
/// # async fn main() {
/// let backend = UnavailableBackend;
/// assert!(backend.probe("https://example.com/v").await.is_err());
/// # }
/// ```
pub struct UnavailableBackend;

const UNAVAILABLE_MESSAGE: &str = "media download requires the yt-dlp binary. \
     Configure backend.ytdlp_path or ensure yt-dlp is in PATH.";

#[async_trait]
impl MediaBackend for UnavailableBackend {
    async fn probe(&self, _url: &str) -> Result<MediaMetadata, BackendError> {
        Err(BackendError::Tool(UNAVAILABLE_MESSAGE.into()))
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<FetchOutcome, BackendError> {
        Err(BackendError::Tool(UNAVAILABLE_MESSAGE.into()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
