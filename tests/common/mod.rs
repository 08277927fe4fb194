//! Common test utilities for media-dl integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use media_dl::{
    BackendError, Config, Event, FetchContext, FetchOutcome, MediaBackend, MediaDownloader,
    MediaMetadata, ProgressUpdate,
};
use tempfile::TempDir;
use tokio::sync::{Notify, broadcast};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend where every fetch waits on a per-URL gate
///
/// URLs containing `fail` fail their fetch, URLs containing `bad` fail their
/// probe. Fetches report 50% before waiting.
#[derive(Default)]
pub struct GatedBackend {
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl GatedBackend {
    pub fn release(&self, url: &str) {
        self.gate(url).notify_one();
    }

    fn gate(&self, url: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

#[async_trait]
impl MediaBackend for GatedBackend {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, BackendError> {
        if url.contains("bad") {
            return Err(BackendError::Probe(format!("Unsupported URL: {}", url)));
        }
        Ok(MediaMetadata {
            title: format!("clip {}", url.rsplit('/').next().unwrap_or(url)),
            duration_seconds: 30,
        })
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, BackendError> {
        ctx.on_progress(ProgressUpdate::bytes(50, Some(100)));
        let gate = self.gate(ctx.url());
        tokio::select! {
            _ = gate.notified() => {}
            _ = ctx.cancelled() => return Ok(FetchOutcome::Cancelled),
        }
        if ctx.url().contains("fail") {
            return Err(BackendError::Fetch("connection reset".to_string()));
        }
        Ok(FetchOutcome::Completed)
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Create a downloader over `backend` writing into a fresh temp dir
pub async fn create_downloader(
    backend: Arc<dyn MediaBackend>,
) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = Config {
        download_dir: temp_dir.path().to_path_buf(),
        ..Default::default()
    };
    let downloader = MediaDownloader::with_backend(config, backend)
        .await
        .expect("Failed to create downloader");
    (downloader, temp_dir)
}

/// Collect events until (and including) the first `RunCompleted`
pub async fn collect_events_until_run_completed(
    events: &mut broadcast::Receiver<Event>,
) -> Vec<Event> {
    let mut collected = Vec::new();
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("Timed out waiting for RunCompleted")
            .expect("Event channel closed");
        let done = matches!(event, Event::RunCompleted { .. });
        collected.push(event);
        if done {
            return collected;
        }
    }
}

/// Wait for the first event matching `predicate`
pub async fn wait_for<F>(events: &mut broadcast::Receiver<Event>, predicate: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Event channel closed");
        if predicate(&event) {
            return event;
        }
    }
}
