//! Shared test helpers: a scripted backend and downloader/event utilities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::{Notify, broadcast};

use crate::backend::{FetchContext, FetchOutcome, MediaBackend, ProgressUpdate};
use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::BackendError;
use crate::types::{Event, MediaMetadata, TaskId, TaskOutcome};

/// Upper bound for any single wait in a test
pub(crate) const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Behaviour of the scripted backend for one URL
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Probe and fetch succeed immediately
    Succeed,
    /// Probe fails with the given message
    FailProbe(String),
    /// Probe succeeds, fetch fails with the given message
    FailFetch(String),
    /// Fetch panics
    Panic,
    /// Fetch sleeps, then completes (or returns cancelled when cancellation arrives first)
    Sleep(Duration),
    /// Fetch waits until released, returning cancelled as soon as cancellation is requested
    Block,
    /// Fetch waits until released even when cancelled, then reports what it observed
    BlockIgnoringCancel,
    /// Fetch reports each update, then waits until released
    Progress(Vec<ProgressUpdate>),
}

/// Backend whose behaviour is scripted per URL; unscripted URLs succeed
pub(crate) struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    started: Mutex<HashMap<String, Arc<Notify>>>,
    probed: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            started: Mutex::new(HashMap::new()),
            probed: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Title the probe reports for `url`
    pub(crate) fn title_for(url: &str) -> String {
        format!("title of {}", url)
    }

    pub(crate) fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    /// Let a blocked fetch for `url` finish (or pre-release one not yet started)
    pub(crate) fn release(&self, url: &str) {
        self.gate(&self.gates, url).notify_one();
    }

    /// Wait until a fetch for `url` has started
    pub(crate) async fn wait_for_fetch(&self, url: &str) {
        let started = self.gate(&self.started, url);
        tokio::time::timeout(EVENT_TIMEOUT, started.notified())
            .await
            .expect("fetch never started");
    }

    pub(crate) fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Highest number of fetches observed running at the same time
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn script_for(&self, url: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Script::Succeed)
    }

    fn gate(&self, gates: &Mutex<HashMap<String, Arc<Notify>>>, url: &str) -> Arc<Notify> {
        gates
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, BackendError> {
        self.probed.lock().unwrap().push(url.to_string());
        match self.script_for(url) {
            Script::FailProbe(message) => Err(BackendError::Probe(message)),
            _ => Ok(MediaMetadata {
                title: Self::title_for(url),
                duration_seconds: 60,
            }),
        }
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, BackendError> {
        let url = ctx.url().to_string();
        self.fetched.lock().unwrap().push(url.clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        // notify_one stores a permit, so a waiter arriving later still wakes
        self.gate(&self.started, &url).notify_one();

        match self.script_for(&url) {
            Script::Succeed | Script::FailProbe(_) => Ok(FetchOutcome::Completed),
            Script::FailFetch(message) => Err(BackendError::Fetch(message)),
            Script::Panic => panic!("backend exploded"),
            Script::Sleep(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(FetchOutcome::Completed),
                    _ = ctx.cancelled() => Ok(FetchOutcome::Cancelled),
                }
            }
            Script::Block => {
                let gate = self.gate(&self.gates, &url);
                tokio::select! {
                    _ = gate.notified() => Ok(FetchOutcome::Completed),
                    _ = ctx.cancelled() => Ok(FetchOutcome::Cancelled),
                }
            }
            Script::BlockIgnoringCancel => {
                self.gate(&self.gates, &url).notified().await;
                if ctx.is_cancelled() {
                    Ok(FetchOutcome::Cancelled)
                } else {
                    Ok(FetchOutcome::Completed)
                }
            }
            Script::Progress(updates) => {
                for update in updates {
                    ctx.on_progress(update);
                }
                self.gate(&self.gates, &url).notified().await;
                Ok(FetchOutcome::Completed)
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Helper to create a test MediaDownloader backed by `backend`.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    backend: Arc<ScriptedBackend>,
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();

    let config = Config {
        download_dir: temp_dir.path().to_path_buf(),
        ..Default::default()
    };

    let downloader = MediaDownloader::with_backend(config, backend)
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Receive the next event, failing the test if none arrives in time
pub(crate) async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Receive events until one matches `predicate`, returning it
pub(crate) async fn wait_for_event<F>(rx: &mut broadcast::Receiver<Event>, predicate: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if predicate(&event) {
            return event;
        }
    }
}

/// Wait for the terminal event of task `id` and return its outcome
pub(crate) async fn wait_for_finish(rx: &mut broadcast::Receiver<Event>, id: TaskId) -> TaskOutcome {
    match wait_for_event(rx, |event| {
        matches!(event, Event::TaskFinished { id: finished, .. } if *finished == id)
    })
    .await
    {
        Event::TaskFinished { outcome, .. } => outcome,
        _ => unreachable!(),
    }
}

/// Collect every event up to and including the next `RunCompleted`
pub(crate) async fn collect_run(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, Event::RunCompleted { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Drain events already buffered without waiting
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
