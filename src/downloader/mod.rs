//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Submission and queue inspection
//! - [`control`] - Per-task and global cancellation
//! - [`queue_processor`] - Run start, admission and the manager loop
//! - [`worker_pool`] - Bounded worker slots executing backend calls
//! - [`lifecycle`] - Idle waiting and shutdown coordination
//! - [`task`] - Per-task runtime state
//!
//! All queue state sits behind a single async mutex. Worker slots never touch
//! it: they report progress and outcomes over a channel that the manager loop
//! drains, so every state transition and event is produced from one place.

mod control;
mod lifecycle;
mod queue;
mod queue_processor;
mod task;
mod worker_pool;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::backend::{self, MediaBackend};
use crate::config::Config;
use crate::error::Result;
use crate::history::{self, HistorySink, JsonHistory};
use crate::types::{Event, HistoryEntry, TaskId};

use task::Task;
use worker_pool::WorkerPool;

/// Queue bookkeeping guarded by the downloader's mutex
pub(crate) struct QueueState {
    /// Tasks waiting for a slot, oldest first
    pub(crate) pending: VecDeque<Task>,
    /// Running or cancelling tasks, keyed by id
    pub(crate) in_flight: HashMap<TaskId, Task>,
    /// Latched by `cancel_all`; blocks admission until the run unwinds
    pub(crate) global_cancel: bool,
    /// Cleared once shutdown begins
    pub(crate) accepting_new: bool,
    /// Present between a successful start and the run's completion
    pub(crate) run: Option<ActiveRun>,
    /// One sender per attached history recorder; dropped once shutdown has resolved every task
    pub(crate) history: Vec<mpsc::UnboundedSender<HistoryEntry>>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            global_cancel: false,
            accepting_new: true,
            run: None,
            history: Vec::new(),
        }
    }

    /// Whether `url` is pending or in flight
    pub(crate) fn contains_url(&self, url: &str) -> bool {
        self.pending.iter().any(|task| task.url == url)
            || self.in_flight.values().any(|task| task.url == url)
    }
}

/// One run, from a successful start until every admitted task is terminal
pub(crate) struct ActiveRun {
    pub(crate) pool: WorkerPool,
    /// Tasks that reached a terminal state during this run
    pub(crate) finished: usize,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Backend used by every worker slot
    pub(crate) backend: Arc<dyn MediaBackend>,
    /// Queue and run bookkeeping
    pub(crate) queue_state: Arc<Mutex<QueueState>>,
    /// Next task id to hand out
    pub(crate) next_id: Arc<AtomicU64>,
    /// `true` while a run is active
    pub(crate) run_active: Arc<watch::Sender<bool>>,
}

impl MediaDownloader {
    /// Create a downloader using the backend selected by `config.backend`
    ///
    /// Falls back to a backend that fails every task when yt-dlp cannot be
    /// located, so construction only fails on invalid configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let backend = backend::from_config(&config.backend);
        Self::with_backend(config, backend).await
    }

    /// Create a downloader with an explicit backend
    ///
    /// If `config.history.path` is set, a [`JsonHistory`] recorder is attached
    /// before the downloader is returned.
    pub async fn with_backend(config: Config, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);
        let (run_active, _) = watch::channel(false);

        let downloader = Self {
            event_tx,
            config: Arc::new(config),
            backend,
            queue_state: Arc::new(Mutex::new(QueueState::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            run_active: Arc::new(run_active),
        };

        if let Some(path) = &downloader.config.history.path {
            let sink = JsonHistory::load(path, downloader.config.history.max_entries).await?;
            downloader.attach_history(Arc::new(sink)).await;
        }

        tracing::info!(
            backend = downloader.backend.name(),
            max_concurrent = downloader.config.max_concurrent_downloads,
            "Media downloader ready"
        );

        Ok(downloader)
    }

    /// Subscribe to downloader events
    ///
    /// Each call returns an independent receiver. Events are delivered in the
    /// order they were produced; a receiver that falls more than
    /// `config.event_buffer` events behind gets `RecvError::Lagged` and loses
    /// the oldest events, without slowing the queue down.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe as a `Stream`, silently skipping events lost to lag
    pub fn event_stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event stream lagged, events were dropped");
                None
            }
        })
    }

    /// Forward every terminal task to `sink`
    ///
    /// Records travel over a dedicated unbounded channel, so a slow or failing
    /// sink never delays the queue and never misses a task. The returned
    /// recorder finishes once shutdown has resolved every task (or the last
    /// downloader handle is dropped) and the backlog is written.
    pub async fn attach_history(
        &self,
        sink: Arc<dyn HistorySink>,
    ) -> tokio::task::JoinHandle<()> {
        let (entries_tx, entries_rx) = mpsc::unbounded_channel();
        let mut state = self.queue_state.lock().await;
        if state.accepting_new || state.run.is_some() {
            state.history.push(entries_tx);
        }
        history::spawn_history_recorder(entries_rx, sink)
    }

    /// Get the downloader's configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// Having no subscribers is normal, so send errors are ignored.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
