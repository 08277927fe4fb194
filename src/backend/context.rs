//! Per-task context handed to a backend fetch call

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::progress::ProgressUpdate;
use crate::types::{TaskId, TaskOutcome};

/// Message from a worker slot to the manager context
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    /// Backend reported a usable percentage
    Progress { id: TaskId, percent: f32 },
    /// Probe resolved a title
    Probed { id: TaskId, title: String },
    /// Backend call returned (or panicked) and the slot is free
    Finished { id: TaskId, outcome: TaskOutcome },
}

/// Everything one backend call needs, bound to exactly one task
///
/// The context is owned by the worker slot running the task; progress and
/// cancellation callbacks go through it instead of through shared state, so
/// each invocation is unambiguously tied to its task. Progress is forwarded to
/// the manager over a channel and never mutates queue state directly.
#[derive(Debug)]
pub struct FetchContext {
    task_id: TaskId,
    url: String,
    dest_dir: PathBuf,
    cancel_token: CancellationToken,
    updates: mpsc::UnboundedSender<WorkerMessage>,
}

impl FetchContext {
    pub(crate) fn new(
        task_id: TaskId,
        url: String,
        dest_dir: PathBuf,
        cancel_token: CancellationToken,
        updates: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            task_id,
            url,
            dest_dir,
            cancel_token,
            updates,
        }
    }

    /// Task this call belongs to
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Source URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Directory output files must be written to
    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Whether cancellation has been requested for this task
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once cancellation is requested, for use in `tokio::select!`
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }

    /// Report a progress tick
    ///
    /// Ticks without a derivable percentage are dropped; the task keeps its
    /// last known value.
    pub fn on_progress(&self, update: ProgressUpdate) {
        if let Some(percent) = update.percent() {
            self.send(WorkerMessage::Progress {
                id: self.task_id,
                percent,
            });
        }
    }

    /// Report that the transfer finished and only post-processing remains
    pub fn on_finished(&self) {
        self.send(WorkerMessage::Progress {
            id: self.task_id,
            percent: 100.0,
        });
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub(crate) fn send(&self, message: WorkerMessage) {
        // Receiver only goes away once the run is over; late ticks are irrelevant then
        self.updates.send(message).ok();
    }
}
