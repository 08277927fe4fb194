//! Submission and queue inspection.

use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::types::{Event, QueueStats, TaskId, TaskInfo, TaskOutcome, TaskState};

use super::MediaDownloader;
use super::task::Task;

impl MediaDownloader {
    /// Add a URL to the back of the pending queue
    ///
    /// Leading and trailing whitespace is stripped. The URL is not validated
    /// beyond being non-blank; unsupported sources fail at probe time.
    ///
    /// When a run is active and has a free slot, the task is admitted right
    /// away. Otherwise it waits for the next free slot or the next run.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyUrl`] if the URL is blank
    /// - [`Error::DuplicateUrl`] if the same URL is already queued, running or cancelling
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    pub async fn submit(&self, url: impl AsRef<str>) -> Result<TaskId> {
        let url = url.as_ref().trim();
        if url.is_empty() {
            return Err(Error::EmptyUrl);
        }

        let mut state = self.queue_state.lock().await;

        if !state.accepting_new {
            return Err(Error::ShuttingDown);
        }
        if state.contains_url(url) {
            return Err(Error::DuplicateUrl {
                url: url.to_string(),
            });
        }

        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        state.pending.push_back(Task::new(id, url.to_string()));

        tracing::info!(task_id = id.0, url, "Task queued");
        self.emit_event(Event::TaskQueued {
            id,
            url: url.to_string(),
        });

        self.admit_pending(&mut state);

        Ok(id)
    }

    /// Snapshot of every non-terminal task: pending first, then in flight
    pub async fn tasks(&self) -> Vec<TaskInfo> {
        let state = self.queue_state.lock().await;

        let mut in_flight: Vec<TaskInfo> = state.in_flight.values().map(Task::snapshot).collect();
        in_flight.sort_by_key(|task| task.id);

        state
            .pending
            .iter()
            .map(Task::snapshot)
            .chain(in_flight)
            .collect()
    }

    /// Snapshot of one task, `None` once it is terminal or if the id is unknown
    pub async fn task(&self, id: TaskId) -> Option<TaskInfo> {
        let state = self.queue_state.lock().await;
        state
            .pending
            .iter()
            .find(|task| task.id == id)
            .or_else(|| state.in_flight.get(&id))
            .map(Task::snapshot)
    }

    /// Counts of queued and in-flight tasks plus current run progress
    pub async fn queue_stats(&self) -> QueueStats {
        let state = self.queue_state.lock().await;

        let queued = state.pending.len();
        let cancelling = state
            .in_flight
            .values()
            .filter(|task| task.state == TaskState::Cancelling)
            .count();
        let running = state.in_flight.len() - cancelling;
        let run_finished = state.run.as_ref().map_or(0, |run| run.finished);
        let run_active = state.run.is_some();

        QueueStats {
            queued,
            running,
            cancelling,
            run_active,
            run_finished,
            run_total: if run_active {
                run_finished + state.in_flight.len() + queued
            } else {
                0
            },
        }
    }

    /// Whether a run is currently active
    pub async fn is_running(&self) -> bool {
        self.queue_state.lock().await.run.is_some()
    }

    /// Cancel every queued task, leaving running tasks alone
    ///
    /// Unlike [`cancel_all`](Self::cancel_all) this does not latch a global
    /// cancel, so a task submitted afterwards can still be admitted by the
    /// current run. Returns the number of tasks removed.
    pub async fn clear_queue(&self) -> usize {
        let mut state = self.queue_state.lock().await;

        let drained: Vec<Task> = state.pending.drain(..).collect();
        let count = drained.len();
        for task in drained {
            task.request_cancel();
            self.finalize_task(&mut state, task, TaskOutcome::Cancelled);
        }

        if count > 0 {
            tracing::info!(count, "Cleared pending queue");
        }

        self.complete_run_if_drained(&mut state);
        count
    }
}
