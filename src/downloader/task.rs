//! Per-task runtime state owned by the queue

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::types::{TaskId, TaskInfo, TaskOutcome, TaskState};

/// One queued URL and its mutable runtime state
///
/// Lives in either the pending queue or the in-flight map and is dropped once
/// its terminal event has been emitted.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) url: String,
    pub(crate) state: TaskState,
    pub(crate) title: Option<String>,
    pub(crate) progress: f32,
    /// Set once by a cancellation call, never unset
    pub(crate) cancel_token: CancellationToken,
    pub(crate) queued_at: DateTime<Utc>,
}

impl Task {
    pub(crate) fn new(id: TaskId, url: String) -> Self {
        Self {
            id,
            url,
            state: TaskState::Queued,
            title: None,
            progress: 0.0,
            cancel_token: CancellationToken::new(),
            queued_at: Utc::now(),
        }
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Move to `next` if the lifecycle allows it
    pub(crate) fn transition(&mut self, next: TaskState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                task_id = self.id.0,
                from = ?self.state,
                to = ?next,
                "Ignoring illegal task transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Record a progress percentage; returns whether the stored value changed
    ///
    /// Only accepted while running, and never moves backwards.
    pub(crate) fn record_progress(&mut self, percent: f32) -> bool {
        if self.state != TaskState::Running || percent <= self.progress {
            return false;
        }
        self.progress = percent.min(100.0);
        true
    }

    /// Apply a terminal outcome and return the one actually reached
    ///
    /// A task that was cancelling can only end as cancelled, whatever the backend
    /// returned while it unwound. Any other outcome the current state cannot take
    /// also ends the task as cancelled. Returns `None` for a task that was
    /// already terminal; nothing changes then.
    pub(crate) fn finish(&mut self, outcome: TaskOutcome) -> Option<TaskOutcome> {
        let outcome = if self.state.can_transition_to(outcome.terminal_state()) {
            outcome
        } else {
            if self.state != TaskState::Cancelling {
                tracing::warn!(
                    task_id = self.id.0,
                    from = ?self.state,
                    requested = ?outcome.kind(),
                    "Outcome not reachable, finishing as cancelled"
                );
            }
            TaskOutcome::Cancelled
        };

        if !self.transition(outcome.terminal_state()) {
            return None;
        }
        if self.state == TaskState::Succeeded {
            self.progress = 100.0;
        }
        Some(outcome)
    }

    pub(crate) fn snapshot(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            url: self.url.clone(),
            state: self.state,
            title: self.title.clone(),
            progress: self.progress,
            cancel_requested: self.cancel_requested(),
            queued_at: self.queued_at,
        }
    }
}
