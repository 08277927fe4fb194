//! Per-task and global cancellation.
//!
//! A queued task is cancelled on the spot. A running task only has its
//! cancellation flag set and moves to `Cancelling`; it becomes `Cancelled` once
//! its backend call returns and the slot reports back.

use crate::types::{TaskId, TaskOutcome, TaskState};

use super::{MediaDownloader, QueueState};

impl MediaDownloader {
    /// Cancel one task
    ///
    /// Returns `true` if the request had an effect: a queued task was cancelled
    /// or a running task was asked to stop. Repeating the call, or calling it
    /// for a terminal or unknown id, is a no-op returning `false`.
    pub async fn cancel_task(&self, id: TaskId) -> bool {
        let mut state = self.queue_state.lock().await;
        let applied = self.cancel_task_locked(&mut state, id);
        if applied {
            self.complete_run_if_drained(&mut state);
        }
        applied
    }

    /// Cancel every queued and running task and stop admitting for this run
    ///
    /// The run completes with `cancelled: true` once every in-flight task has
    /// reported back. Tasks submitted before that happens stay queued for the
    /// next start.
    pub async fn cancel_all(&self) {
        let mut state = self.queue_state.lock().await;
        state.global_cancel = true;

        let running: Vec<TaskId> = state
            .in_flight
            .values()
            .filter(|task| task.state == TaskState::Running)
            .map(|task| task.id)
            .collect();
        for id in &running {
            self.cancel_task_locked(&mut state, *id);
        }

        let pending = state.pending.len();
        while let Some(task) = state.pending.pop_front() {
            task.request_cancel();
            self.finalize_task(&mut state, task, TaskOutcome::Cancelled);
        }

        tracing::info!(
            running = running.len(),
            pending,
            "Cancelling all tasks"
        );

        self.complete_run_if_drained(&mut state);
    }

    fn cancel_task_locked(&self, state: &mut QueueState, id: TaskId) -> bool {
        if let Some(position) = state.pending.iter().position(|task| task.id == id) {
            if let Some(task) = state.pending.remove(position) {
                task.request_cancel();
                tracing::info!(task_id = id.0, "Queued task cancelled");
                self.finalize_task(state, task, TaskOutcome::Cancelled);
                return true;
            }
            return false;
        }

        if let Some(task) = state.in_flight.get_mut(&id)
            && task.state == TaskState::Running
        {
            task.request_cancel();
            task.transition(TaskState::Cancelling);
            tracing::info!(task_id = id.0, url = %task.url, "Cancellation requested");
            return true;
        }

        false
    }
}
