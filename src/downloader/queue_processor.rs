//! Queue processor: run start, admission and the manager loop.
//!
//! Admission is re-evaluated whenever something may have freed capacity or
//! added work: at start, after every terminal task, and on submit during a
//! run. Worker messages are applied by a single manager task per run, so
//! progress, titles and outcomes are folded into queue state in the order the
//! slots produced them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::backend::WorkerMessage;
use crate::config::validate_concurrency;
use crate::error::{Error, Result};
use crate::history;
use crate::types::{Event, TaskId, TaskOutcome, TaskState};

use super::task::Task;
use super::worker_pool::WorkerPool;
use super::{ActiveRun, MediaDownloader, QueueState};

impl MediaDownloader {
    /// Start processing the pending queue
    ///
    /// Dispatches up to `concurrency_limit` tasks in FIFO order, writing into
    /// `dest_dir`, and keeps admitting as slots free up until the queue is
    /// empty. Returns once the first tasks are dispatched; progress and
    /// completion are reported through events. The limit is fixed for the
    /// whole run.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if a run is active (the run is unaffected)
    /// - [`Error::ShuttingDown`] once shutdown has begun
    /// - [`Error::InvalidConcurrency`] if the limit is outside `1..=5`
    /// - [`Error::InvalidDestination`] if `dest_dir` is not a writable directory
    /// - [`Error::EmptyQueue`] if nothing is pending
    pub async fn start(&self, concurrency_limit: usize, dest_dir: impl Into<PathBuf>) -> Result<()> {
        let dest_dir = dest_dir.into();
        let mut state = self.queue_state.lock().await;

        if state.run.is_some() {
            return Err(Error::AlreadyRunning);
        }
        if !state.accepting_new {
            return Err(Error::ShuttingDown);
        }
        validate_concurrency(concurrency_limit)?;
        validate_destination(&dest_dir).await?;
        if state.pending.is_empty() {
            return Err(Error::EmptyQueue);
        }

        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        tracing::info!(
            concurrency_limit,
            pending = state.pending.len(),
            dest_dir = %dest_dir.display(),
            "Starting run"
        );

        state.global_cancel = false;
        state.run = Some(ActiveRun {
            pool: WorkerPool::new(
                concurrency_limit,
                Arc::clone(&self.backend),
                dest_dir,
                messages_tx,
            ),
            finished: 0,
        });
        self.run_active.send_replace(true);

        tokio::spawn(self.clone().process_worker_messages(messages_rx));
        self.admit_pending(&mut state);

        Ok(())
    }

    /// Start with `config.max_concurrent_downloads` and `config.download_dir`
    pub async fn start_with_config(&self) -> Result<()> {
        self.start(
            self.config.max_concurrent_downloads,
            self.config.download_dir.clone(),
        )
        .await
    }

    /// Dispatch pending tasks while the run has free slots and is not cancelled
    pub(crate) fn admit_pending(&self, state: &mut QueueState) {
        let QueueState {
            pending,
            in_flight,
            global_cancel,
            run,
            ..
        } = state;
        let Some(run) = run.as_mut() else {
            return;
        };

        while !*global_cancel && in_flight.len() < run.pool.capacity() && !pending.is_empty() {
            let Some(slot) = run.pool.try_claim_slot() else {
                break;
            };
            let Some(mut task) = pending.pop_front() else {
                break;
            };

            task.transition(TaskState::Running);
            tracing::debug!(task_id = task.id.0, url = %task.url, "Task admitted");
            self.emit_event(Event::TaskStarted {
                id: task.id,
                url: task.url.clone(),
            });

            run.pool.dispatch(&task, slot);
            in_flight.insert(task.id, task);
        }
    }

    /// Apply a terminal outcome to a task that has left the queue and emit it
    pub(crate) fn finalize_task(&self, state: &mut QueueState, mut task: Task, outcome: TaskOutcome) {
        let Some(outcome) = task.finish(outcome) else {
            return;
        };

        match &outcome {
            TaskOutcome::Succeeded { title } => {
                tracing::info!(task_id = task.id.0, url = %task.url, title = %title, "Task succeeded");
            }
            TaskOutcome::Failed { kind, message } => {
                tracing::warn!(
                    task_id = task.id.0,
                    url = %task.url,
                    kind = ?kind,
                    error = %message,
                    "Task failed"
                );
            }
            TaskOutcome::Cancelled => {
                tracing::info!(task_id = task.id.0, url = %task.url, "Task cancelled");
            }
        }

        if let Some(run) = state.run.as_mut() {
            run.finished += 1;
        }

        let finished_at = Utc::now();
        if !state.history.is_empty() {
            let entry =
                history::entry_for(&task.url, task.title.as_deref(), &outcome, finished_at);
            state
                .history
                .retain(|recorder| recorder.send(entry.clone()).is_ok());
        }

        self.emit_event(Event::TaskFinished {
            id: task.id,
            url: task.url,
            title: task.title,
            outcome,
            finished_at,
        });
    }

    /// Complete the run once nothing is in flight and nothing more will be admitted
    pub(crate) fn complete_run_if_drained(&self, state: &mut QueueState) {
        if state.run.is_none() {
            // Idle: a cancel_all has nothing left to unwind
            state.global_cancel = false;
            return;
        }
        if !state.in_flight.is_empty() || (!state.pending.is_empty() && !state.global_cancel) {
            return;
        }

        let cancelled = std::mem::take(&mut state.global_cancel);
        if let Some(run) = state.run.take() {
            tracing::info!(cancelled, finished = run.finished, "Run completed");
            self.emit_event(Event::RunCompleted {
                cancelled,
                finished: run.finished,
            });
            self.run_active.send_replace(false);
        }
        if !state.accepting_new {
            // Shut down and nothing left to resolve: let the recorders drain and exit
            state.history.clear();
        }
    }

    /// Manager loop for one run
    ///
    /// Ends when every sender is gone: the run's pool was dropped at
    /// completion and every worker has reported.
    async fn process_worker_messages(self, mut messages: mpsc::UnboundedReceiver<WorkerMessage>) {
        while let Some(message) = messages.recv().await {
            let mut state = self.queue_state.lock().await;
            match message {
                WorkerMessage::Progress { id, percent } => {
                    if let Some(task) = state.in_flight.get_mut(&id)
                        && task.record_progress(percent)
                    {
                        self.emit_event(Event::TaskProgress {
                            id,
                            percent: task.progress,
                        });
                    }
                }
                WorkerMessage::Probed { id, title } => {
                    if let Some(task) = state.in_flight.get_mut(&id) {
                        task.title = Some(title);
                    }
                }
                WorkerMessage::Finished { id, outcome } => {
                    self.handle_finished(&mut state, id, outcome);
                }
            }
        }
        tracing::debug!("Worker channel closed, manager loop exiting");
    }

    fn handle_finished(&self, state: &mut QueueState, id: TaskId, outcome: TaskOutcome) {
        let Some(task) = state.in_flight.remove(&id) else {
            tracing::warn!(task_id = id.0, "Outcome reported for unknown task");
            return;
        };

        self.finalize_task(state, task, outcome);
        self.admit_pending(state);
        self.complete_run_if_drained(state);
    }
}

/// Check that `path` is an existing, writable directory
async fn validate_destination(path: &Path) -> Result<()> {
    let invalid = |reason: String| Error::InvalidDestination {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    if metadata.permissions().readonly() {
        return Err(invalid("directory is read-only".to_string()));
    }
    Ok(())
}
