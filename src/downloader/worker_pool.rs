//! Bounded worker slots executing backend calls
//!
//! A slot is an owned semaphore permit. It is claimed under the queue lock at
//! admission time and released by the worker task right before the outcome is
//! reported, so the manager always finds the slot free again when it handles
//! that outcome.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};

use super::task::Task;
use crate::backend::{FetchContext, FetchOutcome, MediaBackend, WorkerMessage};
use crate::error::BackendError;
use crate::types::{FailureKind, TaskOutcome};

/// Fixed-size pool of worker slots for one run
pub(crate) struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
    backend: Arc<dyn MediaBackend>,
    dest_dir: PathBuf,
    messages: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerPool {
    pub(crate) fn new(
        capacity: usize,
        backend: Arc<dyn MediaBackend>,
        dest_dir: PathBuf,
        messages: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            backend,
            dest_dir,
            messages,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Claim a free slot without waiting
    pub(crate) fn try_claim_slot(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slots).try_acquire_owned().ok()
    }

    /// Run `task` on its own tokio task, holding `slot` until the backend returns
    pub(crate) fn dispatch(&self, task: &Task, slot: OwnedSemaphorePermit) {
        let id = task.id;
        let ctx = FetchContext::new(
            id,
            task.url.clone(),
            self.dest_dir.clone(),
            task.cancel_token.clone(),
            self.messages.clone(),
        );
        let backend = Arc::clone(&self.backend);
        let messages = self.messages.clone();

        tokio::spawn(async move {
            let outcome = run_slot(backend, ctx).await;
            drop(slot);
            messages.send(WorkerMessage::Finished { id, outcome }).ok();
        });
    }
}

/// Execute one task's backend calls and fold the result into an outcome
///
/// Never fails: backend errors become [`TaskOutcome::Failed`], and a panic
/// inside the backend is caught here and reported as
/// [`FailureKind::Panic`]. Whenever cancellation was requested the outcome is
/// [`TaskOutcome::Cancelled`], even if the backend completed or errored.
pub(crate) async fn run_slot(backend: Arc<dyn MediaBackend>, ctx: FetchContext) -> TaskOutcome {
    let id = ctx.task_id();
    let cancel_token = ctx.cancel_token();

    let call = tokio::spawn(async move { execute(backend.as_ref(), &ctx).await });

    match call.await {
        Ok(outcome) => outcome,
        Err(_) if cancel_token.is_cancelled() => TaskOutcome::Cancelled,
        Err(e) => {
            let message = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                "backend call was aborted".to_string()
            };
            tracing::error!(task_id = id.0, error = %message, "Backend call panicked");
            TaskOutcome::Failed {
                kind: FailureKind::Panic,
                message,
            }
        }
    }
}

async fn execute(backend: &dyn MediaBackend, ctx: &FetchContext) -> TaskOutcome {
    if ctx.is_cancelled() {
        return TaskOutcome::Cancelled;
    }

    let metadata = match backend.probe(ctx.url()).await {
        Ok(metadata) => metadata,
        Err(e) => return failed_unless_cancelled(ctx, e),
    };
    tracing::debug!(
        task_id = ctx.task_id().0,
        title = %metadata.title,
        duration_seconds = metadata.duration_seconds,
        "Probe succeeded"
    );
    ctx.send(WorkerMessage::Probed {
        id: ctx.task_id(),
        title: metadata.title.clone(),
    });

    if ctx.is_cancelled() {
        return TaskOutcome::Cancelled;
    }

    match backend.fetch(ctx).await {
        Ok(FetchOutcome::Completed) if !ctx.is_cancelled() => TaskOutcome::Succeeded {
            title: metadata.title,
        },
        Ok(_) => TaskOutcome::Cancelled,
        Err(e) => failed_unless_cancelled(ctx, e),
    }
}

fn failed_unless_cancelled(ctx: &FetchContext, error: BackendError) -> TaskOutcome {
    if ctx.is_cancelled() {
        return TaskOutcome::Cancelled;
    }
    TaskOutcome::Failed {
        kind: error.failure_kind(),
        message: error.message().to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("backend panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("backend panicked: {}", message)
    } else {
        "backend panicked".to_string()
    }
}
