//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a queued task
///
/// Assigned at submission time from a monotonically increasing counter and never
/// reused for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task lifecycle state
///
/// ```text
/// Queued ──► Running ──► Succeeded | Failed | Cancelled
///   │           │
///   │           └──► Cancelling ──► Cancelled
///   └──► Cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting in the pending queue for a free slot
    Queued,
    /// Dispatched to a worker slot, backend call in progress
    Running,
    /// Cancellation requested, backend call still unwinding
    Cancelling,
    /// Backend finished the transfer
    Succeeded,
    /// Backend reported an error
    Failed,
    /// Cancelled before dispatch, or backend observed the cancellation
    Cancelled,
}

impl TaskState {
    /// Whether no further transitions can occur from this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal lifecycle transition
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Cancelling)
                | (Cancelling, Cancelled)
        )
    }
}

/// Category of a task-level failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Metadata probe failed
    Probe,
    /// Transfer failed
    Fetch,
    /// External backend tool could not be run
    Tool,
    /// Backend call panicked
    Panic,
}

/// Terminal outcome of one task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Transfer completed
    Succeeded {
        /// Title reported by the backend probe
        title: String,
    },
    /// Backend reported an error (message forwarded as-is)
    Failed {
        /// Failure category
        #[serde(rename = "failure")]
        kind: FailureKind,
        /// Backend error message
        message: String,
    },
    /// Cancelled by user intent
    Cancelled,
}

impl TaskOutcome {
    /// The terminal state a task takes for this outcome
    pub fn terminal_state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded { .. } => TaskState::Succeeded,
            TaskOutcome::Failed { .. } => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }

    /// Outcome kind without payload
    pub fn kind(&self) -> OutcomeKind {
        match self {
            TaskOutcome::Succeeded { .. } => OutcomeKind::Succeeded,
            TaskOutcome::Failed { .. } => OutcomeKind::Failed,
            TaskOutcome::Cancelled => OutcomeKind::Cancelled,
        }
    }
}

/// Outcome kind recorded in history
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// Transfer completed
    Succeeded,
    /// Backend reported an error
    Failed,
    /// Cancelled by user intent
    Cancelled,
}

/// Point-in-time view of a task still in active bookkeeping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task ID
    pub id: TaskId,
    /// Source URL
    pub url: String,
    /// Current state
    pub state: TaskState,
    /// Title from the backend probe (None until probed)
    pub title: Option<String>,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Whether cancellation has been requested
    pub cancel_requested: bool,
    /// When the task was submitted
    pub queued_at: DateTime<Utc>,
}

/// Queue counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks waiting for a slot
    pub queued: usize,
    /// Tasks with a backend call in progress
    pub running: usize,
    /// Tasks whose cancellation is unwinding
    pub cancelling: usize,
    /// Whether a run is active
    pub run_active: bool,
    /// Tasks that reached a terminal state during the current run
    pub run_finished: usize,
    /// Tasks admitted or cancelled during the current run plus those still pending
    pub run_total: usize,
}

impl QueueStats {
    /// Overall run progress (0.0 to 100.0), None when no run is active
    pub fn run_percent(&self) -> Option<f32> {
        if !self.run_active || self.run_total == 0 {
            return None;
        }
        Some((self.run_finished as f32 / self.run_total as f32) * 100.0)
    }
}

/// Entry pushed to a history sink on every terminal event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the task reached its terminal state
    pub timestamp: DateTime<Utc>,
    /// Terminal outcome
    pub outcome: OutcomeKind,
    /// Title if the backend probed one, otherwise the URL
    pub title: String,
    /// Source URL
    pub url: String,
}

/// Metadata returned by a backend probe
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Display title
    pub title: String,
    /// Duration in seconds (0 if unknown)
    pub duration_seconds: u64,
}

/// Event emitted during the task lifecycle
///
/// Per task, subscribers observe a subsequence of
/// `TaskQueued, TaskStarted, TaskProgress*, TaskFinished`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task added to the pending queue
    TaskQueued {
        /// Task ID
        id: TaskId,
        /// Source URL
        url: String,
    },

    /// Task admitted into a worker slot
    TaskStarted {
        /// Task ID
        id: TaskId,
        /// Source URL
        url: String,
    },

    /// Task progress update
    TaskProgress {
        /// Task ID
        id: TaskId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
    },

    /// Task reached a terminal state
    TaskFinished {
        /// Task ID
        id: TaskId,
        /// Source URL
        url: String,
        /// Title from the backend probe, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Terminal outcome
        outcome: TaskOutcome,
        /// When the terminal state was reached
        finished_at: DateTime<Utc>,
    },

    /// Pending queue and in-flight set both drained
    RunCompleted {
        /// Whether the run ended through a global cancellation
        cancelled: bool,
        /// Number of tasks that reached a terminal state during the run
        finished: usize,
    },

    /// Downloader shut down
    Shutdown,
}

impl Event {
    /// Task this event belongs to, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Event::TaskQueued { id, .. }
            | Event::TaskStarted { id, .. }
            | Event::TaskProgress { id, .. }
            | Event::TaskFinished { id, .. } => Some(*id),
            Event::RunCompleted { .. } | Event::Shutdown => None,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        let all = [
            TaskState::Queued,
            TaskState::Running,
            TaskState::Cancelling,
            TaskState::Succeeded,
            TaskState::Failed,
            TaskState::Cancelled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(
                    !from.can_transition_to(to),
                    "{:?} must not transition to {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn queued_never_skips_running_except_into_cancelled() {
        assert!(TaskState::Queued.can_transition_to(TaskState::Running));
        assert!(TaskState::Queued.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Succeeded));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Cancelling));
    }

    #[test]
    fn cancelling_only_resolves_to_cancelled() {
        assert!(TaskState::Cancelling.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Cancelling.can_transition_to(TaskState::Succeeded));
        assert!(!TaskState::Cancelling.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Cancelling.can_transition_to(TaskState::Running));
    }

    #[test]
    fn outcome_maps_to_matching_terminal_state() {
        let ok = TaskOutcome::Succeeded {
            title: "clip".into(),
        };
        let failed = TaskOutcome::Failed {
            kind: FailureKind::Fetch,
            message: "HTTP 403".into(),
        };
        assert_eq!(ok.terminal_state(), TaskState::Succeeded);
        assert_eq!(failed.terminal_state(), TaskState::Failed);
        assert_eq!(TaskOutcome::Cancelled.terminal_state(), TaskState::Cancelled);
        assert_eq!(failed.kind(), OutcomeKind::Failed);
    }

    #[test]
    fn event_serializes_with_snake_case_tag() {
        let event = Event::TaskProgress {
            id: TaskId(7),
            percent: 42.5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_progress");
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn run_percent_is_none_when_idle() {
        let stats = QueueStats::default();
        assert_eq!(stats.run_percent(), None);

        let stats = QueueStats {
            run_active: true,
            run_finished: 1,
            run_total: 4,
            ..Default::default()
        };
        assert_eq!(stats.run_percent(), Some(25.0));
    }
}
