//! Download history sinks
//!
//! History is a consumer, not part of the queue: every terminal task yields one
//! [`HistoryEntry`] on a dedicated unbounded channel, and a recorder task pushes
//! it into a [`HistorySink`]. Records never share the lossy event broadcast, so
//! a slow sink delays nothing and loses nothing. Scheduling never reads history
//! back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};

use crate::error::Result;
use crate::types::{HistoryEntry, TaskOutcome};

/// Destination for completed-task records
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Persist one terminal-task record
    ///
    /// Retention policy (how many entries are kept) is up to the sink.
    async fn record(&self, entry: HistoryEntry) -> Result<()>;
}

/// In-memory history bounded to the most recent entries, newest first
pub struct MemoryHistory {
    max_entries: usize,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    /// Create an empty history keeping at most `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Recorded entries, newest first
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl HistorySink for MemoryHistory {
    async fn record(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(0, entry);
        entries.truncate(self.max_entries);
        Ok(())
    }
}

/// JSON-file history bounded to the most recent entries, newest first
///
/// The whole list is rewritten on every record through a temporary file and a
/// rename, so a crash mid-write leaves the previous file intact.
pub struct JsonHistory {
    path: PathBuf,
    max_entries: usize,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl JsonHistory {
    /// Open a history file, starting empty if it is missing or unreadable
    pub async fn load(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let path = path.into();
        let mut entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<HistoryEntry>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unreadable history file, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        entries.truncate(max_entries);

        tracing::debug!(path = %path.display(), count = entries.len(), "History loaded");

        Ok(Self {
            path,
            max_entries,
            entries: Mutex::new(entries),
        })
    }

    /// History file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded entries, newest first
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }

    /// Remove every entry and persist the empty list
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.persist(&entries).await
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistorySink for JsonHistory {
    async fn record(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(0, entry);
        entries.truncate(self.max_entries);
        self.persist(&entries).await
    }
}

/// History record for a task that reached `outcome`, titled by its probed title or its URL
pub(crate) fn entry_for(
    url: &str,
    title: Option<&str>,
    outcome: &TaskOutcome,
    finished_at: DateTime<Utc>,
) -> HistoryEntry {
    HistoryEntry {
        timestamp: finished_at,
        outcome: outcome.kind(),
        title: title.filter(|t| !t.is_empty()).unwrap_or(url).to_string(),
        url: url.to_string(),
    }
}

/// Spawn a task forwarding every received record to `sink`
///
/// Sink failures are logged and never reach the queue. The task ends once
/// every sender is dropped and the backlog has been recorded.
pub fn spawn_history_recorder(
    mut entries: mpsc::UnboundedReceiver<HistoryEntry>,
    sink: Arc<dyn HistorySink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = entries.recv().await {
            if let Err(e) = sink.record(entry).await {
                tracing::error!(error = %e, "Failed to record history entry");
            }
        }
        tracing::debug!("History channel closed, recorder exiting");
    })
}
