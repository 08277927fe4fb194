//! Idle waiting and shutdown coordination.

use crate::error::Result;
use crate::types::Event;

use super::MediaDownloader;

impl MediaDownloader {
    /// Wait until no run is active
    ///
    /// Returns immediately when idle. Driven by the run-state watch channel,
    /// not by polling.
    pub async fn wait_for_idle(&self) {
        let mut run_active = self.run_active.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        run_active.wait_for(|active| !*active).await.ok();
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting submissions and starts
    /// 2. Cancels every queued and running task
    /// 3. Waits for in-flight backend calls to unwind, bounded by
    ///    `config.shutdown_timeout`
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Backend calls still running after the timeout are abandoned; their
    /// outcome is reported, and recorded in history, if they ever return.
    /// History recorders are released once every task is resolved.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.lock().await.accepting_new = false;
        tracing::info!("Stopped accepting new submissions");

        self.cancel_all().await;

        match tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_idle()).await {
            Ok(()) => {
                self.queue_state.lock().await.history.clear();
                tracing::info!("All in-flight tasks resolved");
            }
            Err(_) => tracing::warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Timeout waiting for in-flight tasks, proceeding with shutdown"
            ),
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
