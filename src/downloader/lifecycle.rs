//! Shutdown coordination.

use std::time::Duration;

use crate::error::Result;

use super::BrowserDownloader;

/// Extra time beyond the termination grace for workers to be reaped
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(5);

impl BrowserDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new downloads and retries
    /// 2. Cancels every task token, which terminates every live worker
    /// 3. Waits for tracked tasks, bounded by the termination grace plus a margin
    ///
    /// Tasks that were still queued stay in the registry in their current
    /// state. Calling `shutdown` again is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue.stop_accepting();
        tracing::info!("Stopped accepting new downloads");

        self.shutdown_token.cancel();
        self.tracker.close();

        let (queued, active) = self.queue.counts();
        tracing::debug!(queued, active, "Waiting for workers to exit");

        let timeout = self.config.worker.termination_grace + SHUTDOWN_MARGIN;
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => tracing::info!("All workers stopped"),
            Err(_) => tracing::warn!(
                timeout_secs = timeout.as_secs(),
                remaining = self.tracker.len(),
                "Timeout waiting for workers, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.queue.is_accepting()
    }
}
