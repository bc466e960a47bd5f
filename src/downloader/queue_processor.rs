//! Queue processor - admits queued tasks into worker slots.

use std::sync::Arc;

use super::BrowserDownloader;

impl BrowserDownloader {
    /// Start the queue processor task
    ///
    /// The processor loops until shutdown:
    /// 1. Acquires a permit from the concurrency limiter (max_concurrent_downloads)
    /// 2. Waits for the queue head and marks it active
    /// 3. Spawns a supervised worker task that owns both
    ///
    /// Taking the permit before popping keeps queued tasks `Pending` until a
    /// slot is actually free, and a freed slot admits the next task at once.
    pub(crate) fn start_queue_processor(&self) {
        let downloader = self.clone();

        self.tracker.spawn(async move {
            loop {
                let permit = tokio::select! {
                    biased;
                    _ = downloader.shutdown_token.cancelled() => break,
                    permit = Arc::clone(&downloader.queue.permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        // Semaphore closed during shutdown
                        Err(_) => break,
                    },
                };

                let guard = tokio::select! {
                    biased;
                    _ = downloader.shutdown_token.cancelled() => break,
                    guard = downloader.queue.next() => guard,
                };

                tracing::debug!(task_id = %guard.id(), "admitting task");
                downloader.spawn_supervised(guard, permit);
            }
            tracing::debug!("queue processor stopped");
        });
    }
}
