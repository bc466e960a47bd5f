//! Caller-facing task control and one-shot browser commands.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::launch;
use crate::platform;
use crate::registry::TaskUpdate;
use crate::types::{BrowserKind, BrowserRecord, DownloadTask, SystemInfo, Target, TaskId};

use super::BrowserDownloader;

/// Extra time beyond the termination grace that `remove` waits for the worker
const REMOVE_REAP_MARGIN: Duration = Duration::from_secs(2);

impl BrowserDownloader {
    /// Queue a browser download
    ///
    /// Returns as soon as the task is registered and queued; the download
    /// itself runs in the background. Watch progress with
    /// [`subscribe`](Self::subscribe) or [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTarget`] if the version or platform is blank
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use browser_dl::*;
    /// # async fn example(downloader: BrowserDownloader) -> Result<()> {
    /// let id = downloader
    ///     .start(Target::new(BrowserKind::Firefox, "stable", "linux64"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&self, target: Target) -> Result<TaskId> {
        target.validate()?;
        if !self.queue.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let task = self.registry.create(target).await;
        if let Err(e) = self.queue.enqueue(task.id) {
            // Shutdown began between the check and the enqueue
            self.registry.remove(task.id).await.ok();
            return Err(e);
        }

        tracing::info!(task_id = %task.id, browser = %task.target, "download queued");
        Ok(task.id)
    }

    /// Snapshot of one task
    pub async fn get(&self, id: TaskId) -> Result<DownloadTask> {
        self.registry.get(id).await
    }

    /// Snapshot of all tasks, ordered by id
    pub async fn list(&self) -> Vec<DownloadTask> {
        self.registry.list().await
    }

    /// Retry a failed download
    ///
    /// Always allowed from `Failed`, whatever the retry count. The task goes
    /// to `Retrying` with its error cleared and re-enters the queue without
    /// backoff.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the id is unknown
    /// - [`Error::InvalidState`] if the task is not `Failed`
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    pub async fn retry(&self, id: TaskId) -> Result<DownloadTask> {
        if !self.queue.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let task = self.registry.apply(id, TaskUpdate::UserRetry).await?;
        if let Err(e) = self.queue.enqueue(id) {
            self.registry
                .apply(
                    id,
                    TaskUpdate::Failed {
                        message: e.to_string(),
                    },
                )
                .await
                .ok();
            return Err(e);
        }

        tracing::info!(task_id = %id, retry_count = task.retry_count, "retry requested");
        Ok(task)
    }

    /// Cancel and delete a task
    ///
    /// A live worker is terminated (SIGTERM, then kill after the grace
    /// period) and reaped before the entry is deleted; the wait is bounded by
    /// `worker.termination_grace`. Queued and backing-off tasks are simply
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is unknown.
    pub async fn remove(&self, id: TaskId) -> Result<DownloadTask> {
        let cancel = self.registry.cancellation(id).await?;
        cancel.cancel();
        let was_queued = self.queue.remove(id);

        if self.queue.is_active(id) {
            let timeout = self.config.worker.termination_grace + REMOVE_REAP_MARGIN;
            if tokio::time::timeout(timeout, self.queue.wait_released(id))
                .await
                .is_err()
            {
                tracing::warn!(
                    task_id = %id,
                    timeout_secs = timeout.as_secs(),
                    "worker still running after termination timeout"
                );
            }
        }

        let task = self.registry.remove(id).await?;
        tracing::info!(task_id = %id, status = %task.status, was_queued, "download removed");
        Ok(task)
    }

    /// Uninstall a browser and drop its installation record
    pub async fn uninstall(&self, target: Target) -> Result<()> {
        target.validate()?;
        self.commands.uninstall(&target).await?;
        if self.store.remove(&target).await? {
            tracing::debug!(browser = %target, "installation record removed");
        }
        Ok(())
    }

    /// Versions of `kind` available for download
    pub async fn available_versions(&self, kind: BrowserKind) -> Result<Vec<String>> {
        self.commands.list_versions(kind).await
    }

    /// Whether `target` is installed, as reported by the worker
    pub async fn is_installed(&self, target: Target) -> Result<bool> {
        target.validate()?;
        self.commands.is_installed(&target).await
    }

    /// Installations recorded by the installation store
    pub async fn installations(&self) -> Result<Vec<BrowserRecord>> {
        self.store.list().await
    }

    /// Start an installed browser
    ///
    /// Chromium-family browsers get `--no-first-run` and
    /// `--disable-default-apps`; `args` follow and override them. The
    /// record is flagged `is_running` until the process exits or the
    /// downloader shuts down. The browser itself is never killed by this
    /// crate.
    ///
    /// Returns the process id.
    ///
    /// # Errors
    ///
    /// - [`Error::InstallationNotFound`] if no record has this id
    /// - [`Error::AlreadyRunning`] if the record is flagged running
    /// - [`Error::ExecutableMissing`] if the executable was deleted
    /// - [`Error::InvalidTarget`] for ChromeDriver records
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    pub async fn launch(&self, record_id: &str, args: Vec<String>) -> Result<u32> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        let record = self
            .store
            .list()
            .await?
            .into_iter()
            .find(|record| record.id == record_id)
            .ok_or_else(|| Error::InstallationNotFound(record_id.to_string()))?;

        match self.store.set_running(record_id, true).await? {
            None => return Err(Error::InstallationNotFound(record_id.to_string())),
            Some(true) => return Err(Error::AlreadyRunning(record_id.to_string())),
            Some(false) => {}
        }

        let args = launch::build_launch_args(record.kind, &args);
        let mut child = match launch::spawn_browser(&record, &args) {
            Ok(child) => child,
            Err(e) => {
                self.store.set_running(record_id, false).await.ok();
                return Err(e);
            }
        };
        let pid = child.id().unwrap_or_default();
        tracing::info!(
            record_id,
            kind = %record.kind,
            version = %record.version,
            pid,
            ?args,
            "browser launched"
        );

        let store = Arc::clone(&self.store);
        let shutdown = self.shutdown_token.clone();
        let record_id = record_id.to_string();
        self.tracker.spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => tracing::info!(%record_id, pid, code = status.code(), "browser exited"),
                    Err(e) => tracing::warn!(%record_id, pid, error = %e, "failed to wait for browser"),
                },
                _ = shutdown.cancelled() => {
                    tracing::debug!(%record_id, pid, "no longer tracking browser");
                }
            }
            if let Err(e) = store.set_running(&record_id, false).await {
                tracing::warn!(%record_id, error = %e, "failed to clear running flag");
            }
        });

        Ok(pid)
    }

    /// Uninstall every recorded installation
    ///
    /// Each record is uninstalled through the worker and dropped from the
    /// store. A failure is logged and leaves that record in place; the rest
    /// are still processed. Returns the number of installations removed.
    pub async fn clear_installations(&self) -> Result<usize> {
        let records = self.store.list().await?;
        let total = records.len();
        let mut removed = 0;

        for record in records {
            let target = Target::new(record.kind, record.version.clone(), record.platform.clone());
            if let Err(e) = self.commands.uninstall(&target).await {
                tracing::warn!(record_id = %record.id, browser = %target, error = %e, "failed to uninstall browser");
                continue;
            }
            if self.store.remove(&target).await? {
                removed += 1;
            }
        }

        tracing::info!(removed, total, "cleared installations");
        Ok(removed)
    }

    /// Host platform id, architecture and OS
    pub fn system_info(&self) -> SystemInfo {
        platform::system_info()
    }
}
