//! Supervised task execution, outcome handling and automatic retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;

use super::BrowserDownloader;
use super::queue::ActiveGuard;
use crate::error::DownloadError;
use crate::install::finalize_record;
use crate::registry::TaskUpdate;
use crate::retry::RetryDecision;
use crate::types::TaskId;
use crate::worker::{Supervisor, SupervisorOutcome};

impl BrowserDownloader {
    /// Run one worker attempt for an admitted task
    ///
    /// The active slot and the concurrency permit are released before the
    /// terminal state is applied.
    pub(crate) fn spawn_supervised(&self, guard: ActiveGuard, permit: OwnedSemaphorePermit) {
        let downloader = self.clone();

        self.tracker.spawn(async move {
            let id = guard.id();
            let task = downloader.registry.get(id).await;
            let cancel = downloader.registry.cancellation(id).await;
            let (task, cancel) = match (task, cancel) {
                (Ok(task), Ok(cancel)) => (task, cancel),
                _ => {
                    tracing::debug!(task_id = %id, "task removed before admission");
                    return;
                }
            };

            let supervisor = Supervisor {
                id,
                target: task.target,
                registry: Arc::clone(&downloader.registry),
                launcher: Arc::clone(&downloader.launcher),
                worker: downloader.config.worker.clone(),
                cancel,
            };
            let outcome = supervisor.run().await;

            drop(guard);
            drop(permit);
            downloader.handle_outcome(id, outcome).await;
        });
    }

    async fn handle_outcome(&self, id: TaskId, outcome: SupervisorOutcome) {
        match outcome {
            SupervisorOutcome::Cancelled => {
                tracing::debug!(task_id = %id, "attempt cancelled");
            }
            SupervisorOutcome::Completed { install_path } => {
                let task = match self
                    .registry
                    .apply(id, TaskUpdate::Completed { install_path })
                    .await
                {
                    Ok(task) => task,
                    Err(e) => {
                        tracing::debug!(task_id = %id, error = %e, "completion not applied");
                        return;
                    }
                };
                self.retry_policy.record_success();
                tracing::info!(task_id = %id, browser = %task.target, "download completed");

                match finalize_record(&task) {
                    Some(record) => {
                        if let Err(e) = self.store.save(record).await {
                            tracing::error!(task_id = %id, error = %e, "failed to save installation record");
                        }
                    }
                    None => tracing::warn!(
                        task_id = %id,
                        "worker reported no install path, installation not recorded"
                    ),
                }
            }
            SupervisorOutcome::Failed(error) => self.handle_failure(id, error).await,
        }
    }

    async fn handle_failure(&self, id: TaskId, error: DownloadError) {
        let message = error.user_message();
        let task = match self
            .registry
            .apply(
                id,
                TaskUpdate::Failed {
                    message: message.clone(),
                },
            )
            .await
        {
            Ok(task) => task,
            Err(e) => {
                tracing::debug!(task_id = %id, error = %e, "failure not applied");
                return;
            }
        };

        match self.retry_policy.decide(task.retry_count, &error) {
            RetryDecision::Retry { attempt, delay } => {
                // A user retry that already moved the task on wins
                if let Err(e) = self
                    .registry
                    .apply(id, TaskUpdate::RetryScheduled { message })
                    .await
                {
                    tracing::debug!(task_id = %id, error = %e, "automatic retry superseded");
                    return;
                }
                tracing::warn!(
                    task_id = %id,
                    error = %error,
                    attempt,
                    max_attempts = self.config.retry.max_auto_retries,
                    delay_ms = delay.as_millis() as u64,
                    "download failed, retrying"
                );
                self.schedule_retry(id, delay);
            }
            RetryDecision::GiveUp(reason) => {
                tracing::error!(
                    task_id = %id,
                    error = %error,
                    retry_count = task.retry_count,
                    ?reason,
                    "download failed"
                );
            }
        }
    }

    /// Re-queue `id` after `delay` unless it is cancelled first
    fn schedule_retry(&self, id: TaskId, delay: Duration) {
        let downloader = self.clone();

        self.tracker.spawn(async move {
            let Ok(cancel) = downloader.registry.cancellation(id).await else {
                return;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(task_id = %id, "backoff cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if let Err(e) = downloader.queue.enqueue(id) {
                tracing::warn!(task_id = %id, error = %e, "could not re-queue task after backoff");
            }
        });
    }
}
