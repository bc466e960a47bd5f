//! Task registry: the single source of truth for download task state
//!
//! Each task lives in its own slot behind its own mutex. The id map is only
//! locked long enough to look a slot up, so updates to different tasks never
//! wait on each other. Every successful mutation publishes exactly one
//! [`TaskEvent`] while the slot is still locked, which keeps per-task event
//! order identical to apply order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::protocol::ProgressUpdate;
use crate::types::{ChangeKind, DownloadTask, Status, Target, TaskEvent, TaskId};

/// A mutation of one task
#[derive(Clone, Debug, PartialEq)]
pub enum TaskUpdate {
    /// A worker slot was granted
    Admitted,
    /// Worker progress report
    Progress(ProgressUpdate),
    /// Version alias resolved to a build id
    VersionResolved(String),
    /// Worker reported the executable path
    ExecutableResolved(PathBuf),
    /// Worker finished successfully
    Completed {
        /// Install directory, if the worker reported one
        install_path: Option<PathBuf>,
    },
    /// Attempt failed
    Failed {
        /// User-facing error text
        message: String,
    },
    /// Retry policy scheduled another automatic attempt
    RetryScheduled {
        /// Error text of the failed attempt
        message: String,
    },
    /// Caller asked for another attempt
    UserRetry,
}

impl TaskUpdate {
    fn operation(&self) -> &'static str {
        match self {
            TaskUpdate::Admitted => "admit",
            TaskUpdate::Progress(_) => "report progress for",
            TaskUpdate::VersionResolved(_) => "resolve version for",
            TaskUpdate::ExecutableResolved(_) => "set executable for",
            TaskUpdate::Completed { .. } => "complete",
            TaskUpdate::Failed { .. } => "fail",
            TaskUpdate::RetryScheduled { .. } => "schedule retry for",
            TaskUpdate::UserRetry => "retry",
        }
    }
}

/// Apply `update` to `task`, or reject it if the task's status does not allow it
pub(crate) fn transition(
    task: &mut DownloadTask,
    update: TaskUpdate,
    now: DateTime<Utc>,
) -> Result<()> {
    let invalid = |task: &DownloadTask, update: &TaskUpdate| Error::InvalidState {
        id: task.id,
        operation: update.operation().to_string(),
        current_state: task.status.to_string(),
    };

    match (task.status, update) {
        (Status::Pending | Status::Retrying, TaskUpdate::Admitted) => {
            task.status = Status::Downloading;
            task.error_message = None;
            task.progress = 0.0;
            task.downloaded_bytes = 0;
            task.eta_seconds = None;
            task.started_at = Some(now);
        }
        (Status::Downloading, TaskUpdate::Progress(update)) => {
            apply_progress(task, &update, now);
        }
        (Status::Downloading, TaskUpdate::VersionResolved(version)) => {
            task.resolved_version = Some(version);
        }
        (Status::Downloading, TaskUpdate::ExecutableResolved(path)) => {
            task.executable_path = Some(path);
        }
        (Status::Downloading, TaskUpdate::Completed { install_path }) => {
            task.status = Status::Completed;
            task.progress = 1.0;
            if task.total_bytes > 0 {
                task.downloaded_bytes = task.total_bytes;
            }
            task.eta_seconds = None;
            task.error_message = None;
            if install_path.is_some() {
                task.install_path = install_path;
            }
        }
        (
            Status::Pending | Status::Downloading | Status::Retrying,
            TaskUpdate::Failed { message },
        ) => {
            task.status = Status::Failed;
            task.eta_seconds = None;
            task.error_message = Some(message);
        }
        (Status::Failed, TaskUpdate::RetryScheduled { message }) => {
            task.status = Status::Retrying;
            task.retry_count = task.retry_count.saturating_add(1);
            task.error_message = Some(message);
        }
        (Status::Failed, TaskUpdate::UserRetry) => {
            task.status = Status::Retrying;
            task.retry_count = task.retry_count.saturating_add(1);
            task.error_message = None;
        }
        (_, update) => return Err(invalid(task, &update)),
    }

    task.updated_at = now;
    Ok(())
}

fn apply_progress(task: &mut DownloadTask, update: &ProgressUpdate, now: DateTime<Utc>) {
    let reported = update.progress.clamp(0.0, 1.0);
    if reported >= task.progress {
        task.progress = reported;
    }

    if update.total_bytes > 0 {
        task.total_bytes = update.total_bytes;
    }
    task.downloaded_bytes = if task.total_bytes > 0 {
        update.downloaded_bytes.min(task.total_bytes)
    } else {
        update.downloaded_bytes
    };

    task.eta_seconds = update
        .eta_seconds()
        .or_else(|| derive_eta(task, now));
}

/// Remaining time extrapolated from the average rate since admission
fn derive_eta(task: &DownloadTask, now: DateTime<Utc>) -> Option<u64> {
    let started = task.started_at?;
    if task.downloaded_bytes == 0 || task.total_bytes <= task.downloaded_bytes {
        return None;
    }
    let elapsed = (now - started).to_std().ok()?.as_secs_f64();
    if elapsed <= 0.0 {
        return None;
    }
    let rate = task.downloaded_bytes as f64 / elapsed;
    let remaining = (task.total_bytes - task.downloaded_bytes) as f64 / rate;
    remaining.is_finite().then(|| remaining.round() as u64)
}

struct SlotState {
    task: DownloadTask,
    removed: bool,
}

struct TaskSlot {
    state: Mutex<SlotState>,
    cancel: CancellationToken,
}

/// In-memory registry of download tasks
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<TaskSlot>>>,
    next_id: AtomicU64,
    events: EventBus,
    shutdown: CancellationToken,
}

impl TaskRegistry {
    /// Create an empty registry
    ///
    /// Every task's cancellation token is a child of `shutdown`.
    pub fn new(events: EventBus, shutdown: CancellationToken) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            shutdown,
        }
    }

    /// Register a new pending task
    pub async fn create(&self, target: Target) -> DownloadTask {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(TaskSlot {
            state: Mutex::new(SlotState {
                task: DownloadTask::new(id, target),
                removed: false,
            }),
            cancel: self.shutdown.child_token(),
        });

        let state = slot.state.lock().await;
        self.tasks.write().await.insert(id, Arc::clone(&slot));
        self.events
            .publish(TaskEvent::from_task(&state.task, ChangeKind::Created));
        tracing::debug!(task_id = %id, browser = %state.task.target, "task created");
        state.task.clone()
    }

    async fn slot(&self, id: TaskId) -> Result<Arc<TaskSlot>> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    /// Snapshot of one task
    pub async fn get(&self, id: TaskId) -> Result<DownloadTask> {
        let slot = self.slot(id).await?;
        let state = slot.state.lock().await;
        if state.removed {
            return Err(Error::NotFound(id));
        }
        Ok(state.task.clone())
    }

    /// Apply an update atomically with respect to other updates of the same task
    pub async fn apply(&self, id: TaskId, update: TaskUpdate) -> Result<DownloadTask> {
        let slot = self.slot(id).await?;
        let mut state = slot.state.lock().await;
        if state.removed {
            return Err(Error::NotFound(id));
        }

        transition(&mut state.task, update, Utc::now())?;
        self.events
            .publish(TaskEvent::from_task(&state.task, ChangeKind::Updated));
        Ok(state.task.clone())
    }

    /// Point-in-time snapshot of all tasks, ordered by id
    pub async fn list(&self) -> Vec<DownloadTask> {
        let slots: Vec<Arc<TaskSlot>> = self.tasks.read().await.values().cloned().collect();

        let mut tasks = Vec::with_capacity(slots.len());
        for slot in slots {
            let state = slot.state.lock().await;
            if !state.removed {
                tasks.push(state.task.clone());
            }
        }
        tasks.sort_by_key(|task| task.id);
        tasks
    }

    /// Cancel and delete a task, returning its final state
    pub async fn remove(&self, id: TaskId) -> Result<DownloadTask> {
        let slot = self.slot(id).await?;
        slot.cancel.cancel();

        let mut state = slot.state.lock().await;
        if state.removed {
            return Err(Error::NotFound(id));
        }
        state.removed = true;
        self.tasks.write().await.remove(&id);
        self.events
            .publish(TaskEvent::from_task(&state.task, ChangeKind::Removed));
        tracing::debug!(task_id = %id, "task removed");
        Ok(state.task.clone())
    }

    /// Cancellation token of a task
    pub async fn cancellation(&self, id: TaskId) -> Result<CancellationToken> {
        Ok(self.slot(id).await?.cancel.clone())
    }

    /// Event bus this registry publishes to
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
