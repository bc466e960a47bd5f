//! FIFO admission queue and concurrency slots.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, Semaphore};

use crate::error::{Error, Result};
use crate::types::TaskId;

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<TaskId>,
    active: HashSet<TaskId>,
}

/// Queue of tasks waiting for a worker slot
///
/// Queued and active ids live under one lock, so an id is never queued twice
/// and never queued while its worker is alive.
#[derive(Debug)]
pub(crate) struct AdmissionQueue {
    inner: Mutex<QueueInner>,
    /// Signalled when an id is enqueued
    enqueued: Notify,
    /// Signalled when an active slot is released
    released: Notify,
    /// Limits concurrent workers (max_concurrent_downloads)
    pub(crate) permits: Arc<Semaphore>,
    /// Cleared during shutdown
    accepting_new: AtomicBool,
}

impl AdmissionQueue {
    pub(crate) fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            enqueued: Notify::new(),
            released: Notify::new(),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            accepting_new: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a task to the back of the queue
    pub(crate) fn enqueue(&self, id: TaskId) -> Result<()> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }
        {
            let mut inner = self.lock();
            if inner.active.contains(&id) || inner.pending.contains(&id) {
                return Err(Error::AlreadyActive(id));
            }
            inner.pending.push_back(id);
        }
        self.enqueued.notify_one();
        Ok(())
    }

    /// Move the queue head to the active set
    pub(crate) fn pop(self: &Arc<Self>) -> Option<ActiveGuard> {
        let mut inner = self.lock();
        let id = inner.pending.pop_front()?;
        inner.active.insert(id);
        Some(ActiveGuard {
            queue: Arc::clone(self),
            id,
        })
    }

    /// Wait for the next queued task
    pub(crate) async fn next(self: &Arc<Self>) -> ActiveGuard {
        loop {
            let notified = self.enqueued.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(guard) = self.pop() {
                return guard;
            }
            notified.await;
        }
    }

    /// Drop a queued (not yet admitted) task; returns whether it was queued
    pub(crate) fn remove(&self, id: TaskId) -> bool {
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner.pending.retain(|queued| *queued != id);
        inner.pending.len() < before
    }

    pub(crate) fn is_active(&self, id: TaskId) -> bool {
        self.lock().active.contains(&id)
    }

    pub(crate) fn is_queued(&self, id: TaskId) -> bool {
        self.lock().pending.contains(&id)
    }

    /// (queued, active) counts
    pub(crate) fn counts(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.pending.len(), inner.active.len())
    }

    /// Wait until `id` holds no active slot
    pub(crate) async fn wait_released(&self, id: TaskId) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_active(id) {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_accepting(&self) {
        self.accepting_new.store(false, Ordering::SeqCst);
        self.permits.close();
    }

    fn release(&self, id: TaskId) {
        self.lock().active.remove(&id);
        self.released.notify_waiters();
    }
}

/// Active slot of one task; released on drop
#[derive(Debug)]
pub(crate) struct ActiveGuard {
    queue: Arc<AdmissionQueue>,
    id: TaskId,
}

impl ActiveGuard {
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.queue.release(self.id);
    }
}
