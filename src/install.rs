//! Installation hand-off
//!
//! A task that completes is turned into a [`BrowserRecord`] and given to an
//! [`InstallationStore`]. The store owns persistence; this crate ships an
//! in-memory store.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::platform;
use crate::types::{BrowserRecord, DownloadTask, Target};

/// Receives finished installations
#[async_trait]
pub trait InstallationStore: Send + Sync {
    /// Persist a newly installed browser, replacing any record for the same target
    async fn save(&self, record: BrowserRecord) -> Result<()>;

    /// Forget the installation of `target`, returning whether a record existed
    async fn remove(&self, target: &Target) -> Result<bool>;

    /// All known installations
    async fn list(&self) -> Result<Vec<BrowserRecord>>;

    /// Set the volatile `is_running` flag of record `id`
    ///
    /// Returns the previous value, or `None` if no such record exists. The
    /// check and the update happen atomically.
    async fn set_running(&self, id: &str, running: bool) -> Result<Option<bool>>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

/// Store that keeps records in memory for the life of the process
#[derive(Debug, Default)]
pub struct MemoryInstallationStore {
    records: RwLock<Vec<BrowserRecord>>,
}

impl MemoryInstallationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_target(record: &BrowserRecord, target: &Target) -> bool {
    record.kind == target.kind
        && record.platform == target.platform
        && record.version == target.version
}

#[async_trait]
impl InstallationStore for MemoryInstallationStore {
    async fn save(&self, record: BrowserRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.retain(|existing| {
            !(existing.kind == record.kind
                && existing.version == record.version
                && existing.platform == record.platform)
        });
        records.push(record);
        Ok(())
    }

    async fn remove(&self, target: &Target) -> Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !same_target(record, target));
        Ok(records.len() < before)
    }

    async fn list(&self) -> Result<Vec<BrowserRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn set_running(&self, id: &str, running: bool) -> Result<Option<bool>> {
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .find(|record| record.id == id)
            .map(|record| std::mem::replace(&mut record.is_running, running)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Build the install record for a completed task
///
/// Returns `None` when the worker never reported an install directory. A
/// missing executable path is filled in by probing the install directory.
pub fn finalize_record(task: &DownloadTask) -> Option<BrowserRecord> {
    let install_path = task.install_path.clone()?;
    let executable_path = task
        .executable_path
        .clone()
        .unwrap_or_else(|| platform::find_executable(task.target.kind, &install_path));

    Some(BrowserRecord {
        id: uuid::Uuid::new_v4().to_string(),
        kind: task.target.kind,
        version: task
            .resolved_version
            .clone()
            .unwrap_or_else(|| task.target.version.clone()),
        platform: task.target.platform.clone(),
        install_path,
        executable_path,
        download_date: Utc::now(),
        file_size: task.total_bytes,
        is_running: false,
    })
}
