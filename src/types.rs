//! Core types for browser-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

use crate::error::Error;

/// Unique identifier for a download task
///
/// Assigned from a monotonic counter by the task registry and never reused
/// within one registry instance.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
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

/// Browser product the external engine knows how to install
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Google Chrome (Chrome for Testing builds)
    Chrome,
    /// Chromium snapshot builds
    Chromium,
    /// Mozilla Firefox
    Firefox,
    /// ChromeDriver matching a Chrome build
    ChromeDriver,
}

impl BrowserKind {
    /// All supported kinds, in display order
    pub const ALL: [BrowserKind; 4] = [
        BrowserKind::Chrome,
        BrowserKind::Chromium,
        BrowserKind::Firefox,
        BrowserKind::ChromeDriver,
    ];

    /// Identifier passed to the worker on its command line
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::ChromeDriver => "chromedriver",
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(BrowserKind::Chrome),
            "chromium" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "chromedriver" => Ok(BrowserKind::ChromeDriver),
            other => Err(Error::InvalidTarget(format!(
                "unsupported browser type '{other}'"
            ))),
        }
    }
}

/// Immutable descriptor of what to download
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Target {
    /// Browser product
    pub kind: BrowserKind,
    /// Requested version (may be a channel alias such as "stable")
    pub version: String,
    /// Platform identifier understood by the worker (e.g. "linux64", "mac_arm")
    pub platform: String,
}

impl Target {
    /// Create a new target
    pub fn new(kind: BrowserKind, version: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            kind,
            version: version.into(),
            platform: platform.into(),
        }
    }

    /// Reject targets with blank version or platform
    pub fn validate(&self) -> Result<(), Error> {
        if self.version.trim().is_empty() {
            return Err(Error::InvalidTarget("version must not be empty".to_string()));
        }
        if self.platform.trim().is_empty() {
            return Err(Error::InvalidTarget(
                "platform must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.version, self.platform)
    }
}

/// Download task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, waiting for a concurrency slot
    Pending,
    /// A worker process is running for this task
    Downloading,
    /// Worker reported a successful install
    Completed,
    /// Worker failed; may be retried
    Failed,
    /// Waiting for backoff or a slot before another attempt
    Retrying,
}

impl Status {
    /// Lowercase name used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Downloading => "downloading",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Retrying => "retrying",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative state of one download task
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadTask {
    /// Unique task identifier
    pub id: TaskId,

    /// What is being downloaded
    pub target: Target,

    /// Current status
    pub status: Status,

    /// Progress fraction (0.0 to 1.0)
    pub progress: f64,

    /// Bytes downloaded so far
    pub downloaded_bytes: u64,

    /// Total size in bytes (0 if unknown)
    pub total_bytes: u64,

    /// Estimated time to completion in seconds (advisory)
    pub eta_seconds: Option<u64>,

    /// Error text shown to the user while failed or retrying
    pub error_message: Option<String>,

    /// Number of retries, automatic and user-initiated
    pub retry_count: u32,

    /// Build id reported by the worker once the version alias is resolved
    pub resolved_version: Option<String>,

    /// Install directory reported on completion
    pub install_path: Option<PathBuf>,

    /// Browser executable inside the install directory
    pub executable_path: Option<PathBuf>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last admitted to a worker
    pub started_at: Option<DateTime<Utc>>,

    /// When the task last changed
    pub updated_at: DateTime<Utc>,
}

impl DownloadTask {
    pub(crate) fn new(id: TaskId, target: Target) -> Self {
        let now = Utc::now();
        Self {
            id,
            target,
            status: Status::Pending,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            eta_seconds: None,
            error_message: None,
            retry_count: 0,
            resolved_version: None,
            install_path: None,
            executable_path: None,
            created_at: now,
            started_at: None,
            updated_at: now,
        }
    }
}

/// Install metadata handed to the installation store after a successful download
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BrowserRecord {
    /// Record identifier (uuid v4)
    pub id: String,
    /// Browser product
    pub kind: BrowserKind,
    /// Installed version (resolved build id when known)
    pub version: String,
    /// Platform the binary was built for
    pub platform: String,
    /// Install directory
    pub install_path: PathBuf,
    /// Browser executable
    pub executable_path: PathBuf,
    /// When the download finished
    pub download_date: DateTime<Utc>,
    /// Size of the download in bytes
    pub file_size: u64,
    /// Whether an instance is currently running
    pub is_running: bool,
}

/// Kind of registry mutation an event describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Task was created
    Created,
    /// Task state changed
    Updated,
    /// Task was removed from the registry
    Removed,
}

/// Event published on every registry mutation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    /// Task the event belongs to
    pub task_id: TaskId,
    /// What happened
    pub change: ChangeKind,
    /// Status after the mutation
    pub status: Status,
    /// Retry count after the mutation
    pub retry_count: u32,
    /// Progress fraction, present while downloading or completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Downloaded bytes, present while downloading or completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_bytes: Option<u64>,
    /// Total bytes, present while downloading or completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Remaining time estimate in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    /// Error text while failed or retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Install path once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
}

impl TaskEvent {
    /// Build an event from the task state after a mutation
    pub fn from_task(task: &DownloadTask, change: ChangeKind) -> Self {
        let with_progress = matches!(task.status, Status::Downloading | Status::Completed);
        Self {
            task_id: task.id,
            change,
            status: task.status,
            retry_count: task.retry_count,
            progress: with_progress.then_some(task.progress),
            downloaded_bytes: with_progress.then_some(task.downloaded_bytes),
            total_bytes: with_progress.then_some(task.total_bytes),
            estimated_time_remaining: task.eta_seconds,
            error_message: task.error_message.clone(),
            install_path: task.install_path.clone(),
        }
    }
}

/// Host platform description
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SystemInfo {
    /// Platform identifier the worker expects (e.g. "linux64")
    pub platform: String,
    /// CPU architecture
    pub arch: String,
    /// Operating system family
    pub os: String,
}
