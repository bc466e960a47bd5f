//! Shared test helpers for creating BrowserDownloader instances in tests.
//!
//! Workers are shell scripts run by `sh` under the names the Node.js scripts
//! use, so the real launcher and supervisor code paths are exercised.

use crate::config::{CircuitBreakerConfig, Config, RetryConfig, WorkerConfig};
use crate::downloader::BrowserDownloader;
use crate::install::MemoryInstallationStore;
use crate::types::{BrowserKind, DownloadTask, Status, Target, TaskId};
use crate::worker::NodeWorkerLauncher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Worker that reports progress and completes
pub(crate) const COMPLETING_WORKER: &str = r#"
echo 'INFO:starting download'
echo 'VERSION:120.0.6099.109'
echo 'PROGRESS:{"progress":0.5,"downloaded_bytes":512,"total_bytes":1024}'
echo 'EXECUTABLE:/opt/browsers/chrome-120/chrome'
echo 'COMPLETED:/opt/browsers/chrome-120'
"#;

/// Worker that never finishes on its own
pub(crate) const HANGING_WORKER: &str = "echo 'INFO:waiting'\nexec sleep 30\n";

/// Test downloader plus the pieces tests inspect
pub(crate) struct TestDownloader {
    pub(crate) downloader: BrowserDownloader,
    pub(crate) store: Arc<MemoryInstallationStore>,
    pub(crate) scripts: tempfile::TempDir,
}

impl TestDownloader {
    /// Replace the install worker script
    pub(crate) fn set_worker(&self, body: &str) {
        write_script(self.scripts.path(), "download-browser.js", body);
    }

    /// Path inside the scripts directory, for spawn counters and markers
    pub(crate) fn scratch(&self, name: &str) -> std::path::PathBuf {
        self.scripts.path().join(name)
    }
}

pub(crate) fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

/// Config with short timeouts and no backoff jitter
pub(crate) fn test_config(max_concurrent: usize) -> Config {
    let mut config = Config::default();
    config.download.max_concurrent_downloads = max_concurrent;
    config.worker = WorkerConfig {
        termination_grace: Duration::from_millis(500),
        process_timeout: Duration::from_secs(20),
        command_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    };
    config.retry = RetryConfig {
        max_auto_retries: 2,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        jitter: false,
        circuit_breaker: CircuitBreakerConfig::default(),
    };
    config
}

/// Create a downloader whose install worker runs `worker`
pub(crate) async fn create_test_downloader(config: Config, worker: &str) -> TestDownloader {
    let scripts = tempdir().unwrap();
    write_script(scripts.path(), "download-browser.js", worker);

    let store = Arc::new(MemoryInstallationStore::new());
    let launcher = Arc::new(NodeWorkerLauncher::new("sh", scripts.path()));
    let downloader = BrowserDownloader::with_components(config, launcher, store.clone())
        .await
        .unwrap();

    TestDownloader {
        downloader,
        store,
        scripts,
    }
}

pub(crate) fn chrome() -> Target {
    Target::new(BrowserKind::Chrome, "120", "linux64")
}

/// Poll until the task satisfies `done`
pub(crate) async fn wait_until(
    downloader: &BrowserDownloader,
    id: TaskId,
    what: &str,
    done: impl Fn(&DownloadTask) -> bool,
) -> DownloadTask {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = downloader.get(id).await.unwrap();
        if done(&task) {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} stuck in {} (retry_count {}) waiting for {what}",
            task.status,
            task.retry_count
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until the task reaches `status`
pub(crate) async fn wait_for_status(
    downloader: &BrowserDownloader,
    id: TaskId,
    status: Status,
) -> DownloadTask {
    wait_until(downloader, id, status.as_str(), |task| task.status == status).await
}

/// Whether a process with `pid` still exists
#[cfg(unix)]
pub(crate) fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Read a pid written by a worker script, waiting for the file to appear
pub(crate) async fn read_pid(path: &Path) -> i32 {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(text) = std::fs::read_to_string(path)
            && let Ok(pid) = text.trim().parse()
        {
            return pid;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker never wrote {}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Number of lines in a spawn-counter file (0 if missing)
pub(crate) fn spawn_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
