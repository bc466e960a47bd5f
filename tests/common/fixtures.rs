//! Worker script fixtures and downloader construction
//!
//! Workers are `sh` scripts stored under the Node.js script names, so the
//! production launcher runs them unchanged.

use browser_dl::config::RetryConfig;
use browser_dl::{
    BrowserDownloader, BrowserKind, Config, MemoryInstallationStore, NodeWorkerLauncher, Target,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Worker that reports a resolved version, progress, and completes
pub const FIREFOX_WORKER: &str = r#"
echo 'INFO:resolving stable'
echo 'VERSION:121.0'
echo 'PROGRESS:{"progress":0.25,"downloaded_bytes":20000000,"total_bytes":80000000}'
echo 'PROGRESS:{"progress":0.75,"downloaded_bytes":60000000,"total_bytes":80000000}'
echo 'EXECUTABLE:/opt/browsers/firefox-121/firefox'
echo 'COMPLETED:/opt/browsers/firefox-121'
"#;

/// Worker that blocks until killed
pub const HANGING_WORKER: &str = "echo 'INFO:waiting'\nexec sleep 30\n";

/// Worker that always fails with an unsupported-platform error
pub const UNSUPPORTED_PLATFORM_WORKER: &str = "echo 'ERROR:Platform not supported'\nexit 1\n";

/// A downloader over a scratch scripts directory
pub struct Harness {
    pub downloader: BrowserDownloader,
    pub store: Arc<MemoryInstallationStore>,
    pub scripts: TempDir,
}

impl Harness {
    /// Replace one worker script
    pub fn script(&self, name: &str, body: &str) {
        write_script(self.scripts.path(), name, body);
    }

    /// Scratch file path next to the scripts
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.scripts.path().join(name)
    }
}

pub fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

/// Config tuned for fast tests
pub fn fast_config(max_concurrent: usize) -> Config {
    let mut config = Config::default();
    config.download.max_concurrent_downloads = max_concurrent;
    config.worker.termination_grace = Duration::from_millis(500);
    config.worker.process_timeout = Duration::from_secs(20);
    config.worker.command_timeout = Duration::from_secs(5);
    config.retry = RetryConfig {
        max_auto_retries: 1,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(50),
        jitter: false,
        ..RetryConfig::default()
    };
    config
}

/// Build a downloader whose install worker runs `worker`
pub async fn harness(config: Config, worker: &str) -> Harness {
    let scripts = tempfile::tempdir().unwrap();
    write_script(scripts.path(), "download-browser.js", worker);

    let store = Arc::new(MemoryInstallationStore::new());
    let launcher = Arc::new(NodeWorkerLauncher::new("sh", scripts.path()));
    let downloader = BrowserDownloader::with_components(config, launcher, store.clone())
        .await
        .unwrap();

    Harness {
        downloader,
        store,
        scripts,
    }
}

pub fn firefox() -> Target {
    Target::new(BrowserKind::Firefox, "stable", "linux64")
}

pub fn chrome(version: &str) -> Target {
    Target::new(BrowserKind::Chrome, version, "linux64")
}

/// Pids written one per line by workers that run `echo $$ >> file`
pub async fn read_pids(path: &Path, expected: usize) -> Vec<i32> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let pids: Vec<i32> = std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect();
        if pids.len() >= expected {
            return pids;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "only {} of {expected} workers started",
            pids.len()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Whether a process with `pid` still exists
pub fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence
    unsafe { libc::kill(pid, 0) == 0 }
}
