//! One-shot worker commands
//!
//! Uninstall, version listing and installation checks run a worker script to
//! completion under `worker.command_timeout` and read its whole output. They
//! do not go through the task registry.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{WorkerLauncher, WorkerOperation, WorkerRequest};
use crate::config::{RetryConfig, WorkerConfig};
use crate::error::{DownloadError, Error, Result};
use crate::protocol::{WorkerEvent, parse_line};
use crate::retry::run_with_retry;
use crate::types::{BrowserKind, Target};

#[derive(Debug)]
struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// Message of the first `ERROR:` line on stdout
    fn reported_error(&self) -> Option<String> {
        self.stdout.lines().find_map(|line| match parse_line(line) {
            Ok(WorkerEvent::Error(message)) => Some(message),
            _ => None,
        })
    }

    fn last_stderr_line(&self) -> Option<String> {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }

    /// Error for a failed run, `None` when the run succeeded
    fn failure(&self) -> Option<Error> {
        if let Some(message) = self.reported_error() {
            return Some(DownloadError::from_message(&message).into());
        }
        if self.status.success() {
            return None;
        }
        Some(
            DownloadError::ProcessExit {
                code: self.status.code(),
                detail: self.last_stderr_line(),
            }
            .into(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct InstallationStatus {
    installed: bool,
}

/// Runs one-shot worker scripts
#[derive(Clone)]
pub struct WorkerCommands {
    launcher: Arc<dyn WorkerLauncher>,
    worker: WorkerConfig,
    retry: RetryConfig,
}

impl WorkerCommands {
    /// Create a command runner
    pub fn new(launcher: Arc<dyn WorkerLauncher>, worker: WorkerConfig, retry: RetryConfig) -> Self {
        Self {
            launcher,
            worker,
            retry,
        }
    }

    async fn output(&self, request: &WorkerRequest) -> Result<CommandOutput> {
        let mut command = self.launcher.command(request)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            operation = ?request.operation,
            browser = %request.kind,
            launcher = self.launcher.name(),
            "running worker command"
        );

        let output = tokio::time::timeout(self.worker.command_timeout, command.output())
            .await
            .map_err(|_| DownloadError::TimedOut {
                secs: self.worker.command_timeout.as_secs(),
            })?
            .map_err(|e| DownloadError::SpawnFailed(e.to_string()))?;

        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Remove an installed browser
    ///
    /// An `ERROR:` line fails the command; otherwise the exit status decides.
    pub async fn uninstall(&self, target: &Target) -> Result<()> {
        let request = WorkerRequest::for_target(WorkerOperation::Uninstall, target);
        let output = self.output(&request).await?;
        if let Some(error) = output.failure() {
            tracing::error!(browser = %target, error = %error, "uninstall failed");
            return Err(error);
        }
        tracing::info!(browser = %target, "browser uninstalled");
        Ok(())
    }

    /// Versions of `kind` available for download
    ///
    /// Transient failures are retried per the retry configuration.
    pub async fn list_versions(&self, kind: BrowserKind) -> Result<Vec<String>> {
        let request = WorkerRequest::list_versions(kind);
        let versions: Vec<String> = run_with_retry(&self.retry, || async {
            let output = self.output(&request).await?;
            if let Some(error) = output.failure() {
                return Err(error);
            }
            parse_json_output(&output.stdout)
        })
        .await?;
        tracing::debug!(browser = %kind, count = versions.len(), "listed versions");
        Ok(versions)
    }

    /// Whether `target` is installed
    pub async fn is_installed(&self, target: &Target) -> Result<bool> {
        let request = WorkerRequest::for_target(WorkerOperation::CheckInstalled, target);
        let output = self.output(&request).await?;
        if let Some(error) = output.failure() {
            return Err(error);
        }
        let status: InstallationStatus = parse_json_output(&output.stdout)?;
        Ok(status.installed)
    }
}

/// Parse a JSON result, accepting log lines printed before it
fn parse_json_output<T: DeserializeOwned>(stdout: &str) -> Result<T> {
    let trimmed = stdout.trim();
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(e) => trimmed
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .and_then(|line| serde_json::from_str(line).ok())
            .ok_or(Error::Serialization(e)),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::worker::NodeWorkerLauncher;
    use std::time::Duration;

    fn commands(dir: &std::path::Path) -> WorkerCommands {
        WorkerCommands::new(
            Arc::new(NodeWorkerLauncher::new("sh", dir)),
            WorkerConfig {
                command_timeout: Duration::from_secs(5),
                ..WorkerConfig::default()
            },
            RetryConfig {
                max_auto_retries: 2,
                initial_delay: Duration::from_millis(10),
                jitter: false,
                ..RetryConfig::default()
            },
        )
    }

    fn script(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn target() -> Target {
        Target::new(BrowserKind::Chrome, "120", "linux64")
    }

    #[tokio::test]
    async fn uninstall_succeeds_on_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "uninstall-browser.js", "echo 'SUCCESS:removed'\n");
        commands(dir.path()).uninstall(&target()).await.unwrap();
    }

    #[tokio::test]
    async fn uninstall_error_line_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "uninstall-browser.js",
            "echo 'ERROR:EACCES: permission denied'\nexit 0\n",
        );
        let err = commands(dir.path()).uninstall(&target()).await.unwrap_err();
        assert!(matches!(err, Error::Download(DownloadError::PermissionDenied)));
    }

    #[tokio::test]
    async fn uninstall_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "uninstall-browser.js",
            "echo 'browser not installed' >&2\nexit 2\n",
        );
        let err = commands(dir.path()).uninstall(&target()).await.unwrap_err();
        match err {
            Error::Download(DownloadError::ProcessExit { code, detail }) => {
                assert_eq!(code, Some(2));
                assert_eq!(detail.as_deref(), Some("browser not installed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_versions_skips_log_lines() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "list-versions.js",
            "echo 'INFO:fetching index'\necho '[\"121.0\",\"120.0\"]'\n",
        );
        let versions = commands(dir.path())
            .list_versions(BrowserKind::Chrome)
            .await
            .unwrap();
        assert_eq!(versions, vec!["121.0", "120.0"]);
    }

    #[tokio::test]
    async fn list_versions_retries_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("attempts");
        script(
            dir.path(),
            "list-versions.js",
            &format!(
                "echo x >> '{path}'\nif [ $(wc -l < '{path}') -lt 2 ]; then echo 'ERROR:network timeout'; exit 1; fi\necho '[\"stable\"]'\n",
                path = counter.display()
            ),
        );
        let versions = commands(dir.path())
            .list_versions(BrowserKind::Firefox)
            .await
            .unwrap();
        assert_eq!(versions, vec!["stable"]);
        let attempts = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(attempts.lines().count(), 2);
    }

    #[tokio::test]
    async fn is_installed_reads_json_flag() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "check-installation.js",
            "echo '{\"installed\": true}'\n",
        );
        assert!(commands(dir.path()).is_installed(&target()).await.unwrap());
    }

    #[tokio::test]
    async fn hung_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "check-installation.js", "exec sleep 30\n");
        let mut commands = commands(dir.path());
        commands.worker.command_timeout = Duration::from_millis(200);
        let err = commands.is_installed(&target()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Download(DownloadError::TimedOut { .. })
        ));
    }

    #[test]
    fn json_parse_failure_is_serialization_error() {
        let err = parse_json_output::<Vec<String>>("not json\nstill not").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
