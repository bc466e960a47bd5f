//! Supervision of one install worker process
//!
//! A [`Supervisor`] owns exactly one child process for one task attempt. It
//! streams stdout through the line protocol into the registry, drains stderr,
//! enforces the process deadline and honours cancellation. The terminal
//! outcome is returned to the caller rather than applied, so the caller can
//! release the concurrency slot before observers see the task settle.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{WorkerLauncher, WorkerOperation, WorkerRequest};
use crate::config::WorkerConfig;
use crate::error::DownloadError;
use crate::protocol::{LineDecoder, WorkerEvent, parse_line};
use crate::registry::{TaskRegistry, TaskUpdate};
use crate::types::{Target, TaskId};

const READ_CHUNK_BYTES: usize = 8 * 1024;
const STDERR_COLLECT_TIMEOUT: Duration = Duration::from_secs(2);

/// How one worker attempt ended
#[derive(Clone, Debug, PartialEq)]
pub enum SupervisorOutcome {
    /// Worker reported success or exited cleanly
    Completed {
        /// Install directory from the `COMPLETED` line
        install_path: Option<PathBuf>,
    },
    /// Worker failed
    Failed(DownloadError),
    /// Task was removed or the orchestrator is shutting down
    Cancelled,
}

#[derive(Clone, Copy, Debug)]
enum Interrupt {
    Cancelled,
    TimedOut,
}

/// Terminal line seen on stdout
#[derive(Debug, Default)]
enum Terminal {
    #[default]
    None,
    Completed(Option<PathBuf>),
    Error(String),
}

/// Runs one attempt of one task
pub struct Supervisor {
    /// Task being installed
    pub id: TaskId,
    /// What to install
    pub target: Target,
    /// Registry receiving progress
    pub registry: Arc<TaskRegistry>,
    /// Builds the worker command
    pub launcher: Arc<dyn WorkerLauncher>,
    /// Timeouts and decoder limits
    pub worker: WorkerConfig,
    /// Task cancellation
    pub cancel: CancellationToken,
}

impl Supervisor {
    /// Admit the task, run the worker to completion and classify the result
    pub async fn run(self) -> SupervisorOutcome {
        if let Err(e) = self.registry.apply(self.id, TaskUpdate::Admitted).await {
            tracing::debug!(task_id = %self.id, error = %e, "task no longer admissible");
            return SupervisorOutcome::Cancelled;
        }
        if self.cancel.is_cancelled() {
            return SupervisorOutcome::Cancelled;
        }

        let request = WorkerRequest::for_target(WorkerOperation::Install, &self.target);
        let mut command = match self.launcher.command(&request) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!(task_id = %self.id, error = %e, "failed to build worker command");
                return SupervisorOutcome::Failed(DownloadError::SpawnFailed(e.to_string()));
            }
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    task_id = %self.id,
                    launcher = self.launcher.name(),
                    error = %e,
                    "failed to spawn worker"
                );
                return SupervisorOutcome::Failed(DownloadError::SpawnFailed(e.to_string()));
            }
        };
        tracing::info!(
            task_id = %self.id,
            browser = %self.target,
            pid = child.id(),
            "worker started"
        );

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(self.id, stderr)));
        let Some(mut stdout) = child.stdout.take() else {
            terminate(&mut child, self.worker.termination_grace).await;
            abort_stderr(stderr_task);
            return SupervisorOutcome::Failed(DownloadError::SpawnFailed(
                "worker stdout was not captured".into(),
            ));
        };

        let grace = self.worker.termination_grace;
        let deadline = tokio::time::sleep(self.worker.process_timeout);
        tokio::pin!(deadline);
        // Armed once the child has exited; bounds reads from a stdout that a
        // leftover grandchild still holds open.
        let drain = tokio::time::sleep(grace);
        tokio::pin!(drain);

        let mut decoder = LineDecoder::new(self.worker.max_line_bytes);
        let mut terminal = Terminal::None;
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        let mut exit: Option<std::io::Result<ExitStatus>> = None;

        let mut interrupt = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Some(Interrupt::Cancelled),
                _ = &mut deadline => break Some(Interrupt::TimedOut),
                status = child.wait(), if exit.is_none() => {
                    exit = Some(status);
                    drain.as_mut().reset(tokio::time::Instant::now() + grace);
                }
                _ = &mut drain, if exit.is_some() => {
                    tracing::warn!(task_id = %self.id, "worker exited but its stdout stayed open");
                    break None;
                }
                read = stdout.read(&mut buf) => match read {
                    Ok(0) => {
                        decoder.finish();
                        break None;
                    }
                    Ok(n) => {
                        for line in decoder.push(&buf[..n]) {
                            self.handle_line(&line, &mut terminal).await;
                        }
                        if terminal.is_set() {
                            break None;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(task_id = %self.id, error = %e, "failed to read worker stdout");
                        break None;
                    }
                },
            }
        };

        if interrupt.is_none() && exit.is_none() {
            if terminal.is_set() {
                // The result is already known; the worker only gets the grace
                // period to exit on its own.
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => interrupt = Some(Interrupt::Cancelled),
                    status = child.wait() => exit = Some(status),
                    _ = tokio::time::sleep(grace) => {
                        tracing::warn!(
                            task_id = %self.id,
                            grace_ms = grace.as_millis() as u64,
                            "worker still running after its terminal line, terminating"
                        );
                        terminate(&mut child, grace).await;
                    }
                }
            } else {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => interrupt = Some(Interrupt::Cancelled),
                    _ = &mut deadline => interrupt = Some(Interrupt::TimedOut),
                    status = child.wait() => exit = Some(status),
                }
            }
        }

        if let Some(interrupt) = interrupt {
            terminate(&mut child, self.worker.termination_grace).await;
            abort_stderr(stderr_task);
            return match interrupt {
                Interrupt::Cancelled => {
                    tracing::info!(task_id = %self.id, "worker cancelled");
                    SupervisorOutcome::Cancelled
                }
                Interrupt::TimedOut => {
                    let secs = self.worker.process_timeout.as_secs();
                    tracing::error!(task_id = %self.id, timeout_secs = secs, "worker timed out");
                    SupervisorOutcome::Failed(DownloadError::TimedOut { secs })
                }
            };
        }

        let stderr_tail = collect_stderr(stderr_task).await;
        let status = match exit {
            Some(Ok(status)) => Some(status),
            Some(Err(e)) => {
                tracing::error!(task_id = %self.id, error = %e, "failed to wait for worker");
                if !terminal.is_set() {
                    return SupervisorOutcome::Failed(DownloadError::Unknown(e.to_string()));
                }
                None
            }
            None => None,
        };

        self.classify(terminal, status, stderr_tail)
    }

    async fn handle_line(&self, line: &str, terminal: &mut Terminal) {
        let event = match parse_line(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(task_id = %self.id, error = %e, "ignoring malformed worker output");
                return;
            }
        };
        tracing::debug!(task_id = %self.id, ?event, "worker event");

        if !matches!(terminal, Terminal::None) {
            tracing::debug!(task_id = %self.id, "output after terminal line ignored");
            return;
        }

        let update = match event {
            WorkerEvent::Progress(progress) => TaskUpdate::Progress(progress),
            WorkerEvent::VersionResolved(version) => TaskUpdate::VersionResolved(version),
            WorkerEvent::Executable(path) => TaskUpdate::ExecutableResolved(path),
            WorkerEvent::Completed { install_path } => {
                *terminal = Terminal::Completed(install_path);
                return;
            }
            WorkerEvent::Error(message) => {
                *terminal = Terminal::Error(message);
                return;
            }
            WorkerEvent::Info(message) => {
                tracing::info!(task_id = %self.id, "{message}");
                return;
            }
            WorkerEvent::Debug(message) => {
                tracing::debug!(task_id = %self.id, "{message}");
                return;
            }
            WorkerEvent::Success(message) => {
                tracing::debug!(task_id = %self.id, %message, "worker reported success");
                return;
            }
            WorkerEvent::Unknown { prefix, payload } => {
                tracing::warn!(task_id = %self.id, %prefix, %payload, "unknown worker line prefix");
                return;
            }
        };

        if let Err(e) = self.registry.apply(self.id, update).await {
            tracing::debug!(task_id = %self.id, error = %e, "worker update not applied");
        }
    }

    fn classify(
        &self,
        terminal: Terminal,
        status: Option<ExitStatus>,
        stderr_tail: Option<String>,
    ) -> SupervisorOutcome {
        match (terminal, status) {
            (Terminal::Completed(install_path), status) => {
                if let Some(status) = status
                    && !status.success()
                {
                    tracing::warn!(
                        task_id = %self.id,
                        code = status.code(),
                        "worker exited nonzero after reporting completion"
                    );
                }
                tracing::info!(task_id = %self.id, ?install_path, "worker completed");
                SupervisorOutcome::Completed { install_path }
            }
            (Terminal::Error(message), _) => {
                let error = DownloadError::from_message(&message);
                tracing::error!(task_id = %self.id, error = %message, "worker reported error");
                SupervisorOutcome::Failed(error)
            }
            (Terminal::None, Some(status)) if status.success() => {
                tracing::info!(task_id = %self.id, "worker exited cleanly without completion line");
                SupervisorOutcome::Completed { install_path: None }
            }
            (Terminal::None, Some(status)) => {
                let error = DownloadError::ProcessExit {
                    code: status.code(),
                    detail: stderr_tail,
                };
                tracing::error!(task_id = %self.id, error = %error, "worker failed");
                SupervisorOutcome::Failed(error)
            }
            (Terminal::None, None) => SupervisorOutcome::Failed(DownloadError::Unknown(
                "worker exit status unavailable".into(),
            )),
        }
    }
}

impl Terminal {
    fn is_set(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Log every stderr line and return the last non-empty one
async fn drain_stderr(id: TaskId, stderr: ChildStderr) -> Option<String> {
    let mut reader = BufReader::new(stderr);
    let mut raw = Vec::new();
    let mut last = None;
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if !line.is_empty() {
                    tracing::warn!(task_id = %id, stderr = %line, "worker stderr");
                    last = Some(line.to_string());
                }
            }
            Err(e) => {
                tracing::debug!(task_id = %id, error = %e, "stderr read failed");
                break;
            }
        }
    }
    last
}

async fn collect_stderr(handle: Option<JoinHandle<Option<String>>>) -> Option<String> {
    let mut handle = handle?;
    match tokio::time::timeout(STDERR_COLLECT_TIMEOUT, &mut handle).await {
        Ok(Ok(last)) => last,
        Ok(Err(_)) => None,
        Err(_) => {
            handle.abort();
            None
        }
    }
}

fn abort_stderr(handle: Option<JoinHandle<Option<String>>>) {
    if let Some(handle) = handle {
        handle.abort();
    }
}

/// Ask the child to exit, then kill it after `grace`
///
/// Always reaps the child before returning.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        if let Ok(pid) = libc::pid_t::try_from(pid) {
            // SAFETY: kill(2) with a pid we spawned and have not reaped yet
            let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
            if rc == 0 {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::debug!(pid, ?status, "worker exited after SIGTERM");
                        return;
                    }
                    Ok(Err(e)) => tracing::debug!(pid, error = %e, "wait after SIGTERM failed"),
                    Err(_) => tracing::warn!(
                        pid,
                        grace_secs = grace.as_secs(),
                        "worker ignored SIGTERM, killing"
                    ),
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "kill failed, worker already exited");
    }
}
