//! Core downloader implementation split into focused submodules.
//!
//! The `BrowserDownloader` struct and its methods are organized by domain:
//! - [`queue`] - FIFO admission queue and concurrency slots
//! - [`queue_processor`] - Admits queued tasks into worker slots
//! - [`tasks`] - Supervised task execution, outcome handling and backoff
//! - [`control`] - Caller-facing operations (start/retry/remove, one-shot commands)
//! - [`lifecycle`] - Shutdown coordination

mod control;
mod lifecycle;
mod queue;
mod queue_processor;
mod tasks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::error::Result;
use crate::events::EventBus;
use crate::install::{InstallationStore, MemoryInstallationStore};
use crate::registry::TaskRegistry;
use crate::retry::{CircuitState, RetryPolicy};
use crate::types::TaskEvent;
use crate::worker::{NodeWorkerLauncher, WorkerCommands, WorkerLauncher};

pub(crate) use queue::AdmissionQueue;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// This is the composition root: it owns the task registry, the admission
/// queue, the retry policy and the installation store, and every spawned
/// worker task is tracked so [`shutdown`](Self::shutdown) can wait for it.
#[derive(Clone)]
pub struct BrowserDownloader {
    /// Authoritative task state
    pub(crate) registry: Arc<TaskRegistry>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Builds worker commands
    pub(crate) launcher: Arc<dyn WorkerLauncher>,
    /// Admission queue and concurrency limit
    pub(crate) queue: Arc<AdmissionQueue>,
    /// Automatic retry decisions and circuit breaker
    pub(crate) retry_policy: Arc<RetryPolicy>,
    /// Receives finished installations
    pub(crate) store: Arc<dyn InstallationStore>,
    /// One-shot worker commands (uninstall, versions, install checks)
    pub(crate) commands: WorkerCommands,
    /// Root of every task's cancellation token
    pub(crate) shutdown_token: CancellationToken,
    /// Tracks the queue processor, supervised workers and backoff timers
    pub(crate) tracker: TaskTracker,
}

impl BrowserDownloader {
    /// Create a downloader that runs the Node.js worker scripts
    ///
    /// The interpreter and scripts directory are resolved from
    /// `config.worker`; finished installs are kept in memory.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use browser_dl::{BrowserDownloader, BrowserKind, Config, Target};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = BrowserDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("{:?}", event);
    ///         }
    ///     });
    ///
    ///     let id = downloader
    ///         .start(Target::new(BrowserKind::Chrome, "stable", "linux64"))
    ///         .await?;
    ///     println!("queued task {id}");
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let launcher = NodeWorkerLauncher::from_config(&config.worker)?;
        Self::with_components(config, Arc::new(launcher), Arc::new(MemoryInstallationStore::new()))
            .await
    }

    /// Create a downloader with an explicit launcher and installation store
    pub async fn with_components(
        config: Config,
        launcher: Arc<dyn WorkerLauncher>,
        store: Arc<dyn InstallationStore>,
    ) -> Result<Self> {
        config.validate()?;

        let shutdown_token = CancellationToken::new();
        let events = EventBus::new(config.download.event_buffer);
        let registry = Arc::new(TaskRegistry::new(events, shutdown_token.clone()));
        let queue = Arc::new(AdmissionQueue::new(config.download.max_concurrent_downloads));
        let retry_policy = Arc::new(RetryPolicy::new(config.retry.clone()));
        let commands = WorkerCommands::new(
            Arc::clone(&launcher),
            config.worker.clone(),
            config.retry.clone(),
        );

        tracing::info!(
            launcher = launcher.name(),
            store = store.name(),
            max_concurrent = config.download.max_concurrent_downloads,
            "browser downloader initialized"
        );

        let downloader = Self {
            registry,
            config: Arc::new(config),
            launcher,
            queue,
            retry_policy,
            store,
            commands,
            shutdown_token,
            tracker: TaskTracker::new(),
        };
        downloader.start_queue_processor();
        Ok(downloader)
    }

    /// Subscribe to task events
    ///
    /// Each subscriber receives every event published after it subscribed.
    /// A subscriber that falls more than `download.event_buffer` events
    /// behind receives `RecvError::Lagged` and should re-read [`list`](Self::list).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TaskEvent> {
        self.registry.events().subscribe()
    }

    /// Subscribe as a stream that skips lag gaps
    pub fn subscribe_stream(&self) -> impl futures::Stream<Item = TaskEvent> + Send + 'static {
        self.registry.events().subscribe_stream()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Current state of the automatic-retry circuit breaker
    pub fn circuit_state(&self) -> CircuitState {
        self.retry_policy.circuit_state()
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = Arc::new(self.clone());
        let config = Arc::clone(&self.config);
        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
