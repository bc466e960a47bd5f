//! # browser-dl
//!
//! Orchestration core for downloading and installing browser binaries
//! (Chrome, Chromium, Firefox, ChromeDriver) through an external Node.js
//! worker process.
//!
//! ## Design Philosophy
//!
//! browser-dl is designed to be:
//! - **Library-first** - No CLI or UI; embed it, or expose it with the bundled REST API
//! - **Event-driven** - Consumers subscribe to task changes, no polling required
//! - **Process-safe** - Every worker is owned by a supervisor that reaps it on
//!   completion, cancellation, timeout and shutdown
//!
//! The worker scripts speak a line protocol on stdout (`PROGRESS:{json}`,
//! `COMPLETED:<path>`, `ERROR:<message>`, ...). The downloader admits at most
//! `max_concurrent_downloads` workers at a time, retries transient failures
//! with exponential backoff, and hands finished installs to an
//! [`InstallationStore`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use browser_dl::{BrowserDownloader, BrowserKind, Config, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = BrowserDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to task changes
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("task {} is {}", event.task_id, event.status);
//!         }
//!     });
//!
//!     downloader
//!         .start(Target::new(BrowserKind::Chrome, "stable", "linux64"))
//!         .await?;
//!
//!     browser_dl::run_with_shutdown(downloader).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Task change broadcasting
pub mod events;
/// Installation records and stores
pub mod install;
/// Launching installed browsers
pub mod launch;
/// Host platform detection and executable discovery
pub mod platform;
/// Worker line protocol
pub mod protocol;
/// Task registry
pub mod registry;
/// Retry logic with exponential backoff and circuit breaking
pub mod retry;
/// Core types and events
pub mod types;
/// Worker process launching and supervision
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use downloader::BrowserDownloader;
pub use error::{ApiError, DownloadError, Error, ErrorDetail, Result, ToHttpStatus};
pub use install::{InstallationStore, MemoryInstallationStore};
pub use retry::CircuitState;
pub use types::{
    BrowserKind, BrowserRecord, ChangeKind, DownloadTask, Status, SystemInfo, Target, TaskEvent,
    TaskId,
};
pub use worker::{NodeWorkerLauncher, WorkerLauncher};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's
/// `shutdown()` method, which terminates every live worker before returning.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use browser_dl::{BrowserDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = BrowserDownloader::new(Config::default()).await?;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: BrowserDownloader) -> Result<()> {
    shutdown_after(downloader, wait_for_signal()).await
}

async fn shutdown_after(
    downloader: BrowserDownloader,
    signal: impl std::future::Future<Output = ()>,
) -> Result<()> {
    signal.await;
    downloader.shutdown().await
}

/// Resolves on the first SIGTERM or SIGINT
///
/// Signals that cannot be registered are skipped; with none registered the
/// wait falls back to `ctrl_c`.
#[cfg(unix)]
async fn wait_for_signal() {
    use futures::future::{FutureExt, select_all};
    use tokio::signal::unix::{SignalKind, signal};

    let mut waits = Vec::new();
    for (kind, name) in [
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::interrupt(), "SIGINT"),
    ] {
        match signal(kind) {
            Ok(mut stream) => waits.push(
                async move {
                    stream.recv().await;
                    name
                }
                .boxed(),
            ),
            Err(e) => tracing::warn!(signal = name, error = %e, "could not register signal handler"),
        }
    }

    if waits.is_empty() {
        tracing::error!("no signal handler registered, waiting for ctrl_c");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl_c");
        }
        return;
    }

    let (name, _, _) = select_all(waits).await;
    tracing::info!(signal = name, "shutdown signal received");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "failed to listen for ctrl_c"),
    }
}
