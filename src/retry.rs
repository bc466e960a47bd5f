//! Retry logic with exponential backoff
//!
//! This module decides what happens after a worker fails. [`RetryPolicy`]
//! combines a per-task attempt budget, exponential backoff with optional
//! jitter, and a global [`CircuitBreaker`] that suspends automatic retries
//! when failures pile up across all tasks.
//!
//! [`run_with_retry`] is the generic loop used for one-shot worker commands.
//!
//! # Example
//!
//! ```no_run
//! use browser_dl::retry::{IsRetryable, run_with_retry};
//! use browser_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! run_with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{CircuitBreakerConfig, RetryConfig};
use crate::error::{DownloadError, Error};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            // The worker never ran; retrying spawns the same broken command
            DownloadError::SpawnFailed(_) => false,

            // Unsupported or unresolvable target
            DownloadError::InvalidBrowserType
            | DownloadError::InvalidVersion
            | DownloadError::InvalidPlatform
            | DownloadError::DownloadUrlNotFound
            | DownloadError::RedirectLoop => false,
            DownloadError::HttpClient(code) => *code == 429 || *code == 408,

            DownloadError::NetworkTimeout
            | DownloadError::NetworkUnreachable
            | DownloadError::ConnectionRefused
            | DownloadError::SlowConnection
            | DownloadError::HttpServer(_)
            | DownloadError::TimedOut { .. } => true,

            DownloadError::InsufficientSpace
            | DownloadError::PermissionDenied
            | DownloadError::CorruptedDownload
            | DownloadError::Filesystem(_) => true,

            DownloadError::ResourceExhausted
            | DownloadError::ProcessExit { .. }
            | DownloadError::Unknown(_) => true,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Download(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::BrokenPipe
            ),
            Error::Config { .. }
            | Error::NotFound(_)
            | Error::InvalidState { .. }
            | Error::AlreadyActive(_)
            | Error::InstallationNotFound(_)
            | Error::AlreadyRunning(_)
            | Error::ExecutableMissing(_)
            | Error::InvalidTarget(_)
            | Error::ShuttingDown
            | Error::ExternalTool(_)
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs once plus up to `config.max_auto_retries` retries.
/// Returns the successful result or the last error.
pub async fn run_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_auto_retries => {
                let delay = backoff_delay(config, attempt);
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_auto_retries,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Delay before the retry that follows `retry_count` earlier retries
///
/// `min(initial_delay * backoff_multiplier^retry_count, max_delay)`, then
/// jittered when enabled.
pub fn backoff_delay(config: &RetryConfig, retry_count: u32) -> Duration {
    let exp = config
        .backoff_multiplier
        .powi(retry_count.min(i32::MAX as u32) as i32);
    let secs = config.initial_delay.as_secs_f64() * exp;
    let capped = if secs.is_finite() {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(config.max_delay)
            .min(config.max_delay)
    } else {
        config.max_delay
    };

    if config.jitter {
        add_jitter(capped)
    } else {
        capped
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    delay.mul_f64(1.0 + jitter_factor)
}

/// Observable circuit breaker state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Retries allowed
    Closed,
    /// Retries suspended
    Open,
    /// Probing: retries allowed, one failure re-opens
    HalfOpen,
}

#[derive(Debug)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

/// Global gate that suspends automatic retries after repeated failures
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: BreakerState,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed {
                consecutive_failures: 0,
            },
        }
    }

    /// Whether a retry may proceed; moves Open to HalfOpen once the open period has elapsed
    pub fn allow(&mut self) -> bool {
        if let BreakerState::Open { since } = self.state {
            if since.elapsed() < self.config.open_duration {
                return false;
            }
            tracing::info!("Circuit breaker half-open, probing with retries");
            self.state = BreakerState::HalfOpen { successes: 0 };
        }
        true
    }

    /// Record a failed download
    pub fn record_failure(&mut self) {
        match &mut self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = *consecutive_failures,
                        open_secs = self.config.open_duration.as_secs(),
                        "Circuit breaker opened, suspending automatic retries"
                    );
                    self.state = BreakerState::Open {
                        since: Instant::now(),
                    };
                }
            }
            BreakerState::HalfOpen { .. } => {
                tracing::warn!("Failure while half-open, circuit breaker re-opened");
                self.state = BreakerState::Open {
                    since: Instant::now(),
                };
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Record a successful download
    pub fn record_success(&mut self) {
        match &mut self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => *consecutive_failures = 0,
            BreakerState::HalfOpen { successes } => {
                *successes += 1;
                if *successes >= self.config.success_threshold {
                    tracing::info!("Circuit breaker closed");
                    self.state = BreakerState::Closed {
                        consecutive_failures: 0,
                    };
                }
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        match self.state {
            BreakerState::Closed { .. } => CircuitState::Closed,
            BreakerState::Open { .. } => CircuitState::Open,
            BreakerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Why no automatic retry will happen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GiveUpReason {
    /// Failure class is fatal
    NotRetryable,
    /// Task used up its automatic retries
    AttemptsExhausted,
    /// Global circuit breaker is open
    CircuitOpen,
}

/// Outcome of [`RetryPolicy::decide`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue after `delay`; this will be retry number `attempt`
    Retry {
        /// 1-based retry number
        attempt: u32,
        /// Backoff before re-queueing
        delay: Duration,
    },
    /// Leave the task failed
    GiveUp(GiveUpReason),
}

/// Per-task attempt budget plus global circuit breaker
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    breaker: Mutex<CircuitBreaker>,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn new(config: RetryConfig) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        Self {
            config,
            breaker: Mutex::new(breaker),
        }
    }

    /// Decide whether a task that failed with `error` after `retry_count` retries should retry
    pub fn decide(&self, retry_count: u32, error: &DownloadError) -> RetryDecision {
        let breaker_allows = self.with_breaker(|breaker| {
            breaker.record_failure();
            breaker.allow()
        });

        if !error.is_retryable() {
            return RetryDecision::GiveUp(GiveUpReason::NotRetryable);
        }
        if retry_count >= self.config.max_auto_retries {
            return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted);
        }
        if !breaker_allows {
            return RetryDecision::GiveUp(GiveUpReason::CircuitOpen);
        }

        RetryDecision::Retry {
            attempt: retry_count + 1,
            delay: backoff_delay(&self.config, retry_count),
        }
    }

    /// Record a successful download
    pub fn record_success(&self) {
        self.with_breaker(|breaker| breaker.record_success());
    }

    /// Current circuit breaker state
    pub fn circuit_state(&self) -> CircuitState {
        self.with_breaker(|breaker| breaker.state())
    }

    fn with_breaker<R>(&self, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut guard = self
            .breaker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Retry configuration in effect
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
