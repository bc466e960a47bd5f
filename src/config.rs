//! Configuration types for browser-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Download scheduling configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Maximum concurrent worker processes (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Capacity of the task event broadcast channel (default: 1000)
    ///
    /// Subscribers that fall further behind than this receive a lag notice
    /// and should re-read the task list.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// External worker process configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkerConfig {
    /// Path to the node executable (auto-detected if None)
    #[serde(default)]
    pub node_path: Option<PathBuf>,

    /// Directory containing the worker scripts (auto-detected if None)
    #[serde(default)]
    pub scripts_dir: Option<PathBuf>,

    /// Whether to search PATH for node if `node_path` is not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Time a worker gets to exit after SIGTERM before it is killed (default: 5 seconds)
    #[serde(default = "default_termination_grace", with = "duration_serde")]
    pub termination_grace: Duration,

    /// Upper bound on a single install attempt (default: 600 seconds)
    #[serde(default = "default_process_timeout", with = "duration_serde")]
    pub process_timeout: Duration,

    /// Upper bound on one-shot commands such as listing versions (default: 60 seconds)
    #[serde(default = "default_command_timeout", with = "duration_serde")]
    pub command_timeout: Duration,

    /// Longest stdout line accepted from a worker (default: 64 KiB)
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            node_path: None,
            scripts_dir: None,
            search_path: true,
            termination_grace: default_termination_grace(),
            process_timeout: default_process_timeout(),
            command_timeout: default_command_timeout(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// Retry configuration for failed downloads
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Automatic retries before a task stays failed (default: 3)
    #[serde(default = "default_max_auto_retries")]
    pub max_auto_retries: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Global circuit breaker that suspends automatic retries
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_auto_retries: default_max_auto_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Circuit breaker thresholds
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker (default: 10)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successes in half-open state that close it again (default: 5)
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// How long the breaker stays open (default: 60 seconds)
    #[serde(default = "default_open_duration", with = "duration_serde")]
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_duration: default_open_duration(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for [`BrowserDownloader`](crate::BrowserDownloader)
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Scheduling settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Worker process settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Retry and backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> Error {
            Error::Config {
                message: message.to_string(),
                key: Some(key.to_string()),
            }
        }

        if self.download.max_concurrent_downloads == 0 {
            return Err(invalid(
                "download.max_concurrent_downloads",
                "must be at least 1",
            ));
        }
        if self.download.event_buffer == 0 {
            return Err(invalid("download.event_buffer", "must be at least 1"));
        }
        if self.worker.max_line_bytes == 0 {
            return Err(invalid("worker.max_line_bytes", "must be at least 1"));
        }
        let retry = &self.retry;
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                "must be a finite number >= 1.0",
            ));
        }
        if retry.initial_delay > retry.max_delay {
            return Err(invalid(
                "retry.initial_delay",
                "must not exceed retry.max_delay",
            ));
        }
        if retry.circuit_breaker.failure_threshold == 0
            || retry.circuit_breaker.success_threshold == 0
        {
            return Err(invalid(
                "retry.circuit_breaker",
                "thresholds must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_event_buffer() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_termination_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_process_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_line_bytes() -> usize {
    64 * 1024
}

fn default_max_auto_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_success_threshold() -> u32 {
    5
}

fn default_open_duration() -> Duration {
    Duration::from_secs(60)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.download.max_concurrent_downloads, 3);
        assert_eq!(config.retry.max_auto_retries, 3);
        assert_eq!(config.worker.process_timeout, Duration::from_secs(600));
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.download.event_buffer, 1000);
        assert!(config.worker.search_path);
        assert_eq!(config.retry.circuit_breaker.failure_threshold, 10);
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let json = r#"{"retry":{"max_auto_retries":1,"jitter":false},"worker":{"node_path":"/usr/bin/node"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.retry.max_auto_retries, 1);
        assert!(!config.retry.jitter);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(
            config.worker.node_path,
            Some(PathBuf::from("/usr/bin/node"))
        );
    }

    #[test]
    fn duration_serde_serializes_as_seconds() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            ..RetryConfig::default()
        };

        let json = serde_json::to_value(&config).expect("serialize failed");

        assert_eq!(json["initial_delay"], 5);
        assert_eq!(json["max_delay"], 120);
        assert_eq!(json["circuit_breaker"]["open_duration"], 60);
    }

    #[test]
    fn duration_serde_rejects_negative_integer() {
        let json = r#"{"termination_grace":-1}"#;
        assert!(serde_json::from_str::<WorkerConfig>(json).is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.download.max_concurrent_downloads = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("download.max_concurrent_downloads"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_shrinking_backoff_and_inverted_delays() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.initial_delay = Duration::from_secs(120);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }
}
