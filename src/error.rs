//! Error types for browser-dl
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] returned by registry and orchestrator operations
//! - [`DownloadError`], the classified failure of a worker process
//! - HTTP status code mapping and structured error bodies for the REST API

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::TaskId;

/// Result type alias for browser-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for browser-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.max_concurrent_downloads")
        key: Option<String>,
    },

    /// Task id is not in the registry
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// Operation is not valid for the task's current status
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task the operation was attempted on
        id: TaskId,
        /// The operation that was attempted (e.g., "retry", "complete")
        operation: String,
        /// The status that prevents the operation
        current_state: String,
    },

    /// Task is already queued or has a live worker
    #[error("task {0} is already queued or running")]
    AlreadyActive(TaskId),

    /// No installation record with this id
    #[error("installation {0} not found")]
    InstallationNotFound(String),

    /// Installed browser is already running
    #[error("installation {0} is already running")]
    AlreadyRunning(String),

    /// Installation record points at an executable that no longer exists
    #[error("browser executable not found: {}", .0.display())]
    ExecutableMissing(std::path::PathBuf),

    /// Download target is malformed or unsupported
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Worker process failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// External tool missing or misbehaving (node, worker scripts)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Classified failure of a worker process
///
/// Worker `ERROR:` lines carry free text; [`DownloadError::from_message`]
/// maps that text onto these variants so the retry policy can decide whether
/// another attempt makes sense.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// The worker process could not be started
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(String),

    /// Network operation timed out
    #[error("network timeout")]
    NetworkTimeout,

    /// Download host unreachable
    #[error("network unreachable")]
    NetworkUnreachable,

    /// Download host refused the connection
    #[error("connection refused")]
    ConnectionRefused,

    /// Transfer too slow
    #[error("slow connection")]
    SlowConnection,

    /// 5xx response
    #[error("HTTP server error {0}")]
    HttpServer(u16),

    /// 4xx response
    #[error("HTTP client error {0}")]
    HttpClient(u16),

    /// Too many redirects
    #[error("HTTP redirect loop")]
    RedirectLoop,

    /// Disk full
    #[error("insufficient disk space")]
    InsufficientSpace,

    /// Install directory not writable
    #[error("permission denied")]
    PermissionDenied,

    /// Archive failed integrity check
    #[error("corrupted download")]
    CorruptedDownload,

    /// Other filesystem failure
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// Browser kind rejected by the worker
    #[error("invalid browser type")]
    InvalidBrowserType,

    /// Version does not exist or cannot be resolved
    #[error("invalid version")]
    InvalidVersion,

    /// Platform not supported for this browser
    #[error("invalid platform")]
    InvalidPlatform,

    /// No download URL exists for the target
    #[error("download URL not found")]
    DownloadUrlNotFound,

    /// Host ran out of memory or handles
    #[error("system resources exhausted")]
    ResourceExhausted,

    /// Worker exited unsuccessfully without reporting an error line
    #[error("worker exited with {}{}", exit_label(.code), detail_suffix(.detail))]
    ProcessExit {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Last line the worker wrote to stderr
        detail: Option<String>,
    },

    /// Worker exceeded the process deadline
    #[error("worker timed out after {secs}s")]
    TimedOut {
        /// Deadline that was exceeded, in seconds
        secs: u64,
    },

    /// Error text that matched no known category
    #[error("{0}")]
    Unknown(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => format!(": {detail}"),
        _ => String::new(),
    }
}

fn status_code_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"http\s+(\d{3})", r"status\s*:?\s*(\d{3})", r"error\s+(\d{3})"]
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Pull an HTTP status code out of an error message ("HTTP 404", "status: 503")
pub fn extract_http_status(message: &str) -> Option<u16> {
    let lower = message.to_lowercase();
    status_code_patterns().iter().find_map(|re| {
        re.captures(&lower)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .filter(|code| (100..600).contains(code))
    })
}

impl DownloadError {
    /// Classify a worker error message
    ///
    /// Matching is case-insensitive. An embedded HTTP status code takes
    /// precedence over keywords.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if let Some(code) = extract_http_status(message) {
            if code >= 500 {
                return DownloadError::HttpServer(code);
            }
            if code >= 400 {
                return DownloadError::HttpClient(code);
            }
        }

        if has(&["too many redirects", "redirect loop"]) {
            DownloadError::RedirectLoop
        } else if has(&["timeout", "timed out", "etimedout"]) {
            DownloadError::NetworkTimeout
        } else if has(&["network unreachable", "no route to host", "enotfound", "enetunreach"]) {
            DownloadError::NetworkUnreachable
        } else if has(&["connection refused", "econnrefused"]) {
            DownloadError::ConnectionRefused
        } else if has(&["slow", "bandwidth"]) {
            DownloadError::SlowConnection
        } else if has(&["no space", "disk full", "enospc"]) {
            DownloadError::InsufficientSpace
        } else if has(&["permission denied", "access denied", "eacces", "eperm"]) {
            DownloadError::PermissionDenied
        } else if has(&["corrupted", "checksum"]) {
            DownloadError::CorruptedDownload
        } else if has(&["invalid browser", "unsupported browser"]) {
            DownloadError::InvalidBrowserType
        } else if has(&["invalid version", "version not found"]) {
            DownloadError::InvalidVersion
        } else if has(&["platform not supported", "invalid platform", "unsupported platform"]) {
            DownloadError::InvalidPlatform
        } else if has(&["url not found", "download not available"]) {
            DownloadError::DownloadUrlNotFound
        } else if has(&["resource exhausted", "out of memory", "emfile"]) {
            DownloadError::ResourceExhausted
        } else if has(&["enoent", "eisdir", "enotdir", "i/o error"]) {
            DownloadError::Filesystem(message.trim().to_string())
        } else {
            DownloadError::Unknown(message.trim().to_string())
        }
    }

    /// Message stored on the task and shown to the user
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::SpawnFailed(reason) => {
                format!("Could not start the download worker: {reason}")
            }
            DownloadError::NetworkTimeout => {
                "Network connection timed out, check your connection".to_string()
            }
            DownloadError::NetworkUnreachable => {
                "Cannot reach the download server, check your network settings".to_string()
            }
            DownloadError::ConnectionRefused => {
                "The download server refused the connection and may be temporarily unavailable"
                    .to_string()
            }
            DownloadError::SlowConnection => {
                "Network connection is too slow to finish the download".to_string()
            }
            DownloadError::HttpServer(code) => format!("Download server error ({code})"),
            DownloadError::HttpClient(code) => {
                format!("Request error ({code}), check the download link")
            }
            DownloadError::RedirectLoop => "Download link redirected too many times".to_string(),
            DownloadError::InsufficientSpace => {
                "Not enough disk space, free some space and try again".to_string()
            }
            DownloadError::PermissionDenied => {
                "Permission denied writing the install directory; check write access or run with elevated privileges"
                    .to_string()
            }
            DownloadError::CorruptedDownload => {
                "Downloaded file failed its integrity check".to_string()
            }
            DownloadError::Filesystem(msg) => format!("File operation failed: {msg}"),
            DownloadError::InvalidBrowserType => "Unsupported browser type".to_string(),
            DownloadError::InvalidVersion => "Invalid browser version".to_string(),
            DownloadError::InvalidPlatform => "Unsupported platform".to_string(),
            DownloadError::DownloadUrlNotFound => {
                "No download link found, this version may not exist".to_string()
            }
            DownloadError::ResourceExhausted => {
                "System resources exhausted, close other programs and try again".to_string()
            }
            DownloadError::ProcessExit { .. } | DownloadError::TimedOut { .. } => {
                format!("Download worker failed: {self}")
            }
            DownloadError::Unknown(msg) => msg.clone(),
        }
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "task 123 not found",
///     "details": {
///       "task_id": 123
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_state")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidTarget(_) => 400,

            Error::NotFound(_) => 404,
            Error::InstallationNotFound(_) => 404,
            Error::ExecutableMissing(_) => 404,

            Error::InvalidState { .. } => 409,
            Error::AlreadyActive(_) => 409,
            Error::AlreadyRunning(_) => 409,

            // Worker ran but the operation failed upstream
            Error::Download(_) => 502,

            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidState { .. } => "invalid_state",
            Error::AlreadyActive(_) => "already_active",
            Error::InstallationNotFound(_) => "installation_not_found",
            Error::AlreadyRunning(_) => "already_running",
            Error::ExecutableMissing(_) => "executable_missing",
            Error::InvalidTarget(_) => "invalid_target",
            Error::ShuttingDown => "shutting_down",
            Error::Download(_) => "download_failed",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = match &error {
            Error::Download(e) => e.user_message(),
            other => other.to_string(),
        };

        let details = match &error {
            Error::NotFound(id) | Error::AlreadyActive(id) => Some(serde_json::json!({
                "task_id": id,
            })),
            Error::InvalidState {
                id,
                operation,
                current_state,
            } => Some(serde_json::json!({
                "task_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::InstallationNotFound(id) | Error::AlreadyRunning(id) => {
                Some(serde_json::json!({ "record_id": id }))
            }
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
