//! Worker output line protocol
//!
//! The external download engine reports its progress on stdout, one
//! `PREFIX:payload` record per line. [`LineDecoder`] turns the raw byte
//! stream into complete lines and [`parse_line`] decodes each line into a
//! closed [`WorkerEvent`]; untyped JSON never travels past this module.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Progress payload of a `PROGRESS:` line
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ProgressUpdate {
    /// Progress fraction as reported (not yet clamped)
    pub progress: f64,
    /// Bytes downloaded so far
    #[serde(default)]
    pub downloaded_bytes: u64,
    /// Total bytes, 0 when unknown
    #[serde(default)]
    pub total_bytes: u64,
    /// Remaining time in seconds
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
}

impl ProgressUpdate {
    /// Remaining-time estimate rounded to whole seconds, if usable
    pub fn eta_seconds(&self) -> Option<u64> {
        self.estimated_time_remaining
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.round() as u64)
    }
}

/// One decoded line of worker output
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    /// Advisory text
    Info(String),
    /// Progress report
    Progress(ProgressUpdate),
    /// Install finished (terminal)
    Completed {
        /// Install directory, absent when the payload is empty
        install_path: Option<PathBuf>,
    },
    /// Path of the installed executable
    Executable(PathBuf),
    /// Version alias resolved to a concrete build id
    VersionResolved(String),
    /// Worker failed with a message (terminal)
    Error(String),
    /// Debug output
    Debug(String),
    /// Success marker for one-shot operations such as uninstall
    Success(String),
    /// Well-formed line with a prefix this crate does not know
    Unknown {
        /// The unrecognized prefix
        prefix: String,
        /// Everything after the first colon
        payload: String,
    },
}

impl WorkerEvent {
    /// `COMPLETED` and `ERROR` end a download attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Completed { .. } | WorkerEvent::Error(_))
    }
}

/// A line that could not be decoded
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// No `:` separator on the line
    #[error("line has no prefix separator: {0:?}")]
    MissingPrefix(String),

    /// `PROGRESS` payload is not a valid progress object
    #[error("malformed PROGRESS payload: {0}")]
    MalformedProgress(String),

    /// Recognized prefix with an empty payload where one is required
    #[error("empty payload for {0}")]
    EmptyPayload(&'static str),
}

/// Decode one line of worker output
///
/// The prefix is case-sensitive and ends at the first `:`; the payload is
/// trimmed. Unknown prefixes are not an error.
pub fn parse_line(line: &str) -> Result<WorkerEvent, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some((prefix, payload)) = line.split_once(':') else {
        return Err(ProtocolError::MissingPrefix(line.to_string()));
    };
    let prefix = prefix.trim();
    let payload = payload.trim();

    let event = match prefix {
        "INFO" => WorkerEvent::Info(payload.to_string()),
        "DEBUG" => WorkerEvent::Debug(payload.to_string()),
        "SUCCESS" => WorkerEvent::Success(payload.to_string()),
        "PROGRESS" => {
            let update: ProgressUpdate = serde_json::from_str(payload)
                .map_err(|e| ProtocolError::MalformedProgress(e.to_string()))?;
            if !update.progress.is_finite() {
                return Err(ProtocolError::MalformedProgress(
                    "progress is not a finite number".to_string(),
                ));
            }
            WorkerEvent::Progress(update)
        }
        "COMPLETED" => WorkerEvent::Completed {
            install_path: (!payload.is_empty()).then(|| PathBuf::from(payload)),
        },
        "EXECUTABLE" => {
            if payload.is_empty() {
                return Err(ProtocolError::EmptyPayload("EXECUTABLE"));
            }
            WorkerEvent::Executable(PathBuf::from(payload))
        }
        "VERSION" => {
            if payload.is_empty() {
                return Err(ProtocolError::EmptyPayload("VERSION"));
            }
            WorkerEvent::VersionResolved(payload.to_string())
        }
        "ERROR" => {
            if payload.is_empty() {
                WorkerEvent::Error("Unknown error".to_string())
            } else {
                WorkerEvent::Error(payload.to_string())
            }
        }
        other => WorkerEvent::Unknown {
            prefix: other.to_string(),
            payload: payload.to_string(),
        },
    };

    Ok(event)
}

/// Splits a byte stream into complete lines
///
/// Bytes are buffered until a newline arrives, so a record split across
/// reads is only decoded once whole. Lines longer than `max_line_bytes` are
/// dropped in their entirety.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
}

impl LineDecoder {
    /// Create a decoder that drops lines longer than `max_line_bytes`
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    /// Feed a chunk and return every line it completed
    ///
    /// Returned lines have their terminator (`\n` or `\r\n`) removed; blank
    /// lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buf.clear();
                continue;
            }
            if self.buf.len() + head.len() > self.max_line_bytes {
                tracing::warn!(
                    len = self.buf.len() + head.len(),
                    max = self.max_line_bytes,
                    "discarding oversized worker output line"
                );
                self.buf.clear();
                continue;
            }

            self.buf.extend_from_slice(head);
            let line = String::from_utf8_lossy(&self.buf)
                .trim_end_matches('\r')
                .to_string();
            self.buf.clear();
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }

        if !self.discarding {
            if self.buf.len() + rest.len() > self.max_line_bytes {
                tracing::warn!(
                    max = self.max_line_bytes,
                    "worker output line exceeds limit, discarding until newline"
                );
                self.buf.clear();
                self.discarding = true;
            } else {
                self.buf.extend_from_slice(rest);
            }
        }

        lines
    }

    /// Drop any unterminated tail at end of stream
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            tracing::debug!(
                bytes = self.buf.len(),
                "discarding unterminated worker output at EOF"
            );
        }
        self.buf.clear();
        self.discarding = false;
    }
}
