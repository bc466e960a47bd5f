//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - Task control
//! - [`browsers`] - One-shot browser commands
//! - [`system`] - Health, system info, events, OpenAPI

use crate::types::{BrowserKind, TaskId, Target};
use serde::{Deserialize, Serialize};

mod browsers;
mod downloads;
mod system;

pub use browsers::*;
pub use downloads::*;
pub use system::*;

/// Request body for POST /downloads and POST /browsers/uninstall
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct TargetRequest {
    /// Browser product
    pub kind: BrowserKind,
    /// Version or channel alias
    pub version: String,
    /// Platform identifier (e.g. "linux64")
    pub platform: String,
}

impl From<TargetRequest> for Target {
    fn from(request: TargetRequest) -> Self {
        Target::new(request.kind, request.version, request.platform)
    }
}

/// Response for POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartDownloadResponse {
    /// Id of the queued task
    pub id: TaskId,
}

/// Request body for POST /browsers/:id/launch
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct LaunchRequest {
    /// Extra command-line arguments; a repeated `--flag` replaces the default
    #[serde(default)]
    pub args: Vec<String>,
}

/// Response for POST /browsers/:id/launch
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct LaunchResponse {
    /// Process id of the started browser
    pub pid: u32,
}

/// Response for DELETE /browsers
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ClearInstallationsResponse {
    /// Number of installations uninstalled
    pub removed: usize,
}
