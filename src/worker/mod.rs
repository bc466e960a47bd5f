//! External worker processes
//!
//! Browser installs are performed by Node.js scripts that report over stdout
//! with the line protocol in [`crate::protocol`]. This module builds their
//! command lines ([`WorkerLauncher`]), supervises long-running installs
//! ([`supervisor`]) and runs the one-shot queries ([`commands`]).

use tokio::process::Command;

use crate::error::Result;
use crate::types::{BrowserKind, Target};

pub mod commands;
pub mod node;
pub mod supervisor;

pub use commands::WorkerCommands;
pub use node::NodeWorkerLauncher;
pub use supervisor::{Supervisor, SupervisorOutcome};

/// Which worker script to run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerOperation {
    /// Download and install a browser
    Install,
    /// Remove an installed browser
    Uninstall,
    /// Query whether a browser is installed
    CheckInstalled,
    /// List versions available for download
    ListVersions,
}

impl WorkerOperation {
    /// Script file implementing the operation
    pub fn script_name(&self) -> &'static str {
        match self {
            WorkerOperation::Install => "download-browser.js",
            WorkerOperation::Uninstall => "uninstall-browser.js",
            WorkerOperation::CheckInstalled => "check-installation.js",
            WorkerOperation::ListVersions => "list-versions.js",
        }
    }
}

/// One invocation of a worker script
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerRequest {
    /// Script to run
    pub operation: WorkerOperation,
    /// Browser product
    pub kind: BrowserKind,
    /// Version, omitted for operations that do not take one
    pub version: Option<String>,
    /// Platform, omitted for operations that do not take one
    pub platform: Option<String>,
}

impl WorkerRequest {
    /// Request for an operation on a concrete target
    pub fn for_target(operation: WorkerOperation, target: &Target) -> Self {
        Self {
            operation,
            kind: target.kind,
            version: Some(target.version.clone()),
            platform: Some(target.platform.clone()),
        }
    }

    /// Request to list the versions of `kind`
    pub fn list_versions(kind: BrowserKind) -> Self {
        Self {
            operation: WorkerOperation::ListVersions,
            kind,
            version: None,
            platform: None,
        }
    }

    /// Script arguments: `--browser <kind> [--version <v>] [--platform <p>]`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["--browser".to_string(), self.kind.as_str().to_string()];
        if let Some(version) = &self.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        if let Some(platform) = &self.platform {
            args.push("--platform".to_string());
            args.push(platform.clone());
        }
        args
    }
}

/// Builds the process command for a worker request
///
/// The supervisor configures stdio and spawns the returned command; the
/// launcher only decides what runs. Tests substitute a launcher that runs
/// shell scripts.
pub trait WorkerLauncher: Send + Sync {
    /// Command that performs `request`
    fn command(&self, request: &WorkerRequest) -> Result<Command>;

    /// Launcher name for logging
    fn name(&self) -> &'static str;
}
