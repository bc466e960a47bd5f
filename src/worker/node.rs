//! Node.js worker launcher

use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{WorkerLauncher, WorkerRequest};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};

/// Runs worker scripts with a Node.js interpreter
///
/// # Examples
///
/// ```no_run
/// use browser_dl::worker::NodeWorkerLauncher;
/// use browser_dl::config::WorkerConfig;
///
/// // Discover node on PATH and the scripts next to the executable
/// let launcher = NodeWorkerLauncher::from_config(&WorkerConfig::default())
///     .expect("node runtime not found");
/// ```
#[derive(Clone, Debug)]
pub struct NodeWorkerLauncher {
    interpreter: PathBuf,
    scripts_dir: PathBuf,
}

impl NodeWorkerLauncher {
    /// Create a launcher with an explicit interpreter and scripts directory
    pub fn new(interpreter: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    /// Resolve the interpreter and scripts directory from configuration
    ///
    /// Unset paths are discovered: `node` or `nodejs` on PATH (when
    /// `search_path` is enabled) and a `scripts` directory near the running
    /// executable.
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let interpreter = match &config.node_path {
            Some(path) => path.clone(),
            None if config.search_path => find_node().ok_or_else(|| {
                Error::ExternalTool("Node.js runtime not found on PATH (node, nodejs)".into())
            })?,
            None => {
                return Err(Error::Config {
                    message: "node_path must be set when search_path is disabled".into(),
                    key: Some("worker.node_path".into()),
                });
            }
        };

        let scripts_dir = match &config.scripts_dir {
            Some(dir) => dir.clone(),
            None => locate_scripts_dir().ok_or_else(|| {
                Error::ExternalTool("worker scripts directory not found".into())
            })?,
        };

        tracing::info!(
            interpreter = %interpreter.display(),
            scripts_dir = %scripts_dir.display(),
            "node worker launcher configured"
        );
        Ok(Self::new(interpreter, scripts_dir))
    }

    /// Interpreter path
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Scripts directory
    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }
}

impl WorkerLauncher for NodeWorkerLauncher {
    fn command(&self, request: &WorkerRequest) -> Result<Command> {
        let script = self.scripts_dir.join(request.operation.script_name());
        if !script.is_file() {
            return Err(Error::ExternalTool(format!(
                "worker script not found: {}",
                script.display()
            )));
        }

        let mut command = Command::new(&self.interpreter);
        command.arg(&script).args(request.args());
        Ok(command)
    }

    fn name(&self) -> &'static str {
        "node"
    }
}

/// Find a Node.js interpreter on PATH
pub fn find_node() -> Option<PathBuf> {
    which::which("node")
        .or_else(|_| which::which("nodejs"))
        .ok()
}

/// First existing scripts directory relative to the running executable
pub fn locate_scripts_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?;
    scripts_dir_candidates(exe_dir)
        .into_iter()
        .find(|dir| dir.is_dir())
}

fn scripts_dir_candidates(exe_dir: &Path) -> Vec<PathBuf> {
    vec![
        exe_dir.join("scripts"),
        exe_dir.join("resources").join("scripts"),
        exe_dir.join("../../scripts"),
        exe_dir.join("../../../scripts"),
        exe_dir.join("../../../../scripts"),
    ]
}
