//! Launching installed browsers
//!
//! Installed browsers are started detached from the download workers: the
//! process is not killed on drop and outlives [`shutdown`]. Only the
//! record's `is_running` flag follows it.
//!
//! [`shutdown`]: crate::BrowserDownloader::shutdown

use std::collections::HashSet;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::types::{BrowserKind, BrowserRecord};

/// Flags every Chromium-family browser is started with
const CHROMIUM_DEFAULT_FLAGS: [&str; 2] = ["--no-first-run", "--disable-default-apps"];

/// Command line for `kind`: default flags followed by `extra`
///
/// When a `--flag` (or `--flag=value`) appears more than once, only its last
/// occurrence is kept, so caller flags override the defaults. Arguments that
/// are not flags are kept in order.
pub fn build_launch_args(kind: BrowserKind, extra: &[String]) -> Vec<String> {
    let defaults: &[&str] = match kind {
        BrowserKind::Chrome | BrowserKind::Chromium => &CHROMIUM_DEFAULT_FLAGS,
        BrowserKind::Firefox | BrowserKind::ChromeDriver => &[],
    };
    let all: Vec<String> = defaults
        .iter()
        .map(|flag| flag.to_string())
        .chain(extra.iter().cloned())
        .collect();

    let mut seen = HashSet::new();
    let mut args: Vec<String> = all
        .into_iter()
        .rev()
        .filter(|arg| match flag_name(arg) {
            Some(name) => seen.insert(name.to_string()),
            None => true,
        })
        .collect();
    args.reverse();
    args
}

fn flag_name(arg: &str) -> Option<&str> {
    if !arg.starts_with("--") || arg.len() == 2 {
        return None;
    }
    Some(arg.split_once('=').map_or(arg, |(name, _)| name))
}

/// Start the browser of `record` with `args`
///
/// # Errors
///
/// - [`Error::InvalidTarget`] for ChromeDriver records
/// - [`Error::ExecutableMissing`] if the executable is gone
/// - [`Error::ExternalTool`] if the process cannot be started
pub fn spawn_browser(record: &BrowserRecord, args: &[String]) -> Result<Child> {
    if record.kind == BrowserKind::ChromeDriver {
        return Err(Error::InvalidTarget(
            "chromedriver is not a launchable browser".to_string(),
        ));
    }
    if !record.executable_path.is_file() {
        return Err(Error::ExecutableMissing(record.executable_path.clone()));
    }

    Command::new(&record.executable_path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            Error::ExternalTool(format!(
                "failed to start {}: {e}",
                record.executable_path.display()
            ))
        })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn chromium_family_gets_default_flags() {
        assert_eq!(
            build_launch_args(BrowserKind::Chrome, &[]),
            strings(&["--no-first-run", "--disable-default-apps"])
        );
        assert!(build_launch_args(BrowserKind::Firefox, &[]).is_empty());
    }

    #[test]
    fn later_flag_wins_and_keeps_its_position() {
        let args = build_launch_args(
            BrowserKind::Chromium,
            &strings(&[
                "--window-size=800,600",
                "--no-first-run",
                "https://example.com",
                "--window-size=1280,720",
            ]),
        );
        assert_eq!(
            args,
            strings(&[
                "--disable-default-apps",
                "--no-first-run",
                "https://example.com",
                "--window-size=1280,720",
            ])
        );
    }

    #[test]
    fn plain_arguments_are_never_deduplicated() {
        let args = build_launch_args(
            BrowserKind::Firefox,
            &strings(&["-P", "dev", "-P", "dev", "--"]),
        );
        assert_eq!(args, strings(&["-P", "dev", "-P", "dev", "--"]));
    }
}
