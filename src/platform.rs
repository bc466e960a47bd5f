//! Host platform detection and executable discovery

use std::path::{Path, PathBuf};

use crate::types::{BrowserKind, SystemInfo};

/// Platform identifier the worker scripts expect for this host
pub fn current_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        if cfg!(target_arch = "x86_64") {
            "win64"
        } else if cfg!(target_arch = "x86") {
            "win32"
        } else {
            "windows"
        }
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "mac_arm"
        } else {
            "mac_x64"
        }
    } else if cfg!(target_os = "linux") {
        if cfg!(target_arch = "x86_64") {
            "linux64"
        } else {
            "linux"
        }
    } else {
        "unknown"
    }
}

/// Platform, architecture and OS of the host
pub fn system_info() -> SystemInfo {
    SystemInfo {
        platform: current_platform().to_string(),
        arch: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
    }
}

/// Executable locations relative to an install directory, most likely first
pub fn executable_candidates(kind: BrowserKind) -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        match kind {
            BrowserKind::Chrome | BrowserKind::Chromium => &["chrome.exe", "Application/chrome.exe"],
            BrowserKind::Firefox => &["firefox.exe", "firefox/firefox.exe"],
            BrowserKind::ChromeDriver => &["chromedriver.exe"],
        }
    }
    #[cfg(target_os = "macos")]
    {
        match kind {
            BrowserKind::Chrome => &[
                "Google Chrome.app/Contents/MacOS/Google Chrome",
                "chrome-mac/Google Chrome.app/Contents/MacOS/Google Chrome",
                "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
                "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
            ],
            BrowserKind::Chromium => &[
                "Chromium.app/Contents/MacOS/Chromium",
                "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
            ],
            BrowserKind::Firefox => &["Firefox.app/Contents/MacOS/firefox"],
            BrowserKind::ChromeDriver => &["chromedriver"],
        }
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        match kind {
            BrowserKind::Chrome => &[
                "chrome",
                "google-chrome",
                "chrome-linux/chrome",
                "chrome-linux64/chrome",
            ],
            BrowserKind::Chromium => &["chrome", "chromium", "chrome-linux/chrome"],
            BrowserKind::Firefox => &["firefox", "firefox/firefox"],
            BrowserKind::ChromeDriver => &["chromedriver", "chromedriver-linux64/chromedriver"],
        }
    }
}

/// First existing executable under `install_path`, or the most likely location
pub fn find_executable(kind: BrowserKind, install_path: &Path) -> PathBuf {
    let candidates = executable_candidates(kind);
    if let Some(found) = candidates
        .iter()
        .map(|relative| install_path.join(relative))
        .find(|path| path.is_file())
    {
        tracing::debug!(path = %found.display(), "found browser executable");
        return found;
    }

    let fallback = candidates
        .first()
        .map(|relative| install_path.join(relative))
        .unwrap_or_else(|| install_path.to_path_buf());
    tracing::warn!(
        install_path = %install_path.display(),
        fallback = %fallback.display(),
        "browser executable not found, using default location"
    );
    fallback
}
