//! Platform probe: OS identity and canonical file-system locations
//!
//! Pure data lookups. Collectors depend on this module for browser profile
//! paths and the recent-items folder; nothing here touches the network or
//! spawns processes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Operating system the engine is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Windows,
    MacOs,
    Linux,
}

impl OsKind {
    /// Detect the current OS once at startup
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "windows" => OsKind::Windows,
            "macos" => OsKind::MacOs,
            _ => OsKind::Linux,
        }
    }
}

/// Browser families the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Edge,
    Brave,
    Firefox,
}

impl BrowserKind {
    /// Window-title suffixes the browser chrome appends to the page title
    pub fn title_suffixes(self) -> &'static [&'static str] {
        match self {
            BrowserKind::Chrome => &[" - Google Chrome"],
            BrowserKind::Edge => &[" - Microsoft\u{200b} Edge", " - Microsoft Edge"],
            BrowserKind::Brave => &[" - Brave"],
            BrowserKind::Firefox => &[" \u{2014} Mozilla Firefox", " - Mozilla Firefox"],
        }
    }

    /// Process names (without extension) the browser runs under
    pub fn process_names(self) -> &'static [&'static str] {
        match self {
            BrowserKind::Chrome => &["chrome", "google chrome"],
            BrowserKind::Edge => &["msedge", "microsoft edge"],
            BrowserKind::Brave => &["brave", "brave browser"],
            BrowserKind::Firefox => &["firefox"],
        }
    }

    /// Map a process name back to a browser family, if it is one
    pub fn from_process_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        for kind in [
            BrowserKind::Chrome,
            BrowserKind::Edge,
            BrowserKind::Brave,
            BrowserKind::Firefox,
        ] {
            if kind.process_names().iter().any(|p| lowered == *p) {
                return Some(kind);
            }
        }
        None
    }
}

/// Candidate `History` database files for the chromium-family browsers.
///
/// Paths are returned whether or not they exist; the history reader checks
/// existence so a freshly installed browser shows up without a restart.
pub fn chromium_history_paths(os: OsKind) -> Vec<(BrowserKind, PathBuf)> {
    let mut paths = Vec::new();

    match os {
        OsKind::Windows => {
            if let Some(local) = dirs::data_local_dir() {
                paths.push((
                    BrowserKind::Chrome,
                    local.join("Google/Chrome/User Data/Default/History"),
                ));
                paths.push((
                    BrowserKind::Edge,
                    local.join("Microsoft/Edge/User Data/Default/History"),
                ));
                paths.push((
                    BrowserKind::Brave,
                    local.join("BraveSoftware/Brave-Browser/User Data/Default/History"),
                ));
            }
        }
        OsKind::MacOs => {
            if let Some(home) = dirs::home_dir() {
                let support = home.join("Library/Application Support");
                paths.push((
                    BrowserKind::Chrome,
                    support.join("Google/Chrome/Default/History"),
                ));
                paths.push((
                    BrowserKind::Edge,
                    support.join("Microsoft Edge/Default/History"),
                ));
                paths.push((
                    BrowserKind::Brave,
                    support.join("BraveSoftware/Brave-Browser/Default/History"),
                ));
            }
        }
        OsKind::Linux => {
            if let Some(config) = dirs::config_dir() {
                paths.push((
                    BrowserKind::Chrome,
                    config.join("google-chrome/Default/History"),
                ));
                paths.push((
                    BrowserKind::Edge,
                    config.join("microsoft-edge/Default/History"),
                ));
                paths.push((
                    BrowserKind::Brave,
                    config.join("BraveSoftware/Brave-Browser/Default/History"),
                ));
            }
        }
    }

    paths
}

/// Folder holding the OS recent-items shortcuts, where one exists
pub fn recent_items_dir(os: OsKind) -> Option<PathBuf> {
    match os {
        OsKind::Windows => dirs::data_dir().map(|d| d.join("Microsoft/Windows/Recent")),
        // No per-user recent-items folder with a stable layout elsewhere
        OsKind::MacOs | OsKind::Linux => None,
    }
}
