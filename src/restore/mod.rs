//! Session restoration
//!
//! Best-effort re-establishment of a stored session: clipboard contents,
//! application windows (focus a running process, else launch it), and
//! browser tabs reopened in the default browser. Every step degrades
//! independently; the only hard failure is a session that cannot be loaded.
//!
//! Process names pass through a strict allow-list alphabet before being
//! embedded in any platform command, and only http(s) URLs are ever handed
//! to the OS opener.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::capture::models::BrowserTab;
use crate::clipboard::ClipboardAccess;
use crate::error::Result;
use crate::platform::{BrowserKind, OsKind};
use crate::store::{SessionStore, StoredSession};
use crate::toolexec::{CommandRunner, ToolCommand};

/// Cap on URLs reopened per restore
pub const MAX_RESTORE_URLS: usize = 20;

/// Shell-infrastructure processes that are never focused or launched
const SYSTEM_PROCESSES: &[&str] = &[
    "explorer",
    "dwm",
    "searchhost",
    "textinputhost",
    "shellexperiencehost",
    "applicationframehost",
    "startmenuexperiencehost",
    "systemsettings",
    "taskmgr",
    "lockapp",
    "finder",
    "dock",
    "systemuiserver",
    "controlcenter",
    "notificationcenter",
];

fn process_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9. -]+$").expect("static pattern"))
}

/// A process name is only embedded in a platform command if it matches the
/// allow-list alphabet; anything with quoting or metacharacters is dropped.
pub fn is_valid_process_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 128 && process_name_pattern().is_match(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Focused,
    Launched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOutcome {
    pub process_name: String,
    pub action: WindowAction,
}

/// What a restore attempt actually accomplished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub success: bool,
    pub window_outcomes: Vec<WindowOutcome>,
    pub urls_opened: usize,
    pub clipboard_restored: bool,
}

impl RestoreOutcome {
    fn failed() -> Self {
        Self {
            success: false,
            window_outcomes: Vec::new(),
            urls_opened: 0,
            clipboard_restored: false,
        }
    }
}

/// Replays a stored session onto the current desktop
pub struct SessionRestorer {
    os: OsKind,
    clipboard: Arc<dyn ClipboardAccess>,
    runner: Arc<dyn CommandRunner>,
}

impl SessionRestorer {
    pub fn new(
        os: OsKind,
        clipboard: Arc<dyn ClipboardAccess>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            os,
            clipboard,
            runner,
        }
    }

    /// Load a session by id and restore it. A session that is missing,
    /// tampered, or unloadable yields a failed outcome; everything past
    /// loading is best-effort.
    pub async fn restore(&self, store: &SessionStore, id: &str) -> Result<RestoreOutcome> {
        let session = match store.load(id) {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!("session {id} not found or failed verification, nothing to restore");
                return Ok(RestoreOutcome::failed());
            }
            Err(e) => {
                warn!("session {id} could not be loaded: {e}");
                return Err(e);
            }
        };
        Ok(self.restore_session(&session).await)
    }

    pub async fn restore_session(&self, session: &StoredSession) -> RestoreOutcome {
        let clipboard_restored = self.restore_clipboard(&session.snapshot.clipboard);
        let window_outcomes = self.restore_windows(&session.snapshot.windows).await;
        let urls = restorable_urls(&session.snapshot.browser_tabs);
        let urls_opened = self.open_urls(&urls).await;

        info!(
            session = %session.id,
            windows = window_outcomes.len(),
            urls = urls_opened,
            clipboard = clipboard_restored,
            "session restored"
        );

        RestoreOutcome {
            success: true,
            window_outcomes,
            urls_opened,
            clipboard_restored,
        }
    }

    fn restore_clipboard(&self, contents: &str) -> bool {
        if contents.is_empty() {
            return false;
        }
        match self.clipboard.write_text(contents) {
            Ok(()) => true,
            Err(e) => {
                warn!("clipboard restore failed: {e}");
                false
            }
        }
    }

    async fn restore_windows(
        &self,
        windows: &[crate::capture::models::WindowInfo],
    ) -> Vec<WindowOutcome> {
        if self.os == OsKind::Linux {
            debug!("window restoration not supported on this platform");
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut outcomes = Vec::new();
        for window in windows {
            let name = window.process_name.trim();
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            if should_skip_process(name) {
                continue;
            }
            if !is_valid_process_name(name) {
                warn!("skipping process with unrestorable name {name:?}");
                continue;
            }

            if self.focus_process(name).await {
                outcomes.push(WindowOutcome {
                    process_name: name.to_string(),
                    action: WindowAction::Focused,
                });
            } else if self.launch_process(name).await {
                outcomes.push(WindowOutcome {
                    process_name: name.to_string(),
                    action: WindowAction::Launched,
                });
            }
        }
        outcomes
    }

    async fn focus_process(&self, name: &str) -> bool {
        let cmd = match self.os {
            OsKind::Windows => ToolCommand::new("powershell")
                .args(["-NoProfile", "-NonInteractive", "-Command"])
                .arg(format!(
                    "(New-Object -ComObject WScript.Shell).AppActivate('{name}')"
                )),
            OsKind::MacOs => ToolCommand::new("osascript").arg("-e").arg(format!(
                r#"tell application "System Events" to set frontmost of first process whose name is "{name}" to true"#
            )),
            OsKind::Linux => return false,
        };
        match self.runner.run(&cmd).await {
            // AppActivate reports whether a window actually took focus.
            Ok(stdout) if self.os == OsKind::Windows => stdout.trim() == "True",
            Ok(_) => true,
            Err(e) => {
                debug!("focus of {name} failed: {e}");
                false
            }
        }
    }

    async fn launch_process(&self, name: &str) -> bool {
        let cmd = match self.os {
            OsKind::Windows => ToolCommand::new("powershell")
                .args(["-NoProfile", "-NonInteractive", "-Command"])
                .arg(format!("Start-Process '{name}'")),
            OsKind::MacOs => ToolCommand::new("open").arg("-a").arg(name),
            OsKind::Linux => return false,
        };
        match self.runner.run(&cmd).await {
            Ok(_) => true,
            Err(e) => {
                debug!("launch of {name} failed: {e}");
                false
            }
        }
    }

    async fn open_urls(&self, urls: &[String]) -> usize {
        let mut opened = 0;
        for url in urls {
            let cmd = match self.os {
                // `start` treats its first quoted argument as a window
                // title; the empty string keeps the URL out of that slot.
                OsKind::Windows => ToolCommand::new("cmd").args(["/c", "start", ""]).arg(url),
                OsKind::MacOs => ToolCommand::new("open").arg(url),
                OsKind::Linux => ToolCommand::new("xdg-open").arg(url),
            };
            match self.runner.run(&cmd).await {
                Ok(_) => opened += 1,
                Err(e) => warn!("failed to open {url}: {e}"),
            }
        }
        opened
    }
}

/// Browser processes are excluded from window restoration; their state comes
/// back through reopened tabs instead.
fn should_skip_process(name: &str) -> bool {
    let lowered = name.to_lowercase();
    if SYSTEM_PROCESSES.contains(&lowered.as_str()) {
        return true;
    }
    if lowered == "safari" {
        return true;
    }
    [
        BrowserKind::Chrome,
        BrowserKind::Edge,
        BrowserKind::Brave,
        BrowserKind::Firefox,
    ]
    .iter()
    .any(|kind| kind.process_names().contains(&lowered.as_str()))
}

/// The URLs a restore will reopen: de-duplicated, re-validated as http(s)
/// even though capture already filtered, and capped.
pub fn restorable_urls(tabs: &[BrowserTab]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls: Vec<String> = tabs
        .iter()
        .map(|tab| tab.url.clone())
        .filter(|url| {
            Url::parse(url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false)
        })
        .filter(|url| seen.insert(url.clone()))
        .collect();
    urls.truncate(MAX_RESTORE_URLS);
    urls
}
