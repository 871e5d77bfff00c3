//! Window snapshot collector
//!
//! Enumerates visible top-level windows by shelling out to the platform
//! automation tool. The contract is best-effort and infallible: any tool
//! failure or unparseable output yields an empty list and a warning.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::capture::models::WindowInfo;
use crate::platform::OsKind;
use crate::toolexec::{run_tool, ToolCommand};

/// Bounded wait for the window enumeration tool
const WINDOW_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the current window list; one implementation per OS
#[async_trait]
pub trait WindowSource: Send + Sync {
    /// All windows with a non-empty title. Never fails; degraded sources
    /// return an empty list.
    async fn list_windows(&self) -> Vec<WindowInfo>;
}

/// Pick the window source for the detected OS
pub fn for_os(os: OsKind) -> Arc<dyn WindowSource> {
    match os {
        OsKind::Windows => Arc::new(PowershellWindowSource),
        OsKind::MacOs => Arc::new(AppleScriptWindowSource),
        OsKind::Linux => Arc::new(NullWindowSource),
    }
}

/// Windows: process query over the window manager via PowerShell
pub struct PowershellWindowSource;

const POWERSHELL_WINDOW_QUERY: &str = "Get-Process | Where-Object { $_.MainWindowTitle -ne '' } \
     | Select-Object ProcessName, MainWindowTitle | ConvertTo-Json -Compress";

#[async_trait]
impl WindowSource for PowershellWindowSource {
    async fn list_windows(&self) -> Vec<WindowInfo> {
        let cmd = ToolCommand::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(POWERSHELL_WINDOW_QUERY)
            .with_timeout(WINDOW_QUERY_TIMEOUT);

        match run_tool(&cmd).await {
            Ok(stdout) => parse_powershell_windows(&stdout),
            Err(e) => {
                warn!("window enumeration failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Parse `ConvertTo-Json` output; a single window serializes as a bare
/// object rather than a one-element array.
fn parse_powershell_windows(stdout: &str) -> Vec<WindowInfo> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!("unparseable window query output: {e}");
            return Vec::new();
        }
    };

    let objects: Vec<&serde_json::Value> = match &value {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(_) => vec![&value],
        _ => return Vec::new(),
    };

    objects
        .into_iter()
        .filter_map(|obj| {
            let process_name = obj.get("ProcessName")?.as_str()?.to_string();
            let title = obj.get("MainWindowTitle")?.as_str()?.to_string();
            if title.is_empty() {
                return None;
            }
            Some(WindowInfo {
                process_name,
                title,
            })
        })
        .collect()
}

/// macOS: accessibility tree walk via System Events AppleScript
pub struct AppleScriptWindowSource;

const APPLESCRIPT_WINDOW_QUERY: &str = r#"
set out to ""
tell application "System Events"
    repeat with proc in (every application process whose background only is false)
        repeat with w in (every window of proc)
            set out to out & (name of proc) & tab & (name of w) & linefeed
        end repeat
    end repeat
end tell
return out
"#;

#[async_trait]
impl WindowSource for AppleScriptWindowSource {
    async fn list_windows(&self) -> Vec<WindowInfo> {
        let cmd = ToolCommand::new("osascript")
            .arg("-e")
            .arg(APPLESCRIPT_WINDOW_QUERY)
            .with_timeout(WINDOW_QUERY_TIMEOUT);

        match run_tool(&cmd).await {
            Ok(stdout) => parse_tabbed_windows(&stdout),
            Err(e) => {
                warn!("window enumeration failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Parse `process\ttitle` lines, skipping blanks and titleless entries
fn parse_tabbed_windows(stdout: &str) -> Vec<WindowInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let (process_name, title) = line.split_once('\t')?;
            let process_name = process_name.trim();
            let title = title.trim();
            if process_name.is_empty() || title.is_empty() {
                return None;
            }
            Some(WindowInfo {
                process_name: process_name.to_string(),
                title: title.to_string(),
            })
        })
        .collect()
}

/// Platforms without a supported enumeration tool
pub struct NullWindowSource;

#[async_trait]
impl WindowSource for NullWindowSource {
    async fn list_windows(&self) -> Vec<WindowInfo> {
        Vec::new()
    }
}
