//! UI-automation tab source
//!
//! Last-resort scraping when neither the relay nor the debug protocol has
//! anything. Yields at most one tab per browser window (the active tab) —
//! unlike the other sources, which can enumerate every open tab.
//!
//! On Windows the accessibility providers behind browser address bars are
//! lazily initialized, so the scrape is a two-phase protocol: wake every
//! candidate window's automation root first, wait a fixed settle delay, then
//! query. Waking one-at-a-time would serialize the settle cost per window.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::capture::models::{is_web_url, BrowserTab};
use crate::capture::tabs::{strip_title_suffix, TabSource};
use crate::platform::{BrowserKind, OsKind};
use crate::toolexec::{run_tool, ToolCommand, ToolFailure};

/// Settle delay between the wake and query phases
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// The wake pass touches every window tree; give it the longest budget
const WAKE_TIMEOUT: Duration = Duration::from_secs(25);

/// Per-invocation budget for query scripts
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Phase 1: force each browser window's automation tree to materialize by
/// reading one child of its root. All windows are touched before the caller
/// waits.
const WINDOWS_WAKE_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient
$procs = Get-Process chrome,msedge,brave,firefox -ErrorAction SilentlyContinue |
    Where-Object { $_.MainWindowHandle -ne 0 }
foreach ($p in $procs) {
    try {
        $root = [System.Windows.Automation.AutomationElement]::FromHandle($p.MainWindowHandle)
        $null = $root.FindFirst(
            [System.Windows.Automation.TreeScope]::Children,
            [System.Windows.Automation.Condition]::TrueCondition)
    } catch {}
}
"#;

/// Phase 2: per window, read the address bar value — the product-specific
/// automation id first, then any edit control exposing the value pattern.
/// Emits `process<TAB>window-title<TAB>url` lines, one per window.
const WINDOWS_QUERY_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient
$valuePattern = [System.Windows.Automation.ValuePattern]::Pattern
$procs = Get-Process chrome,msedge,brave,firefox -ErrorAction SilentlyContinue |
    Where-Object { $_.MainWindowHandle -ne 0 }
foreach ($p in $procs) {
    try {
        $root = [System.Windows.Automation.AutomationElement]::FromHandle($p.MainWindowHandle)
        $url = $null
        $byId = $root.FindFirst(
            [System.Windows.Automation.TreeScope]::Descendants,
            (New-Object System.Windows.Automation.PropertyCondition(
                [System.Windows.Automation.AutomationElement]::AutomationIdProperty,
                'addressEditBox')))
        if ($byId) {
            $url = $byId.GetCurrentPattern($valuePattern).Current.Value
        }
        if (-not $url) {
            $edit = $root.FindFirst(
                [System.Windows.Automation.TreeScope]::Descendants,
                (New-Object System.Windows.Automation.AndCondition(
                    (New-Object System.Windows.Automation.PropertyCondition(
                        [System.Windows.Automation.AutomationElement]::ControlTypeProperty,
                        [System.Windows.Automation.ControlType]::Edit)),
                    (New-Object System.Windows.Automation.PropertyCondition(
                        [System.Windows.Automation.AutomationElement]::IsValuePatternAvailableProperty,
                        $true)))))
            if ($edit) {
                $url = $edit.GetCurrentPattern($valuePattern).Current.Value
            }
        }
        if ($url) {
            Write-Output ($p.ProcessName + "`t" + $p.MainWindowTitle + "`t" + $url)
        }
    } catch {}
}
"#;

/// macOS browsers that expose the active tab to AppleScript
const MACOS_SCRIPTABLE_BROWSERS: &[(BrowserKind, &str)] = &[
    (BrowserKind::Chrome, "Google Chrome"),
    (BrowserKind::Edge, "Microsoft Edge"),
    (BrowserKind::Brave, "Brave Browser"),
];

/// UI-automation scrape of each browser window's active tab
pub struct UiAutomationSource {
    os: OsKind,
}

impl UiAutomationSource {
    pub fn new(os: OsKind) -> Self {
        Self { os }
    }

    async fn windows_two_phase(&self) -> Vec<BrowserTab> {
        let wake = ToolCommand::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(WINDOWS_WAKE_SCRIPT)
            .with_timeout(WAKE_TIMEOUT);
        if let Err(e) = run_tool(&wake).await {
            // A failed wake pass degrades the query pass; still attempt it.
            debug!("automation wake pass failed: {e}");
        }

        tokio::time::sleep(SETTLE_DELAY).await;

        let query = ToolCommand::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(WINDOWS_QUERY_SCRIPT)
            .with_timeout(QUERY_TIMEOUT);
        match run_tool(&query).await {
            Ok(stdout) => parse_address_bar_lines(&stdout),
            Err(e) => {
                warn!("automation query pass failed: {e}");
                Vec::new()
            }
        }
    }

    async fn applescript_active_tabs(&self) -> Vec<BrowserTab> {
        let mut tabs = Vec::new();
        for &(kind, app_name) in MACOS_SCRIPTABLE_BROWSERS {
            let script = format!(
                r#"
if application "{app_name}" is running then
    set out to ""
    tell application "{app_name}"
        repeat with w in windows
            set t to active tab of w
            set out to out & (URL of t) & tab & (title of t) & linefeed
        end repeat
    end tell
    return out
end if
return ""
"#
            );
            let cmd = ToolCommand::new("osascript")
                .arg("-e")
                .arg(script)
                .with_timeout(QUERY_TIMEOUT);
            match run_tool(&cmd).await {
                Ok(stdout) => tabs.extend(parse_applescript_tab_lines(&stdout, kind)),
                Err(ToolFailure::Unavailable(_)) => break,
                Err(e) => debug!("applescript scrape of {app_name} failed: {e}"),
            }
        }
        tabs
    }
}

#[async_trait]
impl TabSource for UiAutomationSource {
    async fn fetch_tabs(&self) -> Vec<BrowserTab> {
        match self.os {
            OsKind::Windows => self.windows_two_phase().await,
            OsKind::MacOs => self.applescript_active_tabs().await,
            OsKind::Linux => Vec::new(),
        }
    }
}

/// Parse `process\ttitle\turl` lines from the Windows query pass.
///
/// Address bars commonly omit the scheme, so a bare `host/path` value is
/// retried as https before being dropped.
fn parse_address_bar_lines(stdout: &str) -> Vec<BrowserTab> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let process = parts.next()?.trim();
            let title = parts.next()?.trim();
            let raw_url = parts.next()?.trim();
            let browser = BrowserKind::from_process_name(process)?;
            let url = coerce_address_bar_url(raw_url)?;
            Some(BrowserTab {
                url,
                // Browsers mirror the active tab's page title into the
                // window title.
                title: strip_title_suffix(title),
                browser,
            })
        })
        .collect()
}

fn coerce_address_bar_url(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if is_web_url(raw) {
        return Some(raw.to_string());
    }
    if !raw.contains("://") && raw.contains('.') && !raw.contains(' ') {
        let with_scheme = format!("https://{raw}");
        if is_web_url(&with_scheme) {
            return Some(with_scheme);
        }
    }
    None
}

/// Parse `url\ttitle` lines from the AppleScript scrape
fn parse_applescript_tab_lines(stdout: &str, browser: BrowserKind) -> Vec<BrowserTab> {
    stdout
        .lines()
        .filter_map(|line| {
            let (url, title) = line.split_once('\t')?;
            let url = url.trim();
            if !is_web_url(url) {
                return None;
            }
            Some(BrowserTab {
                url: url.to_string(),
                title: title.trim().to_string(),
                browser,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_bar_lines_one_tab_per_window() {
        let out = "chrome\tDocs - Google Chrome\thttps://docs.rs/tokio\n\
                   msedge\tNews\thttps://news.example/today\n";
        let tabs = parse_address_bar_lines(out);
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0].title, "Docs");
        assert_eq!(tabs[0].browser, BrowserKind::Chrome);
        assert_eq!(tabs[1].browser, BrowserKind::Edge);
    }

    #[test]
    fn test_schemeless_address_bar_value_coerced_to_https() {
        let out = "chrome\tSite\texample.com/path\n";
        let tabs = parse_address_bar_lines(out);
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url, "https://example.com/path");
    }

    #[test]
    fn test_non_web_values_are_skipped() {
        let out = "chrome\tSettings\tchrome://settings\n\
                   chrome\tSearch\tsearch terms typed here\n";
        assert!(parse_address_bar_lines(out).is_empty());
    }

    #[test]
    fn test_unknown_process_lines_are_skipped() {
        let out = "notepad\tSomething\thttps://a.example\n";
        assert!(parse_address_bar_lines(out).is_empty());
    }

    #[test]
    fn test_parse_applescript_lines() {
        let out = "https://a.example/x\tPage A\nfile:///tmp/x\tLocal\n";
        let tabs = parse_applescript_tab_lines(out, BrowserKind::Brave);
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url, "https://a.example/x");
        assert_eq!(tabs[0].title, "Page A");
        assert_eq!(tabs[0].browser, BrowserKind::Brave);
    }
}
