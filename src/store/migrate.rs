//! Stored-session migration
//!
//! Sessions are read through a permissive record shape so files written by
//! older releases still load. Early releases stored a flat `urls` list
//! instead of structured browser tabs; those are normalized on load so the
//! rest of the engine only ever sees the current shape. Files are never
//! rewritten in place.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::capture::models::{is_web_url, BrowserTab, HistoryEntry, SessionSnapshot, WindowInfo};
use crate::platform::BrowserKind;

use super::StoredSession;

/// On-disk session shape across all releases
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSessionRecord {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub ai_summary: String,
    #[serde(default)]
    pub user_note: String,
    #[serde(default = "default_approved")]
    pub approved: bool,
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
    #[serde(default)]
    pub clipboard: String,
    #[serde(default)]
    pub recent_files: Vec<String>,
    /// Current shape; absent in legacy files
    #[serde(default)]
    pub browser_tabs: Option<Vec<BrowserTab>>,
    /// Legacy flat URL list, superseded by `browserTabs`
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub browser_history: Vec<HistoryEntry>,
}

fn default_approved() -> bool {
    true
}

/// Normalize a record of any vintage to the current session shape
pub fn to_current(record: StoredSessionRecord) -> StoredSession {
    let browser_tabs = match record.browser_tabs {
        Some(tabs) => tabs,
        None => legacy_urls_to_tabs(record.urls.unwrap_or_default()),
    };

    StoredSession {
        id: record.id,
        captured_at: record.captured_at,
        ai_summary: record.ai_summary,
        user_note: record.user_note,
        approved: record.approved,
        snapshot: SessionSnapshot {
            windows: record.windows,
            clipboard: record.clipboard,
            recent_files: record.recent_files,
            browser_tabs,
            browser_history: record.browser_history,
        },
    }
}

/// Legacy files carried bare URLs with no title or browser attribution
fn legacy_urls_to_tabs(urls: Vec<String>) -> Vec<BrowserTab> {
    urls.into_iter()
        .filter(|url| is_web_url(url))
        .map(|url| BrowserTab {
            url,
            title: String::new(),
            browser: BrowserKind::Chrome,
        })
        .collect()
}
