//! Capture data model
//!
//! Wire and stored forms serialize with camelCase field names; the session
//! files and the relay payload share this layout with the companion
//! extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::platform::BrowserKind;

/// A visible top-level application window at capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub process_name: String,
    pub title: String,
}

/// An open browser tab; `url` is always http(s), enforced at every producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTab {
    pub url: String,
    pub title: String,
    pub browser: BrowserKind,
}

impl BrowserTab {
    /// Convert a relay push entry, dropping anything that is not http(s)
    pub fn from_relay(tab: RelayTab, browser: BrowserKind) -> Option<Self> {
        if !is_web_url(&tab.url) {
            return None;
        }
        Some(Self {
            url: tab.url,
            title: tab.title,
            browser,
        })
    }
}

/// Transport form pushed by the companion extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTab {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u64>,
}

/// A recently visited page from browser history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
    pub visited_at: DateTime<Utc>,
    pub browser: BrowserKind,
}

/// One point-in-time capture, prior to durable storage.
///
/// Mutable only during the capture phase; promotion to a stored session
/// freezes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
    #[serde(default)]
    pub clipboard: String,
    #[serde(default)]
    pub recent_files: Vec<String>,
    #[serde(default)]
    pub browser_tabs: Vec<BrowserTab>,
    #[serde(default)]
    pub browser_history: Vec<HistoryEntry>,
}

/// True when `url` parses and uses the http or https scheme
pub fn is_web_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// URL with query and fragment stripped, for de-duplication keys.
///
/// Unparseable input falls back to a manual split so dedup never panics on
/// odd rows from a history database.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => {
            let no_fragment = url.split('#').next().unwrap_or(url);
            no_fragment.split('?').next().unwrap_or(no_fragment).to_string()
        }
    }
}
