//! Context capture orchestrator
//!
//! Fans the collectors out as independent concurrent tasks and assembles one
//! [`SessionSnapshot`]. No collector shares mutable state with another, and
//! each degrades to an empty contribution on failure; only an unexpected
//! join error is surfaced.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::capture::history::HistoryReader;
use crate::capture::models::SessionSnapshot;
use crate::capture::tabs::TabCollector;
use crate::capture::windows::WindowSource;
use crate::clipboard::ClipboardAccess;

/// Cap on recent-file names included in a snapshot
pub const MAX_RECENT_FILES: usize = 15;

/// Collaborator seam: produces a plain-text summary of a snapshot.
///
/// Concrete LLM adapters live outside the core; any failure here degrades to
/// a placeholder so a snapshot can always be stored.
#[async_trait]
pub trait SessionSummarizer: Send + Sync {
    async fn summarize(&self, snapshot: &SessionSnapshot) -> Result<String, String>;
}

/// Run the summarizer, degrading failure to a placeholder summary
pub async fn summarize_or_placeholder(
    summarizer: &dyn SessionSummarizer,
    snapshot: &SessionSnapshot,
) -> String {
    match summarizer.summarize(snapshot).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("summarizer failed, storing placeholder: {e}");
            "(summary unavailable)".to_string()
        }
    }
}

/// Assembles one point-in-time snapshot from the collectors
pub struct CaptureOrchestrator {
    windows: Arc<dyn WindowSource>,
    tabs: TabCollector,
    history: Arc<HistoryReader>,
    clipboard: Arc<dyn ClipboardAccess>,
    recent_items_dir: Option<PathBuf>,
    capture_clipboard: bool,
}

impl CaptureOrchestrator {
    pub fn new(
        windows: Arc<dyn WindowSource>,
        tabs: TabCollector,
        history: Arc<HistoryReader>,
        clipboard: Arc<dyn ClipboardAccess>,
        recent_items_dir: Option<PathBuf>,
        capture_clipboard: bool,
    ) -> Self {
        Self {
            windows,
            tabs,
            history,
            clipboard,
            recent_items_dir,
            capture_clipboard,
        }
    }

    /// Capture a snapshot now.
    ///
    /// Window, tab, and history collection run concurrently; history is
    /// blocking work and runs on the blocking pool. There is no cancellation
    /// of an in-flight capture.
    pub async fn capture(&self) -> SessionSnapshot {
        let history_reader = Arc::clone(&self.history);
        let history_task =
            tokio::task::spawn_blocking(move || history_reader.recent_history(Utc::now()));

        let (windows, browser_tabs) =
            tokio::join!(self.windows.list_windows(), self.tabs.collect());

        let browser_history = match history_task.await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("history collection task failed: {e}");
                Vec::new()
            }
        };

        let clipboard = if self.capture_clipboard {
            self.clipboard.read_text().unwrap_or_default()
        } else {
            String::new()
        };

        let recent_files = self
            .recent_items_dir
            .as_deref()
            .map(|dir| list_recent_files(dir, MAX_RECENT_FILES))
            .unwrap_or_default();

        info!(
            windows = windows.len(),
            tabs = browser_tabs.len(),
            history = browser_history.len(),
            recent_files = recent_files.len(),
            "captured session snapshot"
        );

        SessionSnapshot {
            windows,
            clipboard,
            recent_files,
            browser_tabs,
            browser_history,
        }
    }
}

/// Best-effort listing of the recent-items folder, newest first
fn list_recent_files(dir: &Path, cap: usize) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("recent-items folder unreadable: {e}");
            return Vec::new();
        }
    };

    let mut files: Vec<(std::time::SystemTime, String)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            let name = e.file_name().to_str()?.to_string();
            Some((modified, name))
        })
        .collect();

    files.sort_by(|a, b| b.0.cmp(&a.0));
    files.truncate(cap);
    files.into_iter().map(|(_, name)| name).collect()
}
