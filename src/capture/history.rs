//! Browser history reader
//!
//! The live `History` database may be exclusively locked by a running
//! browser, so each profile is copied to a scratch location and the copy is
//! queried read-only. The scratch copy is removed on every path, including
//! query failure.
//!
//! Chromium stores visit times as microseconds since 1601-01-01 (the vendor
//! epoch); conversion to the Unix epoch subtracts a fixed millisecond
//! offset.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::capture::models::{is_web_url, normalize_url, HistoryEntry};
use crate::platform::BrowserKind;

/// Milliseconds between 1601-01-01 and 1970-01-01
pub const VENDOR_EPOCH_OFFSET_MS: i64 = 11_644_473_600_000;

/// Per-profile row cap
pub const PER_PROFILE_CAP: usize = 60;

/// Cap on the merged, de-duplicated result
pub const COMBINED_CAP: usize = 40;

/// Convert a vendor-epoch timestamp (microseconds since 1601) to an instant
pub fn vendor_epoch_to_utc(micros: i64) -> Option<DateTime<Utc>> {
    let unix_ms = micros / 1000 - VENDOR_EPOCH_OFFSET_MS;
    Utc.timestamp_millis_opt(unix_ms).single()
}

/// Convert an instant to the vendor epoch (microseconds since 1601)
pub fn utc_to_vendor_epoch(instant: DateTime<Utc>) -> i64 {
    (instant.timestamp_millis() + VENDOR_EPOCH_OFFSET_MS) * 1000
}

/// Reads recent pages from every installed chromium-family profile
pub struct HistoryReader {
    profiles: Vec<(BrowserKind, PathBuf)>,
    window_minutes: i64,
    scratch_dir: PathBuf,
}

impl HistoryReader {
    pub fn new(profiles: Vec<(BrowserKind, PathBuf)>, window_minutes: i64) -> Self {
        Self {
            profiles,
            window_minutes,
            scratch_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scratch_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Recently visited pages across all profiles, newest first, merged and
    /// de-duplicated by normalized URL, capped at [`COMBINED_CAP`].
    ///
    /// Blocking (file copy + SQLite); run under `spawn_blocking` from async
    /// contexts.
    pub fn recent_history(&self, now: DateTime<Utc>) -> Vec<HistoryEntry> {
        let cutoff = now - Duration::minutes(self.window_minutes);
        let cutoff_vendor = utc_to_vendor_epoch(cutoff);

        let mut entries = Vec::new();
        for (browser, path) in &self.profiles {
            if !path.exists() {
                continue;
            }
            match self.read_profile(*browser, path, cutoff_vendor) {
                Ok(mut rows) => entries.append(&mut rows),
                Err(e) => {
                    warn!("history read for {browser:?} profile failed: {e}");
                }
            }
        }

        merge_history(entries)
    }

    fn read_profile(
        &self,
        browser: BrowserKind,
        path: &Path,
        cutoff_vendor: i64,
    ) -> Result<Vec<HistoryEntry>, String> {
        let scratch = ScratchCopy::create(path, &self.scratch_dir)
            .map_err(|e| format!("scratch copy failed: {e}"))?;

        let conn = Connection::open_with_flags(scratch.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| format!("open failed: {e}"))?;

        let mut stmt = conn
            .prepare(
                "SELECT url, title, last_visit_time FROM urls \
                 WHERE last_visit_time > ?1 \
                   AND (url LIKE 'http://%' OR url LIKE 'https://%') \
                 ORDER BY last_visit_time DESC LIMIT ?2",
            )
            .map_err(|e| format!("prepare failed: {e}"))?;

        let rows = stmt
            .query_map(
                rusqlite::params![cutoff_vendor, PER_PROFILE_CAP as i64],
                |row| {
                    let url: String = row.get(0)?;
                    let title: Option<String> = row.get(1)?;
                    let visit_time: i64 = row.get(2)?;
                    Ok((url, title.unwrap_or_default(), visit_time))
                },
            )
            .map_err(|e| format!("query failed: {e}"))?;

        let mut entries = Vec::new();
        for row in rows {
            let (url, title, visit_time) = match row {
                Ok(r) => r,
                Err(e) => {
                    debug!("skipping malformed history row: {e}");
                    continue;
                }
            };
            if !is_web_url(&url) {
                continue;
            }
            let Some(visited_at) = vendor_epoch_to_utc(visit_time) else {
                continue;
            };
            entries.push(HistoryEntry {
                url,
                title,
                visited_at,
                browser,
            });
        }
        Ok(entries)
        // ScratchCopy drop removes the temp file here, success or not
    }
}

/// De-duplicate by normalized URL keeping the newest visit, sort newest
/// first, cap at [`COMBINED_CAP`].
pub fn merge_history(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut newest: HashMap<String, HistoryEntry> = HashMap::new();
    for entry in entries {
        let key = normalize_url(&entry.url);
        match newest.get(&key) {
            Some(existing) if existing.visited_at >= entry.visited_at => {}
            _ => {
                newest.insert(key, entry);
            }
        }
    }

    let mut merged: Vec<HistoryEntry> = newest.into_values().collect();
    merged.sort_by(|a, b| b.visited_at.cmp(&a.visited_at));
    merged.truncate(COMBINED_CAP);
    merged
}

/// Temporary copy of a history database, removed on drop
struct ScratchCopy {
    path: PathBuf,
}

impl ScratchCopy {
    fn create(source: &Path, scratch_dir: &Path) -> std::io::Result<Self> {
        let name = format!(
            "resurface-history-{}-{}.sqlite",
            std::process::id(),
            uuid::Uuid::new_v4()
        );
        let path = scratch_dir.join(name);
        fs::copy(source, &path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchCopy {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("failed to remove history scratch copy: {e}");
        }
    }
}
