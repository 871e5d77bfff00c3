//! Session store: disk I/O, signing, index, retention
//!
//! Sessions live under `<state-dir>/sessions/` as one JSON file per session
//! plus a detached `.sig` signature, with an `index.json` listing sessions
//! newest first. Writes are atomic (temp file + fsync + rename) with strict
//! permissions, and the index is only updated after the session file and its
//! signature are durable. Index updates are serialized through an advisory
//! file lock.

pub mod integrity;
pub mod migrate;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capture::models::SessionSnapshot;
use crate::error::{EngineError, Result};

/// Maximum number of files to scan during stale-temp cleanup
const CLEANUP_SCAN_LIMIT: usize = 1000;

/// Age threshold for temp file cleanup (1 hour)
const CLEANUP_AGE_THRESHOLD: StdDuration = StdDuration::from_secs(3600);

const INDEX_FILE: &str = "index.json";
const INDEX_LOCK_FILE: &str = "index.lock";

/// Time source, injectable for tests
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A captured session as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub ai_summary: String,
    pub user_note: String,
    pub approved: bool,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

/// Index row: enough to render a session list without opening session files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub ai_summary: String,
}

/// Caller-supplied annotations attached to a snapshot at save time
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub ai_summary: String,
    pub user_note: String,
    pub approved: bool,
}

/// Session store rooted at `<state-dir>/sessions/`
pub struct SessionStore {
    sessions_dir: PathBuf,
    signing_key: Option<Vec<u8>>,
    available: bool,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store, marking it unavailable if the directory or signing
    /// key cannot be set up. Unavailable stores fail every operation with a
    /// typed error rather than panicking.
    pub fn new(state_dir: &Path) -> Self {
        Self::with_clock(state_dir, Arc::new(SystemClock))
    }

    pub fn with_clock(state_dir: &Path, clock: Arc<dyn Clock>) -> Self {
        let sessions_dir = state_dir.join("sessions");
        let dirs_ok = ensure_private_dir(&sessions_dir);

        let signing_key = if dirs_ok {
            match integrity::load_or_create_key(&state_dir.join("signing.key")) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("signing key unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let available = dirs_ok && signing_key.is_some();
        Self {
            sessions_dir,
            signing_key,
            available,
            clock,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    fn ensure_available(&self) -> Result<&[u8]> {
        if !self.available {
            return Err(EngineError::StoreUnavailable(
                "session store directory or signing key could not be set up".to_string(),
            ));
        }
        // available implies the key is present
        Ok(self.signing_key.as_deref().unwrap_or_default())
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{id}.json"))
    }

    fn signature_path(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{id}.sig"))
    }

    /// Persist a snapshot as a new session.
    ///
    /// Write order: session file, then its signature, then the index. A
    /// crash between steps leaves at worst an unindexed session file, never
    /// an index entry pointing at a missing or unsigned session.
    pub fn save(&self, snapshot: SessionSnapshot, meta: SessionMeta) -> Result<StoredSession> {
        let key = self.ensure_available()?;

        let session = StoredSession {
            id: Uuid::new_v4().to_string(),
            captured_at: self.clock.now_utc(),
            ai_summary: meta.ai_summary,
            user_note: meta.user_note,
            approved: meta.approved,
            snapshot,
        };

        let payload = serde_json::to_string_pretty(&session)?;
        write_atomic(&self.session_path(&session.id), payload.as_bytes())?;

        let signature = integrity::sign(key, payload.as_bytes())?;
        write_atomic(&self.signature_path(&session.id), signature.as_bytes())?;

        let _lock = self.lock_index()?;
        let mut index = self.read_index()?;
        index.insert(
            0,
            IndexEntry {
                id: session.id.clone(),
                captured_at: session.captured_at,
                ai_summary: session.ai_summary.clone(),
            },
        );
        self.write_index(&index)?;

        debug!("saved session {}", session.id);
        Ok(session)
    }

    /// Load a session by id.
    ///
    /// Returns `Ok(None)` when the session does not exist, and also when its
    /// signature fails to verify; a tampered session is indistinguishable
    /// from an absent one to callers, but is logged distinctly.
    pub fn load(&self, id: &str) -> Result<Option<StoredSession>> {
        let key = self.ensure_available()?;

        if !is_safe_id(id) {
            return Err(EngineError::ValidationRejected(format!(
                "session id {id:?} contains path characters"
            )));
        }

        let path = self.session_path(id);
        let payload = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match fs::read_to_string(self.signature_path(id)) {
            Ok(signature) => {
                if !integrity::verify(key, &payload, &signature) {
                    warn!("session {id} failed integrity verification, treating as absent");
                    return Ok(None);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Sessions written before signing existed have no .sig file.
                debug!("session {id} has no signature, accepting");
            }
            Err(e) => return Err(e.into()),
        }

        let record: migrate::StoredSessionRecord = serde_json::from_slice(&payload)?;
        Ok(Some(migrate::to_current(record)))
    }

    /// Index entries, newest first
    pub fn list(&self) -> Result<Vec<IndexEntry>> {
        self.ensure_available()?;
        self.read_index()
    }

    /// Load every indexed session, preserving index order and skipping
    /// entries that fail to load or verify.
    pub fn load_all(&self) -> Result<Vec<StoredSession>> {
        let index = self.list()?;
        let mut sessions = Vec::with_capacity(index.len());
        for entry in index {
            match self.load(&entry.id) {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => warn!("indexed session {} is missing or tampered", entry.id),
                Err(e) => warn!("indexed session {} failed to load: {e}", entry.id),
            }
        }
        Ok(sessions)
    }

    /// Delete sessions older than `max_age_days`, returning how many were
    /// removed. Both the session file and its signature are deleted; the
    /// index is rewritten to the retained entries.
    pub fn prune(&self, max_age_days: i64) -> Result<usize> {
        self.ensure_available()?;
        let cutoff = self.clock.now_utc() - Duration::days(max_age_days);

        let _lock = self.lock_index()?;
        let index = self.read_index()?;
        let (retained, expired): (Vec<IndexEntry>, Vec<IndexEntry>) =
            index.into_iter().partition(|e| e.captured_at >= cutoff);

        for entry in &expired {
            for path in [self.session_path(&entry.id), self.signature_path(&entry.id)] {
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("failed to delete {}: {e}", path.display());
                    }
                }
            }
        }

        self.write_index(&retained)?;
        Ok(expired.len())
    }

    /// Delete `*.tmp.*` leftovers from interrupted writes.
    ///
    /// Only files older than an hour are removed, and at most
    /// [`CLEANUP_SCAN_LIMIT`] files are examined so startup stays bounded.
    /// Returns (deleted, scanned, hit_limit).
    pub fn cleanup_stale_temps(&self) -> Result<(usize, usize, bool)> {
        if !self.available {
            return Ok((0, 0, false));
        }

        let mut scanned = 0;
        let mut deleted = 0;
        let now = SystemTime::now();

        for entry in walkdir::WalkDir::new(&self.sessions_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if scanned >= CLEANUP_SCAN_LIMIT {
                warn!("hit cleanup scan limit ({CLEANUP_SCAN_LIMIT})");
                return Ok((deleted, scanned, true));
            }

            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            scanned += 1;

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.contains(".tmp.") {
                continue;
            }

            let stale = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > CLEANUP_AGE_THRESHOLD);
            if stale {
                match fs::remove_file(path) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!("failed to delete stale temp {}: {e}", path.display()),
                }
            }
        }

        Ok((deleted, scanned, false))
    }

    fn lock_index(&self) -> Result<fs::File> {
        let lock = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.sessions_dir.join(INDEX_LOCK_FILE))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn read_index(&self) -> Result<Vec<IndexEntry>> {
        match fs::read_to_string(self.sessions_dir.join(INDEX_FILE)) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_index(&self, entries: &[IndexEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.sessions_dir.join(INDEX_FILE), json.as_bytes())
    }
}

/// Session ids are generated UUIDs; anything else is rejected before it can
/// reach the filesystem as a path component.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn ensure_private_dir(dir: &Path) -> bool {
    match fs::create_dir_all(dir) {
        Ok(()) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    warn!("failed to set permissions on {}: {e}", dir.display());
                    return false;
                }
            }
            true
        }
        Err(e) => {
            warn!("failed to create session directory {}: {e}", dir.display());
            false
        }
    }
}

/// Atomic write: temp file in the same directory + fsync + rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| EngineError::StoreUnavailable("path has no parent".to_string()))?;
    let temp_name = format!(
        "{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    );
    let temp_path = dir.join(temp_name);

    let mut file = fs::File::create(&temp_path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::models::{BrowserTab, WindowInfo};
    use crate::platform::BrowserKind;
    use tempfile::TempDir;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            windows: vec![WindowInfo {
                process_name: "code".to_string(),
                title: "main.rs".to_string(),
            }],
            clipboard: "copied".to_string(),
            recent_files: vec!["notes.md".to_string()],
            browser_tabs: vec![BrowserTab {
                url: "https://docs.rs/axum".to_string(),
                title: "axum".to_string(),
                browser: BrowserKind::Chrome,
            }],
            browser_history: Vec::new(),
        }
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        assert!(store.is_available());

        let saved = store
            .save(
                snapshot(),
                SessionMeta {
                    ai_summary: "editing main.rs".to_string(),
                    user_note: String::new(),
                    approved: true,
                },
            )
            .unwrap();

        let loaded = store.load(&saved.id).unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        store.save(snapshot(), SessionMeta::default()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp.path().join("sessions"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| n.contains(".tmp."))
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_load_missing_session_is_none() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        assert!(store
            .load("00000000-0000-0000-0000-000000000000")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_load_rejects_path_like_ids() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        assert!(store.load("../escape").is_err());
        assert!(store.load("a/b").is_err());
        assert!(store.load("").is_err());
    }

    #[test]
    fn test_tampered_session_loads_as_absent() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        let saved = store.save(snapshot(), SessionMeta::default()).unwrap();

        let path = temp.path().join("sessions").join(format!("{}.json", saved.id));
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, &bytes).unwrap();

        assert!(store.load(&saved.id).unwrap().is_none());
    }

    #[test]
    fn test_unsigned_legacy_session_is_accepted() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        let saved = store.save(snapshot(), SessionMeta::default()).unwrap();

        fs::remove_file(temp.path().join("sessions").join(format!("{}.sig", saved.id))).unwrap();
        assert!(store.load(&saved.id).unwrap().is_some());
    }

    #[test]
    fn test_index_is_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        let first = store.save(snapshot(), SessionMeta::default()).unwrap();
        let second = store.save(snapshot(), SessionMeta::default()).unwrap();

        let index = store.list().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[0].id, second.id);
        assert_eq!(index[1].id, first.id);
    }

    #[test]
    fn test_load_all_skips_tampered_sessions() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        let bad = store.save(snapshot(), SessionMeta::default()).unwrap();
        let good = store.save(snapshot(), SessionMeta::default()).unwrap();

        let bad_path = temp.path().join("sessions").join(format!("{}.json", bad.id));
        fs::write(&bad_path, b"{\"not\": \"the original\"}").unwrap();

        let sessions = store.load_all().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, good.id);
    }

    struct TestClock(std::sync::Mutex<DateTime<Utc>>);

    impl Clock for TestClock {
        fn now_utc(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn test_prune_removes_only_expired_sessions() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(TestClock(std::sync::Mutex::new(Utc::now())));
        let store = SessionStore::with_clock(temp.path(), clock.clone());

        *clock.0.lock().unwrap() = Utc::now() - Duration::days(100);
        let old = store.save(snapshot(), SessionMeta::default()).unwrap();

        *clock.0.lock().unwrap() = Utc::now() - Duration::days(10);
        let recent = store.save(snapshot(), SessionMeta::default()).unwrap();

        *clock.0.lock().unwrap() = Utc::now();
        let removed = store.prune(90).unwrap();
        assert_eq!(removed, 1);

        assert!(store.load(&old.id).unwrap().is_none());
        assert!(store.load(&recent.id).unwrap().is_some());

        let index = store.list().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].id, recent.id);
    }

    #[test]
    fn test_cleanup_deletes_only_old_temps() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        let sessions_dir = temp.path().join("sessions");

        let fresh = sessions_dir.join("a.json.tmp.123");
        fs::write(&fresh, "fresh").unwrap();

        let old = sessions_dir.join("b.json.tmp.456");
        fs::write(&old, "old").unwrap();
        let two_hours_ago = SystemTime::now() - StdDuration::from_secs(7200);
        filetime::set_file_mtime(&old, filetime::FileTime::from_system_time(two_hours_ago))
            .unwrap();

        let (deleted, scanned, hit_limit) = store.cleanup_stale_temps().unwrap();
        assert_eq!(deleted, 1);
        assert!(scanned >= 2);
        assert!(!hit_limit);
        assert!(fresh.exists());
        assert!(!old.exists());
    }

    #[test]
    fn test_unavailable_store_returns_typed_error() {
        let store = SessionStore::new(Path::new("/dev/null/cannot-create"));
        assert!(!store.is_available());
        let result = store.save(snapshot(), SessionMeta::default());
        assert!(matches!(result, Err(EngineError::StoreUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_session_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        let saved = store.save(snapshot(), SessionMeta::default()).unwrap();

        let sessions_dir = temp.path().join("sessions");
        let dir_mode = fs::metadata(&sessions_dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let file_mode = fs::metadata(sessions_dir.join(format!("{}.json", saved.id)))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
