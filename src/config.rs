//! Engine configuration and state directories
//!
//! Read-only input to the core: capture parameters, relay port, retention.
//! Environment overrides follow the same pattern the state directory does so
//! test harnesses can point the engine at a scratch location.

use std::path::{Path, PathBuf};

use crate::platform::BrowserKind;

/// Default local relay port the companion extension pushes to
pub const DEFAULT_RELAY_PORT: u16 = 9224;

/// Default lookback window for browser history, in minutes
pub const DEFAULT_HISTORY_WINDOW_MINUTES: i64 = 120;

/// Default retention horizon for stored sessions, in days
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Engine-wide configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for persistent state (sessions, signing key)
    pub state_dir: PathBuf,
    /// Loopback port the tab relay listens on
    pub relay_port: u16,
    /// How far back browser history is read, in minutes
    pub history_window_minutes: i64,
    /// Whether clipboard text is included in captures
    pub capture_clipboard: bool,
    /// Browser used when restoring URLs and tagging relay tabs
    pub preferred_browser: BrowserKind,
    /// Stored sessions older than this many days are pruned
    pub retention_days: i64,
}

impl EngineConfig {
    /// Configuration with default paths and parameters
    pub fn default_paths() -> Self {
        let state_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".resurface");
        Self {
            state_dir,
            relay_port: DEFAULT_RELAY_PORT,
            history_window_minutes: DEFAULT_HISTORY_WINDOW_MINUTES,
            capture_clipboard: true,
            preferred_browser: BrowserKind::Chrome,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default_paths();

        if let Ok(dir) = std::env::var("RESURFACE_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(port) = env_parse::<u16>("RESURFACE_RELAY_PORT") {
            config.relay_port = port;
        }
        if let Some(minutes) = env_parse::<i64>("RESURFACE_HISTORY_WINDOW_MINUTES") {
            if minutes > 0 {
                config.history_window_minutes = minutes;
            }
        }
        if let Some(days) = env_parse::<i64>("RESURFACE_RETENTION_DAYS") {
            if days > 0 {
                config.retention_days = days;
            }
        }
        if std::env::var("RESURFACE_DISABLE_CLIPBOARD").is_ok() {
            config.capture_clipboard = false;
        }

        config
    }

    /// Directory holding session files, signatures, and the index
    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    /// Path to the persisted signing key
    pub fn signing_key_path(&self) -> PathBuf {
        self.state_dir.join("signing.key")
    }

    /// Override the state directory (used by tests and the daemon)
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.state_dir = dir.as_ref().to_path_buf();
        self
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default_paths();
        assert_eq!(config.relay_port, DEFAULT_RELAY_PORT);
        assert_eq!(config.history_window_minutes, DEFAULT_HISTORY_WINDOW_MINUTES);
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);
        assert!(config.capture_clipboard);
        assert!(config.state_dir.ends_with(".resurface"));
    }

    #[test]
    fn test_derived_paths_live_under_state_dir() {
        let config = EngineConfig::default_paths().with_state_dir("/tmp/resurface-test");
        assert_eq!(
            config.sessions_dir(),
            PathBuf::from("/tmp/resurface-test/sessions")
        );
        assert_eq!(
            config.signing_key_path(),
            PathBuf::from("/tmp/resurface-test/signing.key")
        );
    }
}
