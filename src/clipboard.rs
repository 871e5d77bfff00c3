//! Clipboard access behind a trait so capture and restore stay testable

use tracing::warn;

/// Read/write access to the system clipboard
pub trait ClipboardAccess: Send + Sync {
    /// Current clipboard text, or None when empty/unreadable
    fn read_text(&self) -> Option<String>;

    /// Replace the clipboard contents
    fn write_text(&self, text: &str) -> Result<(), String>;
}

/// System clipboard via arboard.
///
/// A fresh handle is opened per call; arboard contexts are cheap and holding
/// one open can block other clipboard users on X11.
pub struct SystemClipboard;

impl ClipboardAccess for SystemClipboard {
    fn read_text(&self) -> Option<String> {
        let mut clipboard = match arboard::Clipboard::new() {
            Ok(c) => c,
            Err(e) => {
                warn!("clipboard unavailable: {e}");
                return None;
            }
        };
        match clipboard.get_text() {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!("clipboard read failed: {e}");
                None
            }
        }
    }

    fn write_text(&self, text: &str) -> Result<(), String> {
        let mut clipboard = arboard::Clipboard::new().map_err(|e| e.to_string())?;
        clipboard.set_text(text).map_err(|e| e.to_string())
    }
}
