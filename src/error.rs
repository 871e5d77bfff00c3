//! Error taxonomy for the capture/restore engine
//!
//! Per-source failures (tool missing, timeout, unparseable output) are
//! normally recovered by the collectors themselves by substituting an empty
//! result; these variants exist so the boundary between "degrade" and
//! "surface" stays typed rather than stringly.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Engine-wide error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Platform automation tool is missing or crashed on startup
    #[error("automation tool unavailable: {0}")]
    ToolUnavailable(String),

    /// Bounded wait on an external tool expired
    #[error("automation tool timed out after {0:?}")]
    ToolTimeout(Duration),

    /// Tool or JSON output could not be parsed
    #[error("malformed tool output: {0}")]
    MalformedOutput(String),

    /// Stored session bytes no longer match their integrity signature
    #[error("stored session {0} failed integrity verification")]
    Tampered(String),

    /// Item failed an allow-pattern or URL-scheme check
    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    /// Payload exceeded a hard size cap
    #[error("payload exceeds limit of {limit} bytes")]
    Oversized { limit: usize },

    /// Store is unusable (base directory could not be created)
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;
