//! Session context capture
//!
//! Collectors for the pieces of a work session: open windows, browser tabs
//! (ranked relay / debug-protocol / UI-automation chain), recent browser
//! history, the clipboard, and recently opened files. The orchestrator runs
//! them concurrently and assembles a [`models::SessionSnapshot`].

pub mod cdp;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod tabs;
pub mod uia;
pub mod windows;

pub use models::{BrowserTab, HistoryEntry, RelayTab, SessionSnapshot, WindowInfo};
pub use orchestrator::CaptureOrchestrator;
