//! Desktop context capture and session restoration engine.
//!
//! Captures a point-in-time picture of a work session (open windows, browser
//! tabs, recent browser history, clipboard, recently opened files), stores it
//! signed and indexed on disk, and restores it later on a best-effort basis.
//! Browser tabs arrive through a ranked chain of sources headed by a
//! loopback-only relay service that a browser extension pushes to.

pub mod capture;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod platform;
pub mod relay;
pub mod restore;
pub mod store;
pub mod toolexec;

pub use error::{EngineError, Result};
