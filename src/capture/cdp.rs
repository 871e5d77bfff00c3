//! Debug-protocol tab source
//!
//! Queries the browser's remote-debugging HTTP endpoint for open page
//! targets. Only succeeds when the browser was launched with remote
//! debugging enabled; every failure degrades to an empty result.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::capture::models::{is_web_url, BrowserTab};
use crate::capture::tabs::{strip_title_suffix, TabSource};
use crate::platform::BrowserKind;

/// Well-known remote-debugging port
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

/// Bounded wait for the debug endpoint
const DEBUG_PROTOCOL_TIMEOUT: Duration = Duration::from_secs(5);

/// `/json/list` target subset
#[derive(Debug, Deserialize)]
struct DebugTarget {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
}

/// Tab source backed by the remote-debugging endpoint
pub struct DebugProtocolSource {
    port: u16,
    browser: BrowserKind,
}

impl DebugProtocolSource {
    pub fn new(browser: BrowserKind) -> Self {
        Self {
            port: DEFAULT_DEBUG_PORT,
            browser,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn fetch_targets(&self) -> Option<Vec<DebugTarget>> {
        let client = reqwest::Client::builder()
            .timeout(DEBUG_PROTOCOL_TIMEOUT)
            .build()
            .ok()?;

        // Loopback resolution differs per stack; try both spellings.
        for url in [
            format!("http://127.0.0.1:{}/json/list", self.port),
            format!("http://localhost:{}/json/list", self.port),
        ] {
            let response = match client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!("debug-protocol endpoint {url} unreachable: {e}");
                    continue;
                }
            };
            if !response.status().is_success() {
                debug!("debug-protocol endpoint returned {}", response.status());
                continue;
            }
            match response.json::<Vec<DebugTarget>>().await {
                Ok(targets) => return Some(targets),
                Err(e) => {
                    debug!("debug-protocol response unparseable: {e}");
                    return None;
                }
            }
        }
        None
    }
}

#[async_trait]
impl TabSource for DebugProtocolSource {
    async fn fetch_tabs(&self) -> Vec<BrowserTab> {
        match self.fetch_targets().await {
            Some(targets) => targets_to_tabs(targets, self.browser),
            None => Vec::new(),
        }
    }
}

/// Keep page targets with an http(s) URL and a non-empty title, stripping
/// browser-chrome title suffixes.
fn targets_to_tabs(targets: Vec<DebugTarget>, browser: BrowserKind) -> Vec<BrowserTab> {
    targets
        .into_iter()
        .filter(|t| t.kind == "page")
        .filter(|t| is_web_url(&t.url))
        .filter_map(|t| {
            let title = strip_title_suffix(&t.title);
            if title.is_empty() {
                return None;
            }
            Some(BrowserTab {
                url: t.url,
                title,
                browser,
            })
        })
        .collect()
}
