//! Tab collector: ranked source chain with explicit precedence
//!
//! Sources in strict priority order:
//! 1. relay — authoritative and cheapest once the extension has pushed
//! 2. debug-protocol — every open tab, when remote debugging is enabled
//! 3. UI-automation — active tab per window, scraped from the address bar
//!
//! When the relay has nothing, the two fallback sources run concurrently and
//! [`prefer_debug_protocol`] decides the winner.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::capture::models::BrowserTab;
use crate::relay::RelayHandle;

/// Hard cap on collected tabs, bounding downstream prompt/storage size
pub const MAX_TABS: usize = 30;

/// A fallback source of open browser tabs
#[async_trait]
pub trait TabSource: Send + Sync {
    /// Zero or more tabs; failures degrade to an empty result internally
    async fn fetch_tabs(&self) -> Vec<BrowserTab>;
}

/// Resolves the current set of open tabs through the ranked chain
pub struct TabCollector {
    relay: Option<RelayHandle>,
    debug_protocol: Arc<dyn TabSource>,
    automation: Arc<dyn TabSource>,
}

impl TabCollector {
    pub fn new(
        relay: Option<RelayHandle>,
        debug_protocol: Arc<dyn TabSource>,
        automation: Arc<dyn TabSource>,
    ) -> Self {
        Self {
            relay,
            debug_protocol,
            automation,
        }
    }

    /// Collect tabs, de-duplicated by exact URL and capped at [`MAX_TABS`]
    pub async fn collect(&self) -> Vec<BrowserTab> {
        if let Some(relay) = &self.relay {
            if let Some(tabs) = relay.latest_tabs() {
                // Relay has received at least one push: authoritative,
                // no other source is queried.
                return dedupe_and_cap(tabs, MAX_TABS);
            }
        }

        let (from_debug, from_automation) = tokio::join!(
            self.debug_protocol.fetch_tabs(),
            self.automation.fetch_tabs()
        );

        dedupe_and_cap(
            prefer_debug_protocol(from_debug, from_automation),
            MAX_TABS,
        )
    }
}

/// Precedence between the two fallback sources: the debug protocol sees every
/// open tab, so a non-empty result from it wins outright over the automation
/// scrape (which yields at most one tab per window).
pub fn prefer_debug_protocol(
    debug_protocol: Vec<BrowserTab>,
    automation: Vec<BrowserTab>,
) -> Vec<BrowserTab> {
    if debug_protocol.is_empty() {
        automation
    } else {
        debug_protocol
    }
}

/// De-duplicate by exact URL, preserving order, then cap. Idempotent.
pub fn dedupe_and_cap(tabs: Vec<BrowserTab>, cap: usize) -> Vec<BrowserTab> {
    let mut seen = HashSet::new();
    let mut out: Vec<BrowserTab> = tabs
        .into_iter()
        .filter(|tab| seen.insert(tab.url.clone()))
        .collect();
    out.truncate(cap);
    out
}

/// Strip a browser-chrome suffix from a window/page title, if present
pub(crate) fn strip_title_suffix(title: &str) -> String {
    use crate::platform::BrowserKind;

    for kind in [
        BrowserKind::Chrome,
        BrowserKind::Edge,
        BrowserKind::Brave,
        BrowserKind::Firefox,
    ] {
        for suffix in kind.title_suffixes() {
            if let Some(stripped) = title.strip_suffix(suffix) {
                return stripped.to_string();
            }
        }
    }
    title.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::BrowserKind;

    fn tab(url: &str) -> BrowserTab {
        BrowserTab {
            url: url.to_string(),
            title: "t".to_string(),
            browser: BrowserKind::Chrome,
        }
    }

    struct FixedSource(Vec<BrowserTab>);

    #[async_trait]
    impl TabSource for FixedSource {
        async fn fetch_tabs(&self) -> Vec<BrowserTab> {
            self.0.clone()
        }
    }

    #[test]
    fn test_dedupe_preserves_first_occurrence_order() {
        let tabs = vec![tab("https://a.example"), tab("https://b.example"), tab("https://a.example")];
        let out = dedupe_and_cap(tabs, 30);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://a.example");
        assert_eq!(out[1].url, "https://b.example");
    }

    #[test]
    fn test_dedupe_and_cap_is_idempotent() {
        let tabs: Vec<BrowserTab> = (0..40)
            .map(|i| tab(&format!("https://site{}.example", i % 35)))
            .collect();
        let once = dedupe_and_cap(tabs.clone(), MAX_TABS);
        let twice = dedupe_and_cap(once.clone(), MAX_TABS);
        assert_eq!(once, twice);
        assert!(once.len() <= MAX_TABS);
    }

    #[test]
    fn test_precedence_debug_protocol_wins_when_nonempty() {
        let from_debug = vec![tab("https://a.example"), tab("https://b.example")];
        let from_automation = vec![tab("https://c.example")];
        let winner = prefer_debug_protocol(from_debug.clone(), from_automation);
        assert_eq!(winner, from_debug);
    }

    #[test]
    fn test_precedence_falls_back_to_automation() {
        let from_automation = vec![tab("https://c.example")];
        let winner = prefer_debug_protocol(Vec::new(), from_automation.clone());
        assert_eq!(winner, from_automation);
    }

    #[test]
    fn test_strip_title_suffix() {
        assert_eq!(strip_title_suffix("Docs - Google Chrome"), "Docs");
        assert_eq!(strip_title_suffix("Docs - Microsoft Edge"), "Docs");
        assert_eq!(strip_title_suffix("Plain title"), "Plain title");
    }

    #[tokio::test]
    async fn test_collect_without_relay_uses_fallback_chain() {
        let collector = TabCollector::new(
            None,
            Arc::new(FixedSource(vec![tab("https://a.example"), tab("https://b.example")])),
            Arc::new(FixedSource(vec![tab("https://c.example")])),
        );
        let tabs = collector.collect().await;
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0].url, "https://a.example");
    }

    #[tokio::test]
    async fn test_collect_uses_automation_when_debug_protocol_empty() {
        let collector = TabCollector::new(
            None,
            Arc::new(FixedSource(Vec::new())),
            Arc::new(FixedSource(vec![tab("https://c.example")])),
        );
        let tabs = collector.collect().await;
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url, "https://c.example");
    }
}
