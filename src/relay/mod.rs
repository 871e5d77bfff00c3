//! Tab relay service
//!
//! Loopback-only HTTP service the browser extension pushes open tabs to.
//! The relay is the highest-ranked tab source: once the extension has pushed
//! at least once, no scraping fallback runs.
//!
//! Auth model: the bearer token is regenerated on every service start and
//! handed out only over `GET /token`, which (like `/tabs`) is gated to
//! requests whose `Origin` is a browser-extension origin or absent. A stale
//! token from a previous run is never valid.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rand::RngCore;
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::capture::models::{BrowserTab, RelayTab};
use crate::error::Result;
use crate::platform::BrowserKind;

/// Fixed loopback port the extension is configured against
pub const DEFAULT_RELAY_PORT: u16 = 9224;

/// Request body cap; a tab push is far smaller than this
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const EXTENSION_ORIGIN_SCHEMES: &[&str] = &[
    "chrome-extension://",
    "moz-extension://",
    "safari-web-extension://",
];

/// Shared relay state: the per-run token and the most recent accepted push
pub struct RelayState {
    token: String,
    browser: BrowserKind,
    latest: RwLock<Option<Arc<Vec<BrowserTab>>>>,
}

impl RelayState {
    /// Convert and store a pushed tab batch, returning how many tabs were
    /// accepted. Non-web URLs are dropped; the stored batch is replaced
    /// atomically, never merged.
    fn accept(&self, pushed: Vec<RelayTab>) -> usize {
        let tabs: Vec<BrowserTab> = pushed
            .into_iter()
            .filter_map(|t| BrowserTab::from_relay(t, self.browser))
            .collect();
        let accepted = tabs.len();
        *self.latest.write().expect("relay state lock poisoned") = Some(Arc::new(tabs));
        accepted
    }

    fn latest(&self) -> Option<Arc<Vec<BrowserTab>>> {
        self.latest.read().expect("relay state lock poisoned").clone()
    }
}

/// Cheap cloneable view of the relay for the capture pipeline
#[derive(Clone)]
pub struct RelayHandle {
    state: Arc<RelayState>,
}

impl RelayHandle {
    /// The last accepted push, or `None` if the extension has never pushed.
    /// An empty push is `Some(vec![])`, which is authoritative.
    pub fn latest_tabs(&self) -> Option<Vec<BrowserTab>> {
        self.state.latest().map(|tabs| tabs.as_ref().clone())
    }
}

/// The relay HTTP service
pub struct RelayService {
    state: Arc<RelayState>,
}

impl RelayService {
    /// Create a relay with a freshly generated bearer token
    pub fn new(browser: BrowserKind) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self {
            state: Arc::new(RelayState {
                token: hex::encode(secret),
                browser,
                latest: RwLock::new(None),
            }),
        }
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// The current bearer token; valid only for this service instance
    pub fn token(&self) -> &str {
        &self.state.token
    }

    pub fn router(&self) -> Router {
        let state = Arc::clone(&self.state);

        let authed = Router::new()
            .route("/tabs", get(get_tabs).post(post_tabs))
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                require_bearer,
            ));

        let extension_facing = Router::new()
            .route("/token", get(issue_token))
            .merge(authed)
            .route_layer(middleware::from_fn(origin_gate));

        Router::new()
            .route("/ping", get(ping))
            .merge(extension_facing)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .with_state(state)
    }

    /// Bind to loopback and serve until the task is dropped or errors
    pub async fn serve(&self, port: u16) -> Result<()> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await?;
        info!("tab relay listening on {addr}");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Reject cross-origin browsers while letting extension pages and
/// non-browser clients (which send no `Origin`) through.
fn is_allowed_origin(origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(origin) => EXTENSION_ORIGIN_SCHEMES
            .iter()
            .any(|scheme| origin.starts_with(scheme)),
    }
}

async fn origin_gate(request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !is_allowed_origin(origin) {
        debug!("relay rejected disallowed origin {origin:?}");
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

async fn require_bearer(
    State(state): State<Arc<RelayState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token_matches(token, &state.token) => next.run(request).await,
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

fn token_matches(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn issue_token(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(json!({ "token": state.token }))
}

async fn post_tabs(
    State(state): State<Arc<RelayState>>,
    Json(tabs): Json<Vec<RelayTab>>,
) -> impl IntoResponse {
    let accepted = state.accept(tabs);
    debug!("relay accepted {accepted} tabs");
    Json(json!({ "accepted": accepted }))
}

async fn get_tabs(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let tabs = state
        .latest()
        .map(|t| t.as_ref().clone())
        .unwrap_or_default();
    Json(tabs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_origins_allowed() {
        assert!(is_allowed_origin(None));
        assert!(is_allowed_origin(Some("chrome-extension://abcdef")));
        assert!(is_allowed_origin(Some("moz-extension://1234")));
        assert!(is_allowed_origin(Some("safari-web-extension://xyz")));
    }

    #[test]
    fn test_web_origins_rejected() {
        assert!(!is_allowed_origin(Some("https://evil.example")));
        assert!(!is_allowed_origin(Some("http://localhost:9224")));
        assert!(!is_allowed_origin(Some("null")));
    }

    #[test]
    fn test_token_regenerated_per_start() {
        let a = RelayService::new(BrowserKind::Chrome);
        let b = RelayService::new(BrowserKind::Chrome);
        assert_ne!(a.token(), b.token());
        assert_eq!(a.token().len(), 64);
    }

    #[test]
    fn test_token_match_requires_exact_value() {
        assert!(token_matches("abc123", "abc123"));
        assert!(!token_matches("abc124", "abc123"));
        assert!(!token_matches("abc12", "abc123"));
        assert!(!token_matches("", "abc123"));
    }

    #[test]
    fn test_accept_replaces_rather_than_merges() {
        let service = RelayService::new(BrowserKind::Chrome);
        let handle = service.handle();
        assert!(handle.latest_tabs().is_none());

        service.state.accept(vec![RelayTab {
            url: "https://a.example".to_string(),
            title: "A".to_string(),
            active: true,
            window_id: None,
        }]);
        assert_eq!(handle.latest_tabs().unwrap().len(), 1);

        let accepted = service.state.accept(Vec::new());
        assert_eq!(accepted, 0);
        // An empty push is authoritative, not absence.
        assert_eq!(handle.latest_tabs().unwrap().len(), 0);
    }

    #[test]
    fn test_accept_drops_non_web_urls() {
        let service = RelayService::new(BrowserKind::Edge);
        let accepted = service.state.accept(vec![
            RelayTab {
                url: "https://ok.example".to_string(),
                title: "ok".to_string(),
                active: false,
                window_id: Some(1),
            },
            RelayTab {
                url: "chrome://settings".to_string(),
                title: "internal".to_string(),
                active: false,
                window_id: Some(1),
            },
        ]);
        assert_eq!(accepted, 1);
    }
}
