//! Long-running engine daemon: starts the tab relay, performs startup
//! housekeeping on the session store, and serves until interrupted.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use resurface::config::EngineConfig;
use resurface::relay::RelayService;
use resurface::store::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env();
    info!(state_dir = %config.state_dir.display(), "starting resurface daemon");

    let store = SessionStore::new(&config.state_dir);
    if store.is_available() {
        match store.cleanup_stale_temps() {
            Ok((deleted, scanned, hit_limit)) => {
                if deleted > 0 || hit_limit {
                    info!(deleted, scanned, hit_limit, "stale temp cleanup");
                }
            }
            Err(e) => warn!("stale temp cleanup failed: {e}"),
        }
        match store.prune(config.retention_days) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "pruned expired sessions"),
            Err(e) => warn!("session pruning failed: {e}"),
        }
    } else {
        warn!("session store unavailable, captures will not persist");
    }

    let relay = RelayService::new(config.preferred_browser);

    tokio::select! {
        result = relay.serve(config.relay_port) => {
            result.context("tab relay exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
