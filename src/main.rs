//! Treeline - backcountry risk assessment synthesis.
//!
//! # API Endpoints
//!
//! - `GET /safety` - Synthesized risk assessment for a point and start time
//! - `GET /health` - Health check

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use treeline::api::{router, AppState};
use treeline::cache::SafetyCache;
use treeline::orchestrator::Providers;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default whole-request fetch deadline, seconds.
const DEFAULT_DEADLINE_SECS: u64 = 9;

/// Default cache capacity, entries.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("treeline=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("TREELINE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let deadline_secs: u64 = env::var("TREELINE_DEADLINE_SECS")
        .ok()
        .and_then(|d| d.parse().ok())
        .unwrap_or(DEFAULT_DEADLINE_SECS);

    let cache_capacity: usize = env::var("TREELINE_CACHE_CAPACITY")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(DEFAULT_CACHE_CAPACITY);

    info!(port, deadline_secs, cache_capacity, "Starting Treeline server");

    let cache = SafetyCache::with_capacity(cache_capacity);
    let providers = Providers::new(cache, Duration::from_secs(deadline_secs));
    let state = AppState { providers };

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Treeline is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
