//! # scrweb-server: device screen relay
//!
//! HTTP server exposing one WebSocket endpoint. Each viewer connection
//! gets its own stream session: the viewer asks for a device's screen,
//! receives raw H.264 chunks as binary frames and sends input back as
//! JSON commands.

pub mod bridge;
pub mod config;

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scrweb_core::SessionRegistry;

/// State shared by every connection handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    /// Cancelled once the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Routes for the relay.
pub fn router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(bridge::ws_handler))
        .with_state(state)
}

/// Serve until `state.shutdown` is cancelled, then wait up to `grace`
/// for open sessions to tear down.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    ws_path: &str,
    grace: Duration,
) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let registry = state.registry.clone();
    let app = router(state, ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    if !wait_for_sessions(&registry, grace).await {
        warn!(
            active = registry.active_sessions(),
            "sessions still open after {grace:?}"
        );
    }
    info!("server stopped");
    Ok(())
}

/// Poll until no session is open or `grace` elapses.
async fn wait_for_sessions(registry: &SessionRegistry, grace: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + grace;
    while registry.active_sessions() > 0 {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}
