// Module: http
// HTTP/JSON and WebSocket surface over the sync hub

pub mod error;
pub mod health;
pub mod value;
pub mod websocket;

use axum::{routing::get, Router};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wormhole_core::config::SyncConfig;
use wormhole_core::SyncHub;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: SyncHub,
    pub long_poll_timeout: Duration,
}

/// Create the HTTP router
pub fn create_router(hub: SyncHub, sync: &SyncConfig) -> Router {
    let state = AppState {
        hub,
        long_poll_timeout: sync.long_poll_timeout(),
    };

    let router = Router::new()
        .merge(health::create_health_router())
        .merge(value::create_value_router())
        // WebSocket endpoint for real-time updates
        .route("/ws", get(websocket::websocket_handler));

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
