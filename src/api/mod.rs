//! HTTP and WebSocket surface for dashboards
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Stores** for the snapshot sent to new clients
//! - **BroadcastPublisher** subscription for the live event stream
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/snapshot` - Devices online, open critical alerts, latest metric
//! - `WS /api/v1/stream` - `initial_data`, then every dashboard event

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{HealthResponse, InitialData, LatestMetric};

#[cfg(feature = "api")]
use axum::{Router, routing::get};
#[cfg(feature = "api")]
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

#[cfg(feature = "api")]
use crate::config::ApiSettings;

/// Build the router without binding it
#[cfg(feature = "api")]
pub fn router(settings: &ApiSettings, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/snapshot", get(routes::snapshot::get_snapshot))
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if settings.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// Starts an Axum HTTP server in a background task and returns the bound address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(settings: ApiSettings, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", settings.bind);

    let app = router(&settings, state);

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
