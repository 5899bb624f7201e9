//! REST API and WebSocket server over the collection state
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Liveness plus collection status
//! - `GET /api/v1/state` - Full `CollectionState`
//! - `GET /api/v1/snapshot` - Latest `MetricSnapshot`
//! - `GET /api/v1/services` - Service health
//! - `GET /api/v1/alerts` - Firing and recently resolved alerts
//! - `POST /api/v1/alerts/:id/acknowledge` - Acknowledge one alert
//! - `GET /api/v1/stats` - Collection counters
//! - `WS /api/v1/stream` - Every committed state as JSON

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
pub use types::{AcknowledgeResponse, AlertsResponse, HealthResponse, ServicesResponse, StatsResponse};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
#[cfg(feature = "api")]
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

#[cfg(feature = "api")]
use crate::config::ApiSettings;

/// Build the router with all routes
#[cfg(feature = "api")]
pub fn router(settings: &ApiSettings, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/state", get(routes::state::get_state))
        .route("/api/v1/snapshot", get(routes::state::get_snapshot))
        .route("/api/v1/services", get(routes::services::list_services))
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route(
            "/api/v1/alerts/:id/acknowledge",
            post(routes::alerts::acknowledge_alert),
        )
        .route("/api/v1/stats", get(routes::stats::get_stats))
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
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(settings: ApiSettings, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", settings.bind_addr);

    let app = router(&settings, state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
