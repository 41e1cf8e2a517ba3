//! Metrics HTTP endpoint, served when `Config.metric_port` is set
//!
//! A small read-only surface exposing the active [`Reporter`]'s counters
//! as JSON: `axum` handlers annotated with `utoipa::path` feeding a generated
//! `ApiDoc` — but scaled down to the one endpoint this crate actually
//! needs. No Swagger UI: there is exactly one read-only resource here,
//! not a surface worth a browsable spec explorer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::reporter::Reporter;

/// Shared state for the metrics router: the [`Reporter`] of the
/// request currently (or most recently) in flight.
#[derive(Clone)]
pub struct AppState {
    reporter: Arc<dyn Reporter>,
}

impl AppState {
    /// Wrap `reporter` for serving under the metrics router.
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self { reporter }
    }
}

/// OpenAPI documentation for the metrics endpoint.
#[derive(OpenApi)]
#[openapi(
    info(title = "streamproc metrics", version = env!("CARGO_PKG_VERSION")),
    paths(health_check, metrics),
    components(schemas(crate::reporter::Response))
)]
pub struct ApiDoc;

/// Build the metrics router over `state`. Callers bind it to
/// `Config.metric_port` themselves (see [`serve`] for a ready-made helper).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/openapi.json", get(openapi_spec))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// GET /health
#[utoipa::path(get, path = "/health", tag = "system", responses((status = 200, description = "Service is up")))]
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// GET /metrics — a snapshot of the active reporter's counters.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    responses((status = 200, description = "Current reporter snapshot", body = crate::reporter::Response))
)]
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.reporter.snapshot()))
}

async fn openapi_spec() -> Json<serde_json::Value> {
    Json(ApiDoc::openapi().to_pretty_json().map_or_else(
        |_| json!({}),
        |text| serde_json::from_str(&text).unwrap_or(json!({})),
    ))
}

/// Bind and serve the metrics router on `addr` until the process is
/// signaled to stop (pair with [`crate::wait_for_signal`]).
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics endpoint listening");
    axum::serve(listener, app).await
}
