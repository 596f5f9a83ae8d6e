//! HTTP server for the Prometheus endpoint and the read-only views.

use crate::metrics::MetricsRegistry;
use crate::views;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use prometheus_client::encoding::text::encode;
use sitewatch::{AuditStore, IncidentPolicy, MetricWeights, ResourceDirectory, ResourceId};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of the HTTP handlers
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    pub store: Arc<dyn AuditStore>,
    pub directory: Arc<dyn ResourceDirectory>,
    pub incident_policy: IncidentPolicy,
    pub weights: MetricWeights,
}

/// HTTP server for metrics and views
pub struct HttpServer {
    state: Arc<AppState>,
    listen_addr: String,
}

impl HttpServer {
    pub fn new(state: AppState, listen_addr: String) -> Self {
        Self {
            state: Arc::new(state),
            listen_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self) -> Result<(), std::io::Error> {
        info!(listen_addr = %self.listen_addr, "Starting HTTP server");

        let app = router(self.state);

        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, app).await
    }
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/api/resources/:id/health", get(health_handler))
        .route("/api/resources/:id/uptime", get(uptime_handler))
        .route("/api/incidents", get(incidents_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Handler errors
enum ApiError {
    NotFound(ResourceId),
    Store(common::Error),
}

impl From<common::Error> for ApiError {
    fn from(e: common::Error) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("unknown resource {}", id) })),
            )
                .into_response(),
            ApiError::Store(e) => {
                warn!(error = %e, "View query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &state.metrics.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn health_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ResourceId>,
) -> Result<Json<views::HealthView>, ApiError> {
    views::health_view(state.store.as_ref(), state.directory.as_ref(), id, &state.weights)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn uptime_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ResourceId>,
) -> Result<Json<views::UptimeView>, ApiError> {
    views::uptime_view(state.store.as_ref(), state.directory.as_ref(), id, Utc::now())
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn incidents_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<sitewatch::IncidentReport>, ApiError> {
    let report = views::incident_view(
        state.store.as_ref(),
        state.directory.as_ref(),
        Utc::now(),
        &state.incident_policy,
    )
    .await?;
    Ok(Json(report))
}
