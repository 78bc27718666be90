//! HTTP handlers for the read API.

use crate::error::SystemError;
use crate::metrics::MetricSample;
use crate::query::{DashboardView, QueryService};
use crate::web::config::WebConfig;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::error;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub config: WebConfig,
}

/// Window parameters accepted by `/api/window` and `/api/dashboard`.
#[derive(Debug, Default, Deserialize)]
pub struct WindowParams {
    /// Window length in seconds
    pub secs: Option<u64>,
    /// Maximum rows returned
    pub limit: Option<usize>,
}

impl WindowParams {
    /// Resolve against the configured defaults and cap.
    pub fn resolve(&self, config: &WebConfig) -> (Duration, usize) {
        config.resolve_window(self.secs, self.limit)
    }
}

fn status_for(err: &SystemError) -> StatusCode {
    match err {
        SystemError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Most recent sample; `null` when the store is empty.
pub async fn get_latest(
    State(state): State<AppState>,
) -> Result<Json<Option<MetricSample>>, StatusCode> {
    match state.query.latest_snapshot().await {
        Ok(sample) => Ok(Json(sample)),
        Err(e) => {
            error!("Failed to read latest sample: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Samples from the requested window, oldest first.
pub async fn get_window(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<MetricSample>>, StatusCode> {
    let (window, limit) = params.resolve(&state.config);
    match state.query.recent_window(window, limit).await {
        Ok(samples) => Ok(Json(samples)),
        Err(e) => {
            error!("Failed to read sample window: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Latest sample plus window in one response.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<DashboardView>, StatusCode> {
    let (window, limit) = params.resolve(&state.config);
    match state.query.dashboard(window, limit).await {
        Ok(view) => Ok(Json(view)),
        Err(e) => {
            error!("Failed to read dashboard view: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "vitals-keeper",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.query.policy(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
