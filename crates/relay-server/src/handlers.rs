use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use relay_core::{CacheKey, ResourceType};
use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;
use crate::refresh::RefreshJob;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
    version: &'a str,
    commit: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("RELAY_GIT_COMMIT"),
        }),
    )
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.stats().await)
}

pub async fn refresh_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.status())
}

/// Body: `[{"resourceId": "character:1", "reason": "new-resource", "priority": 2}, ...]`
pub async fn enqueue_refresh(
    State(state): State<AppState>,
    body: Result<Json<Vec<RefreshJob>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(jobs) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if jobs.is_empty() {
        return Err(ApiError::BadRequest("no jobs given".to_string()));
    }

    let accepted = jobs.len();
    let queue_size = state.relay.enqueue(jobs);
    tracing::info!(accepted, queue_size, "refresh jobs enqueued over HTTP");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": accepted, "queueSize": queue_size })),
    ))
}

pub async fn invalidate(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let resource_type: ResourceType = resource_type.parse()?;
    let key = CacheKey::new(resource_type, id)?;

    let tiers = state.relay.invalidate(&key).await;
    state.relay.tracked().untrack(&key);
    Ok(Json(json!({ "resourceId": key.to_string(), "tiers": tiers })))
}

pub async fn reset_stats(State(state): State<AppState>) -> impl IntoResponse {
    state.relay.reset_stats();
    StatusCode::NO_CONTENT
}

pub async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let body = crate::metrics::render_metrics()
        .ok_or_else(|| ApiError::Unavailable("metrics exporter not installed".to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
