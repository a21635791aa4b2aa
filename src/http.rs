use crate::coordinator::{Coordinator, PollOutcome};
use crate::sensors;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct HttpState {
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub api_status: Option<i64>,
    pub api_message: String,
    pub api_calls_today: u64,
    pub last_reset_day: String,
    pub next_api_request_at: Option<String>,
    pub last_api_success_at: Option<String>,
    pub buckets: usize,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    outcome: String,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_sensors(State(state): State<HttpState>) -> Json<sensors::SensorReadings> {
    let snapshot = state.coordinator.snapshot();
    Json(sensors::readings(&snapshot, state.coordinator.local_now()))
}

async fn get_status(State(state): State<HttpState>) -> Json<StatusResponse> {
    let snapshot = state.coordinator.snapshot();
    Json(StatusResponse {
        api_status: snapshot.api_status,
        api_message: snapshot.api_message,
        api_calls_today: snapshot.api_calls_today,
        last_reset_day: snapshot.last_reset_day.to_string(),
        next_api_request_at: snapshot.next_api_request_at.map(|dt| dt.to_rfc3339()),
        last_api_success_at: snapshot.last_api_success_at.map(|dt| dt.to_rfc3339()),
        buckets: snapshot.dataset.len(),
    })
}

async fn post_refresh(
    State(state): State<HttpState>,
) -> Result<Json<RefreshResponse>, (StatusCode, String)> {
    match state.coordinator.try_poll().await {
        None => Err((
            StatusCode::CONFLICT,
            "a poll is already in flight".to_string(),
        )),
        Some(Err(err)) => Err((StatusCode::BAD_GATEWAY, err.to_string())),
        Some(Ok(PollOutcome::Updated { accepted, rejected })) => Ok(Json(RefreshResponse {
            outcome: format!("updated, {accepted} buckets accepted, {rejected} rejected"),
        })),
        Some(Ok(PollOutcome::ApiRejected { status })) => Ok(Json(RefreshResponse {
            outcome: format!("api rejected the request with status {status}"),
        })),
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/sensors", get(get_sensors))
        .route("/v1/status", get(get_status))
        .route("/v1/refresh", post(post_refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
