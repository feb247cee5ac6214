//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;
use crate::events::DASHBOARD_TOPIC;

/// GET /api/v1/health
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        subscribers: state.events.subscriber_count(DASHBOARD_TOPIC).await,
    })
}
