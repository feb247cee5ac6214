use axum::{Json, extract::State};

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::api::types::InitialData;

/// GET /api/v1/snapshot
///
/// Same document the stream sends on connect
pub async fn get_snapshot(State(state): State<ApiState>) -> ApiResult<Json<InitialData>> {
    Ok(Json(state.snapshot().await?))
}
