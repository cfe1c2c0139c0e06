use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::booking_flow::{self, TurnResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TurnRequest {
    pub message: String,
    pub thread_id: String,
}

// POST /api/:business_id/turn
pub async fn post_turn(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResult>, AppError> {
    let result =
        booking_flow::process_turn(&state, &business_id, &req.message, &req.thread_id).await?;
    Ok(Json(result))
}
