use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::aggregator::CritiqueResult;
use crate::retrieval::gap::GapReport;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubmitAnswerRequest {
    pub question: String,
    pub answer: String,
}

/// POST /api/v1/sessions/:id/answers
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<CritiqueResult>, AppError> {
    let result = state
        .pipeline
        .submit_answer(id, &req.question, &req.answer)
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/sessions/:id/gap
pub async fn handle_profile_gap(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GapReport>, AppError> {
    Ok(Json(state.pipeline.profile_gap(id).await?))
}
