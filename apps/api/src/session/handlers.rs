use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::models::{Profile, Session};
use crate::session::questions::CuratedQuestion;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionCreatedResponse {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct SetProfileRequest {
    pub raw_text: String,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Serialize)]
pub struct RoleSetResponse {
    pub session_id: Uuid,
    pub role: String,
}

/// POST /api/v1/sessions
pub async fn handle_start_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionCreatedResponse>) {
    let session = state.sessions.start_session().await;
    (
        StatusCode::CREATED,
        Json(SessionCreatedResponse {
            session_id: session.id,
            created_at: session.created_at,
        }),
    )
}

/// PUT /api/v1/sessions/:id/profile
pub async fn handle_set_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    if req.raw_text.trim().is_empty() {
        return Err(AppError::Validation("'raw_text' must not be blank".to_string()));
    }
    let profile = state.sessions.set_profile(id, &req.raw_text).await?;
    Ok(Json(profile))
}

/// PUT /api/v1/sessions/:id/role
pub async fn handle_set_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<RoleSetResponse>, AppError> {
    let role = req.role.trim().to_string();
    state.sessions.set_role(id, &role, &state.index).await?;
    Ok(Json(RoleSetResponse {
        session_id: id,
        role,
    }))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.sessions.get_session(id).await?))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.end_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/questions
pub async fn handle_list_questions(State(state): State<AppState>) -> Json<Vec<CuratedQuestion>> {
    Json(state.questions.all().to_vec())
}
