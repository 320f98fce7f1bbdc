use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::competency::{CompetencyEntry, ScoredEntry};
use crate::errors::AppError;
use crate::state::AppState;

const DEFAULT_SEARCH_K: usize = 5;
const MAX_SEARCH_K: usize = 50;

#[derive(Serialize)]
pub struct RoleListResponse {
    pub roles: Vec<String>,
}

#[derive(Serialize)]
pub struct CompetencyListResponse {
    pub role: String,
    pub competencies: Vec<CompetencyEntry>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub k: Option<usize>,
}

/// GET /api/v1/roles
pub async fn handle_list_roles(State(state): State<AppState>) -> Json<RoleListResponse> {
    Json(RoleListResponse {
        roles: state.index.roles().into_iter().map(str::to_string).collect(),
    })
}

/// GET /api/v1/roles/:role/competencies
pub async fn handle_lookup(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<CompetencyListResponse>, AppError> {
    let competencies = state.index.lookup(&role)?.to_vec();
    Ok(Json(CompetencyListResponse { role, competencies }))
}

/// GET /api/v1/roles/:role/search?q=&k=
pub async fn handle_search(
    State(state): State<AppState>,
    Path(role): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<ScoredEntry>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::Validation("Query 'q' must not be blank".to_string()));
    }
    let k = params.k.unwrap_or(DEFAULT_SEARCH_K);
    if k == 0 || k > MAX_SEARCH_K {
        return Err(AppError::Validation(format!(
            "'k' must be between 1 and {MAX_SEARCH_K}"
        )));
    }
    let hits = state
        .index
        .search(&role, &params.q, k, state.embedder.as_ref())
        .await?;
    Ok(Json(hits))
}
