pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::competency::handlers as competency;
use crate::pipeline::handlers as pipeline;
use crate::session::handlers as session;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Sessions
        .route("/api/v1/sessions", post(session::handle_start_session))
        .route(
            "/api/v1/sessions/:id",
            get(session::handle_get_session).delete(session::handle_end_session),
        )
        .route(
            "/api/v1/sessions/:id/profile",
            put(session::handle_set_profile),
        )
        .route("/api/v1/sessions/:id/role", put(session::handle_set_role))
        .route(
            "/api/v1/sessions/:id/answers",
            post(pipeline::handle_submit_answer),
        )
        .route("/api/v1/sessions/:id/gap", get(pipeline::handle_profile_gap))
        // Competency index
        .route("/api/v1/roles", get(competency::handle_list_roles))
        .route(
            "/api/v1/roles/:role/competencies",
            get(competency::handle_lookup),
        )
        .route("/api/v1/roles/:role/search", get(competency::handle_search))
        .route("/api/v1/questions", get(session::handle_list_questions))
        .with_state(state)
}
