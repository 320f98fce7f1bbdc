use std::sync::Arc;

use crate::competency::CompetencyIndex;
use crate::embeddings::Embedder;
use crate::pipeline::Pipeline;
use crate::session::questions::QuestionBank;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Read-only after startup; shared by every session.
    pub index: Arc<CompetencyIndex>,
    /// Pluggable embedder. HTTP API when a key is configured, local hashing otherwise.
    pub embedder: Arc<dyn Embedder>,
    pub sessions: SessionStore,
    pub questions: Arc<QuestionBank>,
    pub pipeline: Arc<Pipeline>,
}
