mod agents;
mod competency;
mod config;
mod embeddings;
mod errors;
mod llm_client;
mod pipeline;
mod retrieval;
mod retry;
mod routes;
mod session;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::agents::prompts::DEFAULT_STAR_GUIDE;
use crate::competency::snapshot::load_or_build;
use crate::config::Config;
use crate::embeddings::{Embedder, HashingEmbedder, HttpEmbedder};
use crate::llm_client::{LlmClient, TextGenerator, UnconfiguredGenerator};
use crate::pipeline::Pipeline;
use crate::routes::build_router;
use crate::session::questions::QuestionBank;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Coach API v{}", env!("CARGO_PKG_VERSION"));

    let embedder: Arc<dyn Embedder> = match &config.embedding_api_key {
        Some(key) => Arc::new(HttpEmbedder::new(
            key.clone(),
            config.embedding_api_url.clone(),
            config.embedding_model.clone(),
        )?),
        None => {
            warn!("EMBEDDING_API_KEY not set; using the local hashing embedder");
            Arc::new(HashingEmbedder::default())
        }
    };
    info!("Embedder: {}", embedder.name());

    let generator: Arc<dyn TextGenerator> = match &config.anthropic_api_key {
        Some(key) => {
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmClient::new(key.clone())?)
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; rewrites fall back to structure-only coaching");
            Arc::new(UnconfiguredGenerator)
        }
    };

    let index = Arc::new(
        load_or_build(
            &config.competency_dataset_path,
            config.competency_snapshot_path.as_deref(),
            embedder.as_ref(),
        )
        .await?,
    );
    info!(
        "Competency index ready: {} roles, {} entries",
        index.roles().len(),
        index.entry_count()
    );

    let questions = Arc::new(QuestionBank::load(config.question_bank_path.as_deref()).await);
    let star_guide = load_star_guide(config.star_guide_path.as_deref()).await;

    let sessions = SessionStore::with_idle_ttl(config.session_idle_ttl);
    sessions.spawn_sweeper();
    info!("Sessions expire after {:?} idle", config.session_idle_ttl);
    let pipeline = Arc::new(Pipeline::new(
        index.clone(),
        embedder.clone(),
        generator,
        sessions.clone(),
        questions.clone(),
        config.coaching.clone(),
        star_guide,
    ));

    let state = AppState {
        index,
        embedder,
        sessions,
        questions,
        pipeline,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Coaching guide injected into the Coach prompt. The built-in guide is used
/// when no path is configured or the file cannot be read.
async fn load_star_guide(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_STAR_GUIDE.to_string();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => {
            info!("STAR guide loaded from {}", path.display());
            text
        }
        Ok(_) => {
            warn!("STAR guide {} is empty; using the built-in guide", path.display());
            DEFAULT_STAR_GUIDE.to_string()
        }
        Err(e) => {
            warn!("Could not read STAR guide {}: {e}; using the built-in guide", path.display());
            DEFAULT_STAR_GUIDE.to_string()
        }
    }
}
