//! Fixtures and capability doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::competency::source::SourceRow;
use crate::competency::CompetencyIndex;
use crate::config::CoachingConfig;
use crate::embeddings::{Embedder, EmbeddingError, HashingEmbedder};
use crate::llm_client::{LlmError, PromptSpec, TextGenerator};
use crate::pipeline::Pipeline;
use crate::session::questions::QuestionBank;
use crate::session::SessionStore;
use crate::state::AppState;

fn row(
    role: &str,
    term: &str,
    description: &str,
    code: &str,
    rank: u32,
    critical: bool,
) -> SourceRow {
    SourceRow {
        role: role.to_string(),
        term: term.to_string(),
        description: description.to_string(),
        code: Some(code.to_string()),
        proficiency: Some("3".to_string()),
        rank: Some(rank),
        critical,
    }
}

/// Two roles. "Audit Associate" has three critical terms, none of whose
/// descriptions share a content word with "I checked the numbers every week".
pub fn audit_rows() -> Vec<SourceRow> {
    vec![
        row(
            "Audit Associate",
            "Financial Reconciliation",
            "Reconcile ledger balances against bank records and resolve discrepancies.",
            "ACC-FRE-3001-1.1",
            1,
            true,
        ),
        row(
            "Audit Associate",
            "Audit Documentation",
            "Prepare and maintain working papers that evidence audit procedures performed.",
            "ACC-ADO-3002-1.1",
            2,
            true,
        ),
        row(
            "Audit Associate",
            "Internal Controls",
            "Evaluate the design and operating effectiveness of controls over financial reporting.",
            "ACC-ICT-3003-1.1",
            3,
            true,
        ),
        row(
            "Audit Associate",
            "Risk Assessment",
            "Identify and assess risks of material misstatement in client accounts.",
            "ACC-RAS-3004-1.1",
            4,
            false,
        ),
        row(
            "Audit Associate",
            "Data Analytics",
            "Use data tools to analyse large transaction populations.",
            "ACC-DAN-3005-1.1",
            5,
            false,
        ),
        row(
            "Software Engineer",
            "Unit Testing",
            "Write automated tests for individual functions and modules.",
            "ICT-UTE-3001-1.1",
            1,
            true,
        ),
        row(
            "Software Engineer",
            "Continuous Integration",
            "Automate builds and test runs on every change.",
            "ICT-CIN-3002-1.1",
            2,
            true,
        ),
        row(
            "Software Engineer",
            "System Design",
            "Design scalable service architectures.",
            "ICT-SDE-4001-1.1",
            3,
            false,
        ),
    ]
}

/// `audit_rows` as a dataset document.
pub fn audit_rows_json() -> String {
    let rows: Vec<_> = audit_rows()
        .into_iter()
        .map(|r| {
            json!({
                "role": r.role,
                "term": r.term,
                "description": r.description,
                "code": r.code,
                "proficiency": r.proficiency,
                "rank": r.rank,
                "critical": r.critical,
            })
        })
        .collect();
    serde_json::Value::Array(rows).to_string()
}

pub async fn build_test_index() -> CompetencyIndex {
    let (index, report) = CompetencyIndex::build(audit_rows(), &HashingEmbedder::default()).await;
    assert!(report.skipped.is_empty());
    index
}

/// Always fails with a transient error, so callers exercise their retry.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 503,
            message: "embedding service down".to_string(),
        })
    }

    fn name(&self) -> String {
        "failing".to_string()
    }
}

pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _spec: &PromptSpec) -> Result<String, LlmError> {
        Err(LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

/// Returns queued responses in order, repeating the last one once exhausted.
pub struct ScriptedGenerator {
    responses: Vec<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<String>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty());
        Self {
            responses,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, spec: &PromptSpec) -> Result<String, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = spec.prompt.clone();
        Ok(self.responses[n.min(self.responses.len() - 1)].clone())
    }
}

/// Answers only after `delay`.
pub struct SlowGenerator {
    delay: Duration,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl TextGenerator for SlowGenerator {
    async fn generate(&self, _spec: &PromptSpec) -> Result<String, LlmError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "coach_critique": "", "rewritten_answer": "" }).to_string())
    }
}

/// Full application state over the fixture index, with a generator that
/// always returns a contained rewrite.
pub async fn test_state() -> AppState {
    let index = Arc::new(build_test_index().await);
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
    let sessions = SessionStore::new();
    let questions = Arc::new(QuestionBank::default());
    let generator = Arc::new(ScriptedGenerator::new(vec![json!({
        "coach_critique": "Add a situation and a result.",
        "rewritten_answer": "**Action:** I checked the numbers every week."
    })
    .to_string()]));
    let pipeline = Arc::new(Pipeline::new(
        index.clone(),
        embedder.clone(),
        generator,
        sessions.clone(),
        questions.clone(),
        CoachingConfig::default(),
        crate::agents::prompts::DEFAULT_STAR_GUIDE.to_string(),
    ));
    AppState {
        index,
        embedder,
        sessions,
        questions,
        pipeline,
    }
}
