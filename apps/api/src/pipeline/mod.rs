//! One turn end to end: validate, lock the session, fan out to the two agent
//! chains under a shared deadline, fan in through the aggregator, record.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::coach::{CoachAgent, CoachFindings, CoachInput};
use crate::agents::manager::{ManagerAgent, ManagerFindings, ManagerInput};
use crate::agents::{AgentKind, CritiqueAgent};
use crate::competency::CompetencyIndex;
use crate::config::CoachingConfig;
use crate::embeddings::Embedder;
use crate::errors::AppError;
use crate::llm_client::TextGenerator;
use crate::retrieval::evaluate_coverage;
use crate::retrieval::gap::{profile_gap, GapReport};
use crate::session::models::Turn;
use crate::session::questions::QuestionBank;
use crate::session::SessionStore;

pub mod aggregator;
pub mod handlers;

use aggregator::{merge, AgentOutcome, CritiqueResult, MergePolicy};

pub const NO_ROLE_REASON: &str = "no target role selected";

pub struct Pipeline {
    index: Arc<CompetencyIndex>,
    embedder: Arc<dyn Embedder>,
    sessions: SessionStore,
    questions: Arc<QuestionBank>,
    manager: ManagerAgent,
    coach: CoachAgent,
    config: CoachingConfig,
    policy: MergePolicy,
}

impl Pipeline {
    pub fn new(
        index: Arc<CompetencyIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        sessions: SessionStore,
        questions: Arc<QuestionBank>,
        config: CoachingConfig,
        star_guide: String,
    ) -> Self {
        let manager = ManagerAgent::new(embedder.clone());
        let coach = CoachAgent::new(
            generator,
            star_guide,
            config.coach_temperature,
            config.rubric_presence_threshold,
        );
        Self {
            index,
            embedder,
            sessions,
            questions,
            manager,
            coach,
            config,
            policy: MergePolicy::default(),
        }
    }

    fn validate(&self, question: &str, answer: &str) -> Result<(), AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("'question' must not be blank".to_string()));
        }
        if answer.trim().is_empty() {
            return Err(AppError::Validation("'answer' must not be blank".to_string()));
        }
        let len = answer.chars().count();
        if len > self.config.max_answer_chars {
            return Err(AppError::Validation(format!(
                "'answer' is {len} characters; the limit is {}",
                self.config.max_answer_chars
            )));
        }
        Ok(())
    }

    async fn run_manager(&self, role: &str, answer: &str) -> Result<ManagerFindings, AppError> {
        let coverage = evaluate_coverage(
            &self.index,
            role,
            answer,
            self.embedder.as_ref(),
            self.config.coverage_threshold,
        )
        .await?;
        self.manager
            .critique(&ManagerInput {
                coverage,
                answer: answer.to_string(),
            })
            .await
    }

    /// Critiques one answer and appends the turn. Turns on the same session
    /// run one at a time; the session lock is held until the turn is recorded.
    /// The latency budget runs from submission, so time spent waiting behind
    /// another turn counts against it. Past the budget a chain is reported as
    /// timed out and the turn completes with partial findings.
    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<CritiqueResult, AppError> {
        self.validate(question, answer)?;
        let asked = self.questions.classify(question);
        let answer = answer.trim();

        let deadline = Instant::now() + self.config.latency_budget;
        let handle = self.sessions.handle(session_id).await?;
        let mut session = handle.lock().await;
        let role = session.role.clone();
        let snippets = session.profile.fact_sources();

        let manager_chain = async {
            match role.as_deref() {
                Some(role) => {
                    bounded(deadline, self.manager.kind(), self.run_manager(role, answer)).await
                }
                None => AgentOutcome::Unavailable {
                    reason: NO_ROLE_REASON.to_string(),
                },
            }
        };
        let coach_input = CoachInput {
            question: asked.text().to_string(),
            answer: answer.to_string(),
            profile_snippets: snippets,
        };
        let coach_chain = bounded(deadline, self.coach.kind(), self.coach.critique(&coach_input));

        let (manager, coach): (AgentOutcome<ManagerFindings>, AgentOutcome<CoachFindings>) =
            tokio::join!(manager_chain, coach_chain);

        let result = merge(&self.policy, &self.index, role.as_deref(), manager, coach);
        info!(
            "Session {session_id} turn {}: score {:?}, partial {}",
            session.turns().len(),
            result.composite_score,
            result.partial
        );

        session.record_turn(Turn {
            index: 0,
            question: asked,
            answer: answer.to_string(),
            role_at_submission: role,
            submitted_at: Utc::now(),
            critique: result.clone(),
        });
        Ok(result)
    }

    /// Audits the session's profile against its anchored role. Reads the
    /// session, never records a turn.
    pub async fn profile_gap(&self, session_id: Uuid) -> Result<GapReport, AppError> {
        let session = self.sessions.get_session(session_id).await?;
        let role = session.role.as_deref().ok_or_else(|| {
            AppError::Validation(format!("{NO_ROLE_REASON}; set a role before requesting a gap audit"))
        })?;
        profile_gap(
            &self.index,
            role,
            &session.profile,
            self.embedder.as_ref(),
            self.config.coverage_threshold,
        )
        .await
    }
}

/// Runs one chain against the shared deadline. Errors and timeouts become
/// outcomes; neither fails the turn.
async fn bounded<T, F>(deadline: Instant, kind: AgentKind, chain: F) -> AgentOutcome<T>
where
    F: Future<Output = Result<T, AppError>>,
{
    match timeout_at(deadline, chain).await {
        Ok(Ok(findings)) => AgentOutcome::Ready { findings },
        Ok(Err(e)) => {
            warn!("{kind} findings unavailable: {e}");
            AgentOutcome::Unavailable {
                reason: e.to_string(),
            }
        }
        Err(_) => {
            warn!("{kind} chain exceeded the latency budget");
            AgentOutcome::TimedOut
        }
    }
}
