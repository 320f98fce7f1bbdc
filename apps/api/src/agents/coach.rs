//! Coach agent: narrative structure critique and a fact-contained rewrite.
//!
//! The rubric is scored locally. The rewrite comes from the text-generation
//! capability and is only accepted when it introduces no fact absent from the
//! answer and the profile snippets. One stricter regeneration is attempted on
//! a violation; after that the original sentences are regrouped under STAR
//! labels instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::containment::untraceable_facts;
use crate::agents::prompts::{build_coach_prompt, coach_system, strict_addendum};
use crate::agents::rubric::{self, ComponentScore, RubricAssessment, RubricComponent};
use crate::agents::{AgentKind, CritiqueAgent};
use crate::errors::AppError;
use crate::llm_client::{parse_json_response, strip_thinking, LlmError, PromptSpec, TextGenerator};
use crate::retry::retry_once;
use crate::session::profile::split_sentences;

pub struct CoachInput {
    pub question: String,
    pub answer: String,
    pub profile_snippets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStatus {
    Rewritten,
    RewrittenAfterRetry,
    /// Structure-only, no rewrite: the original text regrouped under STAR labels.
    StructureOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachFindings {
    pub rubric: Vec<ComponentScore>,
    pub missing_components: Vec<RubricComponent>,
    /// Fraction of the four components present.
    pub structure_coverage: f32,
    pub critique: String,
    pub rewritten_answer: String,
    pub rewrite_status: RewriteStatus,
    /// Untraceable facts found in rejected drafts.
    pub violations: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CoachDraft {
    #[serde(default)]
    coach_critique: String,
    #[serde(default)]
    rewritten_answer: String,
}

pub struct CoachAgent {
    generator: Arc<dyn TextGenerator>,
    star_guide: String,
    temperature: f32,
    presence_threshold: f32,
}

impl CoachAgent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        star_guide: String,
        temperature: f32,
        presence_threshold: f32,
    ) -> Self {
        Self {
            generator,
            star_guide,
            temperature,
            presence_threshold,
        }
    }

    async fn draft(&self, spec: &PromptSpec) -> Result<CoachDraft, LlmError> {
        let raw = retry_once("Coach rewrite", || self.generator.generate(spec)).await?;
        Ok(parse_draft(&raw))
    }
}

#[async_trait]
impl CritiqueAgent for CoachAgent {
    type Input = CoachInput;
    type Findings = CoachFindings;

    fn kind(&self) -> AgentKind {
        AgentKind::Coach
    }

    async fn critique(&self, input: &CoachInput) -> Result<CoachFindings, AppError> {
        let assessment = rubric::assess(&input.answer, self.presence_threshold);
        let missing = assessment.missing();

        let mut sources: Vec<&str> = vec![input.answer.as_str()];
        sources.extend(input.profile_snippets.iter().map(String::as_str));

        let mut spec = PromptSpec {
            system: coach_system(),
            prompt: build_coach_prompt(
                &self.star_guide,
                &input.question,
                &input.answer,
                &input.profile_snippets,
                &missing,
            ),
            temperature: self.temperature,
        };

        // A first-call failure makes the whole Coach half unavailable.
        let first = self.draft(&spec).await?;
        let critique = non_empty_or(&first.coach_critique, || rubric_summary(&assessment));
        let first_violations = validate(&first.rewritten_answer, &sources);
        if first_violations.is_empty() {
            return Ok(findings(
                &assessment,
                critique,
                first.rewritten_answer,
                RewriteStatus::Rewritten,
                vec![],
            ));
        }

        warn!(
            "Coach rewrite introduced untraceable facts ({}), regenerating with stricter instruction",
            first_violations.join(", ")
        );
        spec.prompt.push_str(&strict_addendum(&first_violations));
        let mut violations = first_violations;

        match self.draft(&spec).await {
            Ok(second) => {
                let second_violations = validate(&second.rewritten_answer, &sources);
                if second_violations.is_empty() {
                    let critique = non_empty_or(&second.coach_critique, || critique.clone());
                    return Ok(findings(
                        &assessment,
                        critique,
                        second.rewritten_answer,
                        RewriteStatus::RewrittenAfterRetry,
                        violations,
                    ));
                }
                for v in second_violations {
                    if !violations.contains(&v) {
                        violations.push(v);
                    }
                }
            }
            Err(e) => warn!("Coach regeneration failed: {e}"),
        }

        info!("Coach falling back to structure-only output");
        Ok(findings(
            &assessment,
            critique,
            structure_only(&input.answer),
            RewriteStatus::StructureOnly,
            violations,
        ))
    }
}

fn findings(
    assessment: &RubricAssessment,
    critique: String,
    rewritten_answer: String,
    rewrite_status: RewriteStatus,
    violations: Vec<String>,
) -> CoachFindings {
    CoachFindings {
        rubric: assessment.scores.clone(),
        missing_components: assessment.missing(),
        structure_coverage: assessment.fraction_present(),
        critique,
        rewritten_answer,
        rewrite_status,
        violations,
    }
}

fn non_empty_or(text: &str, fallback: impl FnOnce() -> String) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

/// JSON draft when the model returned one, otherwise the whole remaining text
/// is taken as the rewrite.
fn parse_draft(raw: &str) -> CoachDraft {
    match parse_json_response::<CoachDraft>(raw) {
        Ok(draft) => draft,
        Err(_) => CoachDraft {
            coach_critique: String::new(),
            rewritten_answer: strip_thinking(raw),
        },
    }
}

/// Untraceable facts in `rewrite`, rendered for the response. A blank rewrite
/// is rejected outright.
fn validate(rewrite: &str, sources: &[&str]) -> Vec<String> {
    if rewrite.trim().is_empty() {
        return vec!["(empty rewrite)".to_string()];
    }
    untraceable_facts(rewrite, sources)
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn rubric_summary(assessment: &RubricAssessment) -> String {
    let missing = assessment.missing();
    if missing.is_empty() {
        return "The answer covers Situation, Task, Action, and Result.".to_string();
    }
    let labels: Vec<&str> = missing.iter().map(|c| c.label()).collect();
    format!(
        "The answer is missing a clear {}. Add it so the story has a beginning, your part, and an outcome.",
        labels.join(", ")
    )
}

/// The original sentences grouped under the component each most resembles,
/// in S-T-A-R order. Sentences that match no component follow, in order.
/// Adds labels only, never words.
pub fn structure_only(answer: &str) -> String {
    let sentences = split_sentences(answer);
    let mut grouped: Vec<(RubricComponent, Vec<&str>)> = RubricComponent::ALL
        .iter()
        .map(|&c| (c, Vec::new()))
        .collect();
    let mut unassigned = Vec::new();

    for sentence in &sentences {
        match rubric::sentence_component(sentence) {
            Some(component) => {
                if let Some((_, list)) = grouped.iter_mut().find(|(c, _)| *c == component) {
                    list.push(sentence.as_str());
                }
            }
            None => unassigned.push(sentence.as_str()),
        }
    }

    let mut parts: Vec<String> = grouped
        .into_iter()
        .filter(|(_, list)| !list.is_empty())
        .map(|(component, list)| format!("**{}:** {}", component.label(), list.join(" ")))
        .collect();
    if !unassigned.is_empty() {
        parts.push(unassigned.join(" "));
    }
    parts.join("\n\n")
}
