//! Aggregator: merges Manager and Coach findings into one recommendation.
//!
//! Merge policy v1:
//! composite = 0.6 × critical competency coverage + 0.4 × STAR components present.
//! If one half is not ready, the composite uses the ready half alone (its weight
//! renormalized to 1.0) and the result is flagged partial. If neither half is
//! ready there is no composite.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::agents::coach::CoachFindings;
use crate::agents::manager::{coverage_fraction, verdict_and_summary, ManagerFindings};
use crate::competency::CompetencyIndex;

/// What one agent chain produced for a turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentOutcome<F> {
    Ready { findings: F },
    Unavailable { reason: String },
    TimedOut,
}

impl<F> AgentOutcome<F> {
    pub fn findings(&self) -> Option<&F> {
        match self {
            AgentOutcome::Ready { findings } => Some(findings),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AgentOutcome::Ready { .. })
    }

    fn describe(&self) -> String {
        match self {
            AgentOutcome::Ready { .. } => "ready".to_string(),
            AgentOutcome::Unavailable { reason } => format!("unavailable ({reason})"),
            AgentOutcome::TimedOut => "timed out".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    pub version: &'static str,
    pub technical_weight: f32,
    pub structure_weight: f32,
}

impl MergePolicy {
    pub const V1: MergePolicy = MergePolicy {
        version: "v1",
        technical_weight: 0.6,
        structure_weight: 0.4,
    };

    /// Composite in [0, 1], or `None` when neither half is available.
    pub fn composite(&self, technical: Option<f32>, structure: Option<f32>) -> Option<f32> {
        match (technical, structure) {
            (Some(t), Some(s)) => Some(self.technical_weight * t + self.structure_weight * s),
            (Some(t), None) => Some(t),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::V1
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CritiqueResult {
    pub id: Uuid,
    pub role: Option<String>,
    pub manager: AgentOutcome<ManagerFindings>,
    pub coach: AgentOutcome<CoachFindings>,
    /// Readiness score 0-100.
    pub composite_score: Option<u32>,
    pub recommendation: String,
    /// True when either half is not ready.
    pub partial: bool,
    pub merge_policy_version: String,
    pub produced_at: DateTime<Utc>,
}

impl CritiqueResult {
    /// Missing critical terms, empty when the Manager half is not ready.
    pub fn missing_critical_terms(&self) -> Vec<&str> {
        self.manager
            .findings()
            .map(|m| m.corrections.iter().map(|c| c.term.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Drops any competency term the index does not list for `role`. When
/// anything is dropped, the critical counts are re-derived from the index and
/// the verdict and summary from the remaining corrections.
pub fn verify_terms(findings: &mut ManagerFindings, index: &CompetencyIndex, role: &str) {
    let mut dropped = 0;
    let mut known = |term: &str| {
        let ok = index.contains_term(role, term);
        if !ok {
            warn!("Dropping term '{term}' not in the competency index for '{role}'");
            dropped += 1;
        }
        ok
    };
    findings.corrections.retain(|c| known(&c.term));
    findings.covered_terms.retain(|t| known(t.as_str()));
    findings.weak_terms.retain(|t| known(t.as_str()));
    if dropped == 0 {
        return;
    }

    let critical_total = index
        .lookup(role)
        .map(|entries| entries.iter().filter(|e| e.critical).count())
        .unwrap_or(0);
    findings.critical_total = critical_total;
    findings.critical_covered = critical_total.saturating_sub(findings.corrections.len());
    findings.critical_coverage = coverage_fraction(findings.critical_covered, critical_total);
    let (verdict, summary) = verdict_and_summary(role, critical_total, &findings.corrections);
    findings.verdict = verdict;
    findings.summary = summary;
}

/// Deterministic merge. Identical inputs give identical scores and text;
/// only `id` and `produced_at` vary.
pub fn merge(
    policy: &MergePolicy,
    index: &CompetencyIndex,
    role: Option<&str>,
    mut manager: AgentOutcome<ManagerFindings>,
    coach: AgentOutcome<CoachFindings>,
) -> CritiqueResult {
    if let (AgentOutcome::Ready { findings }, Some(role)) = (&mut manager, role) {
        verify_terms(findings, index, role);
    }

    let technical = manager.findings().map(|m| m.critical_coverage);
    let structure = coach.findings().map(|c| c.structure_coverage);
    let composite_score = policy
        .composite(technical, structure)
        .map(|c| (c.clamp(0.0, 1.0) * 100.0).round() as u32);
    let partial = !(manager.is_ready() && coach.is_ready());
    let recommendation = recommend(composite_score, &manager, &coach);

    CritiqueResult {
        id: Uuid::new_v4(),
        role: role.map(str::to_string),
        manager,
        coach,
        composite_score,
        recommendation,
        partial,
        merge_policy_version: policy.version.to_string(),
        produced_at: Utc::now(),
    }
}

fn recommend(
    score: Option<u32>,
    manager: &AgentOutcome<ManagerFindings>,
    coach: &AgentOutcome<CoachFindings>,
) -> String {
    let Some(score) = score else {
        return format!(
            "No critique available: manager {}, coach {}. Try again shortly.",
            manager.describe(),
            coach.describe()
        );
    };

    let band = match score {
        80..=100 => "Interview-ready",
        50..=79 => "Almost there",
        _ => "Needs work",
    };

    let mut actions = Vec::new();
    if let Some(m) = manager.findings() {
        if !m.corrections.is_empty() {
            let terms: Vec<&str> = m.corrections.iter().map(|c| c.term.as_str()).collect();
            actions.push(format!("name {} explicitly", terms.join(", ")));
        }
    }
    if let Some(c) = coach.findings() {
        if !c.missing_components.is_empty() {
            let labels: Vec<&str> = c.missing_components.iter().map(|m| m.label()).collect();
            actions.push(format!("add a clear {}", labels.join(", ")));
        }
    }
    let actions = if actions.is_empty() {
        "no gaps found".to_string()
    } else {
        actions.join("; ")
    };

    let mut line = format!("{band} ({score}/100): {actions}.");
    if !manager.is_ready() {
        line.push_str(&format!(" Technical review {}.", manager.describe()));
    }
    if !coach.is_ready() {
        line.push_str(&format!(" Structure review {}.", coach.describe()));
    }
    line
}
