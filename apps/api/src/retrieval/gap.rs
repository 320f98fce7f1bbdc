//! Profile gap audit: which of a role's competencies does the uploaded
//! profile already evidence, and which are missing?
//!
//! Each profile span (snippet or skill mention) is embedded once. An entry is
//! matched by its best span under the same rule as answer coverage: a literal
//! mention of the term, or similarity strictly above the threshold.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::debug;

use crate::competency::{CompetencyEntry, CompetencyIndex};
use crate::embeddings::{cosine_similarity, embed_with_retry, Embedder};
use crate::errors::AppError;
use crate::retrieval::{mentions_term, LITERAL_MENTION_SIMILARITY};
use crate::session::models::Profile;

const SPAN_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct SkillMatch {
    pub term: String,
    pub code: Option<String>,
    pub proficiency: Option<String>,
    pub critical: bool,
    /// The profile span that evidences the term.
    pub evidence: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillGap {
    pub term: String,
    pub code: Option<String>,
    pub proficiency: Option<String>,
    pub critical: bool,
    pub gap: String,
}

/// Both lists keep the index order for the role.
#[derive(Debug, Clone, Serialize)]
pub struct GapReport {
    pub role: String,
    pub threshold: f32,
    pub matched: Vec<SkillMatch>,
    pub missing: Vec<SkillGap>,
    pub critical_missing: usize,
}

fn best_span<'a>(
    entry: &CompetencyEntry,
    spans: &'a [String],
    vectors: &[Vec<f32>],
) -> Option<(&'a str, f32)> {
    let mut best: Option<(&str, f32)> = None;
    for (span, vector) in spans.iter().zip(vectors) {
        let similarity = if mentions_term(span, &entry.term) {
            LITERAL_MENTION_SIMILARITY
        } else {
            cosine_similarity(vector, &entry.embedding)
        };
        if best.map_or(true, |(_, b)| similarity > b) {
            best = Some((span.as_str(), similarity));
        }
    }
    best
}

pub async fn profile_gap(
    index: &CompetencyIndex,
    role: &str,
    profile: &Profile,
    embedder: &dyn Embedder,
    threshold: f32,
) -> Result<GapReport, AppError> {
    if profile.is_empty() {
        return Err(AppError::Validation(
            "the session has no profile; upload one before requesting a gap audit".to_string(),
        ));
    }
    let entries = index.lookup(role)?;
    let spans = profile.fact_sources();
    let vectors: Vec<Vec<f32>> = stream::iter(spans.iter().cloned())
        .map(|span| async move { embed_with_retry(embedder, &span).await })
        .buffered(SPAN_CONCURRENCY)
        .try_collect()
        .await?;

    let mut report = GapReport {
        role: role.to_string(),
        threshold,
        matched: Vec::new(),
        missing: Vec::new(),
        critical_missing: 0,
    };
    for entry in entries {
        match best_span(entry, &spans, &vectors) {
            Some((span, similarity)) if similarity > threshold => {
                report.matched.push(SkillMatch {
                    term: entry.term.clone(),
                    code: entry.code.clone(),
                    proficiency: entry.proficiency.clone(),
                    critical: entry.critical,
                    evidence: span.to_string(),
                    similarity,
                })
            }
            _ => {
                if entry.critical {
                    report.critical_missing += 1;
                }
                report.missing.push(SkillGap {
                    term: entry.term.clone(),
                    code: entry.code.clone(),
                    proficiency: entry.proficiency.clone(),
                    critical: entry.critical,
                    gap: format!("The profile shows no evidence of {}{}.", entry.term, entry.citation()),
                });
            }
        }
    }
    debug!(
        "Gap audit for '{role}': {} matched, {} missing ({} critical)",
        report.matched.len(),
        report.missing.len(),
        report.critical_missing
    );
    Ok(report)
}
