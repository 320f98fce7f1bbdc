//! Manager agent: the skeptical technical reviewer.
//!
//! Consults only the coverage result and the answer text, never the profile.
//! Every missing critical competency becomes a correction that pairs the
//! candidate's closest wording with the framework's canonical term.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::warn;

use crate::agents::{AgentKind, CritiqueAgent};
use crate::competency::{embedding_text, CompetencyEntry};
use crate::embeddings::{content_terms, cosine_similarity, embed_with_retry, stem, Embedder};
use crate::errors::AppError;
use crate::retrieval::CoverageResult;

const MAX_PHRASE_WORDS: usize = 12;
const COORDINATORS: &[&str] = &["and", "but", "so", "then"];
/// Phrase embeddings in flight at once.
const PHRASE_CONCURRENCY: usize = 8;
/// A phrase must be at least this similar to a term to be offered as the
/// candidate's wording for it.
pub const MIN_PHRASE_SIMILARITY: f32 = 0.05;

pub struct ManagerInput {
    pub coverage: CoverageResult,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsWork,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Correction {
    pub term: String,
    pub code: Option<String>,
    pub proficiency: Option<String>,
    /// The span of the answer closest to the missing term, when one exists.
    pub colloquial_phrase: Option<String>,
    pub phrase_similarity: f32,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerFindings {
    pub role: String,
    pub verdict: Verdict,
    pub summary: String,
    pub corrections: Vec<Correction>,
    pub covered_terms: Vec<String>,
    /// Non-critical competencies the answer did not cover.
    pub weak_terms: Vec<String>,
    pub critical_total: usize,
    pub critical_covered: usize,
    /// Fraction of critical competencies covered; 1.0 when the role has none.
    pub critical_coverage: f32,
}

pub struct ManagerAgent {
    embedder: Arc<dyn Embedder>,
}

impl ManagerAgent {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Embeds every phrase, several at a time, in phrase order. `None` when any
    /// embedding fails, in which case the caller falls back to token overlap
    /// for all phrases.
    async fn embed_phrases(&self, phrases: &[String]) -> Option<Vec<Vec<f32>>> {
        let embedder = self.embedder.as_ref();
        let vectors = stream::iter(phrases.iter().cloned())
            .map(|phrase| async move { embed_with_retry(embedder, &phrase).await })
            .buffered(PHRASE_CONCURRENCY)
            .try_collect::<Vec<_>>()
            .await;
        match vectors {
            Ok(vectors) => Some(vectors),
            Err(e) => {
                warn!("Phrase embedding unavailable, using token overlap: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl CritiqueAgent for ManagerAgent {
    type Input = ManagerInput;
    type Findings = ManagerFindings;

    fn kind(&self) -> AgentKind {
        AgentKind::Manager
    }

    async fn critique(&self, input: &ManagerInput) -> Result<ManagerFindings, AppError> {
        let coverage = &input.coverage;
        let phrases = split_phrases(&input.answer);
        let vectors = if coverage.missing_critical.is_empty() {
            None
        } else {
            self.embed_phrases(&phrases).await
        };

        let corrections = coverage
            .missing_critical
            .iter()
            .map(|missing| {
                let nearest = match &vectors {
                    Some(vectors) => nearest_by_vector(&phrases, vectors, &missing.entry.embedding),
                    None => nearest_by_overlap(&phrases, &missing.entry),
                };
                build_correction(&missing.entry, nearest)
            })
            .collect();

        Ok(build_findings(coverage, corrections))
    }
}

fn build_findings(coverage: &CoverageResult, corrections: Vec<Correction>) -> ManagerFindings {
    let critical_total = coverage.critical_total();
    let critical_covered = coverage.critical_covered();
    let (verdict, summary) = verdict_and_summary(&coverage.role, critical_total, &corrections);

    ManagerFindings {
        role: coverage.role.clone(),
        verdict,
        summary,
        corrections,
        covered_terms: coverage.covered.iter().map(|s| s.entry.term.clone()).collect(),
        weak_terms: coverage
            .missing_optional
            .iter()
            .map(|s| s.entry.term.clone())
            .collect(),
        critical_total,
        critical_covered,
        critical_coverage: coverage_fraction(critical_covered, critical_total),
    }
}

/// Fraction of critical competencies covered; 1.0 when there are none.
pub fn coverage_fraction(covered: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        covered as f32 / total as f32
    }
}

/// Approval when nothing is missing, otherwise the missing terms in order.
pub fn verdict_and_summary(
    role: &str,
    critical_total: usize,
    corrections: &[Correction],
) -> (Verdict, String) {
    if corrections.is_empty() {
        return (
            Verdict::Approved,
            format!("Approved: the answer covers every critical competency for {role}."),
        );
    }
    let terms: Vec<&str> = corrections.iter().map(|c| c.term.as_str()).collect();
    (
        Verdict::NeedsWork,
        format!(
            "Missing {} of {critical_total} critical competencies for {role}: {}.",
            corrections.len(),
            terms.join(", ")
        ),
    )
}

fn build_correction(entry: &CompetencyEntry, nearest: Option<(String, f32)>) -> Correction {
    let citation = entry.citation();
    let suggestion = match &nearest {
        Some((phrase, _)) => format!(
            "You said \"{phrase}\". Name it as {}{citation} and describe what the work involved.",
            entry.term
        ),
        None => format!(
            "The answer never demonstrates {}{citation}. Add a concrete example of it.",
            entry.term
        ),
    };
    let (colloquial_phrase, phrase_similarity) = match nearest {
        Some((phrase, similarity)) => (Some(phrase), similarity),
        None => (None, 0.0),
    };

    Correction {
        term: entry.term.clone(),
        code: entry.code.clone(),
        proficiency: entry.proficiency.clone(),
        colloquial_phrase,
        phrase_similarity,
        suggestion,
    }
}

/// Clause-level spans of the answer: split on sentence punctuation, commas,
/// semicolons, and the coordinators "and/but/so/then", capped at
/// `MAX_PHRASE_WORDS` words each.
pub fn split_phrases(answer: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    for clause in answer.split(['.', '!', '?', ',', ';', ':', '\n']) {
        let mut current: Vec<&str> = Vec::new();
        for word in clause.split_whitespace() {
            let bare = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if COORDINATORS.contains(&bare.as_str()) {
                flush(&mut current, &mut phrases);
                continue;
            }
            current.push(word);
            if current.len() == MAX_PHRASE_WORDS {
                flush(&mut current, &mut phrases);
            }
        }
        flush(&mut current, &mut phrases);
    }
    phrases
}

fn flush(current: &mut Vec<&str>, phrases: &mut Vec<String>) {
    if !current.is_empty() {
        phrases.push(current.join(" "));
        current.clear();
    }
}

/// Keeps the best phrase only when it clears `MIN_PHRASE_SIMILARITY`.
fn above_floor(best: Option<(String, f32)>) -> Option<(String, f32)> {
    best.filter(|(_, similarity)| *similarity >= MIN_PHRASE_SIMILARITY)
}

/// Highest-similarity phrase. Ties keep the earlier phrase.
fn nearest_by_vector(
    phrases: &[String],
    vectors: &[Vec<f32>],
    target: &[f32],
) -> Option<(String, f32)> {
    let mut best: Option<(String, f32)> = None;
    for (phrase, vector) in phrases.iter().zip(vectors) {
        let similarity = cosine_similarity(vector, target);
        if best.as_ref().map_or(true, |(_, b)| similarity > *b) {
            best = Some((phrase.clone(), similarity));
        }
    }
    above_floor(best)
}

fn stemmed_terms(text: &str) -> HashSet<String> {
    content_terms(text).iter().map(|t| stem(t)).collect()
}

/// Jaccard overlap of stemmed content words against the entry's term and description.
fn nearest_by_overlap(phrases: &[String], entry: &CompetencyEntry) -> Option<(String, f32)> {
    let target = stemmed_terms(&embedding_text(&entry.term, &entry.description));
    let mut best: Option<(String, f32)> = None;
    for phrase in phrases {
        let words = stemmed_terms(phrase);
        let union = words.union(&target).count();
        let similarity = if union == 0 {
            0.0
        } else {
            words.intersection(&target).count() as f32 / union as f32
        };
        if best.as_ref().map_or(true, |(_, b)| similarity > *b) {
            best = Some((phrase.clone(), similarity));
        }
    }
    above_floor(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::embeddings::{EmbeddingError, HashingEmbedder};
    use crate::retrieval::evaluate_coverage;
    use crate::test_support::{build_test_index, FailingEmbedder};

    const TAU: f32 = 0.45;

    async fn coverage_for(answer: &str) -> CoverageResult {
        let index = build_test_index().await;
        evaluate_coverage(&index, "Audit Associate", answer, &HashingEmbedder::default(), TAU)
            .await
            .unwrap()
    }

    #[test]
    fn test_split_phrases_on_punctuation_and_coordinators() {
        assert_eq!(
            split_phrases("I checked the numbers every week, and then I told my manager. Done!"),
            vec!["I checked the numbers every week", "I told my manager", "Done"]
        );
    }

    #[test]
    fn test_split_phrases_caps_length() {
        let long = (1..=30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let phrases = split_phrases(&long);
        assert_eq!(phrases.len(), 3);
        assert!(phrases.iter().all(|p| p.split_whitespace().count() <= MAX_PHRASE_WORDS));
    }

    #[tokio::test]
    async fn test_colloquial_answer_gets_correction_with_reference_code() {
        let answer = "I checked the bank balances every week, and I told my manager";
        let agent = ManagerAgent::new(Arc::new(HashingEmbedder::default()));
        let findings = agent
            .critique(&ManagerInput {
                coverage: coverage_for(answer).await,
                answer: answer.to_string(),
            })
            .await
            .unwrap();

        assert_eq!(findings.verdict, Verdict::NeedsWork);
        let correction = findings
            .corrections
            .iter()
            .find(|c| c.term == "Financial Reconciliation")
            .unwrap();
        assert_eq!(correction.code.as_deref(), Some("ACC-FRE-3001-1.1"));
        assert_eq!(
            correction.colloquial_phrase.as_deref(),
            Some("I checked the bank balances every week")
        );
        assert!(correction.phrase_similarity >= MIN_PHRASE_SIMILARITY);
        assert!(correction.suggestion.contains("Financial Reconciliation"));
        assert!(correction.suggestion.contains("ACC-FRE-3001-1.1"));
        assert!(findings.critical_coverage < 1.0);
    }

    #[test]
    fn test_nearest_phrase_respects_similarity_floor() {
        let phrases = vec!["I went hiking".to_string()];
        assert_eq!(nearest_by_vector(&phrases, &[vec![0.0, 1.0]], &[1.0, 0.0]), None);
        assert_eq!(
            nearest_by_vector(&phrases, &[vec![0.6, 0.8]], &[1.0, 0.0]),
            Some(("I went hiking".to_string(), 0.6))
        );
        // Opposite direction is never a match.
        assert_eq!(nearest_by_vector(&phrases, &[vec![-1.0, 0.0]], &[1.0, 0.0]), None);
    }

    #[tokio::test]
    async fn test_complete_answer_is_approved() {
        let answer = "I performed financial reconciliation monthly, kept audit documentation \
            current, and tested internal controls.";
        let agent = ManagerAgent::new(Arc::new(HashingEmbedder::default()));
        let findings = agent
            .critique(&ManagerInput {
                coverage: coverage_for(answer).await,
                answer: answer.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(findings.verdict, Verdict::Approved);
        assert!(findings.corrections.is_empty());
        assert_eq!(findings.critical_coverage, 1.0);
        assert!(findings.summary.starts_with("Approved"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phrase_embedding_failure_falls_back_to_overlap() {
        let answer = "I reconciled balances weekly, and I filed paperwork";
        let coverage = coverage_for(answer).await;
        let agent = ManagerAgent::new(Arc::new(FailingEmbedder));
        let findings = agent
            .critique(&ManagerInput {
                coverage,
                answer: answer.to_string(),
            })
            .await
            .unwrap();
        let phrase_for = |term: &str| {
            findings
                .corrections
                .iter()
                .find(|c| c.term == term)
                .map(|c| c.colloquial_phrase.clone())
        };
        assert_eq!(
            phrase_for("Financial Reconciliation"),
            Some(Some("I reconciled balances weekly".to_string()))
        );
        // No shared word with "Internal Controls": nothing is paired.
        assert_eq!(phrase_for("Internal Controls"), Some(None));
    }

    /// Hashing embedder that takes a second per call and counts calls in flight.
    struct SlowEmbedder {
        inner: HashingEmbedder,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        fn name(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_phrase_embeddings_run_concurrently() {
        let answer = "I checked the bank balances, I told my manager, I fixed the errors, \
            I wrote it down, and I trained the team";
        let phrases = split_phrases(answer);
        assert_eq!(phrases.len(), 5);
        let embedder = Arc::new(SlowEmbedder {
            inner: HashingEmbedder::default(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let agent = ManagerAgent::new(embedder.clone());

        let started = tokio::time::Instant::now();
        let vectors = agent.embed_phrases(&phrases).await.unwrap();

        assert_eq!(vectors.len(), phrases.len());
        assert_eq!(vectors[0], HashingEmbedder::default().embed_sync(&phrases[0]));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(embedder.peak.load(Ordering::SeqCst), phrases.len());
    }

    #[test]
    fn test_no_critical_terms_means_full_coverage() {
        let coverage = CoverageResult {
            role: "R".to_string(),
            threshold: TAU,
            covered: vec![],
            missing_critical: vec![],
            missing_optional: vec![],
        };
        let findings = build_findings(&coverage, vec![]);
        assert_eq!(findings.critical_total, 0);
        assert_eq!(findings.critical_coverage, 1.0);
        assert_eq!(findings.verdict, Verdict::Approved);
    }
}
