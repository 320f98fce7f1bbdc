//! Retrieval: which of a role's competencies does an answer cover?
//!
//! Stateless. Reads the index, never mutates it or the session.

use serde::Serialize;
use tracing::debug;

use crate::competency::{CompetencyEntry, CompetencyIndex};
use crate::embeddings::{cosine_similarity, embed_with_retry, tokenize, Embedder};
use crate::errors::AppError;

pub mod gap;

/// Similarity assigned to an entry whose canonical term appears verbatim.
pub const LITERAL_MENTION_SIMILARITY: f32 = 1.0;

#[derive(Debug, Clone, Serialize)]
pub struct CoverageScore {
    pub entry: CompetencyEntry,
    pub similarity: f32,
    pub literal_mention: bool,
}

impl CoverageScore {
    pub fn term(&self) -> &str {
        &self.entry.term
    }
}

/// Every list keeps the index order for the role (critical first, then rank).
#[derive(Debug, Clone, Serialize)]
pub struct CoverageResult {
    pub role: String,
    pub threshold: f32,
    pub covered: Vec<CoverageScore>,
    pub missing_critical: Vec<CoverageScore>,
    pub missing_optional: Vec<CoverageScore>,
}

impl CoverageResult {
    pub fn critical_total(&self) -> usize {
        self.covered.iter().filter(|s| s.entry.critical).count() + self.missing_critical.len()
    }

    pub fn critical_covered(&self) -> usize {
        self.covered.iter().filter(|s| s.entry.critical).count()
    }

    pub fn missing_critical_terms(&self) -> Vec<&str> {
        self.missing_critical.iter().map(CoverageScore::term).collect()
    }
}

/// True when the words of `term` occur contiguously in `text`, ignoring case,
/// punctuation, and spacing.
pub fn mentions_term(text: &str, term: &str) -> bool {
    let term_words = tokenize(term);
    if term_words.is_empty() {
        return false;
    }
    let haystack = format!(" {} ", tokenize(text).join(" "));
    haystack.contains(&format!(" {} ", term_words.join(" ")))
}

/// Scores each entry against a pre-computed answer vector and splits the
/// role's entries into covered / missing. Covered means `similarity > threshold`.
pub fn classify_coverage(
    role: &str,
    entries: &[CompetencyEntry],
    answer_text: &str,
    answer_vector: &[f32],
    threshold: f32,
) -> CoverageResult {
    let mut result = CoverageResult {
        role: role.to_string(),
        threshold,
        covered: Vec::new(),
        missing_critical: Vec::new(),
        missing_optional: Vec::new(),
    };

    for entry in entries {
        let literal_mention = mentions_term(answer_text, &entry.term);
        let similarity = if literal_mention {
            LITERAL_MENTION_SIMILARITY
        } else {
            cosine_similarity(answer_vector, &entry.embedding)
        };
        let score = CoverageScore {
            entry: entry.clone(),
            similarity,
            literal_mention,
        };

        if similarity > threshold {
            result.covered.push(score);
        } else if entry.critical {
            result.missing_critical.push(score);
        } else {
            result.missing_optional.push(score);
        }
    }
    result
}

/// Retrieves the ranked entries for `role`, embeds the answer once, and
/// classifies every entry.
pub async fn evaluate_coverage(
    index: &CompetencyIndex,
    role: &str,
    answer_text: &str,
    embedder: &dyn Embedder,
    threshold: f32,
) -> Result<CoverageResult, AppError> {
    let entries = index.lookup(role)?;
    let answer_vector = embed_with_retry(embedder, answer_text).await?;
    let result = classify_coverage(role, entries, answer_text, &answer_vector, threshold);
    debug!(
        "Coverage for '{role}': {} covered, {} missing critical, {} missing optional",
        result.covered.len(),
        result.missing_critical.len(),
        result.missing_optional.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::test_support::{build_test_index, FailingEmbedder};

    const TAU: f32 = 0.45;

    fn entry(term: &str, critical: bool, embedding: Vec<f32>) -> CompetencyEntry {
        CompetencyEntry {
            role: "R".to_string(),
            term: term.to_string(),
            description: String::new(),
            code: None,
            proficiency: None,
            rank: 1,
            critical,
            embedding,
        }
    }

    #[test]
    fn test_mentions_term_respects_word_boundaries() {
        assert!(mentions_term("We did financial  reconciliation weekly.", "Financial Reconciliation"));
        assert!(mentions_term("Unit-testing everything", "Unit Testing"));
        assert!(!mentions_term("reconciliations", "Reconciliation"));
        assert!(!mentions_term("anything", ""));
    }

    #[test]
    fn test_similarity_equal_to_threshold_is_not_covered() {
        // cos([1,0], [3,4]) is exactly 0.6 in f32
        let entries = vec![entry("Alpha", true, vec![3.0, 4.0])];
        let result = classify_coverage("R", &entries, "unrelated", &[1.0, 0.0], 0.6);
        assert!(result.covered.is_empty());
        assert_eq!(result.missing_critical.len(), 1);
    }

    #[test]
    fn test_similarity_above_threshold_is_covered() {
        let entries = vec![entry("Alpha", true, vec![1.0, 0.0]), entry("Beta", false, vec![0.0, 1.0])];
        let result = classify_coverage("R", &entries, "unrelated", &[1.0, 0.0], TAU);
        assert_eq!(result.covered.len(), 1);
        assert_eq!(result.covered[0].term(), "Alpha");
        assert_eq!(result.missing_optional.len(), 1);
        assert!(result.missing_critical.is_empty());
    }

    #[tokio::test]
    async fn test_verbatim_critical_term_is_never_missing() {
        let index = build_test_index().await;
        let embedder = HashingEmbedder::default();
        for role in index.roles() {
            for critical in index.lookup(role).unwrap().iter().filter(|e| e.critical) {
                let answer = format!(
                    "In my last job the team relied on me for {} during a busy quarter.",
                    critical.term.to_lowercase()
                );
                let result = evaluate_coverage(&index, role, &answer, &embedder, TAU)
                    .await
                    .unwrap();
                assert!(
                    !result.missing_critical_terms().contains(&critical.term.as_str()),
                    "{} reported missing for {role}",
                    critical.term
                );
            }
        }
    }

    #[tokio::test]
    async fn test_colloquial_answer_misses_financial_reconciliation() {
        let index = build_test_index().await;
        let result = evaluate_coverage(
            &index,
            "Audit Associate",
            "I checked the numbers every week",
            &HashingEmbedder::default(),
            TAU,
        )
        .await
        .unwrap();
        assert!(result
            .missing_critical_terms()
            .contains(&"Financial Reconciliation"));
        assert_eq!(result.critical_total(), 3);
    }

    #[tokio::test]
    async fn test_missing_critical_is_deterministic() {
        let index = build_test_index().await;
        let embedder = HashingEmbedder::default();
        let answer = "I reviewed working papers and tested internal controls";
        let a = evaluate_coverage(&index, "Audit Associate", answer, &embedder, TAU)
            .await
            .unwrap();
        let b = evaluate_coverage(&index, "Audit Associate", answer, &embedder, TAU)
            .await
            .unwrap();
        assert_eq!(a.missing_critical_terms(), b.missing_critical_terms());
    }

    #[tokio::test]
    async fn test_unknown_role_is_not_found() {
        let index = build_test_index().await;
        let err = evaluate_coverage(&index, "Astronaut", "x", &HashingEmbedder::default(), TAU)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_embedding_failure_is_unavailable() {
        let index = build_test_index().await;
        let err = evaluate_coverage(&index, "Audit Associate", "x", &FailingEmbedder, TAU)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmbeddingUnavailable(_)));
    }
}
