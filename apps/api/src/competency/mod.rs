//! Competency Index: role → ranked required terminology, built once from the
//! framework dataset and read-only afterwards.
//!
//! Ordering contract for every role: critical entries first, then ascending
//! source rank, then term (tie-break only).

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::embeddings::{cosine_similarity, embed_with_retry, Embedder};
use crate::errors::AppError;

pub mod handlers;
pub mod snapshot;
pub mod source;

use source::SourceRow;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Role '{0}' is not in the competency index")]
    NotFound(String),

    #[error("Malformed source row {row}: {reason}")]
    MalformedSourceRow { row: usize, reason: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// A required competency for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyEntry {
    pub role: String,
    pub term: String,
    pub description: String,
    pub code: Option<String>,
    pub proficiency: Option<String>,
    pub rank: u32,
    /// Absence of a critical term must always be flagged.
    pub critical: bool,
    /// Embedding of `term: description`. Not exposed over the API.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl CompetencyEntry {
    /// " (Ref: CODE, proficiency N)", or whichever part is known.
    pub fn citation(&self) -> String {
        match (&self.code, &self.proficiency) {
            (Some(code), Some(level)) => format!(" (Ref: {code}, proficiency {level})"),
            (Some(code), None) => format!(" (Ref: {code})"),
            (None, Some(level)) => format!(" (proficiency {level})"),
            (None, None) => String::new(),
        }
    }
}

/// An entry paired with its similarity to some query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntry {
    pub entry: CompetencyEntry,
    pub similarity: f32,
}

/// Outcome of an index build, for startup logging.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub rows_read: usize,
    pub rows_indexed: usize,
    pub skipped: Vec<String>,
    /// Rows dropped because the embedder failed, as opposed to bad data.
    pub embedding_failures: usize,
}

impl BuildReport {
    /// A build worth caching: something was indexed and no row was lost to
    /// an embedder outage.
    pub fn is_complete(&self) -> bool {
        self.rows_indexed > 0 && self.embedding_failures == 0
    }
}

#[derive(Debug, Default, Clone)]
pub struct CompetencyIndex {
    roles: BTreeMap<String, Vec<CompetencyEntry>>,
}

/// Text that represents an entry in vector space.
pub fn embedding_text(term: &str, description: &str) -> String {
    if description.is_empty() {
        term.to_string()
    } else {
        format!("{term}: {description}")
    }
}

fn entry_order(a: &CompetencyEntry, b: &CompetencyEntry) -> Ordering {
    b.critical
        .cmp(&a.critical)
        .then(a.rank.cmp(&b.rank))
        .then_with(|| a.term.cmp(&b.term))
}

impl CompetencyIndex {
    /// Embeds every row and groups the results by role. Rows that fail to
    /// embed (after one retry) or duplicate an earlier (role, term) are skipped
    /// and logged; neither aborts the build.
    pub async fn build(rows: Vec<SourceRow>, embedder: &dyn Embedder) -> (Self, BuildReport) {
        let mut report = BuildReport {
            rows_read: rows.len(),
            ..BuildReport::default()
        };
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut position_in_role: BTreeMap<String, u32> = BTreeMap::new();
        let mut entries = Vec::with_capacity(rows.len());

        for row in rows {
            let position = position_in_role.entry(row.role.clone()).or_insert(0);
            *position += 1;
            let rank = row.rank.unwrap_or(*position);

            if !seen.insert((row.role.clone(), row.term.to_lowercase())) {
                let reason = format!("duplicate term '{}' for role '{}'", row.term, row.role);
                warn!("Skipping competency source row: {reason}");
                report.skipped.push(reason);
                continue;
            }

            let text = embedding_text(&row.term, &row.description);
            let embedding = match embed_with_retry(embedder, &text).await {
                Ok(v) => v,
                Err(e) => {
                    let reason = format!("embedding failed for '{}' ({}): {e}", row.term, row.role);
                    warn!("Skipping competency source row: {reason}");
                    report.skipped.push(reason);
                    report.embedding_failures += 1;
                    continue;
                }
            };

            entries.push(CompetencyEntry {
                role: row.role,
                term: row.term,
                description: row.description,
                code: row.code,
                proficiency: row.proficiency,
                rank,
                critical: row.critical,
                embedding,
            });
        }

        report.rows_indexed = entries.len();
        let index = Self::from_entries(entries);
        info!(
            "Competency index built: {} roles, {} entries, {} rows skipped",
            index.roles.len(),
            report.rows_indexed,
            report.skipped.len()
        );
        (index, report)
    }

    /// Groups and orders pre-embedded entries.
    pub fn from_entries(entries: Vec<CompetencyEntry>) -> Self {
        let mut roles: BTreeMap<String, Vec<CompetencyEntry>> = BTreeMap::new();
        for entry in entries {
            roles.entry(entry.role.clone()).or_default().push(entry);
        }
        for list in roles.values_mut() {
            list.sort_by(entry_order);
        }
        Self { roles }
    }

    /// Ordered entries for `role`.
    pub fn lookup(&self, role: &str) -> Result<&[CompetencyEntry], IndexError> {
        self.roles
            .get(role)
            .map(Vec::as_slice)
            .ok_or_else(|| IndexError::NotFound(role.to_string()))
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// True when `term` is a competency of `role` (case-insensitive).
    pub fn contains_term(&self, role: &str, term: &str) -> bool {
        self.roles
            .get(role)
            .map(|list| list.iter().any(|e| e.term.eq_ignore_ascii_case(term)))
            .unwrap_or(false)
    }

    /// All roles, sorted.
    pub fn roles(&self) -> Vec<&str> {
        self.roles.keys().map(String::as_str).collect()
    }

    pub fn entry_count(&self) -> usize {
        self.roles.values().map(Vec::len).sum()
    }

    pub(crate) fn role_map(&self) -> &BTreeMap<String, Vec<CompetencyEntry>> {
        &self.roles
    }

    /// Top-`k` entries for `role` by cosine similarity to a pre-computed query vector.
    /// Ties keep index order.
    pub fn search_by_vector(
        &self,
        role: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>, IndexError> {
        let mut scored: Vec<ScoredEntry> = self
            .lookup(role)?
            .iter()
            .map(|entry| ScoredEntry {
                similarity: cosine_similarity(query, &entry.embedding),
                entry: entry.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Top-`k` entries for `role` by similarity to `query_text`.
    pub async fn search(
        &self,
        role: &str,
        query_text: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredEntry>, AppError> {
        // Unknown role fails before spending an embedding call.
        self.lookup(role)?;
        let query = embed_with_retry(embedder, query_text).await?;
        Ok(self.search_by_vector(role, &query, k)?)
    }
}
