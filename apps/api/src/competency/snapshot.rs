//! Persisted index layout: role → ordered list of (term, vector, criticality, rank).
//!
//! The snapshot is a cache. It is always rebuildable from the source dataset:
//! a snapshot written by a different embedder, in another format version, or
//! that cannot be read is ignored and replaced. Only a complete build is
//! cached.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::competency::source::load_source_rows;
use crate::competency::{CompetencyEntry, CompetencyIndex, IndexError};
use crate::embeddings::Embedder;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub embedder: String,
    pub roles: BTreeMap<String, Vec<SnapshotEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub term: String,
    pub vector: Vec<f32>,
    pub critical: bool,
    pub rank: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub proficiency: Option<String>,
}

impl CompetencyIndex {
    pub fn to_snapshot(&self, embedder: &str) -> IndexSnapshot {
        let roles = self
            .role_map()
            .iter()
            .map(|(role, entries)| {
                let list = entries
                    .iter()
                    .map(|e| SnapshotEntry {
                        term: e.term.clone(),
                        vector: e.embedding.clone(),
                        critical: e.critical,
                        rank: e.rank,
                        description: e.description.clone(),
                        code: e.code.clone(),
                        proficiency: e.proficiency.clone(),
                    })
                    .collect();
                (role.clone(), list)
            })
            .collect();

        IndexSnapshot {
            version: SNAPSHOT_VERSION,
            embedder: embedder.to_string(),
            roles,
        }
    }

    /// Rebuilds an index from a snapshot. Ordering is re-established rather than
    /// trusted, so a hand-edited snapshot cannot break the lookup contract.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self, IndexError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let entries = snapshot
            .roles
            .into_iter()
            .flat_map(|(role, list)| {
                list.into_iter().map(move |s| CompetencyEntry {
                    role: role.clone(),
                    term: s.term,
                    description: s.description,
                    code: s.code,
                    proficiency: s.proficiency,
                    rank: s.rank,
                    critical: s.critical,
                    embedding: s.vector,
                })
            })
            .collect();
        Ok(Self::from_entries(entries))
    }
}

pub async fn write_snapshot(path: &Path, snapshot: &IndexSnapshot) -> Result<()> {
    let body = serde_json::to_vec(snapshot).context("Failed to serialize index snapshot")?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write index snapshot {}", path.display()))
}

pub async fn read_snapshot(path: &Path) -> Result<IndexSnapshot> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read index snapshot {}", path.display()))?;
    serde_json::from_slice(&raw).context("Index snapshot is not valid JSON")
}

/// Loads the index from `snapshot_path` when it exists and matches the active
/// embedder; otherwise builds from the dataset and refreshes the snapshot.
pub async fn load_or_build(
    dataset_path: &Path,
    snapshot_path: Option<&Path>,
    embedder: &dyn Embedder,
) -> Result<CompetencyIndex> {
    if let Some(path) = snapshot_path.filter(|p| p.exists()) {
        match read_snapshot(path).await {
            Ok(snapshot) if snapshot.embedder == embedder.name() => {
                match CompetencyIndex::from_snapshot(snapshot) {
                    Ok(index) => {
                        info!(
                            "Competency index loaded from snapshot {} ({} entries)",
                            path.display(),
                            index.entry_count()
                        );
                        return Ok(index);
                    }
                    Err(e) => warn!("Ignoring index snapshot {}: {e}", path.display()),
                }
            }
            Ok(snapshot) => warn!(
                "Ignoring snapshot built with embedder '{}' (active: '{}')",
                snapshot.embedder,
                embedder.name()
            ),
            Err(e) => warn!("Ignoring unreadable index snapshot: {e:#}"),
        }
    }

    let (rows, rejected) = load_source_rows(dataset_path).await?;
    let (index, report) = CompetencyIndex::build(rows, embedder).await;
    info!(
        "Indexed {}/{} dataset rows ({} malformed, {} skipped during build)",
        report.rows_indexed,
        report.rows_read + rejected.len(),
        rejected.len(),
        report.skipped.len()
    );

    if let Some(path) = snapshot_path {
        if report.is_complete() {
            write_snapshot(path, &index.to_snapshot(&embedder.name())).await?;
            info!("Index snapshot written to {}", path.display());
        } else {
            warn!(
                "Not writing index snapshot {}: {} rows indexed, {} embedding failures",
                path.display(),
                report.rows_indexed,
                report.embedding_failures
            );
        }
    }
    Ok(index)
}
