//! Source dataset parsing: the framework's (role, term, description) rows.
//!
//! Rows are decoded one at a time from a JSON array so a single malformed row
//! is reported and skipped instead of rejecting the whole file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::competency::IndexError;

/// One validated row of the competency framework dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceRow {
    pub role: String,
    pub term: String,
    pub description: String,
    /// Framework reference code, e.g. `ACC-FRE-3001-1.1`.
    #[serde(default)]
    pub code: Option<String>,
    /// Required proficiency level as stated by the framework.
    #[serde(default)]
    pub proficiency: Option<String>,
    /// Source rank within the role; position in file when absent.
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub critical: bool,
}

/// Decodes a dataset document. Fails only when the document itself is not a
/// JSON array; individual bad rows come back as `MalformedSourceRow` errors.
pub fn parse_source_rows(json: &str) -> Result<(Vec<SourceRow>, Vec<IndexError>), IndexError> {
    let values: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| IndexError::Dataset(format!("dataset must be a JSON array of rows: {e}")))?;

    let mut rows = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();

    for (i, value) in values.into_iter().enumerate() {
        let row_number = i + 1;
        match serde_json::from_value::<SourceRow>(value) {
            Ok(row) => match validate_row(row) {
                Ok(row) => rows.push(row),
                Err(reason) => rejected.push(IndexError::MalformedSourceRow { row: row_number, reason }),
            },
            Err(e) => rejected.push(IndexError::MalformedSourceRow {
                row: row_number,
                reason: e.to_string(),
            }),
        }
    }

    for err in &rejected {
        warn!("Skipping competency source row: {err}");
    }

    Ok((rows, rejected))
}

/// Reads and decodes the dataset file at `path`.
pub async fn load_source_rows(path: &Path) -> Result<(Vec<SourceRow>, Vec<IndexError>)> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read competency dataset {}", path.display()))?;
    Ok(parse_source_rows(&raw)?)
}

fn validate_row(mut row: SourceRow) -> Result<SourceRow, String> {
    row.role = row.role.trim().to_string();
    row.term = row.term.trim().to_string();
    row.description = row.description.trim().to_string();
    row.code = row.code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    row.proficiency = row
        .proficiency
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    if row.role.is_empty() {
        return Err("role is blank".to_string());
    }
    if row.term.is_empty() {
        return Err("term is blank".to_string());
    }
    if row.rank == Some(0) {
        return Err("rank must be 1 or greater".to_string());
    }
    Ok(row)
}
