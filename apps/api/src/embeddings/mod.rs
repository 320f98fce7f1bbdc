//! Embeddings: the vector capability behind the Competency Index and retrieval.
//!
//! Default: `HttpEmbedder` against an OpenAI-compatible `/v1/embeddings` endpoint.
//! Fallback: `HashingEmbedder` (pure-Rust, deterministic, no network) when no key
//! is configured; it also gives tests fixed embeddings.
//!
//! `AppState` holds an `Arc<dyn Embedder>`, chosen at startup via config.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retry::{retry_once, Transient};

const REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Embedding response contained no vectors")]
    EmptyResponse,
}

impl Transient for EmbeddingError {
    fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Http(_) => true,
            EmbeddingError::Api { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::EmptyResponse => false,
        }
    }
}

/// The embedding capability: `embed(text) -> vector`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Identifies the vector space; snapshots built by a different embedder are rejected.
    fn name(&self) -> String;
}

/// `embed` with the shared one-retry policy applied.
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    retry_once("Embedding", || embedder.embed(text)).await
}

// ────────────────────────────────────────────────────────────────────────────
// HttpEmbedder
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(api_key: String, url: String, model: String) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key,
            url,
            model,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingResponse = response.json().await?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::EmptyResponse)?;
        debug!("Embedded {} chars into {} dims", text.len(), vector.len());
        Ok(vector)
    }

    fn name(&self) -> String {
        format!("http:{}", self.model)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HashingEmbedder
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic feature-hashing embedder over stemmed content words and
/// adjacent word pairs. Literal and near-literal overlap scores high; unrelated
/// wording scores near zero.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

const BIGRAM_WEIGHT: f32 = 0.5;

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dims: 1024 }
    }
}

impl HashingEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dims];
        let terms: Vec<String> = content_terms(text).into_iter().map(|t| stem(&t)).collect();

        for term in &terms {
            self.add_feature(&mut vector, term, 1.0);
        }
        for pair in terms.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let slot = (hash % self.dims as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[slot] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    fn name(&self) -> String {
        format!("hashing:{}", self.dims)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

// ────────────────────────────────────────────────────────────────────────────
// Text helpers
// ────────────────────────────────────────────────────────────────────────────

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "during",
    "each", "every", "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if",
    "in", "into", "is", "it", "its", "just", "me", "more", "most", "my", "no", "not", "of", "on",
    "once", "or", "other", "our", "out", "over", "she", "so", "some", "such", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "up", "us", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "will", "with", "would", "you", "your",
];

/// Lowercased alphanumeric word tokens, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `tokenize` minus stopwords.
pub fn content_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Light suffix folding so "reconcile", "reconciled", and "reconciling" share a feature.
pub fn stem(word: &str) -> String {
    let mut w = word;
    for suffix in ["ing", "ed", "es", "s"] {
        if w.len() > suffix.len() + 3 && w.ends_with(suffix) && !w.ends_with("ss") {
            w = &w[..w.len() - suffix.len()];
            break;
        }
    }
    w.strip_suffix('e').filter(|s| s.len() >= 3).unwrap_or(w).to_string()
}

/// Cosine similarity in [-1, 1]; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_handles_zero_and_mismatched_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_hashing_embedder_is_deterministic() {
        let e = HashingEmbedder::default();
        assert_eq!(
            e.embed_sync("Financial reconciliation of accounts"),
            e.embed_sync("Financial reconciliation of accounts")
        );
    }

    #[test]
    fn test_hashing_embedder_scores_paraphrase_above_unrelated() {
        let e = HashingEmbedder::default();
        let entry = e.embed_sync("Financial Reconciliation: reconcile ledger accounts");
        let close = e.embed_sync("I reconciled the ledger accounts");
        let far = e.embed_sync("I organised a team offsite");
        assert!(cosine_similarity(&entry, &close) > cosine_similarity(&entry, &far));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let v = HashingEmbedder::default().embed_sync("the and of");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_stem_folds_common_suffixes() {
        assert_eq!(stem("reconciled"), stem("reconcile"));
        assert_eq!(stem("reconciling"), stem("reconcile"));
        assert_eq!(stem("accounts"), "account");
        assert_eq!(stem("process"), "process");
    }

    #[test]
    fn test_content_terms_drop_stopwords() {
        assert_eq!(
            content_terms("I checked the numbers every week"),
            vec!["checked", "numbers", "week"]
        );
    }
}
