use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::session::models::Question;

const DEFAULT_QUESTIONS: &[&str] = &[
    "Tell me about yourself.",
    "Describe a time you handled a difficult stakeholder.",
    "Tell me about a mistake you made at work and what you learned from it.",
    "Describe a situation where you had to meet a tight deadline.",
    "Give an example of a time you improved a process.",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CuratedQuestion {
    pub id: u32,
    pub text: String,
}

/// A bank entry is either a bare string or an object with a `question` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuestion {
    Text(String),
    Object {
        #[serde(default)]
        question: String,
    },
}

#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<CuratedQuestion>,
}

impl Default for QuestionBank {
    fn default() -> Self {
        Self::from_texts(DEFAULT_QUESTIONS.iter().map(|q| q.to_string()))
    }
}

impl QuestionBank {
    /// Assigns ids in file order. Blank and repeated questions are dropped.
    fn from_texts(texts: impl IntoIterator<Item = String>) -> Self {
        let mut seen = HashSet::new();
        let questions = texts
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
            .zip(1u32..)
            .map(|(text, id)| CuratedQuestion { id, text })
            .collect();
        Self { questions }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let items: Vec<RawQuestion> =
            serde_json::from_str(raw).context("Question bank must be a JSON array")?;
        Ok(Self::from_texts(items.into_iter().map(|item| match item {
            RawQuestion::Text(t) => t,
            RawQuestion::Object { question } => question,
        })))
    }

    /// Loads the bank from `path`, falling back to the built-in set when no
    /// path is configured or the file is unusable.
    pub async fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let loaded = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read question bank {}", path.display()))
            .and_then(|raw| Self::from_json(&raw));
        match loaded {
            Ok(bank) if !bank.questions.is_empty() => {
                info!("Loaded {} questions from {}", bank.questions.len(), path.display());
                bank
            }
            Ok(_) => {
                warn!("Question bank {} is empty, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("{e:#}; using default questions");
                Self::default()
            }
        }
    }

    pub fn all(&self) -> &[CuratedQuestion] {
        &self.questions
    }

    /// Curated when the text matches a bank entry (ignoring case and
    /// surrounding whitespace), free text otherwise.
    pub fn classify(&self, text: &str) -> Question {
        let trimmed = text.trim();
        match self
            .questions
            .iter()
            .find(|q| q.text.eq_ignore_ascii_case(trimmed))
        {
            Some(q) => Question::Curated {
                id: q.id,
                text: q.text.clone(),
            },
            None => Question::FreeText {
                text: trimmed.to_string(),
            },
        }
    }
}
