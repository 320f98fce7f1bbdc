use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::aggregator::CritiqueResult;

/// Candidate facts extracted once from an uploaded document.
/// Replaced wholesale on re-upload, never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub skill_mentions: Vec<String>,
    pub snippets: Vec<String>,
    pub set_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self.skill_mentions.is_empty() && self.snippets.is_empty()
    }

    /// Every span the Coach may draw facts from.
    pub fn fact_sources(&self) -> Vec<String> {
        self.snippets
            .iter()
            .chain(self.skill_mentions.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
    Curated { id: u32, text: String },
    FreeText { text: String },
}

impl Question {
    pub fn text(&self) -> &str {
        match self {
            Question::Curated { text, .. } | Question::FreeText { text } => text,
        }
    }
}

/// One question/answer/critique cycle. Only complete turns are recorded.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub index: usize,
    pub question: Question,
    pub answer: String,
    /// Role the critique ran under; history is not re-validated after a role swap.
    pub role_at_submission: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub critique: CritiqueResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub profile: Profile,
    pub role: Option<String>,
    turns: Vec<Turn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            profile: Profile::default(),
            role: None,
            turns: Vec::new(),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append-only: past turns are never edited or removed.
    pub fn record_turn(&mut self, mut turn: Turn) {
        turn.index = self.turns.len();
        self.turns.push(turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_has_no_role_and_empty_profile() {
        let s = Session::new();
        assert!(s.role.is_none());
        assert!(s.profile.is_empty());
        assert!(s.turns().is_empty());
        assert_ne!(Session::default().id, s.id);
    }

    #[test]
    fn test_fact_sources_include_snippets_and_skills() {
        let p = Profile {
            skill_mentions: vec!["SQL".to_string()],
            snippets: vec!["Led the audit of 12 branches".to_string()],
            set_at: None,
        };
        assert_eq!(p.fact_sources().len(), 2);
    }

    #[test]
    fn test_question_serializes_with_kind_tag() {
        let q = Question::FreeText {
            text: "Why audit?".to_string(),
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["kind"], "free_text");
        assert_eq!(q.text(), "Why audit?");
    }
}
