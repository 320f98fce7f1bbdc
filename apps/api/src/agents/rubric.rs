//! Cue-based classifier for the four narrative components of a behavioral answer.
//!
//! Each component has weighted cue patterns. A component's confidence is the
//! sum of the weights of the cues that match, clamped to 1.0.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricComponent {
    Situation,
    Task,
    Action,
    Result,
}

impl RubricComponent {
    pub const ALL: [RubricComponent; 4] = [
        RubricComponent::Situation,
        RubricComponent::Task,
        RubricComponent::Action,
        RubricComponent::Result,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RubricComponent::Situation => "Situation",
            RubricComponent::Task => "Task",
            RubricComponent::Action => "Action",
            RubricComponent::Result => "Result",
        }
    }
}

struct Cue {
    pattern: Regex,
    weight: f32,
}

fn cue(pattern: &str, weight: f32) -> Cue {
    Cue {
        pattern: Regex::new(&format!("(?i){pattern}")).expect("invalid rubric cue"),
        weight,
    }
}

static CUES: Lazy<Vec<(RubricComponent, Vec<Cue>)>> = Lazy::new(|| {
    vec![
        (
            RubricComponent::Situation,
            vec![
                cue(r"\b(when|while|during)\b", 0.3),
                cue(
                    r"\b(at|in) my (last|previous|current|first) (role|job|company|internship|team|position)\b",
                    0.5,
                ),
                cue(r"\b(situation|context|background|at the time)\b", 0.4),
                cue(
                    r"\b(problem|challenge|issue|backlog|deadline|shortage|complaint|crisis)\w*\b",
                    0.3,
                ),
                cue(r"\bthere (was|were)\b", 0.3),
            ],
        ),
        (
            RubricComponent::Task,
            vec![
                cue(r"\bmy (task|role|responsibility|job|goal|objective) was\b", 0.6),
                cue(
                    r"\b(i|we) (was|were) (responsible|asked|tasked|assigned|expected)\b",
                    0.6,
                ),
                cue(r"\b(i|we) (needed|had|wanted) to\b", 0.5),
                cue(r"\b(the goal|the aim|the objective|the target) was\b", 0.5),
                cue(r"\b(responsible for|in charge of|ownership of)\b", 0.3),
            ],
        ),
        (
            RubricComponent::Action,
            vec![
                cue(
                    r"\b(i|we) (checked|reviewed|built|created|led|organi[sz]ed|implemented|developed|analy[sz]ed|reconciled|prepared|wrote|designed|tested|set up|coordinated|negotiated|contacted|traced|investigated|fixed|resolved|proposed|introduced|automated|trained|documented|verified|compared|identified|communicated|scheduled|tracked|monitored|handled|managed|decided|started|used|worked|spoke|met|asked|called|went)\b",
                    0.6,
                ),
                cue(r"\bi \w+ed\b", 0.3),
                cue(r"\b(first|then|next|after that|afterwards|so i|i decided to)\b", 0.3),
            ],
        ),
        (
            RubricComponent::Result,
            vec![
                cue(
                    r"\b(as a result|resulted in|led to|the outcome|in the end|eventually|ultimately|consequently)\b",
                    0.6,
                ),
                cue(
                    r"\b(reduc|increas|improv|sav|cut|grew|achiev|complet|deliver|eliminat|prevent)\w*\b",
                    0.3,
                ),
                cue(r"\d+(\.\d+)?\s*(%|percent|per cent)", 0.4),
                cue(r"\b(praised|recogni[sz]ed|promoted|awarded|thanked|adopted)\b", 0.3),
            ],
        ),
    ]
});

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComponentScore {
    pub component: RubricComponent,
    pub confidence: f32,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RubricAssessment {
    pub scores: Vec<ComponentScore>,
}

impl RubricAssessment {
    pub fn missing(&self) -> Vec<RubricComponent> {
        self.scores
            .iter()
            .filter(|s| !s.present)
            .map(|s| s.component)
            .collect()
    }

    /// Fraction of the four components judged present.
    pub fn fraction_present(&self) -> f32 {
        let present = self.scores.iter().filter(|s| s.present).count();
        present as f32 / RubricComponent::ALL.len() as f32
    }
}

fn confidence(component: RubricComponent, text: &str) -> f32 {
    CUES.iter()
        .find(|(c, _)| *c == component)
        .map(|(_, cues)| {
            cues.iter()
                .filter(|cue| cue.pattern.is_match(text))
                .map(|cue| cue.weight)
                .sum::<f32>()
        })
        .unwrap_or(0.0)
        .min(1.0)
}

/// Scores all four components. Present means `confidence >= presence_threshold`.
pub fn assess(text: &str, presence_threshold: f32) -> RubricAssessment {
    let scores = RubricComponent::ALL
        .iter()
        .map(|&component| {
            let confidence = confidence(component, text);
            ComponentScore {
                component,
                confidence,
                present: confidence >= presence_threshold,
            }
        })
        .collect();
    RubricAssessment { scores }
}

/// The component a single sentence most resembles, if any cue fires.
/// Ties go to the earlier component in S-T-A-R order.
pub fn sentence_component(sentence: &str) -> Option<RubricComponent> {
    let mut best: Option<(RubricComponent, f32)> = None;
    for component in RubricComponent::ALL {
        let c = confidence(component, sentence);
        if c > 0.0 && best.map_or(true, |(_, b)| c > b) {
            best = Some((component, c));
        }
    }
    best.map(|(component, _)| component)
}
