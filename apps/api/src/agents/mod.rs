//! The two critique agents and their shared contract.
//!
//! Each agent is a function from a structured input to structured findings.
//! Neither agent sees the other's input or output; the aggregator combines them.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::AppError;

pub mod coach;
pub mod containment;
pub mod manager;
pub mod prompts;
pub mod rubric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Manager,
    Coach,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Manager => write!(f, "manager"),
            AgentKind::Coach => write!(f, "coach"),
        }
    }
}

/// A critique pass. Implement this to swap an agent's backend without
/// touching the pipeline or the aggregator.
#[async_trait]
pub trait CritiqueAgent: Send + Sync {
    type Input: Send + Sync;
    type Findings: Send;

    fn kind(&self) -> AgentKind;

    async fn critique(&self, input: &Self::Input) -> Result<Self::Findings, AppError>;
}
