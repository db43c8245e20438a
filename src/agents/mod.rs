//! Agent runners.
//!
//! A runner takes an event and returns findings, recommendations and a
//! confidence score. The parallel executor treats every runner the same way
//! through the [`Runner`] trait.

pub mod graph;
pub mod investigator;
pub mod llm;
pub mod security_scan;
pub mod soc_analyst;

pub use investigator::IncidentInvestigator;
pub use llm::LlmClient;
pub use security_scan::SecurityScanRunner;
pub use soc_analyst::SocAnalystRunner;

use crate::models::{AgentEvent, EventType, Finding};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a runner does with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Investigate,
    Scan,
    Run,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Investigate => write!(f, "investigate"),
            RunnerKind::Scan => write!(f, "scan"),
            RunnerKind::Run => write!(f, "run"),
        }
    }
}

/// One executed workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Result of a single runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: String,
    pub kind: RunnerKind,
    pub summary: String,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    /// Confidence in the result (0..=1).
    pub confidence: f64,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl AgentOutput {
    pub fn new(agent: impl Into<String>, kind: RunnerKind) -> Self {
        Self {
            agent: agent.into(),
            kind,
            summary: String::new(),
            findings: Vec::new(),
            recommendations: Vec::new(),
            confidence: 0.0,
            steps: Vec::new(),
        }
    }

    /// Set the confidence, clamped into `0..=1`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn recommend(&mut self, recommendation: impl Into<String>) {
        let recommendation = recommendation.into();
        if !self.recommendations.contains(&recommendation) {
            self.recommendations.push(recommendation);
        }
    }
}

/// An agent the supervisor can delegate to.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Unique name used in routing tables.
    fn name(&self) -> &str;

    fn kind(&self) -> RunnerKind;

    /// Whether this runner can work on events of the given type.
    fn handles(&self, event_type: EventType) -> bool;

    async fn run(&self, event: &AgentEvent) -> Result<AgentOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(AgentOutput::new("a", RunnerKind::Run).with_confidence(1.7).confidence, 1.0);
        assert_eq!(AgentOutput::new("a", RunnerKind::Run).with_confidence(-0.2).confidence, 0.0);
        assert_eq!(
            AgentOutput::new("a", RunnerKind::Run)
                .with_confidence(f64::NAN)
                .confidence,
            0.0
        );
    }

    #[test]
    fn test_recommend_deduplicates() {
        let mut output = AgentOutput::new("soc", RunnerKind::Investigate);
        output.recommend("Block IP");
        output.recommend("Block IP");
        output.recommend("Reset credentials");
        assert_eq!(output.recommendations.len(), 2);
    }
}
