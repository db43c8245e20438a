//! Data models shared by the engines, agents and the supervisor.
//!
//! This module contains the core structures for representing events,
//! findings and their summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Severity level of an event or finding.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - no action required
    Info,
    /// Low severity - hygiene, minor drift
    Low,
    /// Medium severity - degraded but contained
    #[default]
    Medium,
    /// High severity - active risk to availability or security
    High,
    /// Critical severity - ongoing incident or compromise
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "🔵",
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }

    /// Parse a loosely formatted severity string, defaulting to medium.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" | "crit" | "p1" => Severity::Critical,
            "high" | "p2" => Severity::High,
            "medium" | "moderate" | "p3" => Severity::Medium,
            "low" | "p4" => Severity::Low,
            "info" | "informational" | "p5" => Severity::Info,
            _ => Severity::Medium,
        }
    }

    /// Base threat weight used when scoring events.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Info => 0.05,
            Severity::Low => 0.15,
            Severity::Medium => 0.35,
            Severity::High => 0.6,
            Severity::Critical => 0.8,
        }
    }
}

/// Kind of event the supervisor can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Alert,
    SecurityIncident,
    Vulnerability,
    Deployment,
    ComplianceDrift,
    Custom,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Alert => "alert",
            EventType::SecurityIncident => "security_incident",
            EventType::Vulnerability => "vulnerability",
            EventType::Deployment => "deployment",
            EventType::ComplianceDrift => "compliance_drift",
            EventType::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

/// An event delivered to the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event identifier.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// What kind of event this is; drives runner selection.
    pub event_type: EventType,
    /// Originating system (e.g. "prometheus", "guardduty").
    #[serde(default)]
    pub source: String,
    /// Reported severity.
    #[serde(default)]
    pub severity: Severity,
    /// Short human-readable title.
    #[serde(default)]
    pub title: String,
    /// Free-form payload interpreted by individual runners.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When the event was received.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl AgentEvent {
    /// Creates a new event with an empty payload.
    pub fn new(event_type: EventType, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            source: String::new(),
            severity,
            title: title.into(),
            payload: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    /// Attach a payload to the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Read a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// A single finding produced by a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Unique finding identifier.
    pub id: Uuid,
    /// Name of the runner that produced the finding.
    pub source: String,
    /// Severity of the finding.
    pub severity: Severity,
    /// Category (e.g. "secret", "containment", "slo").
    pub category: String,
    /// Short title.
    pub title: String,
    /// Detailed description.
    pub description: String,
    /// Suggested remediation.
    pub recommendation: String,
    /// Affected resource (file path, service, host).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Line number (1-indexed) for file-based findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Supporting evidence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

impl Finding {
    /// Creates a finding with the mandatory fields set.
    pub fn new(
        source: impl Into<String>,
        severity: Severity,
        category: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            severity,
            category: category.into(),
            title: title.into(),
            description: String::new(),
            recommendation: String::new(),
            resource: None,
            line: None,
            evidence: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Returns "resource:line", "resource" or "-" for display.
    pub fn location(&self) -> String {
        match (&self.resource, self.line) {
            (Some(resource), Some(line)) => format!("{}:{}", resource, line),
            (Some(resource), None) => resource.clone(),
            _ => "-".to_string(),
        }
    }
}

/// Summary of findings by severity and category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingSummary {
    /// Total number of findings.
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    /// Findings grouped by category.
    pub by_category: HashMap<String, usize>,
}

impl FindingSummary {
    /// Creates a summary from a list of findings.
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self {
            total: findings.len(),
            ..Self::default()
        };

        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }

            *summary
                .by_category
                .entry(finding.category.clone())
                .or_insert(0) += 1;
        }

        summary
    }

    /// Highest severity present, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        [
            (self.critical, Severity::Critical),
            (self.high, Severity::High),
            (self.medium, Severity::Medium),
            (self.low, Severity::Low),
            (self.info, Severity::Info),
        ]
        .into_iter()
        .find(|(count, _)| *count > 0)
        .map(|(_, severity)| severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_parse_lossy() {
        assert_eq!(Severity::parse_lossy("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse_lossy(" p2 "), Severity::High);
        assert_eq!(Severity::parse_lossy("informational"), Severity::Info);
        assert_eq!(Severity::parse_lossy("whatever"), Severity::Medium);
    }

    #[test]
    fn test_event_deserialize_with_defaults() {
        let event: AgentEvent = serde_json::from_str(
            r#"{"event_type": "security_incident", "title": "Brute force", "severity": "high"}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, EventType::SecurityIncident);
        assert_eq!(event.severity, Severity::High);
        assert!(event.payload.is_null());
        assert!(event.source.is_empty());
    }

    #[test]
    fn test_finding_location() {
        let finding = Finding::new("scan", Severity::High, "secret", "Key")
            .with_resource("config/app.env")
            .with_line(12);
        assert_eq!(finding.location(), "config/app.env:12");

        let bare = Finding::new("scan", Severity::Low, "secret", "Key");
        assert_eq!(bare.location(), "-");
    }

    #[test]
    fn test_finding_summary() {
        let findings = vec![
            Finding::new("a", Severity::Critical, "secret", "one"),
            Finding::new("a", Severity::High, "containment", "two"),
            Finding::new("b", Severity::Low, "secret", "three"),
        ];

        let summary = FindingSummary::from_findings(&findings);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.by_category.get("secret"), Some(&2));
        assert_eq!(summary.max_severity(), Some(Severity::Critical));
        assert_eq!(FindingSummary::default().max_severity(), None);
    }
}
