//! Incident investigator.
//!
//! Correlates an event with what the engines already know about the
//! affected service: recent alerts, SLO error budgets, capacity hot spots
//! and failing compliance controls.

use super::{AgentOutput, Runner, RunnerKind, StepRecord};
use crate::engines::compliance::{ComplianceFilter, ControlStatus};
use crate::engines::slo_budget::BudgetStatus;
use crate::engines::{Engine, EngineRegistry};
use crate::models::{AgentEvent, EventType, Finding, Severity};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

const RELATED_ALERT_LIMIT: usize = 50;
/// Alerts on one service needed to call it a storm.
const ALERT_STORM_THRESHOLD: usize = 3;
const SATURATION_PCT: f64 = 95.0;

pub struct IncidentInvestigator {
    engines: EngineRegistry,
}

impl IncidentInvestigator {
    pub const NAME: &'static str = "incident_investigator";

    pub fn new(engines: EngineRegistry) -> Self {
        Self { engines }
    }

    fn correlate_alerts(&self, service: &str, output: &mut AgentOutput) -> bool {
        let alerts = self.engines.alerts.related_alerts(service, RELATED_ALERT_LIMIT);
        if alerts.is_empty() {
            return false;
        }

        if alerts.len() >= ALERT_STORM_THRESHOLD {
            let severity = alerts
                .iter()
                .map(|a| a.severity)
                .max()
                .unwrap_or_default()
                .max(Severity::Medium);

            let mut groups: Vec<&str> = alerts.iter().map(|a| a.correlation_group.as_str()).collect();
            groups.sort_unstable();
            groups.dedup();

            let mut finding = Finding::new(Self::NAME, severity, "alerts", "Correlated alert storm")
                .with_description(format!(
                    "{} recent alerts on {} across {} correlation group(s)",
                    alerts.len(),
                    service,
                    groups.len()
                ))
                .with_resource(service);
            for alert in alerts.iter().take(5) {
                finding = finding.with_evidence(format!("{} ({})", alert.alert_name, alert.severity));
            }
            output.findings.push(finding);
            output.recommend(format!(
                "Deduplicate alerts for {} and page a single owner",
                service
            ));
        }
        true
    }

    fn check_slo(&self, service: &str, output: &mut AgentOutput) -> bool {
        let slos = self.engines.slo.service_status(service);
        for slo in &slos {
            let (severity, title) = match slo.status {
                BudgetStatus::Exhausted => (Severity::High, "Error budget exhausted"),
                BudgetStatus::AtRisk => (Severity::Medium, "Error budget burning"),
                BudgetStatus::Healthy => continue,
            };
            output.findings.push(
                Finding::new(Self::NAME, severity, "slo", title)
                    .with_description(format!(
                        "SLO {} at {:.2}% against a {:.2}% target; {:.1}% budget left",
                        slo.slo_name, slo.actual_pct, slo.target_pct, slo.budget_remaining_pct
                    ))
                    .with_resource(format!("{}/{}", service, slo.slo_name)),
            );
            if slo.status == BudgetStatus::Exhausted {
                output.recommend(format!(
                    "Freeze risky deployments to {} until the error budget recovers",
                    service
                ));
            }
        }
        !slos.is_empty()
    }

    fn check_capacity(&self, service: &str, output: &mut AgentOutput) -> bool {
        let hot = self.engines.capacity.hot_spots(service);
        for resource in &hot {
            let severity = if resource.utilization_pct >= SATURATION_PCT {
                Severity::High
            } else {
                Severity::Medium
            };
            output.findings.push(
                Finding::new(Self::NAME, severity, "capacity", "Saturated resource")
                    .with_description(format!(
                        "{} {} at {:.1}% utilization",
                        resource.resource_type, resource.resource_id, resource.utilization_pct
                    ))
                    .with_resource(resource.resource_id.clone()),
            );
            output.recommend(format!(
                "Scale out {} ({})",
                resource.resource_id, resource.resource_type
            ));
        }
        !hot.is_empty()
    }

    fn check_compliance(&self, resource: &str, output: &mut AgentOutput) -> bool {
        let filter = ComplianceFilter {
            resource: Some(resource.to_string()),
            ..ComplianceFilter::default()
        };
        let failing: Vec<_> = self
            .engines
            .compliance
            .list(&filter, RELATED_ALERT_LIMIT)
            .into_iter()
            .filter(|c| matches!(c.status, ControlStatus::NonCompliant | ControlStatus::Partial))
            .collect();

        for control in &failing {
            let severity = if control.status == ControlStatus::NonCompliant {
                Severity::High
            } else {
                Severity::Medium
            };
            output.findings.push(
                Finding::new(Self::NAME, severity, "compliance", "Control out of compliance")
                    .with_description(format!(
                        "{} control {} is {:?} on {}",
                        control.framework, control.control_id, control.status, control.resource
                    ))
                    .with_resource(control.resource.clone()),
            );
        }
        if !failing.is_empty() {
            output.recommend(format!("Remediate failing controls on {} and re-assess", resource));
        }
        !failing.is_empty()
    }
}

/// Run a check and record it as a step.
fn timed(steps: &mut Vec<StepRecord>, name: &str, check: impl FnOnce() -> bool) -> bool {
    let started = Instant::now();
    let found = check();
    steps.push(StepRecord {
        step: name.to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
        note: Some(format!("evidence={}", found)),
    });
    found
}

#[async_trait]
impl Runner for IncidentInvestigator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Investigate
    }

    fn handles(&self, event_type: EventType) -> bool {
        matches!(
            event_type,
            EventType::Alert
                | EventType::SecurityIncident
                | EventType::ComplianceDrift
                | EventType::Deployment
                | EventType::Custom
        )
    }

    async fn run(&self, event: &AgentEvent) -> Result<AgentOutput> {
        let mut output = AgentOutput::new(Self::NAME, self.kind());
        let mut steps = Vec::new();

        let service = event
            .payload_str("service")
            .or_else(|| event.payload_str("resource"))
            .map(str::to_string);

        let Some(service) = service else {
            output.summary = "No service or resource in event payload; nothing to correlate".to_string();
            return Ok(output.with_confidence(0.2));
        };

        let mut sources = 0;
        if timed(&mut steps, "correlate_alerts", || self.correlate_alerts(&service, &mut output)) {
            sources += 1;
        }
        if timed(&mut steps, "check_slo", || self.check_slo(&service, &mut output)) {
            sources += 1;
        }
        if timed(&mut steps, "check_capacity", || self.check_capacity(&service, &mut output)) {
            sources += 1;
        }
        if event.event_type == EventType::ComplianceDrift
            && timed(&mut steps, "check_compliance", || self.check_compliance(&service, &mut output))
        {
            sources += 1;
        }
        debug!("Investigation of {} used {} evidence source(s)", service, sources);

        output.summary = if output.findings.is_empty() {
            format!("No corroborating signals for {} in {} source(s)", service, sources)
        } else {
            format!(
                "{} finding(s) for {} from {} evidence source(s)",
                output.findings.len(),
                service,
                sources
            )
        };
        if output.recommendations.is_empty() {
            output.recommend(format!("Review recent changes to {} with the owning team", service));
        }

        info!("Investigation of {}: {}", event.id, output.summary);
        let confidence = 0.3 + 0.2 * sources as f64;
        let mut output = output.with_confidence(confidence.min(0.9));
        output.steps = steps;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnginesConfig;
    use crate::engines::alert_correlation::AlertInput;
    use crate::engines::capacity::{CapacityInput, ResourceType};
    use crate::engines::compliance::{ComplianceInput, Framework};
    use crate::engines::slo_budget::SloInput;
    use serde_json::json;

    fn seeded_registry() -> EngineRegistry {
        let registry = EngineRegistry::from_config(&EnginesConfig::default());
        for (name, severity) in [
            ("HighLatency", Severity::High),
            ("ErrorRate", Severity::Critical),
            ("PodRestarts", Severity::Medium),
        ] {
            registry
                .alerts
                .record(AlertInput {
                    alert_name: name.to_string(),
                    service: "checkout".to_string(),
                    severity,
                    correlation_group: None,
                    correlation_score: 0.9,
                })
                .unwrap();
        }
        registry
            .slo
            .record(SloInput {
                service: "checkout".to_string(),
                slo_name: "availability".to_string(),
                target_pct: 99.9,
                actual_pct: 99.0,
                window_days: 30,
            })
            .unwrap();
        registry
            .capacity
            .record(CapacityInput {
                resource_id: "db-primary".to_string(),
                service: "checkout".to_string(),
                resource_type: ResourceType::Cpu,
                utilization_pct: 97.0,
                monthly_growth_pct: 5.0,
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_investigation_correlates_engines() {
        let investigator = IncidentInvestigator::new(seeded_registry());
        let event = AgentEvent::new(EventType::Alert, "checkout 5xx", Severity::High)
            .with_payload(json!({"service": "checkout"}));

        let output = investigator.run(&event).await.unwrap();
        let categories: Vec<&str> = output.findings.iter().map(|f| f.category.as_str()).collect();

        assert_eq!(categories, vec!["alerts", "slo", "capacity"]);
        assert_eq!(output.findings[0].severity, Severity::Critical);
        assert_eq!(output.findings[1].title, "Error budget exhausted");
        assert_eq!(output.findings[2].severity, Severity::High);
        assert_eq!(output.recommendations.len(), 3);
        assert!((output.confidence - 0.9).abs() < 1e-9);
        assert_eq!(output.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_service_has_low_confidence() {
        let investigator = IncidentInvestigator::new(seeded_registry());
        let event = AgentEvent::new(EventType::Deployment, "deploy billing", Severity::Info)
            .with_payload(json!({"service": "billing"}));

        let output = investigator.run(&event).await.unwrap();
        assert!(output.findings.is_empty());
        assert!((output.confidence - 0.3).abs() < 1e-9);
        assert_eq!(output.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_service() {
        let investigator = IncidentInvestigator::new(EngineRegistry::default());
        let event = AgentEvent::new(EventType::Alert, "no payload", Severity::Low);

        let output = investigator.run(&event).await.unwrap();
        assert!(output.findings.is_empty());
        assert_eq!(output.confidence, 0.2);
    }

    #[tokio::test]
    async fn test_compliance_drift_checks_controls() {
        let registry = EngineRegistry::default();
        registry
            .compliance
            .record(ComplianceInput {
                control_id: "CC6.1".to_string(),
                framework: Framework::Soc2,
                status: ControlStatus::NonCompliant,
                resource: "s3-audit-logs".to_string(),
                evidence_count: 0,
            })
            .unwrap();

        let investigator = IncidentInvestigator::new(registry);
        let event = AgentEvent::new(EventType::ComplianceDrift, "bucket drift", Severity::Medium)
            .with_payload(json!({"resource": "s3-audit-logs"}));

        let output = investigator.run(&event).await.unwrap();
        assert_eq!(output.findings.len(), 1);
        assert_eq!(output.findings[0].category, "compliance");
        assert_eq!(output.findings[0].severity, Severity::High);
        assert_eq!(output.steps.len(), 4);
    }
}
