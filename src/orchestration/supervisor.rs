//! Event supervisor.
//!
//! Routes each incoming event to one or more runners, executes them in
//! parallel, decides whether a human must be paged and keeps a bounded
//! history of sessions.

use super::executor::{ExecutionResult, ExecutionStatus, ParallelExecutor};
use crate::agents::{
    IncidentInvestigator, LlmClient, Runner, SecurityScanRunner, SocAnalystRunner,
};
use crate::config::Config;
use crate::engines::EngineRegistry;
use crate::models::{AgentEvent, EventType, Severity};
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// One handled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSession {
    pub id: Uuid,
    pub event: AgentEvent,
    /// Runners that were executed.
    pub runners: Vec<String>,
    /// Routed names that are not registered.
    #[serde(default)]
    pub skipped: Vec<String>,
    pub execution: ExecutionResult,
    pub escalated: bool,
    #[serde(default)]
    pub escalation_reasons: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

pub struct Supervisor {
    runners: Vec<Arc<dyn Runner>>,
    routes: HashMap<EventType, Vec<String>>,
    executor: ParallelExecutor,
    escalation_confidence: f64,
    max_history: usize,
    history: RwLock<VecDeque<SupervisorSession>>,
}

impl Supervisor {
    /// Empty supervisor with no runners and no routes.
    pub fn new(executor: ParallelExecutor, escalation_confidence: f64, max_history: usize) -> Self {
        Self {
            runners: Vec::new(),
            routes: HashMap::new(),
            executor,
            escalation_confidence,
            max_history: max_history.max(1),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Supervisor with the built-in runners and routing table.
    pub fn from_config(config: &Config, engines: EngineRegistry) -> Result<Self> {
        let llm = LlmClient::from_config(&config.model)?;
        if let Some(client) = &llm {
            info!("LLM assistance enabled with model {}", client.model_name());
        }

        let mut supervisor = Self::new(
            ParallelExecutor::new(Duration::from_secs(config.executor.timeout_seconds)),
            config.executor.escalation_confidence,
            config.executor.max_history,
        );
        supervisor.register(Arc::new(IncidentInvestigator::new(engines)));
        supervisor.register(Arc::new(SocAnalystRunner::new(
            config.executor.containment_threshold,
            llm.clone(),
        )));
        supervisor.register(Arc::new(SecurityScanRunner::new(config.scanner.clone(), llm)));

        for (event_type, names) in default_routes() {
            supervisor.set_route(event_type, names.iter().map(|n| n.to_string()).collect());
        }
        Ok(supervisor)
    }

    /// Register a runner; a runner with the same name is replaced.
    pub fn register(&mut self, runner: Arc<dyn Runner>) {
        self.runners.retain(|r| r.name() != runner.name());
        self.runners.push(runner);
    }

    pub fn set_route(&mut self, event_type: EventType, runners: Vec<String>) {
        self.routes.insert(event_type, runners);
    }

    pub fn runner_names(&self) -> Vec<String> {
        self.runners.iter().map(|r| r.name().to_string()).collect()
    }

    /// Runner names for an event type. Unrouted types fall back to every
    /// runner that declares it handles the type.
    pub fn route(&self, event_type: EventType) -> Vec<String> {
        match self.routes.get(&event_type) {
            Some(names) => names.clone(),
            None => self
                .runners
                .iter()
                .filter(|r| r.handles(event_type))
                .map(|r| r.name().to_string())
                .collect(),
        }
    }

    fn resolve(&self, event_type: EventType) -> (Vec<Arc<dyn Runner>>, Vec<String>) {
        let mut selected: Vec<Arc<dyn Runner>> = Vec::new();
        let mut skipped = Vec::new();

        for name in self.route(event_type) {
            match self.runners.iter().find(|r| r.name() == name) {
                Some(runner) if !selected.iter().any(|s| s.name() == name) => {
                    selected.push(Arc::clone(runner));
                }
                Some(_) => {}
                None => {
                    warn!("Routed runner '{}' is not registered; skipping", name);
                    skipped.push(name);
                }
            }
        }
        (selected, skipped)
    }

    fn escalation_reasons(&self, execution: &ExecutionResult) -> Vec<String> {
        let mut reasons = Vec::new();

        let critical = execution
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .count();
        if critical > 0 {
            reasons.push(format!("{} critical finding(s)", critical));
        }
        if execution.status == ExecutionStatus::Failed {
            reasons.push("no runner completed".to_string());
        }
        if execution.confidence < self.escalation_confidence {
            reasons.push(format!(
                "confidence {:.2} below {:.2}",
                execution.confidence, self.escalation_confidence
            ));
        }
        reasons
    }

    /// Handle an event end to end and record the session.
    pub async fn handle(&self, event: AgentEvent) -> SupervisorSession {
        let started_at = Utc::now();
        let (runners, skipped) = self.resolve(event.event_type);

        info!(
            "Supervising {} event {} with {} runner(s)",
            event.event_type,
            event.id,
            runners.len()
        );

        let execution = self.executor.execute(&event, &runners).await;
        let escalation_reasons = self.escalation_reasons(&execution);
        let escalated = !escalation_reasons.is_empty();
        if escalated {
            warn!(
                "Escalating event {}: {}",
                event.id,
                escalation_reasons.join("; ")
            );
        }

        let session = SupervisorSession {
            id: Uuid::new_v4(),
            runners: runners.iter().map(|r| r.name().to_string()).collect(),
            skipped,
            execution,
            escalated,
            escalation_reasons,
            event,
            started_at,
            completed_at: Utc::now(),
        };

        {
            let mut history = self.history.write();
            history.push_back(session.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }
        session
    }

    /// Most recent sessions, newest first.
    pub fn sessions(&self, limit: usize) -> Vec<SupervisorSession> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn session(&self, id: Uuid) -> Option<SupervisorSession> {
        self.history.read().iter().find(|s| s.id == id).cloned()
    }
}

/// Built-in routing table.
pub fn default_routes() -> Vec<(EventType, Vec<&'static str>)> {
    vec![
        (
            EventType::Alert,
            vec![IncidentInvestigator::NAME, SocAnalystRunner::NAME],
        ),
        (
            EventType::SecurityIncident,
            vec![SocAnalystRunner::NAME, IncidentInvestigator::NAME],
        ),
        (EventType::Vulnerability, vec![SecurityScanRunner::NAME]),
        (EventType::ComplianceDrift, vec![IncidentInvestigator::NAME]),
        (EventType::Deployment, vec![IncidentInvestigator::NAME]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Finding;
    use crate::orchestration::executor::tests::MockRunner;
    use crate::orchestration::executor::RunStatus;
    use serde_json::json;

    fn supervisor(max_history: usize) -> Supervisor {
        Supervisor::new(ParallelExecutor::new(Duration::from_secs(5)), 0.5, max_history)
    }

    fn custom_event(title: &str) -> AgentEvent {
        AgentEvent::new(EventType::Custom, title, Severity::Medium)
    }

    #[tokio::test]
    async fn test_unrouted_type_uses_handles() {
        let mut sup = supervisor(10);
        sup.register(Arc::new(MockRunner::ok("a", 0.9)));
        sup.register(Arc::new(MockRunner {
            handles: vec![EventType::Alert],
            ..MockRunner::ok("b", 0.9)
        }));

        let session = sup.handle(custom_event("custom")).await;
        assert_eq!(session.runners, vec!["a".to_string()]);
        assert!(!session.escalated);
    }

    #[tokio::test]
    async fn test_unknown_route_names_are_skipped() {
        let mut sup = supervisor(10);
        sup.register(Arc::new(MockRunner::ok("a", 0.9)));
        sup.set_route(
            EventType::Custom,
            vec!["ghost".to_string(), "a".to_string(), "a".to_string()],
        );

        let session = sup.handle(custom_event("routed")).await;
        assert_eq!(session.runners, vec!["a".to_string()]);
        assert_eq!(session.skipped, vec!["ghost".to_string()]);
        assert_eq!(session.execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_escalation_rules() {
        let mut sup = supervisor(10);
        sup.register(Arc::new(MockRunner {
            findings: vec![Finding::new("a", Severity::Critical, "x", "boom")],
            ..MockRunner::ok("a", 0.9)
        }));
        let session = sup.handle(custom_event("critical")).await;
        assert!(session.escalated);
        assert_eq!(session.escalation_reasons, vec!["1 critical finding(s)".to_string()]);

        let mut sup = supervisor(10);
        sup.register(Arc::new(MockRunner::ok("a", 0.2)));
        let session = sup.handle(custom_event("unsure")).await;
        assert!(session.escalated);
        assert!(session.escalation_reasons[0].starts_with("confidence 0.20"));

        let sup = supervisor(10);
        let session = sup.handle(custom_event("nobody")).await;
        assert!(session.escalated);
        assert!(session
            .escalation_reasons
            .contains(&"no runner completed".to_string()));
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let mut sup = supervisor(2);
        sup.register(Arc::new(MockRunner::ok("a", 0.9)));

        let first = sup.handle(custom_event("one")).await;
        sup.handle(custom_event("two")).await;
        let third = sup.handle(custom_event("three")).await;

        let sessions = sup.sessions(10);
        let titles: Vec<&str> = sessions.iter().map(|s| s.event.title.as_str()).collect();
        assert_eq!(titles, vec!["three", "two"]);
        assert_eq!(sup.sessions(1).len(), 1);
        assert!(sup.session(first.id).is_none());
        assert_eq!(sup.session(third.id).unwrap().event.title, "three");
    }

    #[tokio::test]
    async fn test_default_supervisor_routes_security_incident() {
        let sup = Supervisor::from_config(&Config::default(), EngineRegistry::default()).unwrap();
        assert_eq!(
            sup.runner_names(),
            vec!["incident_investigator", "soc_analyst", "security_scan"]
        );
        assert_eq!(
            sup.route(EventType::SecurityIncident),
            vec!["soc_analyst", "incident_investigator"]
        );
        assert_eq!(sup.route(EventType::Custom), vec!["incident_investigator"]);

        let event = AgentEvent::new(EventType::SecurityIncident, "ssh brute force", Severity::High)
            .with_payload(json!({"service": "bastion", "source_ip": "198.51.100.4"}));
        let session = sup.handle(event).await;

        assert_eq!(session.execution.results.len(), 2);
        assert!(session
            .execution
            .results
            .iter()
            .all(|r| r.status == RunStatus::Completed));
    }

    #[tokio::test]
    async fn test_vulnerability_without_path_fails_and_escalates() {
        let sup = Supervisor::from_config(&Config::default(), EngineRegistry::default()).unwrap();
        let session = sup
            .handle(AgentEvent::new(EventType::Vulnerability, "scan", Severity::Low))
            .await;

        assert_eq!(session.execution.status, ExecutionStatus::Failed);
        assert_eq!(session.execution.results[0].status, RunStatus::Failed);
        assert!(session.escalated);
    }
}
