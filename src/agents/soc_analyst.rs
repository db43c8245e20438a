//! SOC analyst runner.
//!
//! Scores a security event, extracts indicators of compromise and decides
//! between containment and monitoring:
//!
//! ```text
//! triage -> enrich -> contain | monitor -> summarize
//! ```

use super::graph::{drive, Transition, Workflow};
use super::{AgentOutput, LlmClient, Runner, RunnerKind};
use crate::models::{AgentEvent, EventType, Finding, Severity};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const MAX_STEPS: usize = 16;
const FAILED_LOGIN_THRESHOLD: u64 = 5;
const PRIVILEGED_ACCOUNTS: &[&str] = &["root", "admin", "administrator", "system"];

const SUMMARY_SYSTEM_PROMPT: &str = "You are a SOC analyst. Summarize the security event \
for an on-call responder in at most three sentences. State the threat level, the key \
indicators and the recommended next action. Plain text only.";

struct Patterns {
    ipv4: Regex,
    sha256: Regex,
    md5: Regex,
    domain: Regex,
    technique: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        ipv4: Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b")
            .expect("valid regex"),
        sha256: Regex::new(r"\b[a-fA-F0-9]{64}\b").expect("valid regex"),
        md5: Regex::new(r"\b[a-fA-F0-9]{32}\b").expect("valid regex"),
        domain: Regex::new(r"(?i)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,24}\b")
            .expect("valid regex"),
        technique: Regex::new(r"\bT\d{4}(?:\.\d{3})?\b").expect("valid regex"),
    })
}

/// Indicators of compromise found in an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indicators {
    pub ips: Vec<String>,
    pub hashes: Vec<String>,
    pub domains: Vec<String>,
    pub techniques: Vec<String>,
}

impl Indicators {
    /// Scan free text for indicators. Results are deduplicated in order of
    /// first appearance.
    pub fn extract(text: &str) -> Self {
        let p = patterns();
        let collect = |re: &Regex| {
            let mut out: Vec<String> = Vec::new();
            for m in re.find_iter(text) {
                let value = m.as_str().to_string();
                if !out.contains(&value) {
                    out.push(value);
                }
            }
            out
        };

        let mut hashes = collect(&p.sha256);
        for md5 in collect(&p.md5) {
            if !hashes.contains(&md5) {
                hashes.push(md5);
            }
        }

        Self {
            ips: collect(&p.ipv4),
            hashes,
            domains: collect(&p.domain)
                .into_iter()
                .map(|d| d.to_lowercase())
                .collect(),
            techniques: collect(&p.technique),
        }
    }

    /// Number of IOCs (techniques are not counted).
    pub fn count(&self) -> usize {
        self.ips.len() + self.hashes.len() + self.domains.len()
    }

    fn all(&self) -> impl Iterator<Item = &String> {
        self.ips.iter().chain(&self.hashes).chain(&self.domains)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocStep {
    Triage,
    Enrich,
    Contain,
    Monitor,
    Summarize,
}

impl fmt::Display for SocStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocStep::Triage => "triage",
            SocStep::Enrich => "enrich",
            SocStep::Contain => "contain",
            SocStep::Monitor => "monitor",
            SocStep::Summarize => "summarize",
        };
        write!(f, "{}", name)
    }
}

struct SocState {
    event: AgentEvent,
    threat_score: f64,
    indicators: Indicators,
    malicious: Vec<String>,
    contained: bool,
    output: AgentOutput,
}

/// Security operations analyst.
pub struct SocAnalystRunner {
    containment_threshold: f64,
    llm: Option<LlmClient>,
}

impl SocAnalystRunner {
    pub const NAME: &'static str = "soc_analyst";

    pub fn new(containment_threshold: f64, llm: Option<LlmClient>) -> Self {
        Self {
            containment_threshold,
            llm,
        }
    }

    fn triage(&self, state: &mut SocState) {
        let event = &state.event;
        let text = format!("{} {}", event.title, event.payload);
        state.indicators = Indicators::extract(&text);
        state.threat_score = event.severity.weight();

        // Each mapped technique raises the score a little.
        state.threat_score += 0.05 * state.indicators.techniques.len().min(3) as f64;

        if !state.indicators.techniques.is_empty() {
            let techniques = state.indicators.techniques.join(", ");
            state.output.findings.push(
                Finding::new(Self::NAME, event.severity, "mitre-attack", "ATT&CK techniques observed")
                    .with_description(format!("Event maps to {}", techniques))
                    .with_evidence(techniques),
            );
        }

        debug!(
            "Triage: {} IOC(s), {} technique(s), score {:.2}",
            state.indicators.count(),
            state.indicators.techniques.len(),
            state.threat_score
        );
    }

    fn enrich(&self, state: &mut SocState) {
        let payload = &state.event.payload;

        state.malicious = malicious_indicators(payload.get("reputation"));
        state.malicious.retain(|ioc| state.indicators.all().any(|i| i.eq_ignore_ascii_case(ioc)));
        if !state.malicious.is_empty() {
            state.threat_score += 0.15 * state.malicious.len().min(3) as f64;
            for ioc in &state.malicious {
                state.output.findings.push(
                    Finding::new(Self::NAME, Severity::High, "threat-intel", "Known malicious indicator")
                        .with_description(format!("{} is flagged malicious by threat intelligence", ioc))
                        .with_recommendation("Block the indicator and hunt for related activity")
                        .with_evidence(ioc.clone()),
                );
            }
        }

        let failed_logins = payload
            .get("failed_logins")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if failed_logins >= FAILED_LOGIN_THRESHOLD {
            state.threat_score += if failed_logins >= FAILED_LOGIN_THRESHOLD * 4 {
                0.2
            } else {
                0.1
            };
            state.output.findings.push(
                Finding::new(Self::NAME, Severity::Medium, "authentication", "Repeated failed logins")
                    .with_description(format!("{} failed login attempts recorded", failed_logins))
                    .with_recommendation("Enforce lockout and MFA on the targeted account"),
            );
        }

        if let Some(user) = privileged_user(payload) {
            state.threat_score += 0.1;
            state.output.findings.push(
                Finding::new(Self::NAME, Severity::High, "identity", "Privileged account involved")
                    .with_description(format!("Activity involves privileged account '{}'", user))
                    .with_resource(user),
            );
        }

        state.threat_score = state.threat_score.clamp(0.0, 1.0);
    }

    fn contain(&self, state: &mut SocState) {
        state.contained = true;
        let payload = &state.event.payload;

        let severity = if state.threat_score >= 0.9 {
            Severity::Critical
        } else {
            Severity::High
        };
        state.output.findings.push(
            Finding::new(Self::NAME, severity, "containment", "Active threat requires containment")
                .with_description(format!(
                    "Threat score {:.2} is at or above the containment threshold {:.2}",
                    state.threat_score, self.containment_threshold
                ))
                .with_recommendation("Execute the containment playbook"),
        );

        if let Some(host) = payload.get("host").and_then(Value::as_str) {
            state.output.recommend(format!("Isolate host {} from the network", host));
        }
        if !state.indicators.ips.is_empty() {
            state.output.recommend(format!(
                "Block IP addresses at the perimeter: {}",
                state.indicators.ips.join(", ")
            ));
        }
        if !state.indicators.domains.is_empty() {
            state.output.recommend(format!(
                "Sinkhole domains: {}",
                state.indicators.domains.join(", ")
            ));
        }
        if let Some(user) = payload.get("user").and_then(Value::as_str) {
            state
                .output
                .recommend(format!("Disable account {} and rotate its credentials", user));
        }
        state.output.recommend("Open an incident and notify the security on-call");
    }

    fn monitor(&self, state: &mut SocState) {
        state.output.recommend(format!(
            "Monitor '{}' for 24h; threat score {:.2} is below containment threshold",
            state.event.title, state.threat_score
        ));
    }

    async fn summarize(&self, state: &mut SocState) {
        let template = format!(
            "Threat score {:.2} ({}): {} IP(s), {} hash(es), {} domain(s){}",
            state.threat_score,
            if state.contained { "contain" } else { "monitor" },
            state.indicators.ips.len(),
            state.indicators.hashes.len(),
            state.indicators.domains.len(),
            if state.indicators.techniques.is_empty() {
                String::new()
            } else {
                format!("; techniques {}", state.indicators.techniques.join(", "))
            }
        );

        state.output.summary = match &self.llm {
            Some(llm) => {
                let prompt = format!(
                    "Event: {}\nSeverity: {}\nAssessment: {}\nMalicious indicators: {}\nPayload: {}",
                    state.event.title,
                    state.event.severity,
                    template,
                    state.malicious.join(", "),
                    state.event.payload
                );
                match llm.complete(SUMMARY_SYSTEM_PROMPT, &prompt).await {
                    Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                    Ok(_) => template,
                    Err(e) => {
                        warn!("LLM summary failed, using template: {}", e);
                        template
                    }
                }
            }
            None => template,
        };

        let confidence = 0.5 + 0.1 * state.indicators.count() as f64;
        state.output.confidence = confidence.min(0.95);
    }
}

struct SocWorkflow<'a>(&'a SocAnalystRunner);

#[async_trait]
impl Workflow for SocWorkflow<'_> {
    type Step = SocStep;
    type State = SocState;

    fn entry(&self) -> SocStep {
        SocStep::Triage
    }

    async fn step(&self, step: SocStep, state: &mut SocState) -> Result<Transition<SocStep>> {
        let runner = self.0;
        let transition = match step {
            SocStep::Triage => {
                runner.triage(state);
                Transition::to(SocStep::Enrich)
            }
            SocStep::Enrich => {
                runner.enrich(state);
                let note = format!("threat_score={:.2}", state.threat_score);
                if state.threat_score >= runner.containment_threshold {
                    Transition::to(SocStep::Contain).with_note(note)
                } else {
                    Transition::to(SocStep::Monitor).with_note(note)
                }
            }
            SocStep::Contain => {
                runner.contain(state);
                Transition::to(SocStep::Summarize)
            }
            SocStep::Monitor => {
                runner.monitor(state);
                Transition::to(SocStep::Summarize)
            }
            SocStep::Summarize => {
                runner.summarize(state).await;
                Transition::end()
            }
        };
        Ok(transition)
    }
}

#[async_trait]
impl Runner for SocAnalystRunner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Investigate
    }

    fn handles(&self, event_type: EventType) -> bool {
        matches!(event_type, EventType::Alert | EventType::SecurityIncident)
    }

    async fn run(&self, event: &AgentEvent) -> Result<AgentOutput> {
        let mut state = SocState {
            event: event.clone(),
            threat_score: 0.0,
            indicators: Indicators::default(),
            malicious: Vec::new(),
            contained: false,
            output: AgentOutput::new(Self::NAME, self.kind()),
        };

        let steps = drive(&SocWorkflow(self), &mut state, MAX_STEPS).await?;
        info!(
            "SOC analysis of {} finished: score {:.2}, contained={}",
            event.id, state.threat_score, state.contained
        );

        let confidence = state.output.confidence;
        let mut output = state.output.with_confidence(confidence);
        output.steps = steps;
        Ok(output)
    }
}

/// Indicators marked malicious in a reputation payload.
///
/// Accepts either `{"1.2.3.4": "malicious"}` or
/// `[{"indicator": "1.2.3.4", "verdict": "malicious"}]`.
fn malicious_indicators(reputation: Option<&Value>) -> Vec<String> {
    let is_bad = |v: &str| v.eq_ignore_ascii_case("malicious");
    match reputation {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, verdict)| verdict.as_str().map_or(false, is_bad))
            .map(|(ioc, _)| ioc.clone())
            .collect(),
        Some(Value::Array(entries)) => entries
            .iter()
            .filter(|e| e["verdict"].as_str().map_or(false, is_bad))
            .filter_map(|e| e["indicator"].as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

fn privileged_user(payload: &Value) -> Option<String> {
    let user = payload.get("user").and_then(Value::as_str);
    let flagged = payload
        .get("privileged")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    match user {
        Some(u) if flagged || PRIVILEGED_ACCOUNTS.iter().any(|p| u.eq_ignore_ascii_case(p)) => {
            Some(u.to_string())
        }
        None if flagged => Some("unknown".to_string()),
        _ => None,
    }
}
