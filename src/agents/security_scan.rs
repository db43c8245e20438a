//! Security scan runner.
//!
//! Walks a directory named by `payload.path` and flags hard-coded secrets
//! and risky configuration. With a model configured the files are also sent
//! for an LLM review in a single call.

use super::graph::{drive, Transition, Workflow};
use super::llm::parse_findings;
use super::{AgentOutput, LlmClient, Runner, RunnerKind};
use crate::config::ScannerConfig;
use crate::models::{AgentEvent, EventType, Finding, FindingSummary, Severity};
use crate::scanner::{FileScanner, ScannedFile};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const MAX_STEPS: usize = 8;
const MAX_EVIDENCE_CHARS: usize = 120;

const REVIEW_SYSTEM_PROMPT: &str = "You are a security reviewer for infrastructure and \
application code. Report only real security problems: leaked credentials, unsafe network \
exposure, disabled verification, injection risks, privilege escalation.";

/// A line-based detection rule.
pub struct PatternRule {
    pub id: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub recommendation: &'static str,
    /// Matched lines are not echoed into evidence.
    pub redact: bool,
    regex: Regex,
}

impl PatternRule {
    fn new(
        id: &'static str,
        pattern: &str,
        severity: Severity,
        category: &'static str,
        title: &'static str,
        recommendation: &'static str,
    ) -> Self {
        Self {
            id,
            title,
            category,
            severity,
            recommendation,
            redact: category == "secrets",
            regex: Regex::new(pattern).expect("valid regex"),
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

/// Built-in rule set.
pub fn rules() -> &'static [PatternRule] {
    static RULES: OnceLock<Vec<PatternRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            PatternRule::new(
                "aws-access-key",
                r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
                Severity::Critical,
                "secrets",
                "AWS access key in source",
                "Revoke the key and load credentials from the environment or a secret manager",
            ),
            PatternRule::new(
                "private-key",
                r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY(?: BLOCK)?-----",
                Severity::Critical,
                "secrets",
                "Private key committed",
                "Remove the key from the tree and rotate it",
            ),
            PatternRule::new(
                "hardcoded-secret",
                r#"(?i)\b(?:password|passwd|pwd|secret|api_?key|access_?token|token)\b["']?\s*[:=]\s*["'][^"'\s]{4,}["']"#,
                Severity::High,
                "secrets",
                "Hard-coded credential",
                "Read the value from the environment or a secret manager",
            ),
            PatternRule::new(
                "open-ingress",
                r"0\.0\.0\.0/0",
                Severity::High,
                "network",
                "Ingress open to the internet",
                "Restrict the CIDR range to known networks",
            ),
            PatternRule::new(
                "tls-verify-disabled",
                r#"(?i)(?:verify_?ssl|ssl_?verify|verify)["']?\s*[:=]\s*false|insecure_?skip_?verify["']?\s*[:=]\s*true|rejectUnauthorized["']?\s*[:=]\s*false|curl\s+.*(?:-k\b|--insecure)"#,
                Severity::Medium,
                "tls",
                "TLS certificate verification disabled",
                "Enable certificate verification and trust the proper CA bundle",
            ),
            PatternRule::new(
                "debug-enabled",
                r#"(?i)\bdebug["']?\s*[:=]\s*["']?(?:true|1|on|yes)\b"#,
                Severity::Low,
                "configuration",
                "Debug mode enabled",
                "Disable debug mode outside development environments",
            ),
        ]
    })
}

/// Apply every rule to every line of a file.
pub fn scan_content(source: &str, path: &str, content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (index, line) in content.lines().enumerate() {
        for rule in rules().iter().filter(|r| r.is_match(line)) {
            let evidence = if rule.redact {
                format!("[{}] value redacted", rule.id)
            } else {
                line.trim().chars().take(MAX_EVIDENCE_CHARS).collect()
            };
            findings.push(
                Finding::new(source, rule.severity, rule.category, rule.title)
                    .with_description(format!("Rule {} matched", rule.id))
                    .with_recommendation(rule.recommendation)
                    .with_resource(path)
                    .with_line(index + 1)
                    .with_evidence(evidence),
            );
        }
    }
    findings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanStep {
    Discover,
    PatternScan,
    LlmReview,
    Score,
}

impl fmt::Display for ScanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanStep::Discover => "discover",
            ScanStep::PatternScan => "pattern_scan",
            ScanStep::LlmReview => "llm_review",
            ScanStep::Score => "score",
        };
        write!(f, "{}", name)
    }
}

struct ScanState {
    event: AgentEvent,
    files: Vec<(ScannedFile, String)>,
    output: AgentOutput,
}

/// Secret and misconfiguration scanner.
pub struct SecurityScanRunner {
    scanner: ScannerConfig,
    llm: Option<LlmClient>,
}

impl SecurityScanRunner {
    pub const NAME: &'static str = "security_scan";

    pub fn new(scanner: ScannerConfig, llm: Option<LlmClient>) -> Self {
        Self { scanner, llm }
    }

    /// Walk and read the tree on the blocking pool.
    async fn discover(&self, state: &mut ScanState) -> Result<()> {
        let path = state
            .event
            .payload_str("path")
            .ok_or_else(|| anyhow!("Security scan requires payload.path"))?
            .to_string();

        let scanner = FileScanner::new(path.as_str(), &self.scanner);
        state.files = tokio::task::spawn_blocking(move || scanner.collect_files())
            .await
            .context("File discovery task failed")??;
        debug!("Discovered {} file(s) under {}", state.files.len(), path);
        Ok(())
    }

    async fn pattern_scan(&self, state: &mut ScanState) -> Result<()> {
        let files = std::mem::take(&mut state.files);
        let (files, findings) = tokio::task::spawn_blocking(move || {
            let findings: Vec<Finding> = files
                .iter()
                .flat_map(|(file, content)| scan_content(Self::NAME, &file.path, content))
                .collect();
            (files, findings)
        })
        .await
        .context("Pattern scan task failed")?;

        state.files = files;
        state.output.findings.extend(findings);
        Ok(())
    }

    async fn llm_review(&self, llm: &LlmClient, state: &mut ScanState) {
        let mut prompt = String::new();
        prompt.push_str("Review the following files for security issues.\n\n");
        prompt.push_str("For each issue found, output it in this exact JSON format:\n");
        prompt.push_str(r#"{"file_path": "path/to/file", "line_number": 42, "severity": "high", "category": "secrets", "title": "Issue Title", "description": "Description", "suggestion": "How to fix"}"#);
        prompt.push_str("\n\nOutput one JSON object per line. Only output JSON, no other text.\n\n");
        for (file, content) in &state.files {
            prompt.push_str(&format!("### FILE: {}\n```\n{}\n```\n\n", file.path, content));
        }

        match llm.complete(REVIEW_SYSTEM_PROMPT, &prompt).await {
            Ok(response) => {
                let findings = parse_findings(Self::NAME, &response);
                debug!("LLM review reported {} finding(s)", findings.len());
                state.output.findings.extend(findings);
            }
            Err(e) => warn!("LLM review failed, keeping pattern results only: {}", e),
        }
    }

    fn score(&self, state: &mut ScanState) {
        let summary = FindingSummary::from_findings(&state.output.findings);

        state.output.confidence = if state.files.is_empty() { 0.3 } else { 0.9 };
        state.output.summary = format!(
            "Scanned {} file(s): {} finding(s) ({} critical, {} high)",
            state.files.len(),
            summary.total,
            summary.critical,
            summary.high
        );

        let mut recommendations: Vec<&str> = Vec::new();
        for finding in &state.output.findings {
            if !finding.recommendation.is_empty()
                && !recommendations.contains(&finding.recommendation.as_str())
            {
                recommendations.push(&finding.recommendation);
            }
        }
        let recommendations: Vec<String> = recommendations.into_iter().map(String::from).collect();
        for recommendation in recommendations {
            state.output.recommend(recommendation);
        }
    }
}

struct ScanWorkflow<'a>(&'a SecurityScanRunner);

#[async_trait]
impl Workflow for ScanWorkflow<'_> {
    type Step = ScanStep;
    type State = ScanState;

    fn entry(&self) -> ScanStep {
        ScanStep::Discover
    }

    async fn step(&self, step: ScanStep, state: &mut ScanState) -> Result<Transition<ScanStep>> {
        let runner = self.0;
        let transition = match step {
            ScanStep::Discover => {
                runner.discover(state).await?;
                Transition::to(ScanStep::PatternScan)
                    .with_note(format!("files={}", state.files.len()))
            }
            ScanStep::PatternScan => {
                runner.pattern_scan(state).await?;
                if runner.llm.is_some() && !state.files.is_empty() {
                    Transition::to(ScanStep::LlmReview)
                } else {
                    Transition::to(ScanStep::Score)
                }
            }
            ScanStep::LlmReview => {
                if let Some(llm) = &runner.llm {
                    runner.llm_review(llm, state).await;
                }
                Transition::to(ScanStep::Score)
            }
            ScanStep::Score => {
                runner.score(state);
                Transition::end()
            }
        };
        Ok(transition)
    }
}

#[async_trait]
impl Runner for SecurityScanRunner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Scan
    }

    fn handles(&self, event_type: EventType) -> bool {
        matches!(event_type, EventType::Vulnerability | EventType::Deployment)
    }

    async fn run(&self, event: &AgentEvent) -> Result<AgentOutput> {
        let mut state = ScanState {
            event: event.clone(),
            files: Vec::new(),
            output: AgentOutput::new(Self::NAME, self.kind()),
        };

        let steps = drive(&ScanWorkflow(self), &mut state, MAX_STEPS).await?;
        info!(
            "Security scan of {} finished with {} finding(s)",
            event.id,
            state.output.findings.len()
        );

        let confidence = state.output.confidence;
        let mut output = state.output.with_confidence(confidence);
        output.steps = steps;
        Ok(output)
    }
}
