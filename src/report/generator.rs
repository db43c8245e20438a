//! Markdown and JSON rendering of supervisor sessions.

use crate::cli::OutputFormat;
use crate::models::{Finding, FindingSummary, Severity};
use crate::orchestration::{RunStatus, RunnerResult, SupervisorSession};
use anyhow::Result;

/// Render a session in the requested format.
pub fn render(session: &SupervisorSession, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(generate_markdown_report(session)),
        OutputFormat::Json => generate_json_report(session),
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(session: &SupervisorSession) -> String {
    let mut output = String::new();

    output.push_str("# ShieldOps Incident Report\n\n");
    output.push_str(&generate_metadata_section(session));

    let summary = FindingSummary::from_findings(&session.execution.findings);
    output.push_str(&generate_summary_section(&summary, &session.execution.summary));
    output.push_str(&generate_agents_section(&session.execution.results));
    output.push_str(&generate_findings_section(&session.execution.results));
    output.push_str(&generate_recommendations_section(
        &session.execution.recommendations,
    ));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(session: &SupervisorSession) -> String {
    let event = &session.event;
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Session:** `{}`\n", session.id));
    section.push_str(&format!(
        "- **Event:** {} `{}` ({})\n",
        event.event_type, event.id, event.title
    ));
    if !event.source.is_empty() {
        section.push_str(&format!("- **Source:** {}\n", event.source));
    }
    section.push_str(&format!(
        "- **Reported Severity:** {} {}\n",
        event.severity.emoji(),
        event.severity
    ));
    section.push_str(&format!(
        "- **Received:** {}\n",
        event.received_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Status:** {:?}\n",
        session.execution.status
    ));
    section.push_str(&format!(
        "- **Confidence:** {:.2}\n",
        session.execution.confidence
    ));
    section.push_str(&format!(
        "- **Duration:** {}ms\n",
        session.execution.duration_ms
    ));
    if session.escalated {
        section.push_str(&format!(
            "- **Escalated:** yes ({})\n",
            session.escalation_reasons.join("; ")
        ));
    } else {
        section.push_str("- **Escalated:** no\n");
    }
    if !session.skipped.is_empty() {
        section.push_str(&format!(
            "- **Skipped Runners:** {}\n",
            session.skipped.join(", ")
        ));
    }
    section.push('\n');

    section
}

fn generate_summary_section(summary: &FindingSummary, text: &str) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    if !text.is_empty() {
        for line in text.lines() {
            section.push_str(&format!("> {}\n", line));
        }
        section.push('\n');
    }

    section.push_str("### Severity Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | {} Info | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
        Severity::Info.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.high, summary.medium, summary.low, summary.info, summary.total
    ));

    if !summary.by_category.is_empty() {
        section.push_str("### Findings by Category\n\n");
        section.push_str("| Category | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (category, count) in categories {
            section.push_str(&format!("| {} | {} |\n", category, count));
        }
        section.push('\n');
    }

    section
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "✅ completed",
        RunStatus::Failed => "❌ failed",
        RunStatus::TimedOut => "⏱️ timed out",
    }
}

fn generate_agents_section(results: &[RunnerResult]) -> String {
    let mut section = String::new();

    section.push_str("## Agent Results\n\n");
    if results.is_empty() {
        section.push_str("No agents were run for this event.\n\n");
        return section;
    }

    section.push_str("| Agent | Kind | Status | Duration | Confidence | Findings |\n");
    section.push_str("|:---|:---|:---|---:|---:|---:|\n");
    for result in results {
        let (confidence, findings) = match &result.output {
            Some(output) => (format!("{:.2}", output.confidence), output.findings.len().to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        section.push_str(&format!(
            "| {} | {} | {} | {}ms | {} | {} |\n",
            result.runner,
            result.kind,
            status_label(result.status),
            result.duration_ms,
            confidence,
            findings
        ));
    }
    section.push('\n');

    for result in results {
        if let Some(error) = &result.error {
            section.push_str(&format!("- **{}:** {}\n", result.runner, error));
        }
    }
    if results.iter().any(|r| r.error.is_some()) {
        section.push('\n');
    }

    section
}

fn generate_findings_section(results: &[RunnerResult]) -> String {
    let mut section = String::new();
    section.push_str("## Findings\n\n");

    let with_findings: Vec<_> = results
        .iter()
        .filter_map(|r| r.output.as_ref())
        .filter(|o| !o.findings.is_empty())
        .collect();

    if with_findings.is_empty() {
        section.push_str("No findings were reported. 🎉\n\n");
        return section;
    }

    for output in with_findings {
        section.push_str(&format!("### {}\n\n", output.agent));

        let mut findings = output.findings.clone();
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.location().cmp(&b.location()))
        });

        for finding in &findings {
            section.push_str(&generate_finding_block(finding));
        }
    }

    section
}

fn generate_finding_block(finding: &Finding) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "#### {} **{}** {} - {}\n\n",
        finding.severity.emoji(),
        finding.severity.to_string().to_uppercase(),
        finding.category,
        finding.title
    ));

    if finding.resource.is_some() {
        block.push_str(&format!("**Location:** `{}`\n\n", finding.location()));
    }
    if !finding.description.is_empty() {
        block.push_str(&format!("**Description:** {}\n\n", finding.description));
    }
    if !finding.evidence.is_empty() {
        block.push_str("<details>\n<summary>Evidence</summary>\n\n```\n");
        block.push_str(&finding.evidence.join("\n"));
        block.push_str("\n```\n</details>\n\n");
    }
    if !finding.recommendation.is_empty() {
        block.push_str(&format!("> 💡 **Recommendation:** {}\n\n", finding.recommendation));
    }

    block.push_str("---\n\n");
    block
}

fn generate_recommendations_section(recommendations: &[String]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Recommendations\n\n");
    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, rec));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by ShieldOps v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(session: &SupervisorSession) -> Result<String> {
    serde_json::to_string_pretty(session).map_err(Into::into)
}
