//! Concurrent fan-out of one event to several runners.

use crate::agents::{AgentOutput, Runner, RunnerKind};
use crate::models::{AgentEvent, Finding};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    TimedOut,
}

/// Outcome of the whole fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every runner completed.
    Completed,
    /// Some runners completed.
    Partial,
    /// No runner completed, or there were none.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerResult {
    pub runner: String,
    pub kind: RunnerKind,
    pub status: RunStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<AgentOutput>,
}

/// Merged result of all runners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub results: Vec<RunnerResult>,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    /// Mean confidence of completed runners.
    pub confidence: f64,
    pub summary: String,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Merge per-runner results, keeping runner order.
    pub fn merge(results: Vec<RunnerResult>, duration_ms: u64) -> Self {
        let mut findings = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();
        let mut summaries = Vec::new();
        let mut confidence_sum = 0.0;
        let mut completed = 0;

        for result in &results {
            let Some(output) = &result.output else {
                continue;
            };
            completed += 1;
            confidence_sum += output.confidence;
            findings.extend(output.findings.iter().cloned());
            for recommendation in &output.recommendations {
                if !recommendations.contains(recommendation) {
                    recommendations.push(recommendation.clone());
                }
            }
            if !output.summary.is_empty() {
                summaries.push(format!("[{}] {}", result.runner, output.summary));
            }
        }

        let status = if completed == 0 {
            ExecutionStatus::Failed
        } else if completed == results.len() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Partial
        };

        let summary = if results.is_empty() {
            "No runners available for event".to_string()
        } else if summaries.is_empty() {
            format!("{} runner(s) produced no result", results.len())
        } else {
            summaries.join("\n")
        };

        Self {
            status,
            confidence: if completed == 0 {
                0.0
            } else {
                confidence_sum / completed as f64
            },
            results,
            findings,
            recommendations,
            summary,
            duration_ms,
        }
    }
}

/// Runs runners concurrently, each under its own timeout.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    timeout: Duration,
}

impl ParallelExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, event: &AgentEvent, runners: &[Arc<dyn Runner>]) -> ExecutionResult {
        let started = Instant::now();
        let event = Arc::new(event.clone());

        let pending = runners
            .iter()
            .map(|runner| self.run_one(Arc::clone(&event), Arc::clone(runner)));
        let results = join_all(pending).await;

        ExecutionResult::merge(results, started.elapsed().as_millis() as u64)
    }

    /// Run one runner on its own task so a runner that blocks its thread
    /// still gets cut off at the deadline.
    async fn run_one(&self, event: Arc<AgentEvent>, runner: Arc<dyn Runner>) -> RunnerResult {
        let started = Instant::now();
        let task = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.run(&event).await }
        });
        let abort = task.abort_handle();
        let outcome = tokio::time::timeout(self.timeout, task).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status, error, output) = match outcome {
            Ok(Ok(Ok(output))) => {
                debug!("Runner {} completed in {}ms", runner.name(), duration_ms);
                (RunStatus::Completed, None, Some(output))
            }
            Ok(Ok(Err(e))) => {
                warn!("Runner {} failed: {:#}", runner.name(), e);
                (RunStatus::Failed, Some(format!("{:#}", e)), None)
            }
            Ok(Err(join_error)) => {
                warn!("Runner {} aborted: {}", runner.name(), join_error);
                (RunStatus::Failed, Some(format!("runner task aborted: {}", join_error)), None)
            }
            Err(_) => {
                abort.abort();
                warn!(
                    "Runner {} timed out after {}s",
                    runner.name(),
                    self.timeout.as_secs_f64()
                );
                (
                    RunStatus::TimedOut,
                    Some(format!("timed out after {}ms", self.timeout.as_millis())),
                    None,
                )
            }
        };

        RunnerResult {
            runner: runner.name().to_string(),
            kind: runner.kind(),
            status,
            duration_ms,
            error,
            output,
        }
    }
}
