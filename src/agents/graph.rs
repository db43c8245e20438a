//! Step graph driver for multi-step workflows.
//!
//! A workflow names an entry step and, for each step, mutates its state and
//! returns the next step (or `None` to stop). Conditional edges are plain
//! `match`es inside the workflow. The driver records timing per step and
//! stops runaway graphs after `max_steps`.

use super::StepRecord;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// Outcome of a single step.
pub struct Transition<S> {
    pub next: Option<S>,
    pub note: Option<String>,
}

impl<S> Transition<S> {
    pub fn to(next: S) -> Self {
        Self {
            next: Some(next),
            note: None,
        }
    }

    pub fn end() -> Self {
        Self {
            next: None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[async_trait]
pub trait Workflow: Send + Sync {
    type Step: Copy + fmt::Display + Send + Sync;
    type State: Send;

    fn entry(&self) -> Self::Step;

    async fn step(&self, step: Self::Step, state: &mut Self::State) -> Result<Transition<Self::Step>>;
}

/// Run a workflow from its entry step until it ends.
pub async fn drive<W: Workflow>(
    workflow: &W,
    state: &mut W::State,
    max_steps: usize,
) -> Result<Vec<StepRecord>> {
    let mut trace = Vec::new();
    let mut current = Some(workflow.entry());

    while let Some(step) = current {
        if trace.len() >= max_steps {
            bail!("Workflow exceeded {} steps (stopped at {})", max_steps, step);
        }

        let started = Instant::now();
        let transition = workflow.step(step, state).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!("Step {} finished in {}ms", step, duration_ms);
        trace.push(StepRecord {
            step: step.to_string(),
            duration_ms,
            note: transition.note,
        });
        current = transition.next;
    }

    Ok(trace)
}
