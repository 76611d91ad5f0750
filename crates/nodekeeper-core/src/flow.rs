//! Bookkeeping shared by the step-driven flows (repair and rollout).

use serde::Serialize;
use tracing::warn;

/// Whether a failing step aborts the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure is recorded as a warning and the flow continues
    BestEffort,
    /// Failure aborts the flow
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    /// Best-effort step failed; the flow went on
    Degraded { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord<S> {
    pub step: S,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Step log and warnings accumulated while a flow runs
#[derive(Debug, Clone, Serialize)]
pub struct StepLog<S> {
    pub steps: Vec<StepRecord<S>>,
    pub warnings: Vec<String>,
}

impl<S> Default for StepLog<S> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl<S: Clone + std::fmt::Display> StepLog<S> {
    pub fn done(&mut self, step: &S) {
        self.steps.push(StepRecord {
            step: step.clone(),
            status: StepStatus::Done,
        });
    }

    pub fn degrade(&mut self, step: &S, message: String) {
        warn!(step = %step, "{}", message);
        self.warnings.push(format!("{}: {}", step, message));
        self.steps.push(StepRecord {
            step: step.clone(),
            status: StepStatus::Degraded { message },
        });
    }

    pub fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn degraded(&self) -> impl Iterator<Item = &StepRecord<S>> {
        self.steps
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Degraded { .. }))
    }
}
