//! Step records, the final report and progress reporters.

use std::fmt;
use std::time::Duration;

use super::step::{Step, StepPolicy};

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code when a fatal step failed.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when the operator interrupted the run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step succeeded after `attempts` tries.
    Succeeded {
        /// Attempts used, at least one.
        attempts: u32,
    },
    /// An optional step failed and was skipped.
    Skipped {
        /// Rendered error.
        error: String,
    },
    /// A fatal step failed.
    Failed {
        /// Rendered error.
        error: String,
    },
    /// The operator interrupted the step.
    Interrupted,
}

impl StepOutcome {
    /// Whether the workflow can continue after this outcome.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Skipped { .. })
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { attempts: 1 } => write!(f, "ok"),
            Self::Succeeded { attempts } => write!(f, "ok after {attempts} attempts"),
            Self::Skipped { error } => write!(f, "skipped: {error}"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Position in the workflow, from 1.
    pub index: usize,
    /// Step name.
    pub name: String,
    /// Failure policy the step ran with.
    pub policy: StepPolicy,
    /// How it ended.
    pub outcome: StepOutcome,
    /// Wall time including retries.
    pub elapsed: Duration,
}

/// Summary of a finished workflow.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    /// Workflow name.
    pub name: String,
    /// Every executed step, in order.
    pub steps: Vec<StepRecord>,
    /// Error that ended the run, if any.
    pub error: Option<String>,
    /// Whether the run ended because of an operator interrupt.
    pub interrupted: bool,
    /// Total wall time.
    pub elapsed: Duration,
}

impl WorkflowReport {
    /// Whether the run completed without a fatal failure.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.error.is_none() && !self.interrupted
    }

    /// The step that ended the run.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|record| !record.outcome.is_ok())
    }

    /// Steps that failed but were allowed to.
    pub fn skipped_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|record| matches!(record.outcome, StepOutcome::Skipped { .. }))
    }

    /// Process exit code for this run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.error.is_some() {
            EXIT_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({:.1?})", self.name, self.elapsed)?;
        for record in &self.steps {
            writeln!(f, "  {}. {}: {}", record.index, record.name, record.outcome)?;
        }
        match (&self.error, self.interrupted) {
            (_, true) => write!(f, "interrupted"),
            (Some(error), false) => write!(f, "failed: {error}"),
            (None, false) => write!(f, "completed"),
        }
    }
}

/// Receives workflow progress for the operator.
pub trait Reporter: Send {
    /// A step is about to run.
    fn step_started(&mut self, index: usize, step: &Step);

    /// A step ended.
    fn step_finished(&mut self, record: &StepRecord);

    /// A step failed and will be attempted again.
    fn step_retrying(&mut self, _step: &Step, _attempt: u32, _error: &str) {}

    /// Free-form progress for the operator.
    fn note(&mut self, _message: &str) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn step_started(&mut self, index: usize, step: &Step) {
        tracing::info!(index, step = step.name(), policy = %step.policy(), "step started");
    }

    fn step_finished(&mut self, record: &StepRecord) {
        match &record.outcome {
            StepOutcome::Succeeded { attempts } => tracing::info!(
                step = %record.name,
                attempts,
                elapsed = ?record.elapsed,
                "step succeeded"
            ),
            StepOutcome::Skipped { error } => {
                tracing::warn!(step = %record.name, %error, "optional step failed, continuing");
            }
            StepOutcome::Failed { error } => {
                tracing::error!(step = %record.name, %error, "step failed");
            }
            StepOutcome::Interrupted => tracing::warn!(step = %record.name, "step interrupted"),
        }
    }

    fn step_retrying(&mut self, step: &Step, attempt: u32, error: &str) {
        tracing::warn!(step = step.name(), attempt, %error, "retrying step");
    }

    fn note(&mut self, message: &str) {
        tracing::info!("{message}");
    }
}
