//! Sequential runbook steps with explicit failure policy.
//!
//! A [`Workflow`] runs one [`Step`] at a time. Each step is an async closure
//! whose return value is handed back to the caller, so a value scraped in
//! one step reaches the next as an ordinary variable.
//!
//! ```ignore
//! use runbook::workflow::{Retry, Step, Workflow};
//!
//! let mut workflow = Workflow::new("deploy-debug");
//! let pid = workflow
//!     .run(Step::fatal("find process"), async || {
//!         shell.send_line("ps -A | grep codex").await?;
//!         let listing = shell.expect_any(&prompt).await?;
//!         Ok(runbook::scrape::find_pid(&listing.before, "codex")?)
//!     })
//!     .await?;
//! workflow
//!     .run(Step::optional("smoke test").retry(Retry::attempts(2)), async || {
//!         shell.send_line("./codex --version").await?;
//!         shell.expect_any(&prompt).await
//!     })
//!     .await?;
//! ```

mod report;
mod step;

use std::time::Instant;

pub use report::{
    EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS, Reporter, StepOutcome, StepRecord,
    TracingReporter, WorkflowReport,
};
pub use step::{Retry, Step, StepPolicy};

use crate::error::{DriverError, Result};
use crate::session::Interrupt;

/// Runs named steps in order and keeps their records.
pub struct Workflow {
    name: String,
    reporter: Box<dyn Reporter>,
    interrupt: Interrupt,
    records: Vec<StepRecord>,
    started: Instant,
}

impl Workflow {
    /// A workflow that reports through `tracing`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reporter: Box::new(TracingReporter),
            interrupt: Interrupt::never(),
            records: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Report progress to `reporter` instead.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Cut retry delays short when `interrupt` fires.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The workflow's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps executed so far.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Pass a progress message to the reporter.
    pub fn note(&mut self, message: &str) {
        self.reporter.note(message);
    }

    /// Run `body` as `step`.
    ///
    /// Returns `Ok(Some(value))` on success and `Ok(None)` when an optional
    /// step failed. A fatal failure returns [`DriverError::StepFailed`]
    /// naming the step. An interrupt always aborts, whatever the policy.
    pub async fn run<T>(
        &mut self,
        step: Step,
        body: impl AsyncFnMut() -> Result<T>,
    ) -> Result<Option<T>> {
        match self.execute(&step, body).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if step.policy() == StepPolicy::Optional && !e.is_interrupted() => Ok(None),
            Err(e) => Err(DriverError::step_failed(step.name(), e)),
        }
    }

    /// Run `body` as a fatal step named `name` and return its value.
    pub async fn require<T>(
        &mut self,
        name: impl Into<String>,
        body: impl AsyncFnMut() -> Result<T>,
    ) -> Result<T> {
        self.require_step(Step::fatal(name), body).await
    }

    /// Like [`require`](Self::require) with retry settings from `step`. The
    /// step's policy is ignored: failure always aborts.
    pub async fn require_step<T>(
        &mut self,
        step: Step,
        body: impl AsyncFnMut() -> Result<T>,
    ) -> Result<T> {
        let step = step.with_policy(StepPolicy::Fatal);
        self.execute(&step, body)
            .await
            .map_err(|e| DriverError::step_failed(step.name(), e))
    }

    async fn execute<T>(
        &mut self,
        step: &Step,
        mut body: impl AsyncFnMut() -> Result<T>,
    ) -> Result<T> {
        let index = self.records.len() + 1;
        self.reporter.step_started(index, step);

        let started = Instant::now();
        let retry = step.retry_settings();
        let mut attempt = 1;
        let result = loop {
            match body().await {
                Ok(value) => break Ok(value),
                Err(e) if retry.should_retry(attempt, &e) => {
                    self.reporter.step_retrying(step, attempt, &e.to_string());
                    tokio::select! {
                        biased;
                        () = self.interrupt.triggered() => break Err(DriverError::Interrupted),
                        () = tokio::time::sleep(retry.retry_delay()) => {}
                    }
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        let outcome = match &result {
            Ok(_) => StepOutcome::Succeeded { attempts: attempt },
            Err(e) if e.is_interrupted() => StepOutcome::Interrupted,
            Err(e) if step.policy() == StepPolicy::Optional => StepOutcome::Skipped {
                error: e.to_string(),
            },
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        };

        let record = StepRecord {
            index,
            name: step.name().to_string(),
            policy: step.policy(),
            outcome,
            elapsed: started.elapsed(),
        };
        self.reporter.step_finished(&record);
        self.records.push(record);
        result
    }

    /// Close the workflow with the overall `outcome` of the run.
    pub fn finish<T>(self, outcome: &Result<T>) -> WorkflowReport {
        let (error, interrupted) = match outcome {
            Ok(_) => (None, false),
            Err(e) => (Some(e.to_string()), e.is_interrupted()),
        };
        WorkflowReport {
            name: self.name,
            steps: self.records,
            error,
            interrupted,
            elapsed: self.started.elapsed(),
        }
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.records.len())
            .finish_non_exhaustive()
    }
}
