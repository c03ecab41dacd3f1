//! Operator-facing progress output.

use std::io::{self, Stdout, Write};

use runbook::workflow::{Reporter, Step, StepOutcome, StepRecord, WorkflowReport};

/// Prints step progress between the child's echoed output.
///
/// Lines are prefixed with `==>` so they stand out from the transcript.
#[derive(Debug)]
pub struct ConsoleReporter<W = Stdout> {
    out: W,
}

impl ConsoleReporter {
    /// Report to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    /// Report to `out`.
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    fn line(&mut self, text: &str) {
        // The transcript may have left the cursor mid-line.
        if let Err(e) = writeln!(self.out, "\n==> {text}").and_then(|()| self.out.flush()) {
            tracing::debug!(error = %e, "progress output failed");
        }
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn step_started(&mut self, index: usize, step: &Step) {
        self.line(&format!("[{index}] {}", step.name()));
    }

    fn step_finished(&mut self, record: &StepRecord) {
        match &record.outcome {
            StepOutcome::Succeeded { attempts: 1 } => {}
            StepOutcome::Skipped { error } => {
                self.line(&format!("[{}] skipped: {error}", record.index));
            }
            outcome => self.line(&format!("[{}] {outcome}", record.index)),
        }
    }

    fn step_retrying(&mut self, step: &Step, attempt: u32, error: &str) {
        self.line(&format!("{} failed on attempt {attempt} ({error}), retrying", step.name()));
    }

    fn note(&mut self, message: &str) {
        self.line(message);
    }
}

/// Print the closing summary of a run.
pub fn print_summary(out: &mut impl Write, report: &WorkflowReport) -> io::Result<()> {
    writeln!(out)?;
    for record in report.skipped_steps() {
        writeln!(out, "==> warning: optional step '{}' was skipped", record.name)?;
    }
    writeln!(out, "==> {report}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use runbook::workflow::StepPolicy;

    use super::*;

    fn record(outcome: StepOutcome) -> StepRecord {
        StepRecord {
            index: 3,
            name: "smoke test".into(),
            policy: StepPolicy::Optional,
            outcome,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn quiet_on_first_try_success() {
        let mut out = Vec::new();
        let mut reporter = ConsoleReporter::new(&mut out);
        reporter.step_started(3, &Step::optional("smoke test"));
        reporter.step_finished(&record(StepOutcome::Succeeded { attempts: 1 }));
        assert_eq!(String::from_utf8(out).unwrap(), "\n==> [3] smoke test\n");
    }

    #[test]
    fn skipped_and_retried_steps_are_announced() {
        let mut out = Vec::new();
        let mut reporter = ConsoleReporter::new(&mut out);
        reporter.step_retrying(&Step::fatal("push binary"), 1, "timed out");
        reporter.step_finished(&record(StepOutcome::Skipped {
            error: "timed out".into(),
        }));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("push binary failed on attempt 1 (timed out), retrying"));
        assert!(text.contains("[3] skipped: timed out"));
    }

    #[test]
    fn notes_are_prefixed() {
        let mut out = Vec::new();
        ConsoleReporter::new(&mut out).note("type 'quit' to leave the debugger");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\n==> type 'quit' to leave the debugger\n"
        );
    }

    #[test]
    fn summary_warns_about_skipped_steps() {
        let report = WorkflowReport {
            name: "deploy-debug".into(),
            steps: vec![record(StepOutcome::Skipped {
                error: "timed out".into(),
            })],
            error: None,
            interrupted: false,
            elapsed: Duration::from_secs(2),
        };
        let mut out = Vec::new();
        print_summary(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("optional step 'smoke test' was skipped"));
        assert!(text.ends_with("completed\n"));
    }
}
