//! Step descriptions: name, failure policy and retries.

use std::fmt;
use std::time::Duration;

use crate::error::DriverError;

/// What a failing step does to the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepPolicy {
    /// Abort the workflow.
    #[default]
    Fatal,
    /// Log a warning and carry on.
    Optional,
}

impl fmt::Display for StepPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Optional => write!(f, "optional"),
        }
    }
}

/// Bounded retries for a step.
///
/// Only errors that report [`DriverError::is_retryable`] are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    attempts: u32,
    delay: Duration,
}

impl Retry {
    /// Run once, never retry.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run at most `attempts` times in total. Zero is treated as one.
    #[must_use]
    pub const fn attempts(attempts: u32) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            delay: Duration::ZERO,
        }
    }

    /// Wait `delay` before each retry.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause before the next attempt.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        self.delay
    }

    /// Whether attempt number `attempt` (1-based) failing with `error`
    /// earns another try.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &DriverError) -> bool {
        attempt < self.attempts && error.is_retryable()
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::none()
    }
}

/// A named unit of work in a [`Workflow`](super::Workflow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    name: String,
    policy: StepPolicy,
    retry: Retry,
}

impl Step {
    /// A step whose failure aborts the workflow.
    #[must_use]
    pub fn fatal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: StepPolicy::Fatal,
            retry: Retry::none(),
        }
    }

    /// A step whose failure is logged and skipped.
    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            policy: StepPolicy::Optional,
            ..Self::fatal(name)
        }
    }

    /// Replace the failure policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Retry the step on timeouts.
    #[must_use]
    pub const fn retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// The step's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The failure policy.
    #[must_use]
    pub const fn policy(&self) -> StepPolicy {
        self.policy
    }

    /// The retry settings.
    #[must_use]
    pub const fn retry_settings(&self) -> Retry {
        self.retry
    }
}
