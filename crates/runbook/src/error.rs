//! Error types for runbook.
//!
//! Waiting errors carry the buffered output at the moment they were raised,
//! so an operator can see what the child actually printed.

use std::time::Duration;

use thiserror::Error;

/// Maximum length of buffer content to display in error messages.
const MAX_BUFFER_DISPLAY: usize = 500;

/// Context lines to show before/after truncation point.
const CONTEXT_LINES: usize = 3;

/// Format buffer content for display, truncating if necessary.
fn format_buffer_snippet(buffer: &str) -> String {
    if buffer.is_empty() {
        return "(empty buffer)".to_string();
    }

    let buffer_len = buffer.len();
    if buffer_len <= MAX_BUFFER_DISPLAY {
        return format!(
            "┌─ buffer ({} bytes) ──────────────────────\n│ {}\n└────────────────────────────────────────",
            buffer_len,
            buffer.lines().collect::<Vec<_>>().join("\n│ ")
        );
    }

    let lines: Vec<&str> = buffer.lines().collect();
    let total_lines = lines.len();

    if total_lines <= CONTEXT_LINES * 2 {
        return format!(
            "┌─ buffer ({} bytes, {} lines) ─────────────\n│ {}\n└────────────────────────────────────────",
            buffer_len,
            total_lines,
            lines.join("\n│ ")
        );
    }

    let tail_lines = &lines[total_lines - CONTEXT_LINES * 2..];
    let hidden = total_lines - tail_lines.len();

    format!(
        "┌─ buffer ({} bytes, {} lines) ─────────────\n│ ... ({} lines hidden)\n│ {}\n└────────────────────────────────────────",
        buffer_len,
        total_lines,
        hidden,
        tail_lines.join("\n│ ")
    )
}

fn format_timeout_error(duration: Duration, pattern: &str, buffer: &str) -> String {
    format!(
        "timed out after {duration:?} waiting for {pattern}\n\n{}",
        format_buffer_snippet(buffer)
    )
}

fn format_stream_ended_error(pattern: &str, buffer: &str) -> String {
    format!(
        "process output ended before {pattern} appeared\n\n{}",
        format_buffer_snippet(buffer)
    )
}

fn format_pattern_not_found_error(pattern: &str, buffer: &str) -> String {
    format!(
        "unexpected output {pattern} while waiting\n\n{}",
        format_buffer_snippet(buffer)
    )
}

fn format_command_failed(
    command: &str,
    status: crate::types::ProcessExitStatus,
    output: &str,
) -> String {
    format!("'{command}' {status}\n\n{}", format_buffer_snippet(output))
}

/// The main error type for runbook operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Failed to spawn a process.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] SpawnError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    IoWithContext {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No candidate was satisfied before the deadline.
    #[error("{}", format_timeout_error(*duration, pattern, buffer))]
    Timeout {
        /// The timeout duration that elapsed.
        duration: Duration,
        /// The candidates that were being waited for.
        pattern: String,
        /// Buffer contents at the time of timeout.
        buffer: String,
    },

    /// The child's output ended without a candidate being satisfied.
    #[error("{}", format_stream_ended_error(pattern, buffer))]
    StreamEnded {
        /// The candidates that were being waited for.
        pattern: String,
        /// Buffer contents when the stream ended.
        buffer: String,
    },

    /// An abort pattern appeared before any candidate was satisfied.
    #[error("{}", format_pattern_not_found_error(pattern, buffer))]
    PatternNotFound {
        /// The abort pattern that was seen.
        pattern: String,
        /// Buffer contents when it was seen.
        buffer: String,
    },

    /// The session was closed or the process has exited.
    #[error("session is closed")]
    SessionClosed,

    /// A command ran to completion but reported failure.
    #[error("{}", format_command_failed(command, *status, output))]
    CommandFailed {
        /// The command line that ran.
        command: String,
        /// How it exited.
        status: crate::types::ProcessExitStatus,
        /// Everything it printed.
        output: String,
    },

    /// The operator interrupted the run.
    #[error("interrupted by operator")]
    Interrupted,

    /// Invalid regex pattern.
    #[error("invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// A value could not be scraped from tool output.
    #[error(transparent)]
    Scrape(#[from] crate::scrape::ScrapeError),

    /// A workflow step failed.
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        /// Name of the failed step.
        step: String,
        /// Why it failed.
        #[source]
        source: Box<DriverError>,
    },
}

/// Errors related to process spawning.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Command not found.
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found.
        command: String,
    },

    /// Permission denied.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be executed.
        path: String,
    },

    /// PTY allocation failed.
    #[error("failed to allocate PTY: {reason}")]
    PtyAllocation {
        /// The reason for the failure.
        reason: String,
    },

    /// General I/O error during spawn.
    #[error("I/O error during spawn: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid command or argument.
    #[error("invalid {kind}: {reason}")]
    InvalidArgument {
        /// The kind of invalid input (e.g., "command", "argument").
        kind: String,
        /// The value that was invalid.
        value: String,
        /// The reason it's invalid.
        reason: String,
    },
}

/// Result type alias for runbook operations.
pub type Result<T> = std::result::Result<T, DriverError>;

impl DriverError {
    /// Create a timeout error with the given details.
    pub fn timeout(
        duration: Duration,
        pattern: impl Into<String>,
        buffer: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            duration,
            pattern: pattern.into(),
            buffer: buffer.into(),
        }
    }

    /// Create a stream-ended error.
    pub fn stream_ended(pattern: impl Into<String>, buffer: impl Into<String>) -> Self {
        Self::StreamEnded {
            pattern: pattern.into(),
            buffer: buffer.into(),
        }
    }

    /// Create a pattern not found error.
    pub fn pattern_not_found(pattern: impl Into<String>, buffer: impl Into<String>) -> Self {
        Self::PatternNotFound {
            pattern: pattern.into(),
            buffer: buffer.into(),
        }
    }

    /// Create an error for a command that exited unsuccessfully.
    pub fn command_failed(
        command: impl Into<String>,
        status: crate::types::ProcessExitStatus,
        output: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            status,
            output: output.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap an error as the failure of a named workflow step.
    pub fn step_failed(step: impl Into<String>, source: Self) -> Self {
        Self::StepFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoWithContext {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O result with context.
    pub fn with_io_context<T>(result: std::io::Result<T>, context: impl Into<String>) -> Result<T> {
        result.map_err(|e| Self::io_context(context, e))
    }

    /// The innermost error, looking through step failures.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a timeout error.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout { .. })
    }

    /// Check if the child's output ended.
    #[must_use]
    pub fn is_stream_ended(&self) -> bool {
        matches!(self.root(), Self::StreamEnded { .. })
    }

    /// Check if the operator interrupted the run.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self.root(), Self::Interrupted)
    }

    /// Whether repeating the operation could succeed.
    ///
    /// Only timeouts qualify: an ended stream or a closed session stays that
    /// way.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }

    /// Get the buffer contents if this error contains them.
    #[must_use]
    pub fn buffer(&self) -> Option<&str> {
        match self.root() {
            Self::Timeout { buffer, .. }
            | Self::StreamEnded { buffer, .. }
            | Self::PatternNotFound { buffer, .. } => Some(buffer),
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl SpawnError {
    /// Create a command not found error.
    pub fn command_not_found(command: impl Into<String>) -> Self {
        Self::CommandNotFound {
            command: command.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    /// Create a PTY allocation error.
    pub fn pty_allocation(reason: impl Into<String>) -> Self {
        Self::PtyAllocation {
            reason: reason.into(),
        }
    }

    /// Classify an OS error raised while launching `command`.
    #[must_use]
    pub fn from_launch(command: &str, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::command_not_found(command),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(command),
            _ => Self::Io(error),
        }
    }
}

impl From<runbook_pty::PtyError> for SpawnError {
    fn from(error: runbook_pty::PtyError) -> Self {
        match error {
            runbook_pty::PtyError::Create(e) => Self::pty_allocation(e.to_string()),
            other => Self::Io(std::io::Error::new(
                other.io_error().kind(),
                other.to_string(),
            )),
        }
    }
}
