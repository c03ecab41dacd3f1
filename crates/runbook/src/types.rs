//! Common types shared by sessions, workflows and runbooks.

use std::fmt;

/// The result of a successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Index of the candidate that was satisfied.
    pub pattern_index: usize,

    /// The text that matched. Empty for the `Eof` and `Timeout` sentinels.
    pub matched: String,

    /// Capture groups from regex candidates.
    pub captures: Vec<String>,

    /// Text received before the match, excluding it.
    pub before: String,

    /// Text still buffered after the match.
    pub after: String,
}

impl Match {
    /// Create a new match result.
    #[must_use]
    pub fn new(
        pattern_index: usize,
        matched: impl Into<String>,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Self {
        Self {
            pattern_index,
            matched: matched.into(),
            captures: Vec::new(),
            before: before.into(),
            after: after.into(),
        }
    }

    /// Create a match with captures.
    #[must_use]
    pub fn with_captures(mut self, captures: Vec<String>) -> Self {
        self.captures = captures;
        self
    }

    /// Get a capture group by index; 0 is the first group.
    #[must_use]
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(String::as_str)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.matched)
    }
}

/// The state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Running and ready for operations.
    Running,

    /// Handed over to the operator.
    Interacting,

    /// The child's output ended; the process may still need reaping.
    Ended,

    /// Closed by the driver. Terminal state.
    Closed(ProcessExitStatus),
}

impl SessionState {
    /// Whether the session has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Get the exit status if the session has been closed.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ProcessExitStatus> {
        if let Self::Closed(status) = self {
            Some(*status)
        } else {
            None
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Interacting => write!(f, "interacting"),
            Self::Ended => write!(f, "ended"),
            Self::Closed(status) => write!(f, "closed ({status})"),
        }
    }
}

/// Exit status of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExitStatus {
    /// Process exited with a code.
    Exited(i32),

    /// Process was terminated by a signal.
    Signaled(i32),

    /// Exit status is unknown.
    Unknown,
}

impl ProcessExitStatus {
    /// Check if the process exited successfully (code 0).
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Get the exit code if the process exited normally.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "terminated by signal {sig}"),
            Self::Unknown => write!(f, "unknown exit status"),
        }
    }
}

impl From<runbook_pty::ExitStatus> for ProcessExitStatus {
    fn from(status: runbook_pty::ExitStatus) -> Self {
        match status {
            runbook_pty::ExitStatus::Exited(code) => Self::Exited(code),
            runbook_pty::ExitStatus::Signaled(sig) => Self::Signaled(sig),
        }
    }
}

impl From<std::process::ExitStatus> for ProcessExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            Self::Exited(code)
        } else if let Some(sig) = status.signal() {
            Self::Signaled(sig)
        } else {
            Self::Unknown
        }
    }
}

/// Control characters that can be sent to a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChar {
    /// Ctrl+C (ETX), interrupt.
    CtrlC,
    /// Ctrl+D (EOT), end of input.
    CtrlD,
    /// Ctrl+Z (SUB), suspend.
    CtrlZ,
    /// Ctrl+\ (FS), quit.
    CtrlBackslash,
    /// Ctrl+] (GS).
    CtrlBracket,
    /// Escape.
    Escape,
}

impl ControlChar {
    /// Get the byte value of this control character.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::CtrlC => 0x03,
            Self::CtrlD => 0x04,
            Self::CtrlZ => 0x1A,
            Self::Escape => 0x1B,
            Self::CtrlBackslash => 0x1C,
            Self::CtrlBracket => 0x1D,
        }
    }
}
