//! Configuration types for runbook sessions.
//!
//! [`SessionConfig`] describes one child process and how to talk to it.
//! [`file`] loads settings from TOML and [`env`] reads `RUNBOOK_*`
//! overrides.

pub mod env;
pub mod file;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default timeout for a wait (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default grace period between SIGTERM and SIGKILL on close.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Default match buffer size (1 MB).
pub const DEFAULT_BUFFER_SIZE: usize = crate::expect::DEFAULT_CAPACITY;

/// Default terminal width.
pub const DEFAULT_TERMINAL_WIDTH: u16 = 80;

/// Default terminal height.
pub const DEFAULT_TERMINAL_HEIGHT: u16 = 24;

/// TERM given to PTY children; keeps tools from emitting colour codes.
pub const DEFAULT_TERM: &str = "dumb";

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The command to execute.
    pub command: String,

    /// Command arguments.
    pub args: Vec<String>,

    /// Environment variables to set.
    pub env: HashMap<String, String>,

    /// Whether to inherit the parent environment.
    pub inherit_env: bool,

    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,

    /// Terminal dimensions (width, height). PTY mode only.
    pub dimensions: (u16, u16),

    /// Timeout configuration.
    pub timeout: TimeoutConfig,

    /// Maximum bytes of unmatched output kept for matching.
    pub buffer_size: usize,

    /// Terminator appended by `send_line`.
    pub line_ending: LineEnding,

    /// How the child's standard streams are connected.
    pub spawn_mode: SpawnMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), DEFAULT_TERM.to_string());

        Self {
            command: String::new(),
            args: Vec::new(),
            env,
            inherit_env: true,
            working_dir: None,
            dimensions: (DEFAULT_TERMINAL_WIDTH, DEFAULT_TERMINAL_HEIGHT),
            timeout: TimeoutConfig::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            line_ending: LineEnding::default(),
            spawn_mode: SpawnMode::default(),
        }
    }
}

impl SessionConfig {
    /// Create a new session configuration with the given command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Set the command arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set whether to inherit the parent environment.
    #[must_use]
    pub const fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Set the terminal dimensions.
    #[must_use]
    pub const fn dimensions(mut self, width: u16, height: u16) -> Self {
        self.dimensions = (width, height);
        self
    }

    /// Set the default timeout for waits.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout.default = timeout;
        self
    }

    /// Set the grace period `close` allows after SIGTERM.
    #[must_use]
    pub const fn close_grace(mut self, grace: Duration) -> Self {
        self.timeout.close = grace;
        self
    }

    /// Set the match buffer size.
    #[must_use]
    pub const fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the line ending style.
    #[must_use]
    pub const fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Set the spawn mode.
    #[must_use]
    pub const fn spawn_mode(mut self, mode: SpawnMode) -> Self {
        self.spawn_mode = mode;
        self
    }

    /// The command line as one display string.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Configuration for timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Default timeout for waits.
    pub default: Duration,

    /// Grace period between SIGTERM and SIGKILL when closing.
    pub close: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_TIMEOUT,
            close: DEFAULT_CLOSE_GRACE,
        }
    }
}

/// Line ending styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Unix-style line ending (LF).
    #[default]
    Lf,

    /// Windows-style line ending (CRLF).
    CrLf,

    /// Carriage return only, what a terminal's Enter key sends.
    Cr,
}

impl LineEnding {
    /// Get the line ending as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }
}

/// How a child's standard streams are connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnMode {
    /// A pseudo-terminal becomes the child's controlling terminal.
    #[default]
    Pty,

    /// stdin is a pipe; stdout and stderr are merged into one stream.
    Pipe,
}

impl fmt::Display for SpawnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pty => f.write_str("pty"),
            Self::Pipe => f.write_str("pipe"),
        }
    }
}

impl FromStr for SpawnMode {
    type Err = crate::DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pty" => Ok(Self::Pty),
            "pipe" => Ok(Self::Pipe),
            other => Err(crate::DriverError::config(format!(
                "unknown spawn mode '{other}' (expected 'pty' or 'pipe')"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout.default, DEFAULT_TIMEOUT);
        assert_eq!(config.timeout.close, DEFAULT_CLOSE_GRACE);
        assert_eq!(config.spawn_mode, SpawnMode::Pty);
        assert_eq!(config.env.get("TERM").map(String::as_str), Some("dumb"));
    }

    #[test]
    fn builder_methods() {
        let config = SessionConfig::new("adb")
            .args(["shell", "ls"])
            .timeout(Duration::from_secs(60))
            .close_grace(Duration::from_millis(500))
            .spawn_mode(SpawnMode::Pipe)
            .line_ending(LineEnding::Cr);

        assert_eq!(config.command_line(), "adb shell ls");
        assert_eq!(config.timeout.default, Duration::from_secs(60));
        assert_eq!(config.timeout.close, Duration::from_millis(500));
        assert_eq!(config.line_ending.as_str(), "\r");
    }

    #[test]
    fn spawn_mode_parsing() {
        assert_eq!("PTY".parse::<SpawnMode>().unwrap(), SpawnMode::Pty);
        assert_eq!(" pipe ".parse::<SpawnMode>().unwrap(), SpawnMode::Pipe);
        assert!("socket".parse::<SpawnMode>().is_err());
        assert_eq!(SpawnMode::Pipe.to_string(), "pipe");
    }
}
