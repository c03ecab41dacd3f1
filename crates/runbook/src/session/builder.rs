//! Session builder.

use std::path::PathBuf;
use std::time::Duration;

use super::handle::Session;
use super::interrupt::Interrupt;
use super::transport::ProcessTransport;
use crate::config::{LineEnding, SessionConfig, SpawnMode};
use crate::error::Result;
use crate::transcript::TranscriptSink;

/// Builds a [`Session`] from configuration, transcript sink and interrupt.
///
/// ```ignore
/// use runbook::{SessionBuilder, transcript::ConsoleSink};
/// use std::time::Duration;
///
/// let mut shell = SessionBuilder::new("adb")
///     .arg("shell")
///     .timeout(Duration::from_secs(10))
///     .transcript(ConsoleSink::stdout())
///     .spawn()
///     .await?;
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    transcript: Option<Box<dyn TranscriptSink>>,
    interrupt: Option<Interrupt>,
}

impl SessionBuilder {
    /// Start building a session for `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self::from_config(SessionConfig::new(command))
    }

    /// Start from an existing configuration.
    #[must_use]
    pub fn from_config(config: SessionConfig) -> Self {
        Self {
            config,
            transcript: None,
            interrupt: None,
        }
    }

    /// Set the command arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.config.args.push(arg.into());
        self
    }

    /// Set a single environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_dir = Some(path.into());
        self
    }

    /// Set the terminal dimensions (width, height).
    #[must_use]
    pub const fn dimensions(mut self, cols: u16, rows: u16) -> Self {
        self.config.dimensions = (cols, rows);
        self
    }

    /// Set the default timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout.default = timeout;
        self
    }

    /// Set the close grace period.
    #[must_use]
    pub const fn close_grace(mut self, grace: Duration) -> Self {
        self.config.timeout.close = grace;
        self
    }

    /// Set the line ending style.
    #[must_use]
    pub const fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.config.line_ending = line_ending;
        self
    }

    /// Set the spawn mode.
    #[must_use]
    pub const fn spawn_mode(mut self, mode: SpawnMode) -> Self {
        self.config.spawn_mode = mode;
        self
    }

    /// Attach a transcript sink.
    #[must_use]
    pub fn transcript(mut self, sink: impl TranscriptSink + 'static) -> Self {
        self.transcript = Some(Box::new(sink));
        self
    }

    /// Attach a transcript sink only when `sink` is present.
    #[must_use]
    pub fn transcript_opt(mut self, sink: Option<Box<dyn TranscriptSink>>) -> Self {
        if sink.is_some() {
            self.transcript = sink;
        }
        self
    }

    /// Observe `interrupt` during waits.
    #[must_use]
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// The configuration built so far.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn the process.
    pub async fn spawn(self) -> Result<Session<ProcessTransport>> {
        let mut session = Session::spawn_with_config(self.config).await?;
        if let Some(sink) = self.transcript {
            session.set_boxed_transcript(sink);
        }
        if let Some(interrupt) = self.interrupt {
            session.set_interrupt(interrupt);
        }
        Ok(session)
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("transcript", &self.transcript.is_some())
            .finish_non_exhaustive()
    }
}
