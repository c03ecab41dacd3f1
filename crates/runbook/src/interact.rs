//! Hand a live session to the operator.
//!
//! [`Session::interact`] forwards the child's output to the operator and
//! the operator's lines to the child until one side stops. Both directions
//! are serviced by a single `select!` loop, so a slow child never blocks the
//! operator's input and vice versa.
//!
//! ```ignore
//! use runbook::interact::InteractOptions;
//! use tokio::io::stdout;
//!
//! // `keyboard` is any `AsyncBufRead` carrying the operator's lines.
//! let options = InteractOptions::default().quit_command("quit");
//! let end = lldb.interact(keyboard, stdout(), &options).await?;
//! ```

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DriverError, Result};
use crate::session::{Session, Transport};
use crate::types::SessionState;

/// Words that end an interactive session by default.
pub const DEFAULT_EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

const READ_CHUNK: usize = 4096;

/// How an interactive session behaves.
#[derive(Debug, Clone)]
pub struct InteractOptions {
    /// Operator lines that end the loop, compared case-insensitively after
    /// trimming.
    pub exit_words: Vec<String>,
    /// Line sent to the child when the operator leaves.
    pub quit_command: Option<String>,
}

impl Default for InteractOptions {
    fn default() -> Self {
        Self {
            exit_words: DEFAULT_EXIT_WORDS.iter().map(ToString::to_string).collect(),
            quit_command: None,
        }
    }
}

impl InteractOptions {
    /// Options with the default exit words and no quit command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the exit words.
    #[must_use]
    pub fn exit_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exit_words = words.into_iter().map(Into::into).collect();
        self
    }

    /// Send `command` to the child when the operator leaves.
    #[must_use]
    pub fn quit_command(mut self, command: impl Into<String>) -> Self {
        self.quit_command = Some(command.into());
        self
    }

    /// Whether `line` is one of the exit words.
    #[must_use]
    pub fn is_exit_word(&self, line: &str) -> bool {
        let line = line.trim();
        self.exit_words
            .iter()
            .any(|word| word.eq_ignore_ascii_case(line))
    }
}

/// Why an interactive session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractEnd {
    /// The operator typed an exit word.
    ExitWord(String),
    /// The operator's input ended.
    OperatorEof,
    /// The child's output ended.
    ChildEof,
    /// The session's interrupt fired.
    Interrupted,
}

impl fmt::Display for InteractEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitWord(word) => write!(f, "operator typed '{word}'"),
            Self::OperatorEof => write!(f, "operator input ended"),
            Self::ChildEof => write!(f, "child output ended"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl<T: Transport> Session<T> {
    /// Forward output to `operator_output` and lines from `operator_input`
    /// to the child until an exit word, end of either stream or an
    /// interrupt.
    ///
    /// Unconsumed buffered output is flushed to the operator first, unless
    /// the transcript already showed it to them. When the operator leaves (exit word, end of input or interrupt) the
    /// configured quit command is sent to the child; a child that already
    /// went away is not an error.
    pub async fn interact<R, W>(
        &mut self,
        operator_input: R,
        mut operator_output: W,
        options: &InteractOptions,
    ) -> Result<InteractEnd>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.state().is_closed() {
            return Err(DriverError::SessionClosed);
        }

        let echoed = self.transcript_reaches_operator();
        let pending = self.take_buffer();
        if !echoed {
            forward(&mut operator_output, pending.as_bytes()).await?;
        }

        let resume = self.state();
        if resume == SessionState::Running {
            self.set_state(SessionState::Interacting);
        }
        tracing::debug!(pid = ?self.pid(), "interactive session started");

        let end = self
            .interact_loop(operator_input, &mut operator_output, options, echoed)
            .await;

        if self.state() == SessionState::Interacting {
            self.set_state(resume);
        }

        let end = end?;
        if end != InteractEnd::ChildEof {
            self.send_quit(options).await?;
        }
        tracing::debug!(%end, "interactive session ended");
        Ok(end)
    }

    async fn interact_loop<R, W>(
        &mut self,
        operator_input: R,
        operator_output: &mut W,
        options: &InteractOptions,
        echoed: bool,
    ) -> Result<InteractEnd>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let interrupt = self.interrupt().clone();
        let mut lines = operator_input.lines();
        let mut child_open = !self.is_eof();
        let mut buf = [0u8; READ_CHUNK];

        if !child_open {
            return Ok(InteractEnd::ChildEof);
        }

        loop {
            if interrupt.is_triggered() {
                return Ok(InteractEnd::Interrupted);
            }

            tokio::select! {
                biased;
                () = interrupt.triggered() => return Ok(InteractEnd::Interrupted),
                read = self.transport_mut().read(&mut buf), if child_open => match read {
                    Ok(0) => {
                        self.mark_ended();
                        child_open = false;
                    }
                    Ok(n) => {
                        self.record_output(&buf[..n]);
                        if !echoed {
                            forward(operator_output, &buf[..n]).await?;
                        }
                    }
                    Err(e) => return Err(DriverError::io_context("reading from child", e)),
                },
                line = lines.next_line() => {
                    let line = line.map_err(|e| DriverError::io_context("reading operator input", e))?;
                    match line {
                        None => return Ok(InteractEnd::OperatorEof),
                        Some(line) if options.is_exit_word(&line) => {
                            return Ok(InteractEnd::ExitWord(line.trim().to_string()));
                        }
                        Some(line) => self.send_line(&line).await?,
                    }
                }
            }

            if !child_open {
                return Ok(InteractEnd::ChildEof);
            }
        }
    }

    async fn send_quit(&mut self, options: &InteractOptions) -> Result<()> {
        let Some(command) = options.quit_command.as_deref() else {
            return Ok(());
        };
        match self.send_line(command).await {
            Ok(()) | Err(DriverError::SessionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn forward<W: AsyncWrite + Unpin>(out: &mut W, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    out.write_all(data)
        .await
        .map_err(|e| DriverError::io_context("writing to operator", e))?;
    out.flush()
        .await
        .map_err(|e| DriverError::io_context("writing to operator", e))
}
