//! Transcript sinks.

use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;

use crate::error::{DriverError, Result};

/// Receives a live copy of a session's traffic.
///
/// Implementations must not fail the session: report problems through
/// `tracing` and carry on.
pub trait TranscriptSink: Send {
    /// Bytes read from the child.
    fn on_output(&mut self, data: &[u8]);

    /// Bytes written to the child.
    fn on_input(&mut self, _data: &[u8]) {}

    /// A label marking a point in the run, such as the start of a step.
    fn on_marker(&mut self, _label: &str) {}

    /// Whether output written here is already in front of the operator.
    ///
    /// [`Session::interact`](crate::Session::interact) does not forward
    /// child output a second time when this is true.
    fn reaches_operator(&self) -> bool {
        false
    }
}

/// Writes raw traffic to any [`Write`].
///
/// Output is always written. Input is written only when enabled, since a
/// PTY child usually echoes what it is sent.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    include_input: bool,
    operator: bool,
    failed: bool,
}

/// Echoes child output to the operator's stdout.
pub type ConsoleSink = WriterSink<Stdout>;

/// Logs raw traffic to a file.
pub type FileSink = WriterSink<File>;

impl<W: Write + Send> WriterSink<W> {
    /// Wrap `writer`.
    pub const fn from_writer(writer: W) -> Self {
        Self {
            writer,
            include_input: false,
            operator: false,
            failed: false,
        }
    }

    /// Also write input sent to the child.
    #[must_use]
    pub const fn with_input(mut self, include: bool) -> Self {
        self.include_input = include;
        self
    }

    /// Mark `writer` as the operator's screen.
    #[must_use]
    pub const fn for_operator(mut self, operator: bool) -> Self {
        self.operator = operator;
        self
    }

    /// The wrapped writer.
    pub const fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, data: &[u8]) {
        if self.failed {
            return;
        }
        let result = self.writer.write_all(data).and_then(|()| self.writer.flush());
        if let Err(e) = result {
            // One warning is enough; a broken sink stays broken.
            self.failed = true;
            tracing::warn!(error = %e, "transcript sink failed, disabling it");
        }
    }
}

impl ConsoleSink {
    /// Echo to the process's stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout()).for_operator(true)
    }
}

impl FileSink {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| DriverError::io_context(format!("creating {}", path.display()), e))?;
        Ok(Self::from_writer(file))
    }

    /// Append to `path`, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DriverError::io_context(format!("opening {}", path.display()), e))?;
        Ok(Self::from_writer(file))
    }
}

impl<W: Write + Send> TranscriptSink for WriterSink<W> {
    fn on_output(&mut self, data: &[u8]) {
        self.write(data);
    }

    fn on_input(&mut self, data: &[u8]) {
        if self.include_input {
            self.write(data);
        }
    }

    fn reaches_operator(&self) -> bool {
        self.operator
    }
}

/// Forwards traffic to two sinks.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: TranscriptSink, B: TranscriptSink> Tee<A, B> {
    /// Combine two sinks.
    pub const fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: TranscriptSink, B: TranscriptSink> TranscriptSink for Tee<A, B> {
    fn on_output(&mut self, data: &[u8]) {
        self.first.on_output(data);
        self.second.on_output(data);
    }

    fn on_input(&mut self, data: &[u8]) {
        self.first.on_input(data);
        self.second.on_input(data);
    }

    fn on_marker(&mut self, label: &str) {
        self.first.on_marker(label);
        self.second.on_marker(label);
    }

    fn reaches_operator(&self) -> bool {
        self.first.reaches_operator() || self.second.reaches_operator()
    }
}

impl<S: TranscriptSink + ?Sized> TranscriptSink for Box<S> {
    fn on_output(&mut self, data: &[u8]) {
        (**self).on_output(data);
    }

    fn on_input(&mut self, data: &[u8]) {
        (**self).on_input(data);
    }

    fn on_marker(&mut self, label: &str) {
        (**self).on_marker(label);
    }

    fn reaches_operator(&self) -> bool {
        (**self).reaches_operator()
    }
}
