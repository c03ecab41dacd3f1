//! Session handle for driving a spawned process.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::interrupt::Interrupt;
use super::transport::{ProcessTransport, Signal, Transport};
use crate::config::SessionConfig;
use crate::error::{DriverError, Result};
use crate::expect::{ExpectState, Expectation, Matcher, Pattern};
use crate::transcript::TranscriptSink;
use crate::types::{ControlChar, Match, ProcessExitStatus, SessionState};

/// Bytes requested from the child per read.
const READ_CHUNK: usize = 4096;

/// A live handle to a child process.
///
/// Every operation takes `&mut self`: one wait or one write at a time. A
/// session is valid until [`close`](Session::close); after that every
/// operation fails with [`DriverError::SessionClosed`].
pub struct Session<T: Transport = ProcessTransport> {
    transport: T,
    config: SessionConfig,
    matcher: Matcher,
    state: SessionState,
    transcript: Option<Box<dyn TranscriptSink>>,
    interrupt: Interrupt,
}

impl<T: Transport> Session<T> {
    /// Wrap an already running transport.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let mut matcher = Matcher::new(config.buffer_size);
        matcher.set_default_timeout(config.timeout.default);
        Self {
            transport,
            config,
            matcher,
            state: SessionState::Running,
            transcript: None,
            interrupt: Interrupt::never(),
        }
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The configuration this session was created with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The child's process ID.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.transport.pid()
    }

    /// Whether the child's output has ended.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self.state, SessionState::Ended)
    }

    /// The exit status recorded by [`close`](Session::close).
    #[must_use]
    pub const fn exit_status(&self) -> Option<ProcessExitStatus> {
        self.state.exit_status()
    }

    /// Output received but not yet consumed by a match.
    #[must_use]
    pub fn buffer(&self) -> &str {
        self.matcher.buffer_str()
    }

    /// Discard unconsumed output.
    pub fn clear_buffer(&mut self) {
        self.matcher.clear();
    }

    /// Change the default timeout for waits.
    pub const fn set_default_timeout(&mut self, timeout: Duration) {
        self.matcher.set_default_timeout(timeout);
    }

    /// Attach a transcript sink, replacing any previous one.
    pub fn set_transcript(&mut self, sink: impl TranscriptSink + 'static) {
        self.set_boxed_transcript(Box::new(sink));
    }

    /// Attach an already boxed transcript sink.
    pub fn set_boxed_transcript(&mut self, sink: Box<dyn TranscriptSink>) {
        self.transcript = Some(sink);
    }

    /// Whether the transcript sink already shows output to the operator.
    #[must_use]
    pub fn transcript_reaches_operator(&self) -> bool {
        self.transcript
            .as_ref()
            .is_some_and(|sink| sink.reaches_operator())
    }

    /// Detach the transcript sink.
    pub fn clear_transcript(&mut self) -> Option<Box<dyn TranscriptSink>> {
        self.transcript.take()
    }

    /// Record a marker in the transcript.
    pub fn mark(&mut self, label: &str) {
        if let Some(sink) = self.transcript.as_mut() {
            sink.on_marker(label);
        }
    }

    /// Make waits return [`DriverError::Interrupted`] when `interrupt` fires.
    pub fn set_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupt = interrupt;
    }

    /// The interrupt this session observes.
    #[must_use]
    pub const fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Whether the child is still running.
    pub fn is_alive(&mut self) -> bool {
        !self.state.is_closed() && matches!(self.transport.try_wait(), Ok(None))
    }

    fn ensure_writable(&mut self) -> Result<()> {
        if self.state.is_closed() {
            return Err(DriverError::SessionClosed);
        }
        match self.transport.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(%status, "write refused, child has exited");
                Err(DriverError::SessionClosed)
            }
            Ok(None) => Ok(()),
            Err(e) => Err(DriverError::io_context("checking child status", e)),
        }
    }

    /// Send raw bytes to the child.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;

        let written = match self.transport.write_all(data).await {
            Ok(()) => self.transport.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!(error = %e, "child input is closed");
                return Err(DriverError::SessionClosed);
            }
            Err(e) => return Err(DriverError::io_context("writing to child", e)),
        }

        tracing::trace!(bytes = data.len(), "sent");
        if let Some(sink) = self.transcript.as_mut() {
            sink.on_input(data);
        }
        Ok(())
    }

    /// Send a string to the child.
    pub async fn send_str(&mut self, s: &str) -> Result<()> {
        self.send(s.as_bytes()).await
    }

    /// Send `line` followed by the configured line ending.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        tracing::debug!(line, "send line");
        let data = format!("{line}{}", self.config.line_ending.as_str());
        self.send(data.as_bytes()).await
    }

    /// Send a control character.
    pub async fn send_control(&mut self, ctrl: ControlChar) -> Result<()> {
        self.send(&[ctrl.as_byte()]).await
    }

    /// Wait for one pattern using the default timeout.
    pub async fn expect(&mut self, pattern: impl Into<Pattern>) -> Result<Match> {
        self.wait(&Expectation::from(pattern.into()), None).await
    }

    /// Wait for one pattern with an explicit timeout.
    pub async fn expect_timeout(
        &mut self,
        pattern: impl Into<Pattern>,
        timeout: Duration,
    ) -> Result<Match> {
        self.wait(&Expectation::from(pattern.into()), Some(timeout))
            .await
    }

    /// Wait for any candidate using the default timeout.
    pub async fn expect_any(&mut self, expectation: &Expectation) -> Result<Match> {
        self.wait(expectation, None).await
    }

    /// Wait until a candidate is satisfied, the output ends or `timeout`
    /// passes.
    ///
    /// Text candidates are checked against everything buffered before the
    /// sentinels are considered, and the lowest-index satisfied candidate
    /// wins. On a text match the buffer is consumed through the match and
    /// [`Match::before`] holds the text preceding it.
    ///
    /// # Errors
    ///
    /// - [`DriverError::Timeout`] if the deadline passes and no `Timeout`
    ///   sentinel is listed.
    /// - [`DriverError::StreamEnded`] if the output ends and no `Eof`
    ///   sentinel is listed.
    /// - [`DriverError::PatternNotFound`] if an abort pattern appears first.
    /// - [`DriverError::Interrupted`] if the session's interrupt fires.
    /// - [`DriverError::SessionClosed`] if the session is closed.
    pub async fn expect_any_timeout(
        &mut self,
        expectation: &Expectation,
        timeout: Duration,
    ) -> Result<Match> {
        self.wait(expectation, Some(timeout)).await
    }

    /// Wait for the child's output to end, returning everything before it.
    pub async fn expect_eof(&mut self) -> Result<Match> {
        self.wait(&Expectation::from(Pattern::eof()), None).await
    }

    /// Wait for the child's output to end, with an explicit timeout.
    pub async fn expect_eof_timeout(&mut self, timeout: Duration) -> Result<Match> {
        self.wait(&Expectation::from(Pattern::eof()), Some(timeout))
            .await
    }

    async fn wait(&mut self, expectation: &Expectation, timeout: Option<Duration>) -> Result<Match> {
        if self.state.is_closed() {
            return Err(DriverError::SessionClosed);
        }

        let deadline = ExpectState::new(self.matcher.effective_timeout(expectation, timeout));
        let interrupt = self.interrupt.clone();
        tracing::trace!(candidates = %expectation.describe(), timeout = ?deadline.timeout(), "waiting");

        loop {
            if interrupt.is_triggered() {
                return Err(DriverError::Interrupted);
            }

            if let Some(result) = self.matcher.try_match_any(expectation) {
                let matched = self.matcher.consume_match(&result);
                tracing::debug!(index = matched.pattern_index, matched = %matched.matched, "matched");
                return Ok(matched);
            }

            if let Some(abort) = expectation.find_abort(self.matcher.buffer_str()) {
                return Err(DriverError::pattern_not_found(
                    abort.to_string(),
                    self.matcher.buffer_str(),
                ));
            }

            let ended = self.is_eof();
            let timed_out = deadline.is_timed_out();
            if ended || timed_out {
                return self.resolve_sentinels(expectation, ended, deadline.timeout());
            }

            self.fill_buffer(&interrupt, deadline.remaining_time()).await?;
        }
    }

    /// Pick the lowest-index satisfied sentinel, or fail.
    fn resolve_sentinels(
        &mut self,
        expectation: &Expectation,
        ended: bool,
        timeout: Duration,
    ) -> Result<Match> {
        let eof_index = expectation.eof_index().filter(|_| ended);
        // The deadline was reached when we got here without the stream ending.
        let timeout_index = expectation.timeout_index().filter(|_| !ended);

        match (eof_index, timeout_index) {
            (Some(index), _) => {
                tracing::debug!(index, "matched end of stream");
                Ok(self.matcher.consume_eof(index))
            }
            (None, Some(index)) => {
                tracing::debug!(index, "matched timeout sentinel");
                Ok(self.matcher.snapshot_timeout(index))
            }
            (None, None) if ended => Err(DriverError::stream_ended(
                expectation.describe(),
                self.matcher.buffer_str(),
            )),
            (None, None) => Err(DriverError::timeout(
                timeout,
                expectation.describe(),
                self.matcher.buffer_str(),
            )),
        }
    }

    /// Read one chunk into the match buffer, or return when `remaining`
    /// passes.
    async fn fill_buffer(&mut self, interrupt: &Interrupt, remaining: Duration) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        let read = tokio::select! {
            biased;
            () = interrupt.triggered() => return Err(DriverError::Interrupted),
            read = tokio::time::timeout(remaining, self.transport.read(&mut buf)) => read,
        };

        match read {
            Err(_elapsed) => Ok(()),
            Ok(Ok(0)) => {
                self.mark_ended();
                Ok(())
            }
            Ok(Ok(n)) => {
                tracing::trace!(bytes = n, "read");
                self.matcher.append(&buf[..n]);
                self.record_output(&buf[..n]);
                Ok(())
            }
            Ok(Err(e)) => Err(DriverError::io_context("reading from child", e)),
        }
    }

    pub(crate) fn mark_ended(&mut self) {
        self.matcher.finish();
        if matches!(self.state, SessionState::Running | SessionState::Interacting) {
            tracing::debug!("child output ended");
            self.state = SessionState::Ended;
        }
    }

    pub(crate) fn record_output(&mut self, data: &[u8]) {
        if let Some(sink) = self.transcript.as_mut() {
            sink.on_output(data);
        }
    }

    pub(crate) const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) const fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn take_buffer(&mut self) -> String {
        self.matcher.take_all()
    }

    /// Stop the child and release it.
    ///
    /// A running child gets SIGHUP and SIGTERM, then SIGKILL if it is still
    /// alive after the close grace period. The child is always reaped.
    /// Closing an already closed session returns the recorded status.
    pub async fn close(&mut self) -> Result<ProcessExitStatus> {
        if let SessionState::Closed(status) = self.state {
            return Ok(status);
        }

        let result = self.terminate().await;
        let status = result.as_ref().map_or(ProcessExitStatus::Unknown, |s| *s);
        self.state = SessionState::Closed(status);
        tracing::debug!(pid = ?self.transport.pid(), %status, "session closed");
        result
    }

    async fn terminate(&mut self) -> Result<ProcessExitStatus> {
        let running = self
            .transport
            .try_wait()
            .map_err(|e| DriverError::io_context("checking child status", e))?;
        if let Some(status) = running {
            return Ok(status);
        }

        for signal in [Signal::Hangup, Signal::Terminate] {
            self.transport
                .signal(signal)
                .map_err(|e| DriverError::io_context("signalling child", e))?;
        }

        let grace = self.config.timeout.close;
        if let Ok(waited) = tokio::time::timeout(grace, self.transport.wait()).await {
            return waited.map_err(|e| DriverError::io_context("reaping child", e));
        }

        tracing::warn!(pid = ?self.transport.pid(), ?grace, "child ignored SIGTERM, killing it");
        self.transport
            .signal(Signal::Kill)
            .map_err(|e| DriverError::io_context("killing child", e))?;
        self.transport
            .wait()
            .await
            .map_err(|e| DriverError::io_context("reaping child", e))
    }

    /// Read until the output ends, close the session and check the exit
    /// status.
    ///
    /// For one-shot commands such as `adb push`. Returns everything the
    /// command printed; a non-zero exit is [`DriverError::CommandFailed`].
    pub async fn finish(&mut self, timeout: Duration) -> Result<String> {
        let output = self.expect_eof_timeout(timeout).await;
        let status = self.close().await;
        let output = output?.before;
        let status = status?;
        if status.success() {
            Ok(output)
        } else {
            Err(DriverError::command_failed(
                self.config.command_line(),
                status,
                output,
            ))
        }
    }

    /// Run `body` with this session and close it afterwards, whatever the
    /// outcome.
    ///
    /// The body's error wins over a close error; a close failure after a
    /// successful body is returned.
    pub async fn run_scoped<R>(
        mut self,
        body: impl AsyncFnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let outcome = body(&mut self).await;
        let closed = self.close().await;
        match (outcome, closed) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "closing session after failure");
                }
                Err(err)
            }
        }
    }
}

impl Session<ProcessTransport> {
    /// Spawn `command` with the default configuration.
    ///
    /// ```ignore
    /// use runbook::Session;
    ///
    /// let mut session = Session::spawn("adb", ["devices"]).await?;
    /// let found = session.expect("List of devices attached").await?;
    /// session.close().await?;
    /// ```
    pub async fn spawn<I, S>(command: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::spawn_with_config(SessionConfig::new(command).args(args)).await
    }

    /// Spawn the command described by `config`.
    pub async fn spawn_with_config(config: SessionConfig) -> Result<Self> {
        let transport = ProcessTransport::spawn(&config).await?;
        Ok(Self::new(transport, config))
    }

    /// Spawn, run `body`, and close the session on every exit path.
    pub async fn scoped<R>(
        config: SessionConfig,
        body: impl AsyncFnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        Self::spawn_with_config(config).await?.run_scoped(body).await
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("command", &self.config.command)
            .field("pid", &self.transport.pid())
            .field("state", &self.state)
            .field("buffered", &self.matcher.buffer().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::transcript::Recorder;

    fn mock_session() -> (Session<MockTransport>, crate::mock::MockHandle) {
        let (transport, handle) = MockTransport::new();
        let config = SessionConfig::new("mock").timeout(Duration::from_secs(5));
        (Session::new(transport, config), handle)
    }

    #[tokio::test]
    async fn text_match_returns_preceding_text() {
        let (mut session, handle) = mock_session();
        handle.queue_output("booting...\nREADY\nrest");

        let m = session.expect("READY").await.unwrap();
        assert_eq!(m.pattern_index, 0);
        assert_eq!(m.before, "booting...\n");
        assert_eq!(m.matched, "READY");
        assert_eq!(session.buffer(), "\nrest");
    }

    #[tokio::test]
    async fn earlier_candidate_wins() {
        let (mut session, handle) = mock_session();
        handle.queue_output("Error: build failed\nAndroid build completed successfully!");

        let expectation = Expectation::from(["Error:", "completed successfully"]);
        let m = session.expect_any(&expectation).await.unwrap();
        assert_eq!(m.pattern_index, 0);
    }

    #[tokio::test]
    async fn text_before_eof_sentinel() {
        let (mut session, handle) = mock_session();
        handle.queue_output("READY");
        handle.signal_eof();

        let expectation = Expectation::from("READY").with(Pattern::eof());
        let m = session
            .expect_any_timeout(&expectation, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(m.pattern_index, 0);
        assert_eq!(m.before, "");

        let m = session.expect_any(&expectation).await.unwrap();
        assert_eq!(m.pattern_index, 1);
    }

    #[tokio::test]
    async fn stream_end_without_sentinel_fails() {
        let (mut session, handle) = mock_session();
        handle.queue_output("partial");
        handle.signal_eof();

        let err = session.expect("OK").await.unwrap_err();
        assert!(err.is_stream_ended());
        assert_eq!(err.buffer(), Some("partial"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn timeout_without_sentinel_fails() {
        let (mut session, _handle) = mock_session();
        let err = session
            .expect_timeout("never", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn timeout_sentinel_keeps_buffer() {
        let (mut session, handle) = mock_session();
        handle.queue_output("half a line");

        let expectation = Expectation::from("$ ").with(Pattern::timeout(Duration::from_millis(200)));
        let m = session.expect_any(&expectation).await.unwrap();
        assert_eq!(m.pattern_index, 1);
        assert_eq!(m.before, "half a line");
        assert_eq!(session.buffer(), "half a line");
    }

    #[tokio::test]
    async fn abort_pattern_fails_the_wait() {
        let (mut session, handle) = mock_session();
        handle.queue_output("run-as: Operation not permitted\n");

        let expectation = Expectation::from("$ ").abort_on("Operation not permitted");
        let err = session.expect_any(&expectation).await.unwrap_err();
        assert!(matches!(err, DriverError::PatternNotFound { .. }));
    }

    #[tokio::test]
    async fn interrupt_unblocks_wait() {
        let (mut session, _handle) = mock_session();
        let (trigger, interrupt) = crate::session::interrupt_pair();
        session.set_interrupt(interrupt);

        let waiter = async { session.expect("never").await };
        let (result, ()) = tokio::join!(waiter, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });
        assert!(result.unwrap_err().is_interrupted());
    }

    #[tokio::test]
    async fn send_line_uses_line_ending_and_records() {
        let (mut session, handle) = mock_session();
        let recorder = Recorder::default();
        session.set_transcript(recorder.clone());

        session.send_line("ls").await.unwrap();
        handle.queue_output("codex\n");
        session.expect("codex").await.unwrap();

        assert_eq!(handle.take_input(), b"ls\n");
        let transcript = recorder.snapshot();
        assert_eq!(transcript.input_text(), "ls\n");
        assert_eq!(transcript.output_text(), "codex\n");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut session, handle) = mock_session();
        handle.exit_on_signal(ProcessExitStatus::Signaled(1));

        let first = session.close().await.unwrap();
        let second = session.close().await.unwrap();
        assert_eq!(first, second);
        assert!(session.state().is_closed());

        assert!(matches!(session.send_line("x").await, Err(DriverError::SessionClosed)));
        assert!(matches!(session.expect("x").await, Err(DriverError::SessionClosed)));
    }

    #[tokio::test]
    async fn send_after_exit_is_closed() {
        let (mut session, handle) = mock_session();
        handle.exit(ProcessExitStatus::Exited(0));
        assert!(matches!(session.send_line("x").await, Err(DriverError::SessionClosed)));
    }

    #[tokio::test]
    async fn finish_checks_exit_status() {
        let (mut session, handle) = mock_session();
        handle.queue_output("adb: error: failed to stat codex\n");
        handle.exit(ProcessExitStatus::Exited(1));

        let err = session.finish(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err,
            DriverError::CommandFailed { status: ProcessExitStatus::Exited(1), .. }
        ));
        assert_eq!(err.buffer(), Some("adb: error: failed to stat codex\n"));
        assert!(session.state().is_closed());

        let (mut session, handle) = mock_session();
        handle.queue_output("1 file pushed\n");
        handle.exit(ProcessExitStatus::Exited(0));
        assert_eq!(session.finish(Duration::from_secs(5)).await.unwrap(), "1 file pushed\n");
    }

    #[tokio::test]
    async fn scoped_closes_on_error() {
        let (session, handle) = mock_session();
        handle.exit_on_signal(ProcessExitStatus::Signaled(15));
        handle.signal_eof();

        let result: Result<()> = session
            .run_scoped(async |s| {
                s.expect("OK").await?;
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_stream_ended());
        assert_eq!(handle.signals(), vec![Signal::Hangup, Signal::Terminate]);
    }
}
