//! Scripted transport for testing runbooks without real processes.
//!
//! A [`MockTransport`] plays the child side of a session. Its paired
//! [`MockHandle`] queues output, ends the stream, answers input and decides
//! how the fake process reacts to signals.
//!
//! # Example
//!
//! ```rust
//! use runbook::mock::MockTransport;
//! use runbook::{Session, SessionConfig};
//!
//! # async fn demo() -> runbook::Result<()> {
//! let (transport, handle) = MockTransport::new();
//! handle.queue_output("$ ");
//! handle.respond_to("ps -A", "u0_a123  4242  1 0 codex\n$ ");
//!
//! let mut session = Session::new(transport, SessionConfig::new("adb"));
//! session.expect("$ ").await?;
//! session.send_line("ps -A | grep codex").await?;
//! let listing = session.expect("$ ").await?;
//! assert!(listing.before.contains("4242"));
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;

use crate::session::{Signal, Transport};
use crate::types::ProcessExitStatus;

#[derive(Debug, Default)]
struct MockState {
    output: VecDeque<u8>,
    eof: bool,
    input: Vec<u8>,
    input_closed: bool,
    responses: Vec<(String, Vec<u8>)>,
    signals: Vec<Signal>,
    exit_on_signal: Option<ProcessExitStatus>,
    read_waker: Option<Waker>,
}

impl MockState {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn push_output(&mut self, data: &[u8]) {
        self.output.extend(data);
        self.wake_reader();
    }

    fn end_output(&mut self) {
        self.eof = true;
        self.wake_reader();
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    status: watch::Sender<Option<ProcessExitStatus>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exit(&self, status: ProcessExitStatus) {
        self.status.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(status);
            true
        });
        self.lock().end_output();
    }

    fn exited(&self) -> Option<ProcessExitStatus> {
        *self.status.borrow()
    }
}

/// The child side of a mock session.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
    pid: Option<u32>,
}

/// Controls a [`MockTransport`] from the test.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a transport and its control handle.
    #[allow(clippy::new_ret_no_self)]
    #[must_use]
    pub fn new() -> (Self, MockHandle) {
        let (status, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState::default()),
            status,
        });
        let handle = MockHandle {
            shared: Arc::clone(&shared),
        };
        (Self { shared, pid: None }, handle)
    }

    /// Report `pid` as the fake child's process ID.
    #[must_use]
    pub const fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

impl MockHandle {
    /// Make `data` available to the session's next read.
    pub fn queue_output(&self, data: impl AsRef<[u8]>) {
        self.shared.lock().push_output(data.as_ref());
    }

    /// End the output stream once queued output has been read.
    pub fn signal_eof(&self) {
        self.shared.lock().end_output();
    }

    /// Whenever written input contains `needle`, queue `response`.
    pub fn respond_to(&self, needle: impl Into<String>, response: impl AsRef<[u8]>) {
        self.shared
            .lock()
            .responses
            .push((needle.into(), response.as_ref().to_vec()));
    }

    /// Take everything the session has written so far.
    #[must_use]
    pub fn take_input(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.lock().input)
    }

    /// Everything the session has written so far, as text.
    #[must_use]
    pub fn input_text(&self) -> String {
        String::from_utf8_lossy(&self.shared.lock().input).into_owned()
    }

    /// Make the fake process exit now. Its output ends too.
    pub fn exit(&self, status: ProcessExitStatus) {
        self.shared.exit(status);
    }

    /// Make the fake process exit with `status` on the first polite signal.
    ///
    /// Without this, only SIGKILL ends it.
    pub fn exit_on_signal(&self, status: ProcessExitStatus) {
        self.shared.lock().exit_on_signal = Some(status);
    }

    /// Signals delivered so far, in order.
    #[must_use]
    pub fn signals(&self) -> Vec<Signal> {
        self.shared.lock().signals.clone()
    }

    /// Whether the session closed the child's input.
    #[must_use]
    pub fn input_closed(&self) -> bool {
        self.shared.lock().input_closed
    }
}

impl Transport for MockTransport {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExitStatus>> {
        Ok(self.shared.exited())
    }

    fn signal(&mut self, signal: Signal) -> io::Result<()> {
        let exit = {
            let mut state = self.shared.lock();
            state.signals.push(signal);
            match signal {
                Signal::Kill => Some(ProcessExitStatus::Signaled(signal.as_unix_signal())),
                _ => state.exit_on_signal,
            }
        };
        if let Some(status) = exit {
            self.shared.exit(status);
        }
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ProcessExitStatus> {
        let mut rx = self.shared.status.subscribe();
        let status = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| io::Error::other("mock process vanished"))?;
        Ok(status.unwrap_or(ProcessExitStatus::Unknown))
    }
}

impl AsyncRead for MockTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.shared.lock();
        if !state.output.is_empty() {
            let n = buf.remaining().min(state.output.len());
            let chunk: Vec<u8> = state.output.drain(..n).collect();
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        if state.eof {
            return Poll::Ready(Ok(()));
        }
        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.shared.exited().is_some() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock process has exited",
            )));
        }

        let mut state = self.shared.lock();
        if state.input_closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock input is closed",
            )));
        }
        state.input.extend_from_slice(data);

        let written = String::from_utf8_lossy(data);
        let replies: Vec<Vec<u8>> = state
            .responses
            .iter()
            .filter(|(needle, _)| written.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .collect();
        for reply in replies {
            state.push_output(&reply);
        }

        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.lock().input_closed = true;
        Poll::Ready(Ok(()))
    }
}
