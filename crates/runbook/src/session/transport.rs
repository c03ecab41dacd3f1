//! Transports connecting a session to a child process.
//!
//! A [`Transport`] is the byte stream to and from the child plus enough
//! process control to stop and reap it. [`ProcessTransport`] is the real
//! implementation, in either PTY or pipe mode.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use runbook_pty::{PtyConfig, PtySignal, UnixPtyChild, UnixPtyMaster};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::pipe::MergedOutput;
use crate::config::{SessionConfig, SpawnMode};
use crate::error::{Result, SpawnError};
use crate::types::ProcessExitStatus;

/// Signals a session can deliver to its child.
pub type Signal = PtySignal;

/// The child side of a session.
///
/// Reads return the child's output and end (`Ok(0)`) when the child can no
/// longer produce any. Writes go to the child's input.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// The child's process ID, if there is a real process.
    fn pid(&self) -> Option<u32>;

    /// The exit status, if the child has already exited.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExitStatus>>;

    /// Deliver a signal. Signalling an exited child is not an error.
    fn signal(&mut self, signal: Signal) -> io::Result<()>;

    /// Wait for the child to exit and reap it.
    fn wait(&mut self) -> impl Future<Output = io::Result<ProcessExitStatus>> + Send;
}

enum ProcessIo {
    Pty(UnixPtyMaster),
    Pipe {
        stdin: Option<ChildStdin>,
        output: MergedOutput<ChildStdout, ChildStderr>,
    },
}

enum ProcessChild {
    Pty(UnixPtyChild),
    Pipe(Child),
}

/// A spawned child process in PTY or pipe mode.
pub struct ProcessTransport {
    io: ProcessIo,
    child: ProcessChild,
    pid: u32,
}

impl std::fmt::Debug for ProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTransport")
            .field("mode", &self.spawn_mode())
            .field("pid", &self.pid)
            .finish()
    }
}

impl ProcessTransport {
    /// Spawn the command described by `config`.
    pub async fn spawn(config: &SessionConfig) -> Result<Self> {
        validate_command(config)?;

        let transport = match config.spawn_mode {
            SpawnMode::Pty => Self::spawn_pty(config).await?,
            SpawnMode::Pipe => Self::spawn_pipe(config)?,
        };

        tracing::debug!(
            pid = transport.pid,
            mode = %config.spawn_mode,
            command = %config.command_line(),
            "spawned child"
        );
        Ok(transport)
    }

    async fn spawn_pty(config: &SessionConfig) -> Result<Self> {
        let mut builder = PtyConfig::builder().window_size(config.dimensions.0, config.dimensions.1);
        if !config.inherit_env {
            builder = builder.env_clear();
        }
        for (key, value) in &config.env {
            builder = builder.env(key, value);
        }
        if let Some(dir) = &config.working_dir {
            builder = builder.working_directory(dir);
        }

        let (master, child) = runbook_pty::spawn(&config.command, &config.args, &builder.build())
            .await
            .map_err(|e| match e {
                runbook_pty::PtyError::Spawn(io) => SpawnError::from_launch(&config.command, io),
                other => SpawnError::from(other),
            })?;

        Ok(Self {
            pid: child.pid(),
            io: ProcessIo::Pty(master),
            child: ProcessChild::Pty(child),
        })
    }

    fn spawn_pipe(config: &SessionConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if !config.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&config.env);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_launch(&config.command, e))?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::Io(io::Error::other("child exited before its pid was read")))?;

        let stdin = child.stdin.take();
        let output = MergedOutput::new(child.stdout.take(), child.stderr.take());

        Ok(Self {
            io: ProcessIo::Pipe { stdin, output },
            child: ProcessChild::Pipe(child),
            pid,
        })
    }

    /// The mode this child was spawned in.
    #[must_use]
    pub const fn spawn_mode(&self) -> SpawnMode {
        match self.io {
            ProcessIo::Pty(_) => SpawnMode::Pty,
            ProcessIo::Pipe { .. } => SpawnMode::Pipe,
        }
    }
}

fn validate_command(config: &SessionConfig) -> Result<()> {
    if config.command.trim().is_empty() {
        return Err(SpawnError::InvalidArgument {
            kind: "command".to_string(),
            value: config.command.clone(),
            reason: "command is empty".to_string(),
        }
        .into());
    }
    if let Some(arg) = std::iter::once(&config.command)
        .chain(&config.args)
        .find(|s| s.contains('\0'))
    {
        return Err(SpawnError::InvalidArgument {
            kind: "argument".to_string(),
            value: arg.replace('\0', "\\0"),
            reason: "contains a NUL byte".to_string(),
        }
        .into());
    }
    Ok(())
}

fn pty_io(error: runbook_pty::PtyError) -> io::Error {
    let kind = error.io_error().kind();
    io::Error::new(kind, error.to_string())
}

/// Signal every process in the group led by `pid`.
fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
    let invalid = |what: &str| io::Error::new(io::ErrorKind::InvalidInput, what.to_string());
    let pid = i32::try_from(pid)
        .ok()
        .and_then(rustix::process::Pid::from_raw)
        .ok_or_else(|| invalid("invalid pid"))?;
    let signal = rustix::process::Signal::from_named_raw(signal.as_unix_signal())
        .ok_or_else(|| invalid("invalid signal"))?;

    match rustix::process::kill_process_group(pid, signal) {
        Ok(()) | Err(rustix::io::Errno::SRCH) => Ok(()),
        Err(e) => Err(io::Error::from_raw_os_error(e.raw_os_error())),
    }
}

impl Transport for ProcessTransport {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExitStatus>> {
        match &mut self.child {
            ProcessChild::Pty(child) => child
                .try_wait()
                .map(|s| s.map(ProcessExitStatus::from))
                .map_err(pty_io),
            ProcessChild::Pipe(child) => child.try_wait().map(|s| s.map(ProcessExitStatus::from)),
        }
    }

    fn signal(&mut self, signal: Signal) -> io::Result<()> {
        match &mut self.child {
            ProcessChild::Pty(child) => child.signal(signal).map_err(pty_io),
            ProcessChild::Pipe(child) => {
                // The pid is only valid for signalling until the child is reaped.
                if child.id().is_none() {
                    return Ok(());
                }
                signal_group(self.pid, signal)
            }
        }
    }

    async fn wait(&mut self) -> io::Result<ProcessExitStatus> {
        match &mut self.child {
            ProcessChild::Pty(child) => child.wait().await.map(ProcessExitStatus::from).map_err(pty_io),
            ProcessChild::Pipe(child) => child.wait().await.map(ProcessExitStatus::from),
        }
    }
}

impl AsyncRead for ProcessTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().io {
            ProcessIo::Pty(master) => Pin::new(master).poll_read(cx, buf),
            ProcessIo::Pipe { output, .. } => Pin::new(output).poll_read(cx, buf),
        }
    }
}

fn stdin_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "child stdin is closed")
}

impl AsyncWrite for ProcessTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().io {
            ProcessIo::Pty(master) => Pin::new(master).poll_write(cx, buf),
            ProcessIo::Pipe { stdin: Some(stdin), .. } => Pin::new(stdin).poll_write(cx, buf),
            ProcessIo::Pipe { stdin: None, .. } => Poll::Ready(Err(stdin_closed())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().io {
            ProcessIo::Pty(master) => Pin::new(master).poll_flush(cx),
            ProcessIo::Pipe { stdin: Some(stdin), .. } => Pin::new(stdin).poll_flush(cx),
            ProcessIo::Pipe { stdin: None, .. } => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().io {
            ProcessIo::Pty(master) => Pin::new(master).poll_shutdown(cx),
            ProcessIo::Pipe { stdin, .. } => {
                if let Some(pipe) = stdin.as_mut() {
                    match Pin::new(pipe).poll_shutdown(cx) {
                        Poll::Ready(Ok(())) => {}
                        other => return other,
                    }
                }
                // Dropping the handle is what delivers EOF to the child.
                *stdin = None;
                Poll::Ready(Ok(()))
            }
        }
    }
}
