//! Child process spawning and control for Unix PTYs.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::process::{ExitStatus as StdExitStatus, Stdio};

use rustix::process::{Pid, Signal, kill_process};
use tokio::process::{Child, Command};

use crate::config::{PtyConfig, PtySignal};
use crate::error::{PtyError, Result};

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited normally with a code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Whether the process exited with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "terminated by signal {sig}"),
        }
    }
}

impl From<StdExitStatus> for ExitStatus {
    fn from(status: StdExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            Self::Exited(code)
        } else if let Some(signal) = status.signal() {
            Self::Signaled(signal)
        } else {
            Self::Exited(-1)
        }
    }
}

/// Handle to a child process running on a PTY.
pub struct UnixPtyChild {
    child: Child,
    pid: u32,
    exit_status: Option<ExitStatus>,
}

impl fmt::Debug for UnixPtyChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnixPtyChild")
            .field("pid", &self.pid)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl UnixPtyChild {
    fn new(child: Child) -> Result<Self> {
        let pid = child.id().ok_or_else(|| {
            PtyError::Spawn(io::Error::other("child exited before its pid was read"))
        })?;
        Ok(Self {
            child,
            pid,
            exit_status: None,
        })
    }

    /// Get the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process is still running, as far as we know.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.exit_status.is_none()
    }

    /// Wait for the child process to exit and reap it.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }

        let status = ExitStatus::from(self.child.wait().await.map_err(PtyError::Wait)?);
        self.exit_status = Some(status);
        Ok(status)
    }

    /// Get the exit status without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }

        let status = self
            .child
            .try_wait()
            .map_err(PtyError::Wait)?
            .map(ExitStatus::from);
        self.exit_status = status;
        Ok(status)
    }

    /// Send a signal to the child process.
    ///
    /// Signalling a process that has already been reaped is a no-op.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        send_signal(self.pid, signal)
    }

    /// Kill the child process (SIGKILL).
    pub fn kill(&mut self) -> Result<()> {
        self.signal(PtySignal::Kill)
    }
}

/// Deliver `signal` to the process `pid`.
pub(crate) fn send_signal(pid: u32, signal: PtySignal) -> Result<()> {
    let invalid = |what: &str| PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, what.to_string()));

    let pid = Pid::from_raw(pid as i32).ok_or_else(|| invalid("invalid pid"))?;
    let signal =
        Signal::from_named_raw(signal.as_unix_signal()).ok_or_else(|| invalid("invalid signal"))?;

    match kill_process(pid, signal) {
        // Already gone but not yet reaped.
        Ok(()) | Err(rustix::io::Errno::SRCH) => Ok(()),
        Err(e) => Err(PtyError::Signal(io::Error::from_raw_os_error(e.raw_os_error()))),
    }
}

/// Spawn a child process with `slave_fd` as its stdin, stdout and stderr.
///
/// The child is killed if the returned handle is dropped while it is still
/// running.
pub async fn spawn_child<S, I>(
    slave_fd: OwnedFd,
    program: S,
    args: I,
    config: &PtyConfig,
) -> Result<UnixPtyChild>
where
    S: AsRef<OsStr>,
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
{
    let slave_raw = slave_fd.as_raw_fd();

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args);
    cmd.env_clear();
    cmd.envs(config.effective_env());
    cmd.kill_on_drop(true);

    if let Some(ref dir) = config.working_directory {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));
    cmd.stdout(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));
    cmd.stderr(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));

    let new_session = config.new_session;
    let controlling_terminal = config.controlling_terminal;

    // SAFETY: setsid and ioctl are async-signal-safe.
    #[allow(unsafe_code)]
    unsafe {
        cmd.pre_exec(move || {
            if new_session && libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            if controlling_terminal && libc::ioctl(slave_raw, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(PtyError::Spawn)?;
    // The parent's slave copies must go so the master can observe EOF.
    drop(cmd);
    drop(slave_fd);

    UnixPtyChild::new(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_display() {
        assert_eq!(ExitStatus::Exited(3).to_string(), "exited with code 3");
        assert_eq!(ExitStatus::Signaled(9).to_string(), "terminated by signal 9");
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Signaled(15).success());
    }

    #[tokio::test]
    async fn signal_terminates_child() {
        let (_master, path) = super::super::UnixPtyMaster::open().unwrap();
        let slave = super::super::open_slave(&path).unwrap();
        let mut child = spawn_child(slave, "/bin/sleep", ["30"], &PtyConfig::default())
            .await
            .unwrap();

        assert!(child.try_wait().unwrap().is_none());
        child.signal(PtySignal::Terminate).unwrap();

        let status = child.wait().await.unwrap();
        assert_eq!(status, ExitStatus::Signaled(libc::SIGTERM));
        assert!(!child.is_running());
        // Signalling a reaped child is harmless.
        child.signal(PtySignal::Kill).unwrap();
    }
}
