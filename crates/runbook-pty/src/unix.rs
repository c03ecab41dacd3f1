//! Unix PTY implementation.
//!
//! - PTY master/slave allocation via `openpt`/`grantpt`/`unlockpt`
//! - Async I/O through tokio's `AsyncFd`
//! - Child processes started in a new session with the slave as their
//!   controlling terminal

mod child;
mod pty;

use std::ffi::OsStr;

pub use child::{ExitStatus, UnixPtyChild, spawn_child};
pub use pty::{UnixPtyMaster, open_slave};

use crate::config::PtyConfig;
use crate::error::Result;

/// Allocate a PTY and spawn `program` attached to it.
///
/// The slave descriptor is closed in the parent before this returns, so the
/// master sees end-of-stream once the child (and anything it left holding the
/// terminal) has exited.
pub async fn spawn<S, I>(
    program: S,
    args: I,
    config: &PtyConfig,
) -> Result<(UnixPtyMaster, UnixPtyChild)>
where
    S: AsRef<OsStr>,
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
{
    let (master, slave_path) = UnixPtyMaster::open()?;
    master.set_window_size(config.window_size.into())?;

    let slave_fd = open_slave(&slave_path)?;
    let child = spawn_child(slave_fd, program, args, config).await?;

    tracing::debug!(pid = child.pid(), slave = %slave_path, "spawned child on pty");
    Ok((master, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn spawn_echo_reaches_eof() {
        let config = PtyConfig::default();
        let (mut master, mut child) = spawn("/bin/echo", ["hello"], &config).await.unwrap();

        let mut output = Vec::new();
        master.read_to_end(&mut output).await.unwrap();
        assert!(String::from_utf8_lossy(&output).contains("hello"));

        let status = child.wait().await.unwrap();
        assert_eq!(status, ExitStatus::Exited(0));
    }

    #[tokio::test]
    async fn spawn_missing_program_fails() {
        let config = PtyConfig::default();
        let result = spawn("/nonexistent/program", [] as [&str; 0], &config).await;
        let err = result.unwrap_err();
        assert_eq!(err.io_error().kind(), std::io::ErrorKind::NotFound);
    }
}
