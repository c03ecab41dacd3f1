//! Error types for the runbook-pty crate.

use std::io;

/// The error type for PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// Failed to allocate a new PTY pair.
    #[error("failed to create PTY: {0}")]
    Create(#[source] io::Error),

    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] io::Error),

    /// An I/O error occurred during PTY operations.
    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    Resize(#[source] io::Error),

    /// Failed to send a signal to the child process.
    #[error("failed to send signal: {0}")]
    Signal(#[source] io::Error),

    /// Failed to wait for the child process.
    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),
}

impl PtyError {
    /// The underlying I/O error.
    #[must_use]
    pub const fn io_error(&self) -> &io::Error {
        match self {
            Self::Create(e)
            | Self::Spawn(e)
            | Self::Io(e)
            | Self::Resize(e)
            | Self::Signal(e)
            | Self::Wait(e) => e,
        }
    }
}

/// A specialized Result type for PTY operations.
pub type Result<T> = std::result::Result<T, PtyError>;

#[cfg(unix)]
impl From<rustix::io::Errno> for PtyError {
    fn from(errno: rustix::io::Errno) -> Self {
        Self::Io(io::Error::from_raw_os_error(errno.raw_os_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PtyError::Spawn(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        assert_eq!(err.to_string(), "failed to spawn process: no such file");
    }

    #[test]
    fn error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "not found");
        let pty_err: PtyError = io_err.into();
        assert!(matches!(pty_err, PtyError::Io(_)));
        assert_eq!(pty_err.io_error().kind(), io::ErrorKind::NotFound);
    }
}
