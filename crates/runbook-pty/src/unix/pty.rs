//! Unix PTY allocation and the async master side.

use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustix::fs::{Mode, OFlags, fcntl_setfl, open};
use rustix::io::Errno;
use rustix::pty::{OpenptFlags, grantpt, openpt, ptsname, unlockpt};
use rustix::termios::{Winsize, tcgetwinsize, tcsetwinsize};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::config::WindowSize;
use crate::error::{PtyError, Result};

fn errno_to_io(e: Errno) -> io::Error {
    io::Error::from_raw_os_error(e.raw_os_error())
}

/// The master side of a Unix pseudo-terminal.
pub struct UnixPtyMaster {
    async_fd: AsyncFd<OwnedFd>,
}

impl std::fmt::Debug for UnixPtyMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyMaster")
            .field("fd", &self.async_fd.as_raw_fd())
            .finish()
    }
}

impl UnixPtyMaster {
    /// Allocate a new PTY pair, returning the master and the slave path.
    ///
    /// # Errors
    ///
    /// Returns [`PtyError::Create`] if any allocation step fails.
    pub fn open() -> Result<(Self, String)> {
        let create = |e: Errno| PtyError::Create(errno_to_io(e));

        let master_fd = openpt(OpenptFlags::RDWR | OpenptFlags::NOCTTY).map_err(create)?;
        grantpt(&master_fd).map_err(create)?;
        unlockpt(&master_fd).map_err(create)?;

        let slave_name = ptsname(&master_fd, Vec::new()).map_err(create)?;
        let slave_path = slave_name
            .to_str()
            .map_err(|_| {
                PtyError::Create(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "invalid slave path encoding",
                ))
            })?
            .to_string();

        fcntl_setfl(&master_fd, OFlags::NONBLOCK).map_err(create)?;
        let async_fd = AsyncFd::new(master_fd).map_err(PtyError::Create)?;

        Ok((Self { async_fd }, slave_path))
    }

    /// Set the window size.
    pub fn set_window_size(&self, size: WindowSize) -> Result<()> {
        let winsize = Winsize {
            ws_col: size.cols,
            ws_row: size.rows,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        tcsetwinsize(self.async_fd.get_ref(), winsize)
            .map_err(|e| PtyError::Resize(errno_to_io(e)))
    }

    /// Get the current window size.
    pub fn window_size(&self) -> Result<WindowSize> {
        let winsize = tcgetwinsize(self.async_fd.get_ref())?;
        Ok(WindowSize::new(winsize.ws_col, winsize.ws_row))
    }
}

impl AsRawFd for UnixPtyMaster {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.as_raw_fd()
    }
}

impl AsyncRead for UnixPtyMaster {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = match self.async_fd.poll_read_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };

            let unfilled = buf.initialize_unfilled();
            match rustix::io::read(self.async_fd.get_ref(), unfilled) {
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(Errno::AGAIN) => {
                    guard.clear_ready();
                }
                // Linux reports EIO once every slave descriptor is closed.
                Err(Errno::IO) => return Poll::Ready(Ok(())),
                Err(e) => return Poll::Ready(Err(errno_to_io(e))),
            }
        }
    }
}

impl AsyncWrite for UnixPtyMaster {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = match self.async_fd.poll_write_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };

            match rustix::io::write(self.async_fd.get_ref(), buf) {
                Ok(n) => return Poll::Ready(Ok(n)),
                Err(Errno::AGAIN) => {
                    guard.clear_ready();
                }
                Err(Errno::IO) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "terminal closed",
                    )));
                }
                Err(e) => return Poll::Ready(Err(errno_to_io(e))),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Open the slave side of a PTY.
pub fn open_slave(path: &str) -> Result<OwnedFd> {
    open(Path::new(path), OFlags::RDWR | OFlags::NOCTTY, Mode::empty())
        .map_err(|e| PtyError::Create(errno_to_io(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_pty() {
        let (_master, slave_path) = UnixPtyMaster::open().unwrap();
        assert!(slave_path.starts_with("/dev/pts/") || slave_path.starts_with("/dev/pty"));
    }

    #[tokio::test]
    async fn window_size_operations() {
        let (master, _) = UnixPtyMaster::open().unwrap();

        master.set_window_size(WindowSize::new(120, 40)).unwrap();

        let retrieved = master.window_size().unwrap();
        assert_eq!(retrieved, WindowSize::new(120, 40));
    }
}
