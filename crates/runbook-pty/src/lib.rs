//! runbook-pty: async pseudo-terminal plumbing.
//!
//! This crate allocates Unix pseudo-terminals and spawns child processes with
//! the slave side as their controlling terminal, so interactive tools (shells,
//! debuggers, device bridges) behave as if a human were typing at them.
//!
//! The master side implements tokio's [`AsyncRead`](tokio::io::AsyncRead) and
//! [`AsyncWrite`](tokio::io::AsyncWrite). When every slave descriptor has been
//! closed (the child and its descendants exited) Linux reports `EIO` on the
//! master; this crate surfaces that as an ordinary end-of-stream read.
//!
//! # Quick Start
//!
//! ```ignore
//! use runbook_pty::{PtyConfig, spawn};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (mut master, mut child) = spawn("/bin/cat", [] as [&str; 0], &PtyConfig::default()).await?;
//!     master.write_all(b"hello\n").await?;
//!
//!     let mut buf = [0u8; 1024];
//!     let n = master.read(&mut buf).await?;
//!     println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//!     child.kill()?;
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("runbook-pty supports Unix platforms only");

pub mod config;
pub mod error;

#[cfg(unix)]
pub mod unix;

pub use config::{PtyConfig, PtyConfigBuilder, PtySignal, WindowSize};
pub use error::{PtyError, Result};

#[cfg(unix)]
pub use unix::{ExitStatus, UnixPtyChild, UnixPtyMaster, spawn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PtyConfig::default();
        assert_eq!(config.window_size, (80, 24));
        assert!(config.new_session);
        assert!(config.controlling_terminal);
    }

    #[test]
    fn window_size_conversion() {
        let size = WindowSize::from((120, 40));
        assert_eq!(size.cols, 120);
        assert_eq!(size.rows, 40);
    }
}
