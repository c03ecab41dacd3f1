//! runbook: expect-style session driver for scripted operator runbooks
//!
//! This crate drives interactive command-line tools the way an operator
//! would: spawn the tool, wait for a prompt or marker, send the next line,
//! and close the tool when done. It is the engine behind the `runbook`
//! binary's device workflows.
//!
//! # Features
//!
//! - **Async sessions** on Tokio, over a pseudo-terminal (`runbook-pty`) or
//!   plain pipes
//! - **Ordered expectations** mixing literals, regexes and `Eof`/`Timeout`
//!   sentinels, with abort patterns
//! - **Transcripts** to the console, a file, or an in-memory recorder
//! - **Operator hand-off** through an interact loop
//! - **Workflows** of named steps with fatal/optional policy and retries
//! - **Mock transport** for deterministic tests (feature: `mock`)
//!
//! # Example
//!
//! ```ignore
//! use runbook::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut shell = Session::spawn("adb", ["shell"]).await?;
//!     shell.expect_any(&shell_prompt_expectation()).await?;
//!     shell.send_line("ps -A | grep codex").await?;
//!     let listing = shell.expect_any(&shell_prompt_expectation()).await?;
//!     println!("codex runs as {}", find_pid(&listing.before, "codex")?);
//!     shell.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod expect;
pub mod interact;
pub mod prelude;
pub mod scrape;
pub mod session;
pub mod transcript;
pub mod types;
pub mod workflow;

/// Scripted transport for tests.
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{LineEnding, SessionConfig, SpawnMode, TimeoutConfig};
pub use error::{DriverError, Result, SpawnError};
pub use expect::{Expectation, Pattern};
pub use interact::{InteractEnd, InteractOptions};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockHandle, MockTransport};
pub use scrape::ScrapeError;
pub use session::{
    Interrupt, InterruptTrigger, ProcessTransport, Session, SessionBuilder, Signal, Transport,
    interrupt_pair,
};
pub use transcript::{ConsoleSink, FileSink, Recorder, Transcript, TranscriptSink};
pub use types::{ControlChar, Match, ProcessExitStatus, SessionState};
pub use workflow::{Retry, Step, StepPolicy, Workflow, WorkflowReport};
