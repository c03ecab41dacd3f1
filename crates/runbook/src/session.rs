//! Sessions: live, scripted conversations with child processes.
//!
//! The [`Session`] type spawns a command, waits for its output to satisfy an
//! [`Expectation`](crate::expect::Expectation), writes the next line, and
//! finally closes the child.
//!
//! # Examples
//!
//! ```ignore
//! use runbook::{Expectation, Pattern, Session};
//! use std::time::Duration;
//!
//! let mut build = Session::spawn("bash", ["./build-android.sh"]).await?;
//! let outcome = build
//!     .expect_any_timeout(
//!         &Expectation::from(["Error:", "Android build completed successfully!"]),
//!         Duration::from_secs(600),
//!     )
//!     .await?;
//! if outcome.pattern_index == 0 {
//!     eprintln!("build failed:\n{}", outcome.before);
//! }
//! build.close().await?;
//! ```
//!
//! Use [`Session::scoped`] to guarantee the close on every path:
//!
//! ```ignore
//! use runbook::{Session, SessionConfig};
//!
//! let serials = Session::scoped(SessionConfig::new("adb").args(["devices"]), async |adb| {
//!     let listing = adb.expect_eof().await?;
//!     Ok(runbook::scrape::online_devices(&listing.before))
//! })
//! .await?;
//! ```

mod builder;
mod handle;
mod interrupt;
mod pipe;
mod transport;

pub use builder::SessionBuilder;
pub use handle::Session;
pub use interrupt::{Interrupt, InterruptTrigger, interrupt_pair};
pub use pipe::MergedOutput;
pub use transport::{ProcessTransport, Signal, Transport};
