//! Logging initialization.
//!
//! Logs go to stderr so they never interleave with the child transcript
//! echoed on stdout.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "runbook=info,runbook_cli=info";
const VERBOSE_FILTER: &str = "runbook=debug,runbook_cli=debug";

fn filter(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        1 => EnvFilter::new(VERBOSE_FILTER),
        _ => EnvFilter::new("runbook=trace,runbook_cli=trace,runbook_pty=debug"),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` applies unless `-v` was given; each `-v` raises the level.
pub fn try_init(verbosity: u8) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter(verbosity))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
}
