//! Configuration types for PTY creation.
//!
//! [`PtyConfig`] controls how the child process is launched and
//! [`PtySignal`] names the signals a driver needs to stop it.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Configuration for spawning a child inside a new PTY.
///
/// # Example
///
/// ```
/// use runbook_pty::PtyConfig;
///
/// let config = PtyConfig::builder()
///     .working_directory("/tmp")
///     .env("TERM", "dumb")
///     .window_size(120, 40)
///     .build();
/// assert_eq!(config.window_size, (120, 40));
/// ```
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Working directory for the child process.
    pub working_directory: Option<PathBuf>,

    /// Complete environment for the child. `None` inherits the parent's.
    pub env: Option<HashMap<OsString, OsString>>,

    /// Variables layered over the base environment.
    pub env_add: HashMap<OsString, OsString>,

    /// Initial window size (columns, rows).
    pub window_size: (u16, u16),

    /// Whether the child starts a new session (`setsid`).
    pub new_session: bool,

    /// Whether the slave becomes the child's controlling terminal.
    pub controlling_terminal: bool,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            working_directory: None,
            env: None,
            env_add: HashMap::new(),
            window_size: (80, 24),
            new_session: true,
            controlling_terminal: true,
        }
    }
}

impl PtyConfig {
    /// Create a new builder for `PtyConfig`.
    #[must_use]
    pub fn builder() -> PtyConfigBuilder {
        PtyConfigBuilder::default()
    }

    /// The environment the child will actually see.
    ///
    /// Starts from the explicit or inherited environment and layers
    /// `env_add` over it.
    #[must_use]
    pub fn effective_env(&self) -> HashMap<OsString, OsString> {
        let mut env = self
            .env
            .clone()
            .unwrap_or_else(|| std::env::vars_os().collect());
        env.extend(self.env_add.clone());
        env
    }
}

/// Builder for [`PtyConfig`].
#[derive(Debug, Clone, Default)]
pub struct PtyConfigBuilder {
    config: PtyConfig,
}

impl PtyConfigBuilder {
    /// Set the working directory for the child process.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_directory = Some(path.into());
        self
    }

    /// Start from an empty environment instead of the inherited one.
    #[must_use]
    pub fn env_clear(mut self) -> Self {
        self.config.env = Some(HashMap::new());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.config.env_add.insert(key.into(), value.into());
        self
    }

    /// Set the initial window size.
    #[must_use]
    pub const fn window_size(mut self, cols: u16, rows: u16) -> Self {
        self.config.window_size = (cols, rows);
        self
    }

    /// Set whether to create a new session.
    #[must_use]
    pub const fn new_session(mut self, value: bool) -> Self {
        self.config.new_session = value;
        self
    }

    /// Set whether the slave becomes the controlling terminal.
    #[must_use]
    pub const fn controlling_terminal(mut self, value: bool) -> Self {
        self.config.controlling_terminal = value;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> PtyConfig {
        self.config
    }
}

/// Signals a driver sends to a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PtySignal {
    /// SIGTERM, the polite request to exit.
    Terminate,
    /// SIGKILL, cannot be caught.
    Kill,
    /// SIGHUP, the terminal went away.
    Hangup,
}

impl PtySignal {
    /// The Unix signal number.
    #[cfg(unix)]
    #[must_use]
    pub const fn as_unix_signal(self) -> i32 {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Hangup => libc::SIGHUP,
        }
    }
}

/// Window size for the PTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Number of columns (characters per line).
    pub cols: u16,
    /// Number of rows (lines).
    pub rows: u16,
}

impl WindowSize {
    /// Create a new window size with the given dimensions.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl From<(u16, u16)> for WindowSize {
    fn from((cols, rows): (u16, u16)) -> Self {
        Self::new(cols, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn config_builder() {
        let config = PtyConfig::builder()
            .working_directory("/tmp")
            .env("FOO", "bar")
            .window_size(120, 40)
            .build();

        assert_eq!(config.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(config.window_size, (120, 40));
        assert!(config.env_add.contains_key(&OsString::from("FOO")));
    }

    #[test]
    fn cleared_env_holds_only_added_variables() {
        let config = PtyConfig::builder()
            .env_clear()
            .env("TERM", "dumb")
            .env("TERM", "xterm")
            .build();

        let env = config.effective_env();
        assert_eq!(env.len(), 1);
        assert_eq!(env.get(&OsString::from("TERM")), Some(&OsString::from("xterm")));
    }

    #[test]
    fn inherited_env_is_the_base() {
        let config = PtyConfig::builder().env("RUNBOOK_PTY_TEST", "1").build();
        let env = config.effective_env();
        assert_eq!(
            env.get(&OsString::from("RUNBOOK_PTY_TEST")),
            Some(&OsString::from("1"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn signal_numbers() {
        assert_eq!(PtySignal::Terminate.as_unix_signal(), libc::SIGTERM);
        assert_eq!(PtySignal::Kill.as_unix_signal(), libc::SIGKILL);
        assert_eq!(PtySignal::Hangup.as_unix_signal(), libc::SIGHUP);
    }

    proptest! {
        #[test]
        fn added_variables_win_over_the_base(
            base in proptest::collection::hash_map("[A-Z]{1,6}", "[a-z0-9]{0,6}", 0..8),
            added in proptest::collection::hash_map("[A-Z]{1,6}", "[a-z0-9]{0,6}", 0..8),
        ) {
            let mut config = PtyConfig::default();
            config.env = Some(base.iter().map(|(k, v)| (k.into(), v.into())).collect());
            let config = added
                .iter()
                .fold(PtyConfigBuilder { config }, |builder, (k, v)| builder.env(k, v))
                .build();

            let env = config.effective_env();
            for (key, value) in &added {
                prop_assert_eq!(env.get(&OsString::from(key)).cloned(), Some(OsString::from(value)));
            }
            for (key, value) in base.iter().filter(|(key, _)| !added.contains_key(*key)) {
                prop_assert_eq!(env.get(&OsString::from(key)).cloned(), Some(OsString::from(value)));
            }
            let expected = base.keys().chain(added.keys()).collect::<std::collections::HashSet<_>>();
            prop_assert_eq!(env.len(), expected.len());
        }

        #[test]
        fn window_size_keeps_columns_and_rows(cols in any::<u16>(), rows in any::<u16>()) {
            let size = WindowSize::from((cols, rows));
            prop_assert_eq!((size.cols, size.rows), (cols, rows));
            prop_assert_eq!(PtyConfig::builder().window_size(cols, rows).build().window_size, (cols, rows));
        }
    }
}
