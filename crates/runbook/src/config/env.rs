//! Environment-based configuration overrides.

use std::collections::HashMap;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "RUNBOOK";

/// Well-known override names (without the prefix).
pub mod vars {
    /// Default wait timeout in seconds.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Close grace period in seconds.
    pub const CLOSE_GRACE: &str = "CLOSE_GRACE";
    /// `pty` or `pipe`.
    pub const SPAWN_MODE: &str = "SPAWN_MODE";
    /// Whether to echo child output to the console.
    pub const ECHO: &str = "ECHO";
    /// Path of the device bridge binary.
    pub const ADB: &str = "ADB";
    /// Path of the debugger binary.
    pub const LLDB: &str = "LLDB";
}

/// Reader for prefixed environment variables.
///
/// Values come from the process environment, or from a fixed map when built
/// with [`EnvConfig::from_map`].
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
    overrides: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Read from the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: None,
        }
    }

    /// Read from `vars` instead of the process environment.
    ///
    /// Keys are full variable names, prefix included.
    #[must_use]
    pub fn from_map<K, V>(prefix: impl Into<String>, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            overrides: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    /// Build the full environment variable name.
    #[must_use]
    pub fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value. Empty values count as unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        let value = match &self.overrides {
            Some(map) => map.get(&var_name).cloned(),
            None => std::env::var(&var_name).ok(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Get a parsed value.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in seconds.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> EnvConfig {
        EnvConfig::from_map(DEFAULT_PREFIX, vars.iter().copied())
    }

    #[test]
    fn prefixed_names() {
        assert_eq!(EnvConfig::default().var_name("timeout"), "RUNBOOK_TIMEOUT");
        assert_eq!(EnvConfig::new("").var_name("timeout"), "TIMEOUT");
    }

    #[test]
    fn reads_typed_values() {
        let env = env(&[
            ("RUNBOOK_TIMEOUT", "45"),
            ("RUNBOOK_ECHO", "yes"),
            ("RUNBOOK_SPAWN_MODE", "pipe"),
        ]);

        assert_eq!(env.duration_secs(vars::TIMEOUT), Some(Duration::from_secs(45)));
        assert_eq!(env.bool(vars::ECHO), Some(true));
        assert_eq!(env.get(vars::SPAWN_MODE).as_deref(), Some("pipe"));
        assert_eq!(env.get(vars::ADB), None);
    }

    #[test]
    fn empty_and_malformed_values() {
        let env = env(&[("RUNBOOK_TIMEOUT", "soon"), ("RUNBOOK_ADB", "  ")]);
        assert_eq!(env.duration_secs(vars::TIMEOUT), None);
        assert_eq!(env.get(vars::ADB), None);
    }
}
