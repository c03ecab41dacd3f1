//! File-based configuration loading.
//!
//! Settings files are TOML. Every field is optional; anything left out keeps
//! its default.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::env::{EnvConfig, vars};
use super::{LineEnding, SessionConfig, SpawnMode};
use crate::error::{DriverError, Result};

/// Read and parse a TOML file.
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| DriverError::io_context(format!("reading {}", path.display()), e))?;
    parse_toml(&content)
        .map_err(|e| DriverError::config(format!("{}: {}", path.display(), root_message(&e))))
}

/// Parse TOML text.
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| DriverError::config(e.to_string()))
}

fn root_message(error: &DriverError) -> String {
    match error {
        DriverError::Config { message } => message.clone(),
        other => other.to_string(),
    }
}

/// The `[session]` table of a settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Default wait timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Grace period between SIGTERM and SIGKILL, in milliseconds.
    pub close_grace_ms: Option<u64>,

    /// Match buffer size in bytes.
    pub buffer_size: Option<usize>,

    /// `pty` or `pipe`.
    pub spawn_mode: Option<SpawnMode>,

    /// `lf`, `crlf` or `cr`.
    pub line_ending: Option<LineEnding>,

    /// Whether child output is echoed to the console.
    pub echo: Option<bool>,
}

impl SessionSettings {
    /// Overlay `RUNBOOK_*` variables on top of these settings.
    pub fn apply_env(&mut self, env: &EnvConfig) -> Result<()> {
        if let Some(raw) = env.get(vars::TIMEOUT) {
            let secs = raw.trim().parse().map_err(|_| {
                DriverError::config(format!(
                    "{} must be whole seconds, got '{raw}'",
                    env.var_name(vars::TIMEOUT)
                ))
            })?;
            self.timeout_secs = Some(secs);
        }
        if let Some(grace) = env.duration_secs(vars::CLOSE_GRACE) {
            self.close_grace_ms = Some(u64::try_from(grace.as_millis()).unwrap_or(u64::MAX));
        }
        if let Some(mode) = env.get(vars::SPAWN_MODE) {
            self.spawn_mode = Some(mode.parse()?);
        }
        if let Some(echo) = env.bool(vars::ECHO) {
            self.echo = Some(echo);
        }
        Ok(())
    }

    /// Apply the settings that are present to `config`.
    #[must_use]
    pub fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(secs) = self.timeout_secs {
            config = config.timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = self.close_grace_ms {
            config = config.close_grace(Duration::from_millis(ms));
        }
        if let Some(size) = self.buffer_size {
            config = config.buffer_size(size);
        }
        if let Some(mode) = self.spawn_mode {
            config = config.spawn_mode(mode);
        }
        if let Some(line_ending) = self.line_ending {
            config = config.line_ending(line_ending);
        }
        config
    }

    /// Whether output echo is on, defaulting to `true`.
    #[must_use]
    pub fn echo(&self) -> bool {
        self.echo.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_settings() {
        let settings: SessionSettings = parse_toml("timeout_secs = 5\nspawn_mode = \"pipe\"\n").unwrap();
        assert_eq!(settings.timeout_secs, Some(5));
        assert_eq!(settings.spawn_mode, Some(SpawnMode::Pipe));
        assert_eq!(settings.buffer_size, None);

        let config = settings.apply(SessionConfig::new("sh"));
        assert_eq!(config.timeout.default, Duration::from_secs(5));
        assert_eq!(config.spawn_mode, SpawnMode::Pipe);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_toml::<SessionSettings>("timout_secs = 5").unwrap_err();
        assert!(matches!(err, DriverError::Config { .. }));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut settings: SessionSettings = parse_toml("timeout_secs = 5\necho = false").unwrap();
        let env = EnvConfig::from_map("RUNBOOK", [("RUNBOOK_TIMEOUT", "90"), ("RUNBOOK_ECHO", "1")]);
        settings.apply_env(&env).unwrap();

        assert_eq!(settings.timeout_secs, Some(90));
        assert!(settings.echo());
    }

    #[test]
    fn bad_env_values_are_errors() {
        let mut settings = SessionSettings::default();
        let env = EnvConfig::from_map("RUNBOOK", [("RUNBOOK_SPAWN_MODE", "socket")]);
        assert!(settings.apply_env(&env).is_err());

        let env = EnvConfig::from_map("RUNBOOK", [("RUNBOOK_TIMEOUT", "soon")]);
        let err = settings.apply_env(&env).unwrap_err();
        assert!(err.to_string().contains("RUNBOOK_TIMEOUT"));
    }
}
