//! Settings files and environment overrides.

use std::io::Write;
use std::time::Duration;

use runbook::config::env::EnvConfig;
use runbook::config::file::{SessionSettings, load_toml};
use runbook::{DriverError, LineEnding, SessionConfig, SpawnMode};
use tempfile::NamedTempFile;

fn settings_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn load_settings_from_file() {
    let file = settings_file(
        "timeout_secs = 12\nclose_grace_ms = 250\nline_ending = \"crlf\"\necho = false\n",
    );
    let settings: SessionSettings = load_toml(file.path()).unwrap();

    let config = settings.apply(SessionConfig::new("adb"));
    assert_eq!(config.timeout.default, Duration::from_secs(12));
    assert_eq!(config.timeout.close, Duration::from_millis(250));
    assert_eq!(config.line_ending, LineEnding::CrLf);
    assert!(!settings.echo());
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_toml::<SessionSettings>(dir.path().join("runbook.toml")).unwrap_err();
    assert!(matches!(err, DriverError::IoWithContext { .. }));
    assert!(err.to_string().contains("runbook.toml"));
}

#[test]
fn malformed_file_names_the_path() {
    let file = settings_file("timeout_secs = \"soon\"\n");
    let err = load_toml::<SessionSettings>(file.path()).unwrap_err();
    assert!(matches!(err, DriverError::Config { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn env_beats_file() {
    let file = settings_file("spawn_mode = \"pty\"\ntimeout_secs = 30\n");
    let mut settings: SessionSettings = load_toml(file.path()).unwrap();
    let env = EnvConfig::from_map(
        "RUNBOOK",
        [("RUNBOOK_SPAWN_MODE", "pipe"), ("RUNBOOK_CLOSE_GRACE", "2")],
    );
    settings.apply_env(&env).unwrap();

    let config = settings.apply(SessionConfig::new("adb"));
    assert_eq!(config.spawn_mode, SpawnMode::Pipe);
    assert_eq!(config.timeout.default, Duration::from_secs(30));
    assert_eq!(config.timeout.close, Duration::from_secs(2));
}
