//! Runbook configuration.
//!
//! Values are resolved in order: built-in defaults, then `runbook.toml`
//! (or the file given with `--config`), then `RUNBOOK_*` environment
//! variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use runbook::config::env::{EnvConfig, vars};
use runbook::config::file::{SessionSettings, load_toml};
use runbook::{Result, SessionConfig};
use serde::{Deserialize, Serialize};

/// Settings file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "runbook.toml";

/// Everything the runbooks need to know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunbookConfig {
    /// Session defaults shared by every spawned tool.
    pub session: SessionSettings,
    /// Build, device bridge and on-device binary.
    pub device: DeviceConfig,
    /// The remote debugger.
    pub debugger: DebuggerConfig,
    /// The Termux package.
    pub termux: TermuxConfig,
}

/// The `[device]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device bridge executable.
    pub adb: String,
    /// Build command.
    pub build_command: String,
    /// Build command arguments.
    pub build_args: Vec<String>,
    /// Line the build prints on success.
    pub build_success: String,
    /// Text that marks a failed build.
    pub build_error: String,
    /// Build time limit in seconds.
    pub build_timeout_secs: u64,
    /// Host path of the built binary.
    pub local_binary: String,
    /// Device path the binary is pushed to.
    pub remote_binary: String,
    /// Process name to look for in `ps` output.
    pub process_name: String,
    /// Arguments the binary is started with on the device.
    pub launch_args: Vec<String>,
    /// Time limit for `adb push`, in seconds.
    pub push_timeout_secs: u64,
    /// Time limit for a device shell prompt, in seconds.
    pub prompt_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb: "adb".into(),
            build_command: "bash".into(),
            build_args: vec!["./build-android.sh".into()],
            build_success: "Android build completed successfully!".into(),
            build_error: "Error:".into(),
            build_timeout_secs: 300,
            local_binary: "codex-rs/target/aarch64-linux-android/release/codex".into(),
            remote_binary: "/data/local/tmp/codex".into(),
            process_name: "codex".into(),
            launch_args: Vec::new(),
            push_timeout_secs: 60,
            prompt_timeout_secs: 10,
        }
    }
}

impl DeviceConfig {
    /// Directory holding the binary on the device.
    #[must_use]
    pub fn remote_dir(&self) -> &str {
        self.remote_binary
            .rsplit_once('/')
            .map_or(".", |(dir, _)| if dir.is_empty() { "/" } else { dir })
    }

    /// The build time limit.
    #[must_use]
    pub const fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// The push time limit.
    #[must_use]
    pub const fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    /// The shell prompt time limit.
    #[must_use]
    pub const fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }
}

/// The `[debugger]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Debugger executable.
    pub lldb: String,
    /// Debugger prompt.
    pub prompt: String,
    /// Remote platform name.
    pub platform: String,
    /// Port forwarded to the device's debug server.
    pub port: u16,
    /// Functions to break on after attaching.
    pub breakpoints: Vec<String>,
    /// Time limit for ordinary debugger commands, in seconds.
    pub command_timeout_secs: u64,
    /// Time limit for the attach, in seconds.
    pub attach_timeout_secs: u64,
    /// Command that leaves the debugger.
    pub quit_command: String,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            lldb: "lldb".into(),
            prompt: "(lldb)".into(),
            platform: "remote-android".into(),
            port: 5039,
            breakpoints: vec!["main".into(), "panic".into()],
            command_timeout_secs: 10,
            attach_timeout_secs: 20,
            quit_command: "quit".into(),
        }
    }
}

impl DebuggerConfig {
    /// URL for `platform connect`.
    #[must_use]
    pub fn connect_url(&self) -> String {
        format!("connect://localhost:{}", self.port)
    }

    /// `adb forward` spec for the debug port.
    #[must_use]
    pub fn forward_spec(&self) -> String {
        format!("tcp:{}", self.port)
    }

    /// The time limit for ordinary commands.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// The attach time limit.
    #[must_use]
    pub const fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout_secs)
    }
}

/// The `[termux]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TermuxConfig {
    /// Android package name.
    pub package: String,
    /// Activity launched with `am start`.
    pub activity: String,
    /// Host path of the `.deb` package.
    pub deb: String,
    /// Device directory the package is pushed to.
    pub staging_dir: String,
    /// Shared storage directory Termux can read.
    pub shared_dir: String,
    /// Name of the generated install script.
    pub script_name: String,
    /// Host directory the install script is written to.
    pub work_dir: PathBuf,
    /// Installed binary inside the Termux prefix.
    pub installed_binary: String,
    /// First-run setup command shipped with the package.
    pub setup_command: String,
}

impl Default for TermuxConfig {
    fn default() -> Self {
        Self {
            package: "com.termux".into(),
            activity: ".HomeActivity".into(),
            deb: "android-codex-cli-0.25.0-aarch64.deb".into(),
            staging_dir: "/data/local/tmp/".into(),
            shared_dir: "/sdcard/".into(),
            script_name: "termux_install.sh".into(),
            work_dir: PathBuf::from("."),
            installed_binary: "/data/data/com.termux/files/usr/bin/codex".into(),
            setup_command: "codex-setup".into(),
        }
    }
}

impl TermuxConfig {
    /// File name of the package.
    #[must_use]
    pub fn deb_name(&self) -> &str {
        Path::new(&self.deb)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.deb)
    }

    /// `package/activity` for `am start -n`.
    #[must_use]
    pub fn component(&self) -> String {
        format!("{}/{}", self.package, self.activity)
    }

    /// Termux's `usr` prefix inside the package's data directory.
    #[must_use]
    pub fn prefix(&self) -> String {
        format!("/data/data/{}/files/usr", self.package)
    }

    /// Device path of Termux's bash.
    #[must_use]
    pub fn bash(&self) -> String {
        format!("{}/bin/bash", self.prefix())
    }

    /// Device path of the staged package.
    #[must_use]
    pub fn staged_deb(&self) -> String {
        join_device_path(&self.staging_dir, self.deb_name())
    }

    /// Device path of the package in shared storage.
    #[must_use]
    pub fn shared_deb(&self) -> String {
        join_device_path(&self.shared_dir, self.deb_name())
    }

    /// Device path of the install script in shared storage.
    #[must_use]
    pub fn shared_script(&self) -> String {
        join_device_path(&self.shared_dir, &self.script_name)
    }
}

fn join_device_path(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

impl RunbookConfig {
    /// Load the settings file and apply environment overrides.
    ///
    /// An explicit `path` must exist; otherwise `runbook.toml` is read when
    /// present.
    pub fn load(path: Option<&Path>, env: &EnvConfig) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) => load_toml(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => load_toml(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    /// Overlay `RUNBOOK_*` variables.
    pub fn apply_env(&mut self, env: &EnvConfig) -> Result<()> {
        self.session.apply_env(env)?;
        if let Some(adb) = env.get(vars::ADB) {
            self.device.adb = adb;
        }
        if let Some(lldb) = env.get(vars::LLDB) {
            self.debugger.lldb = lldb;
        }
        Ok(())
    }

    /// Session configuration for `command`, with the `[session]` settings
    /// applied.
    #[must_use]
    pub fn session_config<I, S>(&self, command: &str, args: I) -> SessionConfig
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session.apply(SessionConfig::new(command).args(args))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use runbook::SpawnMode;

    use super::*;

    #[test]
    fn defaults_match_the_device_layout() {
        let config = RunbookConfig::default();
        assert_eq!(config.device.remote_dir(), "/data/local/tmp");
        assert_eq!(config.debugger.connect_url(), "connect://localhost:5039");
        assert_eq!(config.termux.component(), "com.termux/.HomeActivity");
        assert_eq!(
            config.termux.shared_deb(),
            "/sdcard/android-codex-cli-0.25.0-aarch64.deb"
        );
        assert_eq!(config.termux.shared_script(), "/sdcard/termux_install.sh");
        assert!(config.session.echo());
    }

    #[test]
    fn file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[session]\nspawn_mode = \"pipe\"\n\n[device]\nadb = \"/opt/platform-tools/adb\"\n\n[debugger]\nport = 6000\nbreakpoints = [\"rust_panic\"]"
        )
        .unwrap();

        let env = EnvConfig::from_map("RUNBOOK", [("RUNBOOK_LLDB", "/usr/bin/lldb-18")]);
        let config = RunbookConfig::load(Some(file.path()), &env).unwrap();

        assert_eq!(config.device.adb, "/opt/platform-tools/adb");
        assert_eq!(config.device.process_name, "codex");
        assert_eq!(config.debugger.lldb, "/usr/bin/lldb-18");
        assert_eq!(config.debugger.forward_spec(), "tcp:6000");
        assert_eq!(config.debugger.breakpoints, vec!["rust_panic"]);

        let session = config.session_config("adb", ["shell"]);
        assert_eq!(session.spawn_mode, SpawnMode::Pipe);
        assert_eq!(session.command_line(), "adb shell");
    }

    #[test]
    fn env_adb_beats_file() {
        let mut config = RunbookConfig::default();
        let env = EnvConfig::from_map("RUNBOOK", [("RUNBOOK_ADB", "/tmp/adb")]);
        config.apply_env(&env).unwrap();
        assert_eq!(config.device.adb, "/tmp/adb");
    }

    #[test]
    fn unknown_section_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[devices]\nadb = \"adb\"").unwrap();
        let env = EnvConfig::from_map("RUNBOOK", Vec::<(String, String)>::new());
        assert!(RunbookConfig::load(Some(file.path()), &env).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvConfig::from_map("RUNBOOK", Vec::<(String, String)>::new());
        assert!(RunbookConfig::load(Some(&dir.path().join("nope.toml")), &env).is_err());
    }
}
