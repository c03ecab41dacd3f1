//! Pull values out of tool output.
//!
//! Each function here states which fields it reads and fails with a
//! [`ScrapeError`] naming what was missing. Nothing falls back to a made-up
//! value.

use thiserror::Error;

use crate::expect::Expectation;

/// Header line printed by `adb devices`.
const DEVICES_HEADER: &str = "List of devices attached";

/// State `adb devices` reports for a usable device.
pub const ONLINE_STATE: &str = "device";

/// Column holding the PID when a `ps` listing has no header.
const DEFAULT_PID_COLUMN: usize = 1;

/// Errors raised while scraping tool output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    /// The value could not be located in the output.
    #[error("could not find {what} for '{name}': {reason}")]
    IdentifierNotFound {
        /// Kind of value that was looked for.
        what: &'static str,
        /// What it was looked up by.
        name: String,
        /// Why the lookup failed.
        reason: String,
    },
}

impl ScrapeError {
    /// A `what` looked up by `name` is missing.
    pub fn not_found(what: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IdentifierNotFound {
            what,
            name: name.into(),
            reason: reason.into(),
        }
    }

    fn pid_not_found(name: &str, reason: impl Into<String>) -> Self {
        Self::not_found("PID", name, reason)
    }
}

/// Find the PID of `process_name` in a `ps` listing.
///
/// A header line containing a `PID` field selects the PID column; without
/// one the toybox layout (`USER PID PPID ... NAME`) is assumed. A line names
/// the process when its last field, stripped of any directory, equals
/// `process_name`. Matching lines whose PID field is not a number are
/// skipped, which drops echoed command lines such as `ps | grep codex`.
pub fn find_pid(listing: &str, process_name: &str) -> Result<u32, ScrapeError> {
    let mut pid_column = DEFAULT_PID_COLUMN;
    let mut candidates = 0usize;

    for line in listing.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let Some(column) = fields.iter().position(|field| *field == "PID") {
            pid_column = column;
            continue;
        }

        let Some(command) = fields.last() else {
            continue;
        };
        if basename(command) != process_name {
            continue;
        }
        candidates += 1;

        if let Some(pid) = fields.get(pid_column).and_then(|f| f.parse::<u32>().ok()) {
            tracing::debug!(process = process_name, pid, "found process");
            return Ok(pid);
        }
    }

    let reason = if candidates == 0 {
        "no process with that name in the listing".to_string()
    } else {
        format!("{candidates} matching line(s) but none has a numeric PID in column {pid_column}")
    };
    Err(ScrapeError::pid_not_found(process_name, reason))
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A device reported by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDevice {
    /// Device serial number.
    pub serial: String,
    /// Connection state, e.g. `device`, `unauthorized`, `offline`.
    pub state: String,
}

impl AttachedDevice {
    /// Whether the device accepts commands.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state == ONLINE_STATE
    }
}

/// Parse `adb devices` output.
///
/// Reads `serial<whitespace>state` lines, skipping the header, daemon
/// notices (`* daemon ...`) and blank lines.
#[must_use]
pub fn attached_devices(listing: &str) -> Vec<AttachedDevice> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*') && *line != DEVICES_HEADER)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            Some(AttachedDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Serials of the devices in `listing` that accept commands.
#[must_use]
pub fn online_devices(listing: &str) -> Vec<String> {
    attached_devices(listing)
        .into_iter()
        .filter(AttachedDevice::is_online)
        .map(|device| device.serial)
        .collect()
}

/// The first online device in `listing`.
///
/// Fails when nothing is attached or no attached device is authorised.
pub fn require_online_device(listing: &str) -> Result<String, ScrapeError> {
    let devices = attached_devices(listing);
    if let Some(device) = devices.iter().find(|device| device.is_online()) {
        return Ok(device.serial.clone());
    }

    let reason = if devices.is_empty() {
        "no device attached; connect one and enable USB debugging".to_string()
    } else {
        let states: Vec<String> = devices
            .iter()
            .map(|device| format!("{} is {}", device.serial, device.state))
            .collect();
        states.join(", ")
    };
    Err(ScrapeError::not_found("online device", "adb devices", reason))
}

/// Whether a `pm list packages` listing contains `package`.
///
/// Reads `package:<name>` lines and compares the name exactly.
#[must_use]
pub fn has_package(listing: &str, package: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .any(|name| name == package)
}

/// Prompt candidates of a device shell: `#` for root, `$` otherwise.
#[must_use]
pub fn shell_prompt_expectation() -> Expectation {
    Expectation::from(["#", "$"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOYBOX_PS: &str = "\
USER           PID  PPID     VSZ    RSS WCHAN            ADDR S NAME
shell         4242  4100 1234567  23456 0                   0 S codex
shell         4300  4100   12345   2345 0                   0 R ps
";

    #[test]
    fn pid_from_header_column() {
        assert_eq!(find_pid(TOYBOX_PS, "codex"), Ok(4242));
    }

    #[test]
    fn pid_column_follows_header() {
        let listing = "PID USER NAME\n  77 shell /data/local/tmp/codex\n";
        assert_eq!(find_pid(listing, "codex"), Ok(77));
    }

    #[test]
    fn headerless_listing_uses_second_column() {
        let listing = "u0_a123 9001 1 0 ./codex\n";
        assert_eq!(find_pid(listing, "codex"), Ok(9001));
    }

    #[test]
    fn echoed_command_line_is_skipped() {
        let listing = "$ ps | grep codex\nshell 5150 1 0 codex\n";
        assert_eq!(find_pid(listing, "codex"), Ok(5150));
    }

    #[test]
    fn missing_process_is_labelled() {
        let err = find_pid(TOYBOX_PS, "lldb-server").unwrap_err();
        let ScrapeError::IdentifierNotFound { what, name, reason } = &err;
        assert_eq!(*what, "PID");
        assert_eq!(name, "lldb-server");
        assert!(reason.contains("no process"));
        assert!(err.to_string().contains("lldb-server"));
    }

    #[test]
    fn missing_pid_column_is_labelled() {
        let err = find_pid("codex\n", "codex").unwrap_err();
        assert!(err.to_string().contains("none has a numeric PID"));
    }

    #[test]
    fn similar_names_do_not_match() {
        assert!(find_pid("shell 1 0 codex-helper\n", "codex").is_err());
    }

    #[test]
    fn parses_adb_devices() {
        let listing = "* daemon not running; starting now at tcp:5037\n\
                       * daemon started successfully\n\
                       List of devices attached\n\
                       R58M12ABCDE\tdevice\n\
                       emulator-5554\toffline\n\
                       0123456789\tunauthorized\n\n";
        let devices = attached_devices(listing);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[1].serial, "emulator-5554");
        assert!(!devices[1].is_online());
        assert_eq!(online_devices(listing), vec!["R58M12ABCDE".to_string()]);
    }

    #[test]
    fn empty_device_list() {
        assert!(online_devices("List of devices attached\n\n").is_empty());
        let err = require_online_device("List of devices attached\n\n").unwrap_err();
        assert!(err.to_string().contains("no device attached"));
    }

    #[test]
    fn unauthorized_device_is_named() {
        let err = require_online_device("List of devices attached\nR58M12\tunauthorized\n").unwrap_err();
        assert!(err.to_string().contains("R58M12 is unauthorized"));
        assert_eq!(
            require_online_device("R58M12\tdevice\n").as_deref(),
            Ok("R58M12")
        );
    }

    #[test]
    fn package_listing() {
        let listing = "pm list packages | grep termux\r\npackage:com.termux\r\npackage:com.termux.api\r\n";
        assert!(has_package(listing, "com.termux"));
        assert!(has_package(listing, "com.termux.api"));
        assert!(!has_package(listing, "com.termux.x11"));
        assert!(!has_package("", "com.termux"));
    }

    #[test]
    fn shell_prompts() {
        let expectation = shell_prompt_expectation();
        assert_eq!(expectation.find_match("root@device:/ # ").map(|(i, _)| i), Some(0));
        assert_eq!(expectation.find_match("shell@device:/ $ ").map(|(i, _)| i), Some(1));
    }

    proptest! {
        #[test]
        fn finds_any_pid_in_toybox_layout(
            pid in 1u32..4_194_304,
            user in "[a-z][a-z0-9_]{0,11}",
            name in "[a-z][a-z0-9_]{0,15}",
        ) {
            let listing = format!("{user} {pid} 1 0 0 S /system/bin/{name}\n");
            prop_assert_eq!(find_pid(&listing, &name), Ok(pid));
        }

        #[test]
        fn header_position_decides_the_column(
            pid in 1u32..100_000,
            filler in 0usize..4,
        ) {
            let mut header: Vec<String> = (0..filler).map(|i| format!("COL{i}")).collect();
            header.extend(["PID".to_string(), "NAME".to_string()]);
            let mut row: Vec<String> = (0..filler).map(|i| format!("x{i}")).collect();
            row.extend([pid.to_string(), "codex".to_string()]);

            let listing = format!("{}\n{}\n", header.join(" "), row.join(" "));
            prop_assert_eq!(find_pid(&listing, "codex"), Ok(pid));
        }
    }
}
