//! The install script handed to Termux.

use std::path::PathBuf;

use runbook::{DriverError, Result};

use crate::config::TermuxConfig;

/// Render the install script for `termux`.
pub fn render(termux: &TermuxConfig) -> String {
    let bash = termux.bash();
    let shared = termux.shared_deb();
    let deb = termux.deb_name();
    let setup = &termux.setup_command;
    format!(
        r#"#!{bash}
# Installs {deb} inside Termux.

set -e

if [ ! -f "{shared}" ]; then
    echo "Package not found at {shared}"
    echo "Push it to the device with 'runbook install-package' first"
    exit 1
fi

cp "{shared}" ~/
pkg install -y ~/{deb}
{setup}

echo "Installation complete"
"#
    )
}

/// Write the script into the work directory and return its path.
pub fn write(termux: &TermuxConfig) -> Result<PathBuf> {
    let path = termux.work_dir.join(&termux.script_name);
    std::fs::write(&path, render(termux))
        .map_err(|e| DriverError::io_context(format!("writing {}", path.display()), e))?;
    tracing::debug!(path = %path.display(), "wrote install script");
    Ok(path)
}
