//! `runbook install-package`: stage the Termux package on the device.

use std::path::PathBuf;

use runbook::Result;
use runbook::scrape::{ScrapeError, has_package};
use runbook::workflow::{Retry, Step, Workflow};

use super::adb::{self, DeviceShell};
use super::{Context, Launcher, devices, script};
use crate::config::RunbookConfig;

/// Steps `install-package` would run.
pub fn plan(config: &RunbookConfig) -> Vec<String> {
    let adb = &config.device.adb;
    let termux = &config.termux;
    vec![
        format!("{adb} devices"),
        format!("{adb} push {} {}", termux.deb, termux.staging_dir),
        format!(
            "{adb} shell: pm list packages | grep termux (optional); cp {} {}; am start -n {} (optional); exit",
            termux.staged_deb(),
            termux.shared_dir,
            termux.component()
        ),
        format!(
            "write {}",
            termux.work_dir.join(&termux.script_name).display()
        ),
        format!("{adb} push {} {}", termux.script_name, termux.shared_dir),
    ]
}

/// Manual steps shown once the package is in shared storage.
fn instructions(config: &RunbookConfig) -> String {
    let termux = &config.termux;
    format!(
        "finish the installation inside Termux:
  1. open Termux on the device
  2. cd {}
  3. pkg install ./{}
  4. {}",
        termux.shared_dir.trim_end_matches('/'),
        termux.deb_name(),
        termux.setup_command
    )
}

/// Push the package, copy it to shared storage and leave an install script
/// next to it.
///
/// Returns the host path of the generated script.
pub async fn run<L: Launcher>(ctx: &mut Context<L>, workflow: &mut Workflow) -> Result<PathBuf> {
    devices::check(ctx, workflow).await?;

    let mut shell = None;
    let outcome = drive(ctx, workflow, &mut shell).await;
    if let Some(mut shell) = shell {
        shell.close().await;
    }
    outcome
}

async fn drive<L: Launcher>(
    ctx: &mut Context<L>,
    workflow: &mut Workflow,
    held: &mut Option<DeviceShell<L::Transport>>,
) -> Result<PathBuf> {
    let config = &ctx.config;
    let launcher = &mut ctx.launcher;
    let termux = &config.termux;
    let push_timeout = config.device.push_timeout();

    workflow
        .require_step(
            Step::fatal("push package").retry(Retry::attempts(2)),
            async || {
                let args = ["push", termux.deb.as_str(), termux.staging_dir.as_str()];
                adb::run(launcher, config, args, push_timeout).await
            },
        )
        .await?;

    let opened = workflow
        .require("open device shell", async || {
            DeviceShell::open(launcher, config).await
        })
        .await?;
    let shell = held.insert(opened);

    workflow
        .run(Step::optional("check for Termux"), async || {
            let listing = shell.run("pm list packages | grep termux").await?;
            if has_package(&listing, &termux.package) {
                Ok(())
            } else {
                Err(ScrapeError::not_found(
                    "package",
                    termux.package.as_str(),
                    "not installed; install Termux before running the script",
                )
                .into())
            }
        })
        .await?;

    workflow
        .require("copy package to shared storage", async || {
            let command = format!("cp {} {}", termux.staged_deb(), termux.shared_dir);
            shell.run(&command).await
        })
        .await?;
    workflow.note(&instructions(config));

    workflow
        .run(Step::optional("launch Termux"), async || {
            shell.run(&format!("am start -n {}", termux.component())).await
        })
        .await?;

    workflow
        .require("leave device shell", async || shell.exit().await)
        .await?;

    let script = workflow
        .require("write install script", async || script::write(termux))
        .await?;

    workflow
        .require("push install script", async || {
            let path = script.to_string_lossy();
            let args = ["push", &*path, termux.shared_dir.as_str()];
            adb::run(launcher, config, args, push_timeout).await
        })
        .await?;

    workflow.note(&format!(
        "in Termux run: bash {}",
        termux.shared_script()
    ));
    Ok(script)
}
