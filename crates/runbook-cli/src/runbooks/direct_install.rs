//! `runbook direct-install`: install from inside the Termux sandbox.
//!
//! `run-as` only works on debuggable builds of Termux. When the device
//! refuses it, Termux is launched instead and the operator finishes the
//! installation by hand.

use std::fmt;
use std::time::Duration;

use runbook::scrape::ScrapeError;
use runbook::workflow::{Step, Workflow};
use runbook::{DriverError, Expectation, Interrupt, Pattern, Result, Transport};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::adb::DeviceShell;
use super::{Context, Launcher};
use crate::config::{RunbookConfig, TermuxConfig};

const PERMISSION_DENIED: &str = "Operation not permitted";

/// How long `run-as` gets to answer before the runbook moves on.
const RUN_AS_TIMEOUT: Duration = Duration::from_secs(5);

/// Output that means the installed binary could not be run.
const VERIFY_FAILURES: [&str; 3] = ["run-as:", "No such file", "not found"];

/// What `run-as` allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// A shell inside the Termux sandbox opened.
    Granted,
    /// The device refused; Termux was launched for the operator.
    Denied,
    /// `run-as` never answered.
    NoAnswer,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => write!(f, "run-as granted"),
            Self::Denied => write!(f, "run-as refused"),
            Self::NoAnswer => write!(f, "run-as did not answer"),
        }
    }
}

/// Steps `direct-install` would run.
pub fn plan(config: &RunbookConfig, verify: bool) -> Vec<String> {
    let adb = &config.device.adb;
    let termux = &config.termux;
    let mut plan = vec![
        format!(
            "{adb} shell: run-as {}; on '{PERMISSION_DENIED}': am start -n {} (optional)",
            termux.package,
            termux.component()
        ),
        format!("{adb} shell: exit"),
    ];
    if verify {
        plan.push("wait for the operator to finish in Termux".to_string());
        plan.push(format!(
            "{adb} shell: {} (optional)",
            verify_command(termux)
        ));
    }
    plan
}

fn verify_command(termux: &TermuxConfig) -> String {
    format!("run-as {} {} --version", termux.package, termux.installed_binary)
}

fn manual_commands(termux: &TermuxConfig) -> String {
    format!(
        "run these commands in Termux:
  1. cp {} ~/
  2. pkg install ~/{}
  3. {}
  4. codex exec --skip-git-repo-check 'echo hello'",
        termux.shared_deb(),
        termux.deb_name(),
        termux.setup_command
    )
}

/// Try to reach the Termux sandbox, fall back to launching Termux, and with
/// `verify` wait for the operator before checking the installed binary.
pub async fn run<L, R>(
    ctx: &mut Context<L>,
    workflow: &mut Workflow,
    verify: bool,
    mut operator_input: R,
) -> Result<Access>
where
    L: Launcher,
    R: AsyncBufRead + Unpin,
{
    let access = enter_termux(ctx, workflow).await?;
    workflow.note(&manual_commands(&ctx.config.termux));

    if verify {
        workflow.note("press Enter once the installation in Termux has finished");
        let interrupt = ctx.interrupt.clone();
        workflow
            .require("wait for operator", async || {
                wait_for_operator(&mut operator_input, &interrupt).await
            })
            .await?;
        verify_installation(ctx, workflow).await?;
    }
    Ok(access)
}

async fn enter_termux<L: Launcher>(ctx: &mut Context<L>, workflow: &mut Workflow) -> Result<Access> {
    let config = &ctx.config;
    let launcher = &mut ctx.launcher;

    let mut shell = workflow
        .require("open device shell", async || {
            DeviceShell::open(launcher, config).await
        })
        .await?;
    let outcome = in_device_shell(workflow, &mut shell, &config.termux).await;
    shell.close().await;
    outcome
}

async fn in_device_shell<T: Transport>(
    workflow: &mut Workflow,
    shell: &mut DeviceShell<T>,
    termux: &TermuxConfig,
) -> Result<Access> {
    let access = workflow
        .require("enter Termux environment", async || {
            try_run_as(shell, &termux.package).await
        })
        .await?;
    workflow.note(&access.to_string());

    if access == Access::Denied {
        workflow
            .run(Step::optional("launch Termux"), async || {
                shell.run(&format!("am start -n {}", termux.component())).await
            })
            .await?;
    }

    workflow
        .require("leave device shell", async || leave(shell, access).await)
        .await?;
    Ok(access)
}

/// Send `run-as` and classify the answer.
async fn try_run_as<T: Transport>(shell: &mut DeviceShell<T>, package: &str) -> Result<Access> {
    let expectation = Expectation::from([PERMISSION_DENIED, "$"]).with(Pattern::timeout(RUN_AS_TIMEOUT));
    let answer = shell
        .run_expecting(&format!("run-as {package}"), &expectation, RUN_AS_TIMEOUT)
        .await?;
    Ok(match answer.pattern_index {
        0 => {
            // The refusal is followed by the device shell's prompt.
            shell.wait_for_prompt().await?;
            Access::Denied
        }
        1 => Access::Granted,
        _ => Access::NoAnswer,
    })
}

/// Leave the sandbox shell if one was entered, then the device shell.
async fn leave<T: Transport>(shell: &mut DeviceShell<T>, access: Access) -> Result<()> {
    if access == Access::Granted {
        shell.run("exit").await?;
    }
    shell.exit().await?;
    Ok(())
}

async fn wait_for_operator<R>(input: &mut R, interrupt: &Interrupt) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    tokio::select! {
        biased;
        () = interrupt.triggered() => Err(DriverError::Interrupted),
        read = input.read_line(&mut line) => read
            .map(|_| ())
            .map_err(|e| DriverError::io_context("reading operator input", e)),
    }
}

async fn verify_installation<L: Launcher>(ctx: &mut Context<L>, workflow: &mut Workflow) -> Result<()> {
    let config = &ctx.config;
    let launcher = &mut ctx.launcher;
    let termux = &config.termux;

    let verified = workflow
        .run(Step::optional("verify installation"), async || {
            let mut shell = DeviceShell::open(launcher, config).await?;
            let output = shell.run(&verify_command(termux)).await;
            shell.close().await;
            let output = output?;
            match VERIFY_FAILURES.iter().find(|marker| output.contains(*marker)) {
                Some(marker) => Err(ScrapeError::not_found(
                    "installed binary",
                    termux.installed_binary.as_str(),
                    format!("device answered '{marker}'"),
                )
                .into()),
                None => Ok(output),
            }
        })
        .await?;

    match verified {
        Some(output) => workflow.note(&format!("installed: {}", output.trim())),
        None => workflow.note("could not check the installation; run 'codex --version' in Termux"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use runbook::ProcessExitStatus;

    use super::*;
    use crate::runbooks::testing;

    const PROMPT: &str = "shell@device:/ $ ";

    #[tokio::test]
    async fn refused_run_as_launches_termux() {
        let mut ctx = testing::context();
        let shell = ctx.launcher.expect("adb shell");
        shell.queue_output(PROMPT);
        shell.respond_to(
            "run-as com.termux",
            format!("run-as: package not debuggable: {PERMISSION_DENIED}\n{PROMPT}"),
        );
        shell.respond_to("am start", format!("Starting: Intent\n{PROMPT}"));
        testing::end_on_exit(&shell);

        let mut workflow = Workflow::new("direct-install");
        let access = run(&mut ctx, &mut workflow, false, &b""[..]).await.unwrap();

        assert_eq!(access, Access::Denied);
        assert_eq!(
            shell.input_text(),
            "run-as com.termux\nam start -n com.termux/.HomeActivity\nexit\n"
        );
    }

    #[tokio::test]
    async fn granted_run_as_leaves_both_shells() {
        let mut ctx = testing::context();
        let shell = ctx.launcher.expect("adb shell");
        shell.queue_output(PROMPT);
        shell.respond_to("run-as com.termux", "u0_a123@device:/data/data/com.termux $ ");
        testing::end_on_exit(&shell);
        shell.respond_to("exit", PROMPT);

        let mut workflow = Workflow::new("direct-install");
        let access = run(&mut ctx, &mut workflow, false, &b""[..]).await.unwrap();

        assert_eq!(access, Access::Granted);
        assert_eq!(shell.input_text(), "run-as com.termux\nexit\nexit\n");
    }

    #[tokio::test]
    async fn verify_reports_a_missing_binary_as_skipped() {
        let mut ctx = testing::context();
        let first = ctx.launcher.expect("adb shell");
        first.queue_output(PROMPT);
        first.respond_to("run-as com.termux", format!("{PERMISSION_DENIED}\n{PROMPT}"));
        first.respond_to("am start", PROMPT);
        testing::end_on_exit(&first);

        let second = ctx.launcher.expect("adb shell");
        second.queue_output(PROMPT);
        second.respond_to(
            "--version",
            format!("run-as: exec failed for /data/data/com.termux/files/usr/bin/codex: No such file or directory\n{PROMPT}"),
        );
        second.exit_on_signal(ProcessExitStatus::Exited(0));

        let mut workflow = Workflow::new("direct-install");
        let access = run(&mut ctx, &mut workflow, true, &b"\n"[..]).await.unwrap();

        assert_eq!(access, Access::Denied);
        let report = workflow.finish(&Ok(()));
        let skipped: Vec<&str> = report.skipped_steps().map(|r| r.name.as_str()).collect();
        assert_eq!(skipped, vec!["verify installation"]);
        assert!(report.success());
    }

    #[tokio::test]
    async fn waiting_for_the_operator_is_interruptible() {
        let (trigger, interrupt) = runbook::interrupt_pair();
        let (_operator, input) = tokio::io::duplex(16);
        let mut input = tokio::io::BufReader::new(input);
        trigger.trigger();

        let err = wait_for_operator(&mut input, &interrupt).await.unwrap_err();
        assert!(err.is_interrupted());
    }

    #[test]
    fn plan_mentions_verification_only_when_asked() {
        let config = RunbookConfig::default();
        assert_eq!(plan(&config, false).len(), 2);
        let with_verify = plan(&config, true);
        assert!(with_verify[3].contains(
            "run-as com.termux /data/data/com.termux/files/usr/bin/codex --version"
        ));
    }
}
