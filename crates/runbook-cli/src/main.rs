//! `runbook`: scripted operator runbooks for Android devices.
//!
//! Each subcommand drives the device bridge, a device shell and the
//! debugger through expect-style sessions, echoing their output while it
//! narrates progress. Exit codes: 0 success, 1 a step failed, 2 bad
//! configuration or usage, 130 interrupted.

mod config;
mod logging;
mod operator;
mod report;
mod runbooks;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use runbook::config::env::EnvConfig;
use runbook::workflow::{EXIT_FAILURE, Workflow};
use runbook::{SpawnMode, interrupt_pair};
use tokio::io::stdout;

use crate::config::RunbookConfig;
use crate::operator::OperatorInput;
use crate::report::{ConsoleReporter, print_summary};
use crate::runbooks::{
    Context, ProcessLauncher, deploy_debug, devices, direct_install, install_package,
};

/// Exit code for configuration and usage errors.
const EXIT_USAGE: u8 = 2;

/// Scripted operator runbooks: deploy, debug and install on Android devices.
#[derive(Debug, Parser)]
#[command(name = "runbook", version, about)]
struct Cli {
    /// Settings file; `runbook.toml` in the working directory is used when
    /// present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the steps without running anything.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Do not echo tool output.
    #[arg(long, global = true)]
    no_echo: bool,

    /// Default wait timeout in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Talk to tools through a pseudo-terminal or plain pipes.
    #[arg(long, global = true, value_name = "pty|pipe")]
    spawn_mode: Option<SpawnMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List the attached devices that accept commands.
    Devices,

    /// Build, push and start the binary, then attach lldb to it.
    DeployDebug,

    /// Push the Termux package and an install script to the device.
    InstallPackage,

    /// Install inside Termux through run-as, falling back to launching it.
    DirectInstall {
        /// Wait for the operator, then check the installed binary.
        #[arg(long)]
        verify: bool,
    },
}

impl Command {
    const fn name(&self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::DeployDebug => "deploy-debug",
            Self::InstallPackage => "install-package",
            Self::DirectInstall { .. } => "direct-install",
        }
    }

    fn plan(&self, config: &RunbookConfig) -> Vec<String> {
        match self {
            Self::Devices => devices::plan(config),
            Self::DeployDebug => deploy_debug::plan(config),
            Self::InstallPackage => install_package::plan(config),
            Self::DirectInstall { verify } => direct_install::plan(config, *verify),
        }
    }
}

impl Cli {
    /// Overlay the command-line flags, which win over file and environment.
    fn apply(&self, config: &mut RunbookConfig) {
        if let Some(secs) = self.timeout {
            config.session.timeout_secs = Some(secs);
        }
        if let Some(mode) = self.spawn_mode {
            config.session.spawn_mode = Some(mode);
        }
        if self.no_echo {
            config.session.echo = Some(false);
        }
    }

    fn resolve_config(&self, env: &EnvConfig) -> anyhow::Result<RunbookConfig> {
        let mut config = RunbookConfig::load(self.config.as_deref(), env)
            .context("loading configuration")?;
        self.apply(&mut config);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::try_init(cli.verbose) {
        eprintln!("runbook: logging unavailable: {e}");
    }

    let config = match cli.resolve_config(&EnvConfig::default()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("runbook: {e:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if cli.dry_run {
        print_plan(&cli.command, &config);
        return ExitCode::SUCCESS;
    }

    match execute(&cli.command, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("runbook: {e:#}");
            ExitCode::from(u8::try_from(EXIT_FAILURE).unwrap_or(1))
        }
    }
}

fn print_plan(command: &Command, config: &RunbookConfig) {
    println!("{} would run:", command.name());
    for (index, step) in command.plan(config).iter().enumerate() {
        println!("  {}. {step}", index + 1);
    }
}

/// Run `command` and return the process exit code.
async fn execute(command: &Command, config: RunbookConfig) -> anyhow::Result<u8> {
    let (trigger, interrupt) = interrupt_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cleaning up");
            trigger.trigger();
        }
    });

    let launcher = ProcessLauncher::new(interrupt.clone(), config.session.echo());
    let mut workflow = Workflow::new(command.name())
        .with_reporter(ConsoleReporter::stdout())
        .with_interrupt(interrupt.clone());
    let mut ctx = Context::new(config, launcher, interrupt);

    let outcome = match command {
        Command::Devices => devices::run(&mut ctx, &mut workflow).await.map(drop),
        Command::DeployDebug => {
            let input = OperatorInput::stdin().context("reading operator input")?;
            deploy_debug::run(&mut ctx, &mut workflow, input, stdout())
                .await
                .map(|end| tracing::info!(%end, "debugger session ended"))
        }
        Command::InstallPackage => install_package::run(&mut ctx, &mut workflow)
            .await
            .map(|script| tracing::info!(script = %script.display(), "install script written")),
        Command::DirectInstall { verify } => {
            let input = OperatorInput::stdin().context("reading operator input")?;
            direct_install::run(&mut ctx, &mut workflow, *verify, input)
                .await
                .map(|access| tracing::info!(%access, "direct install finished"))
        }
    };

    let report = workflow.finish(&outcome);
    let mut out = std::io::stdout();
    print_summary(&mut out, &report).context("writing the run summary")?;
    out.flush().context("writing the run summary")?;
    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}
