//! `runbook deploy-debug`: build, deploy and attach a debugger.
//!
//! The binary is started in the background inside an `adb shell` session,
//! its PID is read from `ps`, and `lldb` attaches to it through a forwarded
//! port. The operator then drives the debugger directly. Whatever happens,
//! the device process is killed, both sessions are closed and the port
//! forward is removed.

use std::time::Duration;

use runbook::scrape::find_pid;
use runbook::workflow::{Retry, Step, Workflow};
use runbook::{
    DriverError, Expectation, InteractEnd, InteractOptions, Result, Session, SessionConfig,
    Transport,
};
use tokio::io::{AsyncBufRead, AsyncWrite};

use super::adb::{self, DeviceShell};
use super::{Context, Launcher, devices};
use crate::config::{DeviceConfig, RunbookConfig};

/// Marker lldb prints when a command fails.
const LLDB_ERROR: &str = "error:";

const LLDB_HELP: &str = "debugger attached; useful commands:
  c / continue      resume execution
  bt                backtrace
  breakpoint list   list breakpoints
  register read     show registers
  memory read       examine memory
  quit              leave the debugger";

const PUSH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Steps `deploy-debug` would run.
pub fn plan(config: &RunbookConfig) -> Vec<String> {
    let device = &config.device;
    let debugger = &config.debugger;
    let adb = &device.adb;
    let port = debugger.forward_spec();
    vec![
        build_config(config).command_line(),
        format!("{adb} devices"),
        format!("{adb} push {} {}", device.local_binary, device.remote_binary),
        format!("{adb} shell chmod +x {}", device.remote_binary),
        format!("{adb} shell {} --version (optional)", device.remote_binary),
        format!(
            "{adb} shell: cd {}; {}; ps -A | grep {}",
            device.remote_dir(),
            launch_command(device),
            device.process_name
        ),
        format!("{adb} forward {port} {port} (optional)"),
        format!(
            "{}: platform select {}; platform connect {} (optional); attach -p <pid>",
            debugger.lldb,
            debugger.platform,
            debugger.connect_url()
        ),
        format!(
            "{}: breakpoint set --name {} (optional); process status (optional)",
            debugger.lldb,
            debugger.breakpoints.join(", ")
        ),
        "interactive debugger session".to_string(),
        format!(
            "cleanup: {}; killall {}; {adb} forward --remove {port}",
            debugger.quit_command, device.process_name
        ),
    ]
}

/// Sessions and device state that cleanup has to undo.
struct Held<T: Transport> {
    shell: Option<DeviceShell<T>>,
    debugger: Option<Session<T>>,
    started: bool,
    forwarded: bool,
}

impl<T: Transport> Held<T> {
    const fn new() -> Self {
        Self {
            shell: None,
            debugger: None,
            started: false,
            forwarded: false,
        }
    }
}

/// Run the whole deploy-and-debug workflow.
///
/// The operator talks to the debugger through `operator_input` and
/// `operator_output` once it is attached.
pub async fn run<L, R, W>(
    ctx: &mut Context<L>,
    workflow: &mut Workflow,
    operator_input: R,
    operator_output: W,
) -> Result<InteractEnd>
where
    L: Launcher,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut held = Held::new();
    let outcome = drive(ctx, workflow, &mut held, operator_input, operator_output).await;
    cleanup(ctx, workflow, held).await;
    outcome
}

async fn drive<L, R, W>(
    ctx: &mut Context<L>,
    workflow: &mut Workflow,
    held: &mut Held<L::Transport>,
    mut operator_input: R,
    mut operator_output: W,
) -> Result<InteractEnd>
where
    L: Launcher,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    build(ctx, workflow).await?;
    devices::check(ctx, workflow).await?;

    let config = &ctx.config;
    let launcher = &mut ctx.launcher;
    let device = &config.device;
    let debugger = &config.debugger;

    let push = Step::fatal("push binary").retry(Retry::attempts(2).delay(PUSH_RETRY_DELAY));
    workflow
        .require_step(push, async || {
            let args = [
                "push",
                device.local_binary.as_str(),
                device.remote_binary.as_str(),
            ];
            adb::run(launcher, config, args, device.push_timeout()).await
        })
        .await?;

    workflow
        .require("make binary executable", async || {
            let args = ["shell", "chmod", "+x", device.remote_binary.as_str()];
            adb::run(launcher, config, args, device.prompt_timeout()).await
        })
        .await?;

    workflow
        .run(Step::optional("smoke test"), async || {
            let args = ["shell", device.remote_binary.as_str(), "--version"];
            adb::run(launcher, config, args, device.prompt_timeout()).await
        })
        .await?;

    let opened = workflow
        .require("open device shell", async || {
            DeviceShell::open(launcher, config).await
        })
        .await?;
    let shell = held.shell.insert(opened);

    let launch = launch_command(device);
    workflow
        .require("start binary on device", async || {
            shell.run(&format!("cd {}", device.remote_dir())).await?;
            shell.run(&launch).await
        })
        .await?;
    held.started = true;

    let pid = workflow
        .require("find process", async || {
            let listing = shell
                .run(&format!("ps -A | grep {}", device.process_name))
                .await?;
            Ok(find_pid(&listing, &device.process_name)?)
        })
        .await?;
    workflow.note(&format!("{} is running as pid {pid}", device.process_name));

    let port = debugger.forward_spec();
    held.forwarded = workflow
        .run(Step::optional("forward debug port"), async || {
            let args = ["forward", port.as_str(), port.as_str()];
            adb::run(launcher, config, args, device.prompt_timeout()).await
        })
        .await?
        .is_some();

    let prompt = Expectation::from(debugger.prompt.as_str());
    let started = workflow
        .require("start debugger", async || {
            start_debugger(launcher, config, &prompt).await
        })
        .await?;
    let lldb = held.debugger.insert(started);
    let timeout = debugger.command_timeout();

    workflow
        .require("select platform", async || {
            let command = format!("platform select {}", debugger.platform);
            lldb_command(lldb, &command, &prompt, timeout).await
        })
        .await?;

    workflow
        .run(Step::optional("connect platform"), async || {
            let command = format!("platform connect {}", debugger.connect_url());
            lldb_command(lldb, &command, &prompt, timeout).await
        })
        .await?;

    workflow
        .require("attach to process", async || {
            let command = format!("attach -p {pid}");
            lldb_command(lldb, &command, &prompt, debugger.attach_timeout()).await
        })
        .await?;

    workflow
        .run(Step::optional("set breakpoints"), async || {
            for name in &debugger.breakpoints {
                let command = format!("breakpoint set --name {name}");
                lldb_command(lldb, &command, &prompt, timeout).await?;
            }
            Ok(())
        })
        .await?;

    workflow
        .run(Step::optional("show process status"), async || {
            lldb_command(lldb, "process status", &prompt, timeout).await
        })
        .await?;

    workflow.note(LLDB_HELP);
    let options = InteractOptions::default().quit_command(debugger.quit_command.as_str());
    workflow
        .require("interactive debugging", async || {
            lldb.interact(&mut operator_input, &mut operator_output, &options)
                .await
        })
        .await
}

fn build_config(config: &RunbookConfig) -> SessionConfig {
    let device = &config.device;
    config.session_config(&device.build_command, device.build_args.iter().cloned())
}

/// Run the build until its success banner; the error marker fails it.
async fn build<L: Launcher>(ctx: &mut Context<L>, workflow: &mut Workflow) -> Result<()> {
    let config = &ctx.config;
    let launcher = &mut ctx.launcher;
    let device = &config.device;
    let expectation =
        Expectation::from(device.build_success.as_str()).abort_on(device.build_error.as_str());

    workflow
        .require("build", async || {
            let session = launcher.launch(build_config(config)).await?;
            session
                .run_scoped(async |build| {
                    build
                        .expect_any_timeout(&expectation, device.build_timeout())
                        .await?;
                    build.finish(device.build_timeout()).await?;
                    Ok(())
                })
                .await
        })
        .await
}

/// The shell line that starts the binary in the background.
fn launch_command(device: &DeviceConfig) -> String {
    let name = device
        .remote_binary
        .rsplit('/')
        .next()
        .unwrap_or(&device.remote_binary);
    let mut command = format!("./{name}");
    for arg in &device.launch_args {
        command.push(' ');
        command.push_str(arg);
    }
    command.push_str(" &");
    command
}

async fn start_debugger<L: Launcher>(
    launcher: &mut L,
    config: &RunbookConfig,
    prompt: &Expectation,
) -> Result<Session<L::Transport>> {
    let debugger = &config.debugger;
    let mut lldb = launcher
        .launch(config.session_config(&debugger.lldb, std::iter::empty::<String>()))
        .await?;
    if let Err(e) = lldb
        .expect_any_timeout(prompt, debugger.command_timeout())
        .await
    {
        adb::close_quietly(&mut lldb).await;
        return Err(e);
    }
    Ok(lldb)
}

/// Send a debugger command and wait for the prompt.
///
/// Output containing lldb's error marker fails the command even though the
/// prompt came back.
async fn lldb_command<T: Transport>(
    lldb: &mut Session<T>,
    command: &str,
    prompt: &Expectation,
    timeout: Duration,
) -> Result<String> {
    lldb.send_line(command).await?;
    let reply = lldb.expect_any_timeout(prompt, timeout).await?;
    if reply.before.contains(LLDB_ERROR) {
        return Err(DriverError::pattern_not_found(LLDB_ERROR, reply.before));
    }
    Ok(reply.before)
}

async fn cleanup<L: Launcher>(
    ctx: &mut Context<L>,
    workflow: &mut Workflow,
    mut held: Held<L::Transport>,
) {
    let config = &ctx.config;
    let device = &config.device;

    if let Some(mut lldb) = held.debugger.take() {
        adb::close_quietly(&mut lldb).await;
    }

    if let Some(mut shell) = held.shell.take() {
        shell.ignore_interrupts();
        if held.started {
            let command = format!("killall {}", device.process_name);
            if let Err(e) = shell.run(&command).await {
                tracing::warn!(error = %e, "stopping {} on the device", device.process_name);
            }
        }
        shell.close().await;
    }

    if held.forwarded {
        let port = config.debugger.forward_spec();
        let args = ["forward", "--remove", port.as_str()];
        if let Err(e) =
            adb::run_uninterrupted(&mut ctx.launcher, config, args, device.prompt_timeout()).await
        {
            tracing::warn!(error = %e, "removing port forward");
        }
    }

    workflow.note("device cleaned up");
}

#[cfg(test)]
mod tests {
    use runbook::ProcessExitStatus;
    use runbook::mock::MockHandle;
    use runbook::scrape::ScrapeError;

    use super::*;
    use crate::runbooks::testing::{self, ScriptedLauncher};

    const PROMPT: &str = "shell@device:/data/local/tmp $ ";

    fn deploy(launcher: &mut ScriptedLauncher) {
        let build = launcher.expect("bash ./build-android.sh");
        build.queue_output("Compiling codex\nAndroid build completed successfully!\n");
        build.exit(ProcessExitStatus::Exited(0));
        launcher.one_shot("adb devices", "List of devices attached\nR58M12\tdevice\n", 0);
        launcher.one_shot(
            "adb push codex-rs/target/aarch64-linux-android/release/codex /data/local/tmp/codex",
            "1 file pushed\n",
            0,
        );
        launcher.one_shot("adb shell chmod +x /data/local/tmp/codex", "", 0);
        launcher.one_shot(
            "adb shell /data/local/tmp/codex --version",
            "codex-cli 0.25.0\n",
            0,
        );
    }

    fn device_shell(launcher: &mut ScriptedLauncher, ps_listing: &str) -> MockHandle {
        let shell = launcher.expect("adb shell");
        shell.queue_output(PROMPT);
        shell.respond_to("cd /data/local/tmp", PROMPT);
        shell.respond_to("./codex &", format!("[1] 4242\n{PROMPT}"));
        shell.respond_to("ps -A | grep codex", format!("{ps_listing}{PROMPT}"));
        shell.respond_to("killall codex", PROMPT);
        shell.exit_on_signal(ProcessExitStatus::Signaled(1));
        shell
    }

    fn debugger(launcher: &mut ScriptedLauncher) -> MockHandle {
        let lldb = launcher.expect("lldb");
        lldb.queue_output("(lldb) ");
        lldb.respond_to("platform select", "  Platform: remote-android\n(lldb) ");
        lldb.respond_to("platform connect", "  Connected: yes\n(lldb) ");
        lldb.respond_to("attach -p 4242", "Process 4242 stopped\n(lldb) ");
        lldb.respond_to("breakpoint set", "Breakpoint 1: where = codex`main\n(lldb) ");
        lldb.respond_to("process status", "Process 4242 stopped\n(lldb) ");
        lldb.respond_to("bt", "* thread #1, frame #0: codex`main\n(lldb) ");
        lldb.exit_on_signal(ProcessExitStatus::Exited(0));
        lldb
    }

    #[tokio::test]
    async fn attaches_to_the_scraped_pid_and_cleans_up() {
        let mut ctx = testing::context();
        deploy(&mut ctx.launcher);
        let shell = device_shell(&mut ctx.launcher, "shell 4242 4100 0 S codex\n");
        ctx.launcher.one_shot("adb forward tcp:5039 tcp:5039", "5039\n", 0);
        let lldb = debugger(&mut ctx.launcher);
        ctx.launcher.one_shot("adb forward --remove tcp:5039", "", 0);

        let mut workflow = Workflow::new("deploy-debug");
        let mut seen = Vec::new();
        let end = run(&mut ctx, &mut workflow, &b"bt\nquit\n"[..], &mut seen)
            .await
            .unwrap();

        assert_eq!(end, InteractEnd::ExitWord("quit".to_string()));
        assert!(String::from_utf8(seen).unwrap().contains("frame #0"));

        let sent = lldb.input_text();
        assert!(sent.contains("platform select remote-android\n"));
        assert!(sent.contains("platform connect connect://localhost:5039\n"));
        assert!(sent.contains("attach -p 4242\n"));
        assert!(sent.contains("breakpoint set --name panic\n"));
        assert!(sent.ends_with("bt\nquit\n"));
        assert!(shell.input_text().ends_with("killall codex\n"));
        assert!(ctx.launcher.pending().is_empty());

        let report = workflow.finish(&Ok(()));
        assert!(report.success());
        assert_eq!(report.skipped_steps().count(), 0);
    }

    #[tokio::test]
    async fn missing_process_fails_without_a_debugger() {
        let mut ctx = testing::context();
        deploy(&mut ctx.launcher);
        let shell = device_shell(&mut ctx.launcher, "");

        let mut workflow = Workflow::new("deploy-debug");
        let err = run(&mut ctx, &mut workflow, &b""[..], Vec::new())
            .await
            .unwrap_err();

        let DriverError::StepFailed { step, source } = &err else {
            panic!("expected a step failure, got {err:?}");
        };
        assert_eq!(step, "find process");
        assert!(matches!(
            source.as_ref(),
            DriverError::Scrape(ScrapeError::IdentifierNotFound { what: "PID", .. })
        ));
        assert!(!ctx.launcher.launched.iter().any(|command| command == "lldb"));
        assert!(shell.input_text().ends_with("killall codex\n"));
        assert!(!shell.signals().is_empty());
    }

    #[tokio::test]
    async fn build_error_stops_before_the_device() {
        let mut ctx = testing::context();
        let build = ctx.launcher.expect("bash ./build-android.sh");
        build.queue_output("Compiling codex\nError: linker `aarch64-linux-android-clang` not found\n");
        build.exit(ProcessExitStatus::Exited(1));

        let mut workflow = Workflow::new("deploy-debug");
        let err = run(&mut ctx, &mut workflow, &b""[..], Vec::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("build"));
        assert!(matches!(err.root(), DriverError::PatternNotFound { .. }));
        assert_eq!(ctx.launcher.launched, vec!["bash ./build-android.sh"]);
    }

    #[tokio::test]
    async fn attach_error_is_not_mistaken_for_success() {
        let (transport, handle) = runbook::mock::MockTransport::new();
        handle.respond_to(
            "attach -p 1",
            "error: attach failed: lost connection\n(lldb) ",
        );
        let mut lldb = Session::new(transport, SessionConfig::new("lldb"));
        let prompt = Expectation::from("(lldb) ");

        let err = lldb_command(&mut lldb, "attach -p 1", &prompt, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::PatternNotFound { .. }));
    }

    #[test]
    fn launch_line_uses_the_binary_name() {
        let mut device = DeviceConfig::default();
        assert_eq!(launch_command(&device), "./codex &");
        device.launch_args = vec!["exec".into(), "--help".into()];
        assert_eq!(launch_command(&device), "./codex exec --help &");
    }

    #[test]
    fn plan_lists_every_stage() {
        let plan = plan(&RunbookConfig::default());
        assert_eq!(plan[0], "bash ./build-android.sh");
        assert!(plan.iter().any(|line| line.contains("adb forward tcp:5039 tcp:5039")));
        assert!(plan.last().unwrap().starts_with("cleanup:"));
    }
}
