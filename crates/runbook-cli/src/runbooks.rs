//! The operator runbooks behind each subcommand.
//!
//! Every runbook drives its tools through a [`Launcher`], so the same code
//! runs against real processes and against scripted mock sessions.

mod adb;
pub mod deploy_debug;
pub mod devices;
pub mod direct_install;
pub mod install_package;
mod script;

use runbook::transcript::TranscriptSink;
use runbook::{
    ConsoleSink, Interrupt, ProcessTransport, Result, Session, SessionBuilder, SessionConfig,
    Transport,
};

use crate::config::RunbookConfig;

/// Starts the tools a runbook talks to.
pub trait Launcher {
    /// Transport of the sessions this launcher creates.
    type Transport: Transport;

    /// Start the command described by `config`.
    async fn launch(&mut self, config: SessionConfig) -> Result<Session<Self::Transport>>;
}

/// Spawns real child processes.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    interrupt: Interrupt,
    echo: bool,
}

impl ProcessLauncher {
    /// Sessions observe `interrupt`; with `echo` their output is copied to
    /// stdout.
    pub const fn new(interrupt: Interrupt, echo: bool) -> Self {
        Self { interrupt, echo }
    }
}

impl Launcher for ProcessLauncher {
    type Transport = ProcessTransport;

    async fn launch(&mut self, config: SessionConfig) -> Result<Session<ProcessTransport>> {
        tracing::debug!(command = %config.command_line(), "launching");
        let sink = self
            .echo
            .then(|| Box::new(ConsoleSink::stdout()) as Box<dyn TranscriptSink>);
        SessionBuilder::from_config(config)
            .transcript_opt(sink)
            .interrupt(self.interrupt.clone())
            .spawn()
            .await
    }
}

/// What a runbook works with.
#[derive(Debug)]
pub struct Context<L> {
    /// Resolved configuration.
    pub config: RunbookConfig,
    /// Starts the tools.
    pub launcher: L,
    /// The operator's Ctrl-C.
    pub interrupt: Interrupt,
}

impl<L: Launcher> Context<L> {
    /// Bundle the pieces.
    pub const fn new(config: RunbookConfig, launcher: L, interrupt: Interrupt) -> Self {
        Self {
            config,
            launcher,
            interrupt,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted launchers for runbook tests.

    use std::collections::VecDeque;

    use runbook::mock::{MockHandle, MockTransport};
    use runbook::{DriverError, Interrupt, ProcessExitStatus, Result, Session, SessionConfig};

    use super::{Context, Launcher};
    use crate::config::RunbookConfig;

    /// Hands out prepared mock sessions in order, checking each command.
    #[derive(Debug, Default)]
    pub struct ScriptedLauncher {
        queue: VecDeque<(String, MockTransport)>,
        pub launched: Vec<String>,
    }

    impl ScriptedLauncher {
        /// Expect `command_line` next; the returned handle scripts it.
        pub fn expect(&mut self, command_line: &str) -> MockHandle {
            let (transport, handle) = MockTransport::new();
            self.queue.push_back((command_line.to_string(), transport));
            handle
        }

        /// Expect a one-shot command that prints `output` and exits with
        /// `code`.
        pub fn one_shot(&mut self, command_line: &str, output: &str, code: i32) -> MockHandle {
            let handle = self.expect(command_line);
            handle.queue_output(output);
            handle.exit(ProcessExitStatus::Exited(code));
            handle
        }

        /// Commands not launched yet.
        pub fn pending(&self) -> Vec<&str> {
            self.queue.iter().map(|(command, _)| command.as_str()).collect()
        }
    }

    impl Launcher for ScriptedLauncher {
        type Transport = MockTransport;

        async fn launch(&mut self, config: SessionConfig) -> Result<Session<MockTransport>> {
            let command_line = config.command_line();
            self.launched.push(command_line.clone());
            match self.queue.pop_front() {
                Some((expected, transport)) if expected == command_line => {
                    Ok(Session::new(transport, config))
                }
                Some((expected, _)) => Err(DriverError::config(format!(
                    "launched '{command_line}', expected '{expected}'"
                ))),
                None => Err(DriverError::config(format!(
                    "unexpected launch of '{command_line}'"
                ))),
            }
        }
    }

    /// End the fake shell's output once it is sent `exit`, and let it exit
    /// when signalled.
    pub fn end_on_exit(shell: &MockHandle) {
        let watch = shell.clone();
        tokio::spawn(async move {
            while !watch.input_text().ends_with("exit\n") {
                tokio::task::yield_now().await;
            }
            watch.signal_eof();
        });
        shell.exit_on_signal(ProcessExitStatus::Exited(0));
    }

    /// A context with default configuration and a short prompt timeout.
    pub fn context() -> Context<ScriptedLauncher> {
        let mut config = RunbookConfig::default();
        config.device.prompt_timeout_secs = 2;
        config.session.timeout_secs = Some(2);
        Context::new(config, ScriptedLauncher::default(), Interrupt::never())
    }
}
