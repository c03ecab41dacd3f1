//! Device bridge helpers shared by the runbooks.

use std::time::Duration;

use runbook::scrape::shell_prompt_expectation;
use runbook::{Expectation, Interrupt, Match, ProcessExitStatus, Result, Session, Transport};

use super::Launcher;
use crate::config::RunbookConfig;

/// Run `adb <args>` to completion and return its output.
///
/// A non-zero exit fails with the command's output attached.
pub async fn run<L, I, S>(
    launcher: &mut L,
    config: &RunbookConfig,
    args: I,
    timeout: Duration,
) -> Result<String>
where
    L: Launcher,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut session = launcher
        .launch(config.session_config(&config.device.adb, args))
        .await?;
    session.finish(timeout).await
}

/// Like [`run`], but immune to the operator's interrupt. For cleanup.
pub async fn run_uninterrupted<L, I, S>(
    launcher: &mut L,
    config: &RunbookConfig,
    args: I,
    timeout: Duration,
) -> Result<String>
where
    L: Launcher,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut session = launcher
        .launch(config.session_config(&config.device.adb, args))
        .await?;
    session.set_interrupt(Interrupt::never());
    session.finish(timeout).await
}

/// Close `session`, logging instead of failing.
pub async fn close_quietly<T: Transport>(session: &mut Session<T>) {
    session.set_interrupt(Interrupt::never());
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing session during cleanup");
    }
}

/// An interactive `adb shell` session synchronised on the shell prompt.
#[derive(Debug)]
pub struct DeviceShell<T: Transport> {
    session: Session<T>,
    prompt: Expectation,
    timeout: Duration,
}

impl<T: Transport> DeviceShell<T> {
    /// Start `adb shell` and wait for the first prompt.
    pub async fn open<L>(launcher: &mut L, config: &RunbookConfig) -> Result<Self>
    where
        L: Launcher<Transport = T>,
    {
        let mut session = launcher
            .launch(config.session_config(&config.device.adb, ["shell"]))
            .await?;
        let prompt = shell_prompt_expectation();
        let timeout = config.device.prompt_timeout();
        if let Err(e) = session.expect_any_timeout(&prompt, timeout).await {
            close_quietly(&mut session).await;
            return Err(e);
        }
        Ok(Self {
            session,
            prompt,
            timeout,
        })
    }

    /// Run `command` and return what it printed before the next prompt.
    pub async fn run(&mut self, command: &str) -> Result<String> {
        self.session.send_line(command).await?;
        let found = self
            .session
            .expect_any_timeout(&self.prompt, self.timeout)
            .await?;
        Ok(found.before)
    }

    /// Run `command` and wait for `expectation` instead of the prompt.
    pub async fn run_expecting(
        &mut self,
        command: &str,
        expectation: &Expectation,
        timeout: Duration,
    ) -> Result<Match> {
        self.session.send_line(command).await?;
        self.session.expect_any_timeout(expectation, timeout).await
    }

    /// Wait for the next prompt.
    pub async fn wait_for_prompt(&mut self) -> Result<String> {
        let found = self
            .session
            .expect_any_timeout(&self.prompt, self.timeout)
            .await?;
        Ok(found.before)
    }

    /// Stop observing the operator's interrupt, for cleanup.
    pub fn ignore_interrupts(&mut self) {
        self.session.set_interrupt(Interrupt::never());
    }

    /// Leave the shell with `exit` and close the session.
    pub async fn exit(&mut self) -> Result<ProcessExitStatus> {
        self.session.send_line("exit").await?;
        self.session.expect_eof_timeout(self.timeout).await?;
        self.session.close().await
    }

    /// Close the session, logging instead of failing.
    pub async fn close(&mut self) {
        close_quietly(&mut self.session).await;
    }
}
