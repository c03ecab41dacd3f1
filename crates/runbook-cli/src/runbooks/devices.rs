//! `runbook devices`: list the devices ready for commands.

use runbook::Result;
use runbook::scrape::{attached_devices, require_online_device};
use runbook::workflow::Workflow;

use super::{Context, Launcher, adb};
use crate::config::RunbookConfig;

/// Steps `devices` would run.
pub fn plan(config: &RunbookConfig) -> Vec<String> {
    vec![format!("{} devices", config.device.adb)]
}

/// List attached devices; fails when none is online.
///
/// Returns the serials of the online devices.
pub async fn run<L: Launcher>(ctx: &mut Context<L>, workflow: &mut Workflow) -> Result<Vec<String>> {
    let serials = check(ctx, workflow).await?;
    workflow.note(&format!("online: {}", serials.join(", ")));
    Ok(serials)
}

/// The device check shared by the other runbooks.
///
/// Returns the online serials, first one first.
pub async fn check<L: Launcher>(ctx: &mut Context<L>, workflow: &mut Workflow) -> Result<Vec<String>> {
    let config = &ctx.config;
    let launcher = &mut ctx.launcher;
    let timeout = config.device.prompt_timeout();

    workflow
        .require("check device", async || {
            let listing = adb::run(launcher, config, ["devices"], timeout).await?;
            let first = require_online_device(&listing)?;
            let others = attached_devices(&listing)
                .into_iter()
                .filter(|device| device.is_online() && device.serial != first)
                .map(|device| device.serial);
            Ok(std::iter::once(first.clone()).chain(others).collect())
        })
        .await
}

#[cfg(test)]
mod tests {
    use runbook::DriverError;
    use runbook::scrape::ScrapeError;

    use super::*;
    use crate::runbooks::testing;

    #[tokio::test]
    async fn lists_online_devices() {
        let mut ctx = testing::context();
        ctx.launcher.one_shot(
            "adb devices",
            "List of devices attached\nR58M12\tdevice\nemulator-5554\toffline\nHT7A1\tdevice\n\n",
            0,
        );

        let mut workflow = Workflow::new("devices");
        let serials = run(&mut ctx, &mut workflow).await.unwrap();
        assert_eq!(serials, vec!["R58M12", "HT7A1"]);
        assert!(workflow.finish(&Ok(())).success());
    }

    #[tokio::test]
    async fn no_device_fails_the_step() {
        let mut ctx = testing::context();
        ctx.launcher.one_shot("adb devices", "List of devices attached\n\n", 0);

        let mut workflow = Workflow::new("devices");
        let err = run(&mut ctx, &mut workflow).await.unwrap_err();
        let DriverError::StepFailed { step, source } = &err else {
            panic!("expected a step failure, got {err:?}");
        };
        assert_eq!(step, "check device");
        assert!(matches!(
            source.as_ref(),
            DriverError::Scrape(ScrapeError::IdentifierNotFound { .. })
        ));
        assert_eq!(workflow.finish(&Err::<(), _>(err)).exit_code(), 1);
    }

    #[test]
    fn plan_names_the_bridge() {
        let mut config = RunbookConfig::default();
        config.device.adb = "/opt/adb".into();
        assert_eq!(plan(&config), vec!["/opt/adb devices"]);
    }
}
