// src/actions/service.rs

//! `node service`: translates a logical engine action into the configured
//! shell command, optionally checkpointing first to shorten recovery time.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::engine;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::exec::local_command;
use std::str::FromStr;
use tracing::info;

use super::connect_local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
    Promote,
}

impl FromStr for ServiceAction {
    type Err = UxMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ServiceAction::Start),
            "stop" => Ok(ServiceAction::Stop),
            "restart" => Ok(ServiceAction::Restart),
            "reload" => Ok(ServiceAction::Reload),
            "promote" => Ok(ServiceAction::Promote),
            other => Err(UxMgrError::Config(format!("unknown service action \"{other}\""))),
        }
    }
}

/// The configured command for an action, falling back to `ux_ctl` against
/// the data directory.
pub fn command_for(config: &Config, action: ServiceAction) -> String {
    let configured = match action {
        ServiceAction::Start => &config.service.start_command,
        ServiceAction::Stop => &config.service.stop_command,
        ServiceAction::Restart => &config.service.restart_command,
        ServiceAction::Reload => &config.service.reload_command,
        ServiceAction::Promote => &config.service.promote_command,
    };
    if let Some(cmd) = configured {
        return cmd.clone();
    }
    let verb = match action {
        ServiceAction::Start => "start",
        ServiceAction::Stop => "stop -m fast",
        ServiceAction::Restart => "restart -m fast",
        ServiceAction::Reload => "reload",
        ServiceAction::Promote => "promote",
    };
    format!("ux_ctl -D {} -w {verb}", config.node.data_directory.display())
}

/// Runs an action's command, surfacing failures with the command's stderr.
pub async fn execute_action(config: &Config, action: ServiceAction) -> UxMgrResult<()> {
    let cmd = command_for(config, action);
    info!("running service command: {cmd}");
    let out = local_command(&cmd).await?;
    if !out.success {
        return Err(UxMgrError::CommandFailed {
            exit_code: out.exit_code,
            stderr: out.stderr,
        });
    }
    Ok(())
}

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let action: ServiceAction = args
        .value_parsed("action")?
        .ok_or_else(|| UxMgrError::Config("--action=<start|stop|restart|reload|promote> is required".into()))?;

    // A pre-stop checkpoint flushes dirty buffers so the next start replays
    // less WAL. Needs a superuser session.
    if args.has("checkpoint")
        && matches!(action, ServiceAction::Stop | ServiceAction::Restart)
    {
        let sess = connect_local(config).await?;
        info!("issuing CHECKPOINT before {action:?}");
        engine::request_checkpoint(&sess).await?;
    }

    execute_action(config, action).await?;
    println!("service action completed");
    Ok(())
}
