// src/actions/control.rs

//! `node control`: diagnostic control of the WAL receiver on a running
//! standby. Disabling stops the receiver process; the engine restarts it
//! when re-enabled.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{engine, shared};
use crate::core::errors::{UxMgrError, UxMgrResult};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::info;

use super::connect_local;

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    if !engine::is_in_recovery(&local).await? {
        return Err(UxMgrError::Consistency(
            "WAL receiver control only applies to a standby".to_string(),
        ));
    }

    if args.has("disable-wal-receiver") {
        let pid = shared::get_wal_receiver_pid(&local).await?.ok_or_else(|| {
            UxMgrError::Protocol("no WAL receiver is currently running".to_string())
        })?;
        kill(Pid::from_raw(pid), Signal::SIGSTOP).map_err(|e| {
            UxMgrError::Protocol(format!("could not stop WAL receiver (PID {pid}): {e}"))
        })?;
        info!("WAL receiver (PID {pid}) stopped");
        println!("WAL receiver (PID {pid}) disabled");
        return Ok(());
    }

    if args.has("enable-wal-receiver") {
        let pid = shared::get_wal_receiver_pid(&local).await?.ok_or_else(|| {
            UxMgrError::Protocol(
                "no stopped WAL receiver found; the engine starts one on demand".to_string(),
            )
        })?;
        kill(Pid::from_raw(pid), Signal::SIGCONT).map_err(|e| {
            UxMgrError::Protocol(format!("could not resume WAL receiver (PID {pid}): {e}"))
        })?;
        info!("WAL receiver (PID {pid}) resumed");
        println!("WAL receiver (PID {pid}) enabled");
        return Ok(());
    }

    Err(UxMgrError::Config(
        "one of --disable-wal-receiver or --enable-wal-receiver is required".into(),
    ))
}
