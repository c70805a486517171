// src/actions/status.rs

//! `node status`: read-only report of the local node, plus the
//! machine-parseable clean-shutdown probe used across SSH during a
//! switchover. Never writes.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{engine, nodes, shared, slots};
use crate::core::datadir::control_file::{ControlFileData, DbState, read_control_file};
use crate::core::errors::UxMgrResult;
use crate::core::lsn::Lsn;

use super::connect_local;

/// State token reported by `--is-shutdown-cleanly`. Part of the scripting
/// interface; the remote side of a switchover parses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
    UncleanShutdown,
    Unknown,
}

impl ShutdownState {
    pub fn token(self) -> &'static str {
        match self {
            ShutdownState::Running => "RUNNING",
            ShutdownState::ShuttingDown => "SHUTTING_DOWN",
            ShutdownState::Shutdown => "SHUTDOWN",
            ShutdownState::UncleanShutdown => "UNCLEAN_SHUTDOWN",
            ShutdownState::Unknown => "UNKNOWN",
        }
    }
}

/// Classifies the control-file state against whether the engine answers.
pub fn classify_shutdown(control: &ControlFileData, engine_reachable: bool) -> ShutdownState {
    match control.state {
        DbState::Shutdowned | DbState::ShutdownedInRecovery => {
            if engine_reachable {
                // The control file lags a freshly started engine briefly.
                ShutdownState::Running
            } else {
                ShutdownState::Shutdown
            }
        }
        DbState::Shutdowning => ShutdownState::ShuttingDown,
        DbState::InProduction | DbState::InArchiveRecovery | DbState::InCrashRecovery
        | DbState::Startup => {
            if engine_reachable {
                ShutdownState::Running
            } else {
                ShutdownState::UncleanShutdown
            }
        }
        DbState::Unknown => ShutdownState::Unknown,
    }
}

/// Renders the machine-parseable status line.
pub fn shutdown_status_line(state: ShutdownState, checkpoint: Option<Lsn>) -> String {
    match (state, checkpoint) {
        (ShutdownState::Shutdown, Some(lsn)) => {
            format!(
                "--state={} --last-checkpoint-lsn={lsn}",
                state.token()
            )
        }
        _ => format!("--state={}", state.token()),
    }
}

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    if args.has("is-shutdown-cleanly") {
        return run_shutdown_check(config).await;
    }
    run_full_status(config).await
}

/// The `--is-shutdown-cleanly` probe only touches the control file and the
/// socket; it is safe on a stopped node.
async fn run_shutdown_check(config: &Config) -> UxMgrResult<()> {
    let control = read_control_file(&config.node.data_directory)?;
    let engine_reachable = match connect_local(config).await {
        Ok(sess) => sess.ping().await,
        Err(_) => false,
    };
    let state = classify_shutdown(&control, engine_reachable);
    let checkpoint = (state == ShutdownState::Shutdown).then_some(control.checkpoint);
    println!("{}", shutdown_status_line(state, checkpoint));
    Ok(())
}

async fn run_full_status(config: &Config) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let record = nodes::get_node_record(&local, config.node.node_id).await?;
    let replinfo = engine::get_replication_info(&local).await?;

    println!("Node \"{}\" (ID: {}):", config.node.node_name, config.node.node_id);
    match &record {
        Some(record) => {
            println!("\tUxsinoDB Replication role: {}", record.node_type);
            println!("\tActive: {}", if record.active { "yes" } else { "no" });
            if let Some(upstream) = record.upstream_node_id {
                println!("\tUpstream node ID: {upstream}");
            }
            println!("\tLocation: {}", record.location);
            println!("\tPriority: {}", record.priority);
        }
        None => println!("\tWARNING: node is not registered in the catalog"),
    }

    println!(
        "\tIn recovery: {}",
        if replinfo.in_recovery { "yes" } else { "no" }
    );
    println!("\tTimeline: {}", replinfo.timeline_id);
    if replinfo.in_recovery {
        if let Some(lsn) = replinfo.last_wal_receive_lsn {
            println!("\tLast WAL receive LSN: {lsn}");
        }
        if let Some(lsn) = replinfo.last_wal_replay_lsn {
            println!("\tLast WAL replay LSN: {lsn}");
        }
        println!("\tReplication lag: {}s", replinfo.replication_lag_secs);
        println!(
            "\tReceiving streamed WAL: {}",
            if replinfo.receiving_streamed_wal { "yes" } else { "no" }
        );
        println!(
            "\tWAL replay paused: {}",
            if replinfo.wal_replay_paused { "yes" } else { "no" }
        );
    } else {
        let lsn = engine::get_current_wal_lsn(&local).await?;
        println!("\tCurrent WAL LSN: {lsn}");
        let attached = engine::get_attached_standby_names(&local).await?;
        println!("\tAttached standbys: {}", attached.len());
        for name in attached {
            println!("\t\t{name}");
        }
        let slot_list = slots::get_physical_slots(&local).await?;
        for slot in slot_list {
            println!(
                "\tSlot \"{}\": {}",
                slot.slot_name,
                if slot.active { "active" } else { "inactive" }
            );
        }
    }

    let daemon_running = shared::daemon_is_running(&local).await.unwrap_or(false);
    println!(
        "\tuxmgr daemon: {}",
        if daemon_running { "running" } else { "not running" }
    );
    let paused = shared::daemon_is_paused(&local).await.ok().flatten();
    if let Some(paused) = paused {
        println!("\tuxmgr daemon paused: {}", if paused { "yes" } else { "no" });
    }

    Ok(())
}
