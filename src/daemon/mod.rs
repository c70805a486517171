// src/daemon/mod.rs

//! The long-running monitoring daemon.
//!
//! One daemon runs per node. It registers itself in the engine's shared
//! state, writes a PID file, and enters the monitoring loop matching the
//! node's catalogued role. SIGHUP reloads the configuration, SIGTERM stops
//! the daemon after clearing its registration.

pub mod election;
pub mod failover;
pub mod monitor;
pub mod state;

use crate::config::Config;
use crate::core::catalog::{event_names, events, nodes, shared};
use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::shmem::SharedNodeState;
use anyhow::anyhow;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use self::monitor::NodeMonitor;
use self::state::{LoopExit, SignalFlags};

/// Entry point for `uxmgr daemon run`.
pub async fn run(config_path: PathBuf, mut config: Config) -> anyhow::Result<()> {
    // A short random run id keeps interleaved logs from several daemons
    // attributable.
    let mut runid_bytes = [0u8; 4];
    getrandom::fill(&mut runid_bytes)
        .map_err(|e| anyhow!("failed to generate run id: {e}"))?;
    let run_id = hex::encode(runid_bytes);
    info!(
        "uxmgr daemon starting for node {} ({}), run id {run_id}",
        config.node.node_id, config.node.node_name
    );

    let shared = Arc::new(SharedNodeState::new());
    shared.set_local_node_id(config.node.node_id, Some(&config.daemon.state_file));

    let pid = std::process::id() as i32;
    write_pid_file(&config.daemon.pid_file, pid)?;
    shared.set_daemon_pid(pid, Some(config.daemon.pid_file.clone()));

    let flags = Arc::new(SignalFlags::default());
    spawn_signal_listener(flags.clone());

    register_daemon(&config, pid).await;

    let mut exit = LoopExit::Terminate;
    loop {
        let mut node_monitor = NodeMonitor {
            config: config.clone(),
            shared: shared.clone(),
            flags: flags.clone(),
            notification: config.events.notification_settings(),
        };

        match node_monitor.run().await {
            Ok(LoopExit::Reload) => {
                info!("SIGHUP received, reloading configuration");
                match Config::from_file(&config_path) {
                    Ok(fresh) => {
                        announce_event(&fresh, event_names::DAEMON_RELOAD, true, "").await;
                        config = fresh;
                    }
                    Err(e) => {
                        // Keep running with the previous configuration; a
                        // bad reload must not take the daemon down.
                        error!("configuration reload failed: {e}");
                    }
                }
                continue;
            }
            Ok(other) => {
                exit = other;
                break;
            }
            Err(e) => {
                match e {
                    UxMgrError::DbConn(_) | UxMgrError::Query(_) => {
                        warn!("monitor loop error: {e}; retrying");
                        tokio::time::sleep(config.failover.reconnect_interval).await;
                        if flags.terminate_requested() {
                            break;
                        }
                        continue;
                    }
                    other => {
                        error!("monitor loop failed: {other}");
                        break;
                    }
                }
            }
        }
    }

    info!("daemon shutting down ({exit:?})");
    announce_event(&config, event_names::DAEMON_SHUTDOWN, true, "").await;
    shared.clear_daemon_pid();
    deregister_daemon(&config).await;
    remove_pid_file(&config.daemon.pid_file);
    Ok(())
}

fn write_pid_file(path: &PathBuf, pid: i32) -> UxMgrResult<()> {
    fs::write(path, format!("{pid}\n")).map_err(|e| UxMgrError::Io {
        path: path.clone(),
        source: e,
    })
}

fn remove_pid_file(path: &PathBuf) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove PID file {}: {e}", path.display());
        }
    }
}

/// Signal handlers only set flags; the monitor observes them at loop tops.
fn spawn_signal_listener(flags: Arc<SignalFlags>) {
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to create SIGTERM stream");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to create SIGINT stream");
        let mut sighup = signal(SignalKind::hangup()).expect("failed to create SIGHUP stream");
        loop {
            tokio::select! {
                _ = sigterm.recv() => flags.request_terminate(),
                _ = sigint.recv() => flags.request_terminate(),
                _ = sighup.recv() => flags.request_reload(),
            }
        }
    });
}

/// Registers the PID in the engine's shared segment and records the start
/// event. Best-effort: the daemon also runs while the node is down.
async fn register_daemon(config: &Config, pid: i32) {
    match UxSession::open_str(&config.node.conninfo).await {
        Ok(sess) => {
            let pidfile = config.daemon.pid_file.display().to_string();
            if let Err(e) = shared::set_daemon_pid(&sess, pid, Some(pidfile.as_str())).await {
                warn!("could not register daemon PID in shared state: {e}");
            }
            announce_event_on(&sess, config, event_names::DAEMON_START, true, "").await;
        }
        Err(e) => warn!("local node unreachable at daemon start: {e}"),
    }
}

async fn deregister_daemon(config: &Config) {
    if let Ok(sess) = UxSession::open_str(&config.node.conninfo).await {
        if let Err(e) = shared::set_daemon_pid(&sess, 0, None).await {
            warn!("could not clear daemon PID from shared state: {e}");
        }
    }
}

async fn announce_event(config: &Config, event: &str, successful: bool, details: &str) {
    if let Ok(sess) = UxSession::open_str(&config.node.conninfo).await {
        announce_event_on(&sess, config, event, successful, details).await;
    }
}

async fn announce_event_on(
    sess: &UxSession,
    config: &Config,
    event: &str,
    successful: bool,
    details: &str,
) {
    // The daemon's own record may not exist yet on first start.
    let node_name = match nodes::get_node_record(sess, config.node.node_id).await {
        Ok(Some(record)) => record.node_name,
        _ => config.node.node_name.clone(),
    };
    events::record_event(
        sess,
        &config.events.notification_settings(),
        config.node.node_id,
        &node_name,
        event,
        successful,
        details,
    )
    .await;
}
