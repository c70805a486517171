// src/actions/mod.rs

//! One-shot operations invoked by the control tool.
//!
//! Each action composes catalog access, local-file inspection and remote
//! command execution, reports through stdout, and maps failures onto the
//! tool's exit codes.

pub mod check;
pub mod clone;
pub mod cluster;
pub mod control;
pub mod daemon_ctl;
pub mod follow;
pub mod promote;
pub mod register;
pub mod rejoin;
pub mod service;
pub mod startup;
pub mod status;
pub mod switchover;

use crate::config::Config;
use crate::core::catalog::{NodeRecord, engine, nodes};
use crate::core::conn::UxSession;
use crate::core::conninfo::ConnInfo;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::exec::{self, CommandOutput};
use std::time::Duration;
use tracing::{debug, warn};

/// Opens a session to the local node.
pub async fn connect_local(config: &Config) -> UxMgrResult<UxSession> {
    UxSession::open_str(&config.node.conninfo).await
}

/// Locates the cluster's current primary, preferring the catalog's active
/// primary row but verifying it actually accepts writes; falls back to
/// probing every active node.
pub async fn find_primary(local: &UxSession) -> UxMgrResult<(NodeRecord, UxSession)> {
    if let Some(record) = nodes::get_primary_node_record(local).await? {
        if let Ok(sess) = UxSession::open_str(&record.conninfo).await {
            if !engine::is_in_recovery(&sess).await? {
                return Ok((record, sess));
            }
            debug!(
                "catalogued primary {} is in recovery, probing other nodes",
                record.node_name
            );
        }
    }

    for record in nodes::get_all_node_records(local).await? {
        if !record.active {
            continue;
        }
        let Ok(sess) = UxSession::open_str(&record.conninfo).await else {
            continue;
        };
        if !engine::is_in_recovery(&sess).await? {
            return Ok((record, sess));
        }
    }

    Err(UxMgrError::NotFound(
        "no writable primary reachable in this cluster".to_string(),
    ))
}

/// Host component of a node's conninfo, for SSH targets.
pub fn node_host(record: &NodeRecord) -> UxMgrResult<String> {
    let params = ConnInfo::parse(&record.conninfo)?;
    params
        .get("host")
        .map(str::to_string)
        .ok_or_else(|| UxMgrError::ConnInfo(format!(
            "conninfo for node {} carries no host",
            record.node_id
        )))
}

/// Runs a command on a remote node over SSH, using the password transport
/// when one is configured.
pub async fn remote_command(
    config: &Config,
    host: &str,
    cmd: &str,
) -> UxMgrResult<CommandOutput> {
    if let Some(password) = &config.ssh.ssh_password {
        let host = host.to_string();
        let cmd = cmd.to_string();
        let options = config.ssh.ssh_options.clone();
        let password = password.clone();
        let timeout = config.ssh.ssh_timeout;
        return tokio::task::spawn_blocking(move || {
            exec::ssh_command_with_password(&host, &cmd, &options, &password, timeout)
        })
        .await
        .map_err(|e| UxMgrError::Internal(format!("ssh task panicked: {e}")))?;
    }

    exec::local_command(&format!(
        "ssh {} {} {}",
        config.ssh.ssh_options,
        host,
        shell_quote(cmd)
    ))
    .await
}

/// Quotes a command line for transport through a remote shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Waits until `application_name` shows up as streaming in the primary's
/// replication view, or the budget runs out.
pub async fn wait_for_attachment(
    primary: &UxSession,
    application_name: &str,
    budget: Duration,
) -> UxMgrResult<bool> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        match engine::standby_is_attached(primary, application_name).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => warn!("replication view probe failed: {e}"),
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
