// src/actions/follow.rs

//! `standby follow`: re-point a running standby at the current primary.
//!
//! Rewrites the standby's replication connection settings, restarts the
//! engine, verifies attachment, and records the new upstream in the
//! catalog. Also invoked by the daemon's follow-new-primary transition.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{
    NodeRecord, engine, event_names, events, nodes, slots,
};
use crate::core::conn::UxSession;
use crate::core::conninfo::ConnInfo;
use crate::core::datadir;
use crate::core::errors::{UxMgrError, UxMgrResult};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::{connect_local, find_primary, wait_for_attachment};

/// Name of the engine's auto-configuration overlay file.
const AUTO_CONF: &str = "uxsinodb.auto.conf";

/// Rewrites `primary_conninfo` (and `primary_slot_name`) in the engine's
/// auto-configuration overlay, replacing any previous values.
pub fn write_recovery_settings(
    data_dir: &Path,
    primary_conninfo: &str,
    slot_name: Option<&str>,
) -> UxMgrResult<()> {
    let path = data_dir.join(AUTO_CONF);
    let existing = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(UxMgrError::Io { path, source: e }),
    };

    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| {
            let key = line.split('=').next().unwrap_or("").trim();
            key != "primary_conninfo" && key != "primary_slot_name"
        })
        .map(str::to_string)
        .collect();

    lines.push(format!(
        "primary_conninfo = '{}'",
        primary_conninfo.replace('\'', "''")
    ));
    if let Some(slot) = slot_name {
        lines.push(format!("primary_slot_name = '{slot}'"));
    }
    let mut content = lines.join("\n");
    content.push('\n');

    fs::write(&path, content).map_err(|e| UxMgrError::Io { path, source: e })
}

/// Builds the `primary_conninfo` value a standby uses to reach its
/// upstream: the upstream's conninfo with the replication role and this
/// node's name as `application_name`.
pub fn upstream_conninfo_for(
    upstream: &NodeRecord,
    repluser: &str,
    node_name: &str,
) -> UxMgrResult<String> {
    let mut params = ConnInfo::parse(&upstream.conninfo)?;
    params.set("user", repluser);
    params.set("application_name", node_name);
    Ok(params.to_string())
}

/// Re-points the local standby at `new_upstream_id` and restarts
/// replication. Used both by the CLI verb and the daemon.
pub async fn follow_new_upstream(config: &Config, new_upstream_id: i32) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let upstream_record = nodes::get_node_record(&local, new_upstream_id)
        .await?
        .ok_or_else(|| {
            UxMgrError::NotFound(format!("upstream node {new_upstream_id} not in catalog"))
        })?;
    local.close();

    let upstream = UxSession::open_str(&upstream_record.conninfo).await?;
    if engine::is_in_recovery(&upstream).await? {
        return Err(UxMgrError::Consistency(format!(
            "intended upstream node {new_upstream_id} is itself in recovery"
        )));
    }

    let slot_name = config
        .replication
        .use_replication_slots
        .then(|| NodeRecord::slot_name_for(config.node.node_id));
    if let Some(slot) = &slot_name {
        let version = engine::get_server_version_num(&upstream).await?;
        slots::create_slot_sql(&upstream, slot, version).await?;
    }

    let primary_conninfo = upstream_conninfo_for(
        &upstream_record,
        &config.node.replication_user,
        &config.node.node_name,
    )?;
    write_recovery_settings(
        &config.node.data_directory,
        &primary_conninfo,
        slot_name.as_deref(),
    )?;
    if !datadir::has_standby_signal(&config.node.data_directory) {
        datadir::write_standby_signal(&config.node.data_directory)?;
    }

    info!("restarting engine to follow node {new_upstream_id}");
    super::service::execute_action(config, super::service::ServiceAction::Restart).await?;

    let attached = wait_for_attachment(
        &upstream,
        &config.node.node_name,
        config.failover.promote_check_timeout,
    )
    .await?;
    if !attached {
        warn!(
            "standby did not appear in node {}'s replication view in time",
            new_upstream_id
        );
    }

    nodes::update_node_record_set_upstream(&upstream, config.node.node_id, new_upstream_id)
        .await?;
    Ok(())
}

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    if !engine::is_in_recovery(&local).await? {
        return Err(UxMgrError::Consistency(
            "this node is not in recovery; only a standby can follow".to_string(),
        ));
    }

    let (primary_record, primary) = find_primary(&local).await?;
    let target_id: i32 = args
        .value_parsed("upstream-node-id")?
        .unwrap_or(primary_record.node_id);
    local.close();

    follow_new_upstream(config, target_id).await?;

    events::record_event(
        &primary,
        &config.events.notification_settings(),
        config.node.node_id,
        &config.node.node_name,
        event_names::STANDBY_FOLLOW,
        true,
        &format!("standby now follows node {target_id}"),
    )
    .await;
    println!(
        "standby \"{}\" now follows node {target_id}",
        config.node.node_name
    );
    Ok(())
}
