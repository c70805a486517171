// src/actions/rejoin.rs

//! `node rejoin`: return a former primary to the cluster as a standby.
//!
//! The engine must be cleanly shut down, or the operator opts into
//! block-level resynchronisation with `--force-rewind`. Around a resync run
//! the engine configuration files are archived and restored, and the
//! standby-signal marker is moved aside so the tool can run recovery.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{
    NodeRecord, engine, event_names, events, nodes, slots,
};
use crate::core::conn::UxSession;
use crate::core::datadir::{
    self, control_file::{DbState, read_control_file},
};
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::exec::local_command;
use crate::core::vip::VipArbitrator;
use std::time::Duration;
use tracing::{info, warn};

use super::{follow, wait_for_attachment};

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let data_dir = &config.node.data_directory;
    if !datadir::is_ux_dir(data_dir) {
        return Err(UxMgrError::NotADataDirectory(data_dir.clone()));
    }

    let control = read_control_file(data_dir)?;
    let cleanly_down = matches!(
        control.state,
        DbState::Shutdowned | DbState::ShutdownedInRecovery
    );
    let force_rewind = args.has("force-rewind");
    if !cleanly_down && !force_rewind {
        return Err(UxMgrError::RejoinFailed(format!(
            "database is \"{}\"; a clean shutdown is required unless --force-rewind is given",
            control.state
        )));
    }

    // The upstream conninfo comes from the operator; the registered primary
    // is then located through that node's catalog.
    let upstream_conninfo = args.value("upstream").ok_or_else(|| {
        UxMgrError::Config("--upstream=<conninfo> of a cluster member is required".into())
    })?;
    let entry = UxSession::open_str(upstream_conninfo).await?;
    let (primary_record, primary) = super::find_primary(&entry).await?;
    entry.close();

    sanity_check_attach(&primary, &primary_record, &control).await?;

    let archived;
    if force_rewind {
        archived = run_rewind(config, &primary_record).await?;
    } else {
        archived = Vec::new();
    }

    // A rejoining former primary must not keep the virtual address.
    let addresses = config.vip.addresses();
    if !addresses.is_empty() {
        let arbitrator = VipArbitrator::new(addresses, config.vip.command_config());
        if let Err(e) = arbitrator.unbind_all() {
            warn!("could not release virtual address: {e}");
        }
    }

    let slot_name = config
        .replication
        .use_replication_slots
        .then(|| NodeRecord::slot_name_for(config.node.node_id));
    if let Some(slot) = &slot_name {
        let version = engine::get_server_version_num(&primary).await?;
        slots::create_slot_sql(&primary, slot, version)
            .await
            .map_err(|e| UxMgrError::RejoinFailed(format!("slot preparation failed: {e}")))?;
    }

    let primary_conninfo = follow::upstream_conninfo_for(
        &primary_record,
        &config.node.replication_user,
        &config.node.node_name,
    )?;
    follow::write_recovery_settings(data_dir, &primary_conninfo, slot_name.as_deref())?;
    if !datadir::has_standby_signal(data_dir) {
        datadir::write_standby_signal(data_dir)?;
    }
    if !archived.is_empty() {
        datadir::restore_config_files(data_dir, &archived)?;
    }

    info!("starting engine to rejoin as standby of node {}", primary_record.node_id);
    super::service::execute_action(config, super::service::ServiceAction::Start)
        .await
        .map_err(|e| UxMgrError::RejoinFailed(format!("engine start failed: {e}")))?;

    let mut attached = true;
    if !args.has("no-wait") {
        let budget = Duration::from_secs(args.value_parsed::<u64>("wait-timeout")?.unwrap_or(60));
        attached = wait_for_attachment(&primary, &config.node.node_name, budget).await?;
        if !attached {
            events::record_event(
                &primary,
                &config.events.notification_settings(),
                config.node.node_id,
                &config.node.node_name,
                event_names::NODE_REJOIN,
                false,
                &format!(
                    "node did not appear in the replication view of node {} within {budget:?}",
                    primary_record.node_id
                ),
            )
            .await;
            return Err(UxMgrError::RejoinFailed(format!(
                "node did not attach to node {} within {budget:?}",
                primary_record.node_id
            )));
        }
    }

    nodes::update_node_record_set_standby(&primary, config.node.node_id, primary_record.node_id)
        .await?;
    events::record_event(
        &primary,
        &config.events.notification_settings(),
        config.node.node_id,
        &config.node.node_name,
        event_names::NODE_REJOIN,
        true,
        &format!("node rejoined as standby of node {}", primary_record.node_id),
    )
    .await;

    println!(
        "node \"{}\" (ID: {}) rejoined the cluster as standby of node {}{}",
        config.node.node_name,
        config.node.node_id,
        primary_record.node_id,
        if attached { "" } else { " (attachment not verified)" }
    );
    Ok(())
}

/// Verifies the local node can attach to the target: same cluster, and no
/// divergent local history ahead of the target's timeline.
async fn sanity_check_attach(
    primary: &UxSession,
    primary_record: &NodeRecord,
    control: &crate::core::datadir::control_file::ControlFileData,
) -> UxMgrResult<()> {
    let row = primary
        .client()
        .query_one(
            "SELECT (ux_control_system()).system_identifier::text, \
                    (ux_control_checkpoint()).timeline_id::bigint",
            &[],
        )
        .await?;
    let target_sysid: String = row.get(0);
    let target_timeline = row.get::<_, i64>(1) as u32;

    if target_sysid != control.system_identifier.to_string() {
        return Err(UxMgrError::RejoinFailed(format!(
            "system identifier mismatch: local {}, node {} has {}",
            control.system_identifier, primary_record.node_id, target_sysid
        )));
    }

    let local_timeline = control
        .min_recovery_end_timeline
        .max(control.timeline_id);
    if local_timeline > target_timeline {
        return Err(UxMgrError::RejoinFailed(format!(
            "local timeline {local_timeline} is ahead of target timeline {target_timeline}; \
             this node has divergent history"
        )));
    }
    Ok(())
}

/// Runs the block-level resynchronisation tool with the local configuration
/// stashed away, returning the archived file paths for restoration.
async fn run_rewind(
    config: &Config,
    primary_record: &NodeRecord,
) -> UxMgrResult<Vec<std::path::PathBuf>> {
    let data_dir = &config.node.data_directory;
    let archive_dir = data_dir.join("uxmgr_config_archive");
    let archived = datadir::archive_config_files(data_dir, &archive_dir)?;

    // The resync tool refuses to run recovery while the standby marker is
    // present.
    let stashed = datadir::stash_standby_signal(data_dir)?;

    let cmd = format!(
        "ux_rewind --target-uxdata={} --source-server='{}'",
        data_dir.display(),
        primary_record.conninfo.replace('\'', "'\\''")
    );
    info!("running block-level resynchronisation: {cmd}");
    let result = local_command(&cmd).await;

    if let Some(stash) = &stashed {
        if let Err(e) = datadir::restore_standby_signal(data_dir, stash) {
            warn!("could not restore standby-signal marker: {e}");
        }
    }

    let out = result?;
    if !out.success {
        return Err(UxMgrError::RejoinFailed(format!(
            "ux_rewind exited {}: {}",
            out.exit_code,
            out.stderr.trim()
        )));
    }

    // The tool copies the source's recovery-done marker in; a standby must
    // not start with one.
    if datadir::remove_recovery_done(data_dir)? {
        info!("removed copied-in recovery-done marker");
    }

    Ok(archived)
}
