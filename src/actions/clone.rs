// src/actions/clone.rs

//! `standby clone`: build a new standby's data directory from the upstream
//! with the engine's base-backup tool and write its replication settings.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{NodeRecord, engine, event_names, events, slots};
use crate::core::conn::UxSession;
use crate::core::conninfo::ConnInfo;
use crate::core::datadir;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::exec::local_command;
use tracing::info;

use super::follow;

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let upstream_conninfo = args.value("upstream").ok_or_else(|| {
        UxMgrError::Config("--upstream=<conninfo> of the node to clone from is required".into())
    })?;
    let params = ConnInfo::parse(upstream_conninfo)?;
    let upstream = UxSession::open_str(upstream_conninfo).await?;

    let data_dir = &config.node.data_directory;
    if datadir::is_ux_dir(data_dir) && !args.has("force") {
        return Err(UxMgrError::Consistency(format!(
            "{} already contains a data directory; use --force to overwrite",
            data_dir.display()
        )));
    }

    let slot_name = config
        .replication
        .use_replication_slots
        .then(|| NodeRecord::slot_name_for(config.node.node_id));

    let host = params.get("host").unwrap_or("localhost");
    let port = params.get("port").unwrap_or("5432");
    let mut cmd = format!(
        "ux_basebackup -h {host} -p {port} -U {} -D {} -X stream --checkpoint=fast",
        config.node.replication_user,
        data_dir.display()
    );
    if let Some(slot) = &slot_name {
        cmd.push_str(&format!(" --slot={slot}"));
    }

    if args.has("dry-run") {
        println!("would execute: {cmd}");
        if let Some(slot) = &slot_name {
            println!("would create physical replication slot \"{slot}\" first");
        }
        return Ok(());
    }

    // Creating the slot before the base backup guarantees no WAL gap
    // between backup end and first attachment.
    if let Some(slot) = &slot_name {
        let version = engine::get_server_version_num(&upstream).await?;
        slots::create_slot_sql(&upstream, slot, version).await?;
    }

    info!("cloning from {host}:{port}");
    let out = local_command(&cmd).await?;
    if !out.success {
        events::record_event(
            &upstream,
            &config.events.notification_settings(),
            config.node.node_id,
            &config.node.node_name,
            event_names::STANDBY_CLONE,
            false,
            &format!("base backup exited {}", out.exit_code),
        )
        .await;
        return Err(UxMgrError::CommandFailed {
            exit_code: out.exit_code,
            stderr: out.stderr,
        });
    }

    // Point the fresh data directory at its upstream.
    let mut upstream_params = params.clone();
    upstream_params.set("user", &config.node.replication_user);
    upstream_params.set("application_name", &config.node.node_name);
    follow::write_recovery_settings(
        data_dir,
        &upstream_params.to_string(),
        slot_name.as_deref(),
    )?;
    datadir::write_standby_signal(data_dir)?;

    events::record_event(
        &upstream,
        &config.events.notification_settings(),
        config.node.node_id,
        &config.node.node_name,
        event_names::STANDBY_CLONE,
        true,
        &format!("cloned from {host}:{port}"),
    )
    .await;

    println!(
        "standby cloned into {}; start the engine and run \"uxmgr standby register\"",
        data_dir.display()
    );
    Ok(())
}
