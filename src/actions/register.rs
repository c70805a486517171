// src/actions/register.rs

//! Registration and deregistration of primaries, standbys and witnesses.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{
    NodeRecord, NodeType, engine, event_names, events, nodes, slots,
};
use crate::core::errors::{UxMgrError, UxMgrResult};
use tracing::{info, warn};

use super::{connect_local, find_primary};

/// Builds the local node's record from the configuration.
fn record_from_config(config: &Config, node_type: NodeType) -> NodeRecord {
    NodeRecord {
        node_id: config.node.node_id,
        node_type,
        upstream_node_id: None,
        node_name: config.node.node_name.clone(),
        conninfo: config.node.conninfo.clone(),
        repluser: config.node.replication_user.clone(),
        slot_name: config
            .replication
            .use_replication_slots
            .then(|| NodeRecord::slot_name_for(config.node.node_id)),
        location: config.node.location.clone(),
        priority: config.node.priority,
        active: true,
        config_file: config
            .node
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        virtual_ip: config.vip.virtual_ip.first().cloned(),
        network_card: config.vip.network_card.clone(),
    }
}

/// `primary register`: installs the catalog when missing and publishes the
/// local node as the active primary.
pub async fn primary_register(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let mut local = connect_local(config).await?;
    if engine::is_in_recovery(&local).await? {
        return Err(UxMgrError::Consistency(
            "this node is in recovery; a primary must accept writes".to_string(),
        ));
    }

    nodes::install_catalog(&local).await?;
    crate::core::catalog::voting::initialize_voting_term(&local).await?;

    let record = record_from_config(config, NodeType::Primary);
    let existing = nodes::get_node_record(&local, record.node_id).await?;
    match existing {
        Some(_) if !args.has("force") => {
            return Err(UxMgrError::Consistency(format!(
                "node {} is already registered; use --force to overwrite",
                record.node_id
            )));
        }
        Some(_) => nodes::update_node_record(&local, &record).await?,
        None => nodes::create_node_record(&local, &record).await?,
    }
    nodes::update_node_record_set_primary(&mut local, record.node_id).await?;

    events::record_event(
        &local,
        &config.events.notification_settings(),
        record.node_id,
        &record.node_name,
        event_names::PRIMARY_REGISTER,
        true,
        "",
    )
    .await;
    info!("primary node {} registered", record.node_id);
    println!("primary node \"{}\" (ID: {}) registered", record.node_name, record.node_id);
    Ok(())
}

/// `standby register`: records the local node as a standby of its upstream,
/// pre-creating the replication slot when slots are in use.
pub async fn standby_register(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    if !engine::is_in_recovery(&local).await? {
        return Err(UxMgrError::Consistency(
            "this node is not in recovery; only a standby can be registered as one".to_string(),
        ));
    }

    let (primary_record, primary) = find_primary(&local).await?;
    let upstream_id: i32 = args
        .value_parsed("upstream-node-id")?
        .unwrap_or(primary_record.node_id);
    if upstream_id == config.node.node_id {
        return Err(UxMgrError::Consistency(
            "a standby cannot be its own upstream".to_string(),
        ));
    }

    let mut record = record_from_config(config, NodeType::Standby);
    record.upstream_node_id = Some(upstream_id);

    if let Some(slot_name) = &record.slot_name {
        let upstream_sess = if upstream_id == primary_record.node_id {
            None
        } else {
            let upstream_record = nodes::get_node_record(&primary, upstream_id)
                .await?
                .ok_or_else(|| {
                    UxMgrError::NotFound(format!("upstream node {upstream_id} not in catalog"))
                })?;
            Some(crate::core::conn::UxSession::open_str(&upstream_record.conninfo).await?)
        };
        let slot_target = upstream_sess.as_ref().unwrap_or(&primary);
        let version = engine::get_server_version_num(slot_target).await?;
        slots::create_slot_sql(slot_target, slot_name, version).await?;
    }

    // All catalog writes land on the primary and replicate out.
    let existing = nodes::get_node_record(&primary, record.node_id).await?;
    match existing {
        Some(_) if !args.has("force") => {
            return Err(UxMgrError::Consistency(format!(
                "node {} is already registered; use --force to overwrite",
                record.node_id
            )));
        }
        Some(_) => nodes::update_node_record(&primary, &record).await?,
        None => nodes::create_node_record(&primary, &record).await?,
    }

    events::record_event(
        &primary,
        &config.events.notification_settings(),
        record.node_id,
        &record.node_name,
        event_names::STANDBY_REGISTER,
        true,
        &format!("standby registered with upstream node {upstream_id}"),
    )
    .await;

    // With --wait-sync the caller wants proof the record replicated back.
    if args.has("wait-sync") {
        let budget = std::time::Duration::from_secs(
            args.value_parsed::<u64>("wait-sync-timeout")?.unwrap_or(30),
        );
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if nodes::get_node_record(&local, record.node_id).await?.is_some() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("standby registration has not replicated within {budget:?}");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }

    info!("standby node {} registered", record.node_id);
    println!("standby node \"{}\" (ID: {}) registered", record.node_name, record.node_id);
    Ok(())
}

/// `witness register`: records the witness and seeds its local copy of the
/// nodes table.
pub async fn witness_register(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let mut local = connect_local(config).await?;
    let (primary_record, primary) = find_primary(&local).await?;

    nodes::install_catalog(&local).await?;

    let mut record = record_from_config(config, NodeType::Witness);
    record.priority = 0;
    record.upstream_node_id = Some(primary_record.node_id);

    let existing = nodes::get_node_record(&primary, record.node_id).await?;
    match existing {
        Some(_) if !args.has("force") => {
            return Err(UxMgrError::Consistency(format!(
                "node {} is already registered; use --force to overwrite",
                record.node_id
            )));
        }
        Some(_) => nodes::update_node_record(&primary, &record).await?,
        None => nodes::create_node_record(&primary, &record).await?,
    }

    nodes::witness_copy_node_records(&primary, &mut local).await?;

    events::record_event(
        &primary,
        &config.events.notification_settings(),
        record.node_id,
        &record.node_name,
        event_names::WITNESS_REGISTER,
        true,
        "",
    )
    .await;
    info!("witness node {} registered", record.node_id);
    println!("witness node \"{}\" (ID: {}) registered", record.node_name, record.node_id);
    Ok(())
}

/// Removes a node record. `--node-id` targets another node, e.g. one that
/// no longer exists.
pub async fn unregister(config: &Config, args: &CliArgs, object: &str) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let node_id: i32 = args
        .value_parsed("node-id")?
        .unwrap_or(config.node.node_id);

    let (event, writer) = match object {
        "primary" => (event_names::PRIMARY_UNREGISTER, local),
        "witness" => {
            let (_, primary) = find_primary(&local).await?;
            (event_names::WITNESS_UNREGISTER, primary)
        }
        _ => {
            let (_, primary) = find_primary(&local).await?;
            (event_names::STANDBY_UNREGISTER, primary)
        }
    };

    let record = nodes::get_node_record(&writer, node_id)
        .await?
        .ok_or_else(|| UxMgrError::NotFound(format!("node {node_id} not in catalog")))?;

    let downstream = nodes::get_downstream_node_records(&writer, node_id).await?;
    let active_downstream: Vec<_> = downstream.iter().filter(|n| n.active).collect();
    if !active_downstream.is_empty() && !args.has("force") {
        return Err(UxMgrError::Consistency(format!(
            "node {node_id} still has {} active downstream node(s); use --force",
            active_downstream.len()
        )));
    }

    nodes::delete_node_record(&writer, node_id).await?;
    events::record_event(
        &writer,
        &config.events.notification_settings(),
        node_id,
        &record.node_name,
        event,
        true,
        "",
    )
    .await;
    info!("node {node_id} unregistered");
    println!("node \"{}\" (ID: {node_id}) unregistered", record.node_name);
    Ok(())
}
