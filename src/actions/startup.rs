// src/actions/startup.rs

//! `node startup`: bring a node up at boot.
//!
//! Waits for the engine's configuration to appear, starts the engine and
//! the daemon, and then arbitrates the virtual address: a node that finds
//! another working primary shuts itself down so the daemon can rejoin it
//! later instead of contesting the address.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{NodeType, engine, nodes};
use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::exec::local_command;
use crate::core::vip::VipArbitrator;
use std::time::Duration;
use tracing::{info, warn};

use super::{connect_local, service};

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    // Shared storage or configuration management may publish the engine
    // configuration slightly after boot.
    let config_file = config
        .node
        .config_file
        .clone()
        .unwrap_or_else(|| config.node.data_directory.join("uxsinodb.conf"));
    let budget = Duration::from_secs(args.value_parsed::<u64>("config-wait")?.unwrap_or(60));
    let deadline = tokio::time::Instant::now() + budget;
    while !config_file.is_file() {
        if tokio::time::Instant::now() >= deadline {
            return Err(UxMgrError::Config(format!(
                "engine configuration {} did not appear within {budget:?}",
                config_file.display()
            )));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    info!("starting engine");
    service::execute_action(config, service::ServiceAction::Start).await?;

    let local = wait_for_local(config, Duration::from_secs(30)).await?;

    info!("starting uxmgr daemon");
    let daemon_cmd = format!(
        "uxmgr -f {} daemon run >/dev/null 2>&1 &",
        args.value("daemon-config").unwrap_or(crate::cli::DEFAULT_CONFIG_PATH)
    );
    let out = local_command(&daemon_cmd).await?;
    if !out.success {
        warn!("daemon start command exited {}", out.exit_code);
    }

    // Virtual-address arbitration only concerns a node registered as
    // primary.
    let record = nodes::get_node_record(&local, config.node.node_id).await?;
    let Some(record) = record else {
        println!("node started; not yet registered in the catalog");
        return Ok(());
    };
    if record.node_type != NodeType::Primary {
        println!("node started as {}", record.node_type);
        return Ok(());
    }

    if let Some(other_primary) = find_other_working_primary(&local, record.node_id).await {
        // Another primary won while this node was down. Contest nothing:
        // stop the engine and let the daemon rejoin later.
        warn!(
            "node {} is already the working primary; shutting down local engine",
            other_primary
        );
        service::execute_action(config, service::ServiceAction::Stop).await?;
        println!(
            "another primary (ID: {other_primary}) is active; local engine stopped for rejoin"
        );
        return Ok(());
    }

    let addresses = config.vip.addresses();
    if !addresses.is_empty() {
        let arbitrator = VipArbitrator::new(addresses, config.vip.command_config());
        arbitrator.bind_all()?;
        println!("node started as primary; virtual address bound");
    } else {
        println!("node started as primary");
    }
    Ok(())
}

async fn wait_for_local(config: &Config, budget: Duration) -> UxMgrResult<UxSession> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        match connect_local(config).await {
            Ok(sess) => return Ok(sess),
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(e);
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Probes every other catalogued node for one that accepts writes.
async fn find_other_working_primary(local: &UxSession, self_id: i32) -> Option<i32> {
    let records = nodes::get_all_node_records(local).await.ok()?;
    for record in records {
        if record.node_id == self_id || !record.active {
            continue;
        }
        let Ok(sess) = UxSession::open_str(&record.conninfo).await else {
            continue;
        };
        if matches!(engine::is_in_recovery(&sess).await, Ok(false)) {
            return Some(record.node_id);
        }
    }
    None
}
