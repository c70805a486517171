// src/actions/daemon_ctl.rs

//! `service` verbs: pause, unpause and report the monitoring daemons on
//! every reachable node through the shared-state procedures.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{nodes, shared};
use crate::core::conn::UxSession;
use crate::core::errors::UxMgrResult;

use super::connect_local;

pub async fn pause(config: &Config, args: &CliArgs, pause: bool) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let records = nodes::get_all_node_records(&local).await?;

    let only_node: Option<i32> = args.value_parsed("node-id")?;
    let mut failures = 0usize;
    for record in &records {
        if let Some(id) = only_node {
            if record.node_id != id {
                continue;
            }
        }
        let Ok(sess) = UxSession::open_str(&record.conninfo).await else {
            println!(
                "node {:>4} ({}): unreachable",
                record.node_id, record.node_name
            );
            failures += 1;
            continue;
        };
        match shared::daemon_pause(&sess, pause).await {
            Ok(()) => println!(
                "node {:>4} ({}): daemon {}",
                record.node_id,
                record.node_name,
                if pause { "paused" } else { "unpaused" }
            ),
            Err(e) => {
                println!(
                    "node {:>4} ({}): failed: {e}",
                    record.node_id, record.node_name
                );
                failures += 1;
            }
        }
    }

    if failures > 0 {
        println!("{failures} node(s) could not be updated");
    }
    Ok(())
}

pub async fn status(config: &Config, _args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let records = nodes::get_all_node_records(&local).await?;

    println!(
        "{:>4} | {:<16} | {:<10} | {:<8} | PID",
        "ID", "Name", "Daemon", "Paused"
    );
    println!("{}", "-".repeat(56));
    for record in &records {
        let Ok(sess) = UxSession::open_str(&record.conninfo).await else {
            println!(
                "{:>4} | {:<16} | {:<10} | {:<8} | -",
                record.node_id, record.node_name, "n/a", "n/a"
            );
            continue;
        };
        let running = shared::daemon_is_running(&sess).await.unwrap_or(false);
        let paused = shared::daemon_is_paused(&sess).await.ok().flatten();
        let pid = shared::get_daemon_pid(&sess).await.ok().flatten();
        println!(
            "{:>4} | {:<16} | {:<10} | {:<8} | {}",
            record.node_id,
            record.node_name,
            if running { "running" } else { "stopped" },
            match paused {
                Some(true) => "yes",
                Some(false) => "no",
                None => "n/a",
            },
            pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}
