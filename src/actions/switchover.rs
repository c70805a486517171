// src/actions/switchover.rs

//! `standby switchover`: controlled promotion of the local standby with
//! demotion and rejoin of the current primary.
//!
//! Run on the standby that is to become the primary. The old primary is
//! checkpointed and cleanly stopped over SSH, its shutdown position
//! verified against what this node has received, and it is then rejoined
//! as a standby of the promoted node.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{engine, event_names, events, nodes, voting};
use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::lsn::Lsn;
use crate::daemon::failover::perform_promotion;
use std::str::FromStr;
use tracing::{info, warn};

use super::status::ShutdownState;
use super::{connect_local, node_host, remote_command};

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let mut local = connect_local(config).await?;
    if !engine::is_in_recovery(&local).await? {
        return Err(UxMgrError::SwitchoverFailed(
            "this node is not a standby; switchover promotes the local node".to_string(),
        ));
    }

    let record = nodes::get_node_record(&local, config.node.node_id)
        .await?
        .ok_or_else(|| {
            UxMgrError::NotFound(format!(
                "node {} is not registered in the catalog",
                config.node.node_id
            ))
        })?;
    let (old_primary, primary_sess) = super::find_primary(&local).await?;
    let old_primary_host = node_host(&old_primary)?;

    if args.has("dry-run") {
        return dry_run(
            config,
            args,
            &local,
            &record,
            &old_primary,
            &old_primary_host,
            &primary_sess,
        )
        .await;
    }

    info!(
        "switching over: promoting node {} and demoting node {}",
        record.node_id, old_primary.node_id
    );

    // Pause the daemons so no automatic failover interleaves with the
    // controlled sequence.
    pause_all_daemons(&primary_sess, true).await;

    // Checkpoint and cleanly stop the old primary.
    if let Err(e) = engine::request_checkpoint(&primary_sess).await {
        warn!("pre-stop checkpoint on old primary failed: {e}");
    }
    let stop_cmd = format!("uxmgr -f {} node service --action=stop", remote_config_path(args));
    let out = remote_command(config, &old_primary_host, &stop_cmd).await?;
    if !out.success {
        pause_all_daemons(&primary_sess, false).await;
        return Err(UxMgrError::SwitchoverFailed(format!(
            "could not stop old primary (exit {}): {}",
            out.exit_code,
            out.stderr.trim()
        )));
    }
    primary_sess.close();

    // Verify the shutdown was clean and its final checkpoint has reached
    // this node.
    let status_cmd = format!(
        "uxmgr -f {} node status --is-shutdown-cleanly",
        remote_config_path(args)
    );
    let out = remote_command(config, &old_primary_host, &status_cmd).await?;
    let (state, shutdown_lsn) = parse_shutdown_status(&out.stdout)?;
    if state != ShutdownState::Shutdown {
        return Err(UxMgrError::SwitchoverFailed(format!(
            "old primary reports state {} after stop",
            state.token()
        )));
    }
    let local_receive = engine::get_last_wal_receive_lsn(&local).await?.unwrap_or(Lsn::INVALID);
    if let Some(shutdown_lsn) = shutdown_lsn {
        if local_receive < shutdown_lsn {
            return Err(UxMgrError::SwitchoverFailed(format!(
                "this node received only {local_receive} of the old primary's final {shutdown_lsn}"
            )));
        }
    }

    // Promote the local node and publish the topology change.
    perform_promotion(config, &local).await?;
    if !engine::wait_for_promotion(&local, config.failover.promote_check_timeout).await? {
        return Err(UxMgrError::SwitchoverFailed(format!(
            "node did not leave recovery within {:?}",
            config.failover.promote_check_timeout
        )));
    }
    nodes::update_node_record_set_primary(&mut local, record.node_id).await?;

    let addresses = config.vip.addresses();
    if !addresses.is_empty() {
        let arbitrator =
            crate::core::vip::VipArbitrator::new(addresses, config.vip.command_config());
        if let Err(e) = arbitrator.bind_all() {
            warn!("virtual address takeover failed: {e}");
        }
    }

    // Rejoin the old primary as a standby of this node.
    let rejoin_cmd = format!(
        "uxmgr -f {} node rejoin --upstream={} --force-rewind",
        remote_config_path(args),
        shell_quote_inner(&record.conninfo)
    );
    let out = remote_command(config, &old_primary_host, &rejoin_cmd).await?;
    let old_primary_rejoined = out.success;
    if !old_primary_rejoined {
        warn!(
            "old primary rejoin failed (exit {}): {}",
            out.exit_code,
            out.stderr.trim()
        );
    }

    // Re-point the remaining standbys.
    for sibling in
        nodes::get_active_sibling_node_records(&local, record.node_id, old_primary.node_id).await?
    {
        let Ok(sess) = UxSession::open_str(&sibling.conninfo).await else {
            warn!("sibling {} unreachable for follow notification", sibling.node_name);
            continue;
        };
        if let Err(e) = voting::notify_follow_primary(&sess, record.node_id).await {
            warn!("follow notification to {} failed: {e}", sibling.node_name);
        }
    }

    pause_all_daemons(&local, false).await;

    events::record_event_ext(
        &local,
        &config.events.notification_settings(),
        record.node_id,
        &record.node_name,
        event_names::STANDBY_SWITCHOVER,
        true,
        &format!(
            "node {} promoted by switchover, former primary {} {}",
            record.node_id,
            old_primary.node_id,
            if old_primary_rejoined { "rejoined as standby" } else { "requires manual rejoin" }
        ),
        Some(&record.conninfo),
        Some(old_primary.node_id),
    )
    .await;

    println!(
        "switchover complete: node \"{}\" (ID: {}) is now the primary",
        record.node_name, record.node_id
    );
    if !old_primary_rejoined {
        println!(
            "WARNING: former primary (ID: {}) must be rejoined manually",
            old_primary.node_id
        );
    }
    Ok(())
}

/// `--dry-run`: verify every precondition the real switchover relies on,
/// reporting each, without touching any node.
async fn dry_run(
    config: &Config,
    args: &CliArgs,
    local: &UxSession,
    record: &crate::core::catalog::NodeRecord,
    old_primary: &crate::core::catalog::NodeRecord,
    old_primary_host: &str,
    primary_sess: &UxSession,
) -> UxMgrResult<()> {
    let mut ok = true;

    println!(
        "switchover plan: promote node {} ({}), demote node {} ({})",
        record.node_id, record.node_name, old_primary.node_id, old_primary.node_name
    );

    // SSH reachability is what the stop and rejoin steps depend on.
    let probe_cmd = format!(
        "uxmgr -f {} node status --is-shutdown-cleanly",
        remote_config_path(args)
    );
    match remote_command(config, old_primary_host, &probe_cmd).await {
        Ok(out) if out.success => match parse_shutdown_status(&out.stdout) {
            Ok((state, _)) => {
                println!("  ssh to {old_primary_host}: ok (reports {})", state.token());
            }
            Err(_) => {
                println!("  ssh to {old_primary_host}: ok, but remote uxmgr output unparseable");
                ok = false;
            }
        },
        Ok(out) => {
            println!(
                "  ssh to {old_primary_host}: remote command exited {}",
                out.exit_code
            );
            ok = false;
        }
        Err(e) => {
            println!("  ssh to {old_primary_host}: failed ({e})");
            ok = false;
        }
    }

    // Replication position: the promotion candidate must be caught up.
    let primary_lsn = engine::get_current_wal_lsn(primary_sess).await?;
    let local_receive = engine::get_last_wal_receive_lsn(local)
        .await?
        .unwrap_or(Lsn::INVALID);
    let lag = primary_lsn.bytes_since(local_receive);
    println!(
        "  replication position: primary {primary_lsn}, local {local_receive} ({lag} bytes behind)"
    );

    let attached = engine::standby_is_attached(primary_sess, &record.node_name).await?;
    println!(
        "  streaming attachment: {}",
        if attached { "ok" } else { "NOT attached" }
    );
    ok = ok && attached;

    if config.vip.addresses().is_empty() {
        println!("  virtual address: none configured");
    } else {
        println!(
            "  virtual address: {} would move to this node",
            config.vip.virtual_ip.join(", ")
        );
    }

    if ok {
        println!("dry run ok: switchover prerequisites satisfied");
        Ok(())
    } else {
        Err(UxMgrError::SwitchoverFailed(
            "dry run found unsatisfied prerequisites".to_string(),
        ))
    }
}

/// Parses the machine-parseable line from `--is-shutdown-cleanly`.
pub fn parse_shutdown_status(output: &str) -> UxMgrResult<(ShutdownState, Option<Lsn>)> {
    let mut state = None;
    let mut lsn = None;
    for token in output.split_whitespace() {
        if let Some(value) = token.strip_prefix("--state=") {
            state = Some(match value {
                "RUNNING" => ShutdownState::Running,
                "SHUTTING_DOWN" => ShutdownState::ShuttingDown,
                "SHUTDOWN" => ShutdownState::Shutdown,
                "UNCLEAN_SHUTDOWN" => ShutdownState::UncleanShutdown,
                _ => ShutdownState::Unknown,
            });
        } else if let Some(value) = token.strip_prefix("--last-checkpoint-lsn=") {
            lsn = Some(Lsn::from_str(value)?);
        }
    }
    match state {
        Some(state) => Ok((state, lsn)),
        None => Err(UxMgrError::SwitchoverFailed(format!(
            "unparseable shutdown status: {output:?}"
        ))),
    }
}

/// The remote nodes run with their own configuration; `--remote-config`
/// overrides the default path.
fn remote_config_path(args: &CliArgs) -> String {
    args.value("remote-config")
        .unwrap_or(crate::cli::DEFAULT_CONFIG_PATH)
        .to_string()
}

fn shell_quote_inner(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

/// Flips the pause flag on every reachable node's daemon. Best-effort.
async fn pause_all_daemons(catalog_sess: &UxSession, pause: bool) {
    let Ok(records) = nodes::get_all_node_records(catalog_sess).await else {
        return;
    };
    for record in records {
        let Ok(sess) = UxSession::open_str(&record.conninfo).await else {
            continue;
        };
        if let Err(e) = crate::core::catalog::shared::daemon_pause(&sess, pause).await {
            warn!("could not set pause flag on node {}: {e}", record.node_id);
        }
    }
}
