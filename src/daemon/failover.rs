// src/daemon/failover.rs

//! The failover engine: election, promotion, publication and sibling
//! re-pointing, entered from the standby loop once degraded monitoring has
//! exceeded the configured threshold.

use crate::config::Config;
use crate::core::catalog::{NodeRecord, NodeType, engine, event_names, nodes, shared, slots, voting};
use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::exec::local_command;
use crate::core::lsn::Lsn;
use crate::core::notify::NotificationSettings;
use crate::core::shmem::{SharedNodeState, VotingStatus};
use crate::core::vip::VipArbitrator;
use crate::daemon::election::{Candidate, rank_candidates};
use tracing::{info, warn};

/// How a failover attempt ended, as seen by the standby loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// This node won the election and is now the primary.
    Promoted,
    /// Another node ranked ahead; wait for its follow notification.
    AwaitingWinner(i32),
    /// A sibling vetoed with a better candidate; re-run next tick.
    RerunRequested,
    /// A sibling still sees the primary; the outage is not cluster-wide.
    PrimaryStillVisible,
    /// No eligible candidate exists; operator intervention required.
    NoCandidate,
    /// Promotion was attempted and failed; stay degraded.
    Failed,
}

/// A sibling with its record and, when reachable, an open session.
struct Sibling {
    record: NodeRecord,
    session: Option<UxSession>,
}

/// Runs the failover protocol for a standby whose upstream is gone.
pub async fn handle_upstream_failure(
    config: &Config,
    shared: &SharedNodeState,
    notification: &NotificationSettings,
    local: &mut UxSession,
    local_record: &NodeRecord,
    failed_upstream: &NodeRecord,
) -> FailoverOutcome {
    info!(
        "entering failover for failed upstream {} (node {})",
        failed_upstream.node_name, failed_upstream.node_id
    );

    // Step 1: enumerate active siblings and open a session to each.
    let sibling_records = match nodes::get_active_sibling_node_records(
        local,
        local_record.node_id,
        failed_upstream.node_id,
    )
    .await
    {
        Ok(records) => records,
        Err(e) => {
            warn!("could not enumerate siblings from local catalog: {e}");
            return FailoverOutcome::Failed;
        }
    };

    let mut siblings = Vec::with_capacity(sibling_records.len());
    for record in sibling_records {
        let session = match UxSession::open_str(&record.conninfo).await {
            Ok(sess) => Some(sess),
            Err(e) => {
                warn!(
                    "sibling {} (node {}) unreachable during election: {e}",
                    record.node_name, record.node_id
                );
                None
            }
        };
        siblings.push(Sibling { record, session });
    }

    // The consensus check asks every reachable sibling whether it still
    // sees the upstream; any fresh sighting means the outage is local.
    if config.failover.primary_visibility_consensus
        && primary_still_visible(&siblings, config).await
    {
        info!("a sibling still sees the primary; deferring failover");
        return FailoverOutcome::PrimaryStillVisible;
    }

    // Step 2: collect WAL receive positions and rank.
    let mut candidates = Vec::with_capacity(siblings.len() + 1);
    let local_lsn = engine::get_last_wal_receive_lsn(local)
        .await
        .ok()
        .flatten()
        .unwrap_or(Lsn::INVALID);
    candidates.push(candidate_from(local_record, local_lsn, true));

    for sibling in &siblings {
        let mut lsn = Lsn::INVALID;
        let reachable = sibling.session.is_some();
        if let Some(sess) = &sibling.session {
            if sibling.record.node_type != NodeType::Witness {
                lsn = engine::get_last_wal_receive_lsn(sess)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(Lsn::INVALID);
            }
        }
        candidates.push(candidate_from(&sibling.record, lsn, reachable));
    }

    let ranked = rank_candidates(&candidates, &failed_upstream.location);
    let Some(winner) = ranked.first() else {
        warn!("no eligible promotion candidate among {} nodes", candidates.len());
        return FailoverOutcome::NoCandidate;
    };

    if winner.node_id != local_record.node_id {
        info!(
            "node {} ranks ahead for promotion; awaiting its notification",
            winner.node_id
        );
        return FailoverOutcome::AwaitingWinner(winner.node_id);
    }

    // Step 3: this node initiates; bump the term.
    shared.set_voting_status(VotingStatus::VoteRequested);
    let term = match voting::increment_current_term(local).await {
        Ok(term) => term,
        Err(e) => {
            warn!("could not advance the voting term: {e}");
            shared.reset_voting_status();
            return FailoverOutcome::Failed;
        }
    };
    shared.set_candidate(local_record.node_id, term);
    info!("initiating election for term {term}");

    // Step 4: announce candidature to every reachable sibling.
    for sibling in &siblings {
        let Some(sess) = &sibling.session else { continue };
        match voting::announce_candidature(sess, local_record.node_id, term).await {
            Ok(voting::VoteOutcome::Endorsed) => {}
            Ok(voting::VoteOutcome::Rerun) => {
                info!(
                    "sibling {} vetoed with a better candidate; rerunning election",
                    sibling.record.node_name
                );
                shared.reset_voting_status();
                let _ = voting::reset_voting_status(local).await;
                return FailoverOutcome::RerunRequested;
            }
            Err(e) => {
                // An unreachable voter cannot veto; it will observe the new
                // topology on reconnect.
                warn!(
                    "candidature announcement to {} failed: {e}",
                    sibling.record.node_name
                );
            }
        }
    }

    // Step 5: promote.
    shared.set_voting_status(VotingStatus::VotingTerminates);
    if let Err(e) = perform_promotion(config, local).await {
        warn!("promotion failed: {e}");
        events_best_effort(
            local,
            notification,
            local_record,
            event_names::DAEMON_FAILOVER_ABORT,
            false,
            &format!("promotion failed in term {term}: {e}"),
        )
        .await;
        shared.reset_voting_status();
        let _ = voting::reset_voting_status(local).await;
        return FailoverOutcome::Failed;
    }

    match engine::wait_for_promotion(local, config.failover.promote_check_timeout).await {
        Ok(true) => {}
        Ok(false) | Err(_) => {
            events_best_effort(
                local,
                notification,
                local_record,
                event_names::DAEMON_FAILOVER_ABORT,
                false,
                &format!(
                    "node did not leave recovery within {:?} in term {term}",
                    config.failover.promote_check_timeout
                ),
            )
            .await;
            shared.reset_voting_status();
            let _ = voting::reset_voting_status(local).await;
            return FailoverOutcome::Failed;
        }
    }

    // Step 6: publish the new topology and take over the virtual address.
    if let Err(e) = nodes::update_node_record_set_primary(local, local_record.node_id).await {
        warn!("could not publish new primary in catalog: {e}");
        shared.reset_voting_status();
        return FailoverOutcome::Failed;
    }

    events_best_effort(
        local,
        notification,
        local_record,
        event_names::DAEMON_FAILOVER_PROMOTE,
        true,
        &format!(
            "node {} promoted to primary in term {term} (former primary {})",
            local_record.node_id, failed_upstream.node_id
        ),
    )
    .await;

    bind_virtual_address(config);

    // Step 7: re-point surviving siblings at this node.
    for sibling in &siblings {
        let Some(sess) = &sibling.session else { continue };
        match voting::notify_follow_primary(sess, local_record.node_id).await {
            Ok(()) => info!(
                "notified {} (node {}) to follow this node",
                sibling.record.node_name, sibling.record.node_id
            ),
            Err(e) => {
                // Not fatal to the new primary; the standby observes the new
                // topology on its next reconnect. Recorded as pending.
                warn!(
                    "follow notification to {} failed: {e}",
                    sibling.record.node_name
                );
                events_best_effort(
                    local,
                    notification,
                    &sibling.record,
                    event_names::STANDBY_FOLLOW_PENDING,
                    false,
                    &format!(
                        "node {} could not be notified to follow node {}",
                        sibling.record.node_id, local_record.node_id
                    ),
                )
                .await;
            }
        }
    }

    // Make sure the slots the siblings will attach to exist here.
    ensure_sibling_slots(local, &siblings, config).await;

    // Step 8: clear voting state.
    shared.reset_voting_status();
    let _ = voting::reset_voting_status(local).await;
    let _ = shared::set_upstream_node_id(local, local_record.node_id).await;

    info!("failover complete; this node is now the primary");
    FailoverOutcome::Promoted
}

fn candidate_from(record: &NodeRecord, lsn: Lsn, reachable: bool) -> Candidate {
    Candidate {
        node_id: record.node_id,
        priority: record.priority,
        location: record.location.clone(),
        last_receive_lsn: lsn,
        is_witness: record.node_type == NodeType::Witness,
        reachable,
    }
}

/// Asks reachable siblings whether any of them saw the upstream within the
/// monitor interval.
async fn primary_still_visible(siblings: &[Sibling], config: &Config) -> bool {
    let freshness = config.failover.monitor_interval.as_secs() as i64 * 2;
    for sibling in siblings {
        let Some(sess) = &sibling.session else { continue };
        match shared::get_upstream_last_seen(sess).await {
            Ok(seen) if seen >= 0 && seen <= freshness => {
                info!(
                    "{} saw the upstream {seen}s ago",
                    sibling.record.node_name
                );
                return true;
            }
            _ => {}
        }
    }
    false
}

/// Executes the promotion: the configured command when set, the engine's
/// promotion procedure on newer engines, the signal-based control tool
/// otherwise.
pub async fn perform_promotion(config: &Config, local: &UxSession) -> UxMgrResult<()> {
    if let Some(cmd) = &config.failover.promote_command {
        let out = local_command(cmd).await?;
        if !out.success {
            return Err(UxMgrError::PromotionFailed(format!(
                "promote command exited {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        return Ok(());
    }

    let version = engine::get_server_version_num(local).await?;
    if version >= engine::PROMOTE_PROCEDURE_MIN_VERSION {
        engine::promote_sql(local).await
    } else {
        let out = local_command(&format!(
            "ux_ctl -D {} promote",
            config.node.data_directory.display()
        ))
        .await?;
        if !out.success {
            return Err(UxMgrError::PromotionFailed(format!(
                "ux_ctl promote exited {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Creates any catalogued replication slots siblings will need on the newly
/// promoted node. Failures are warnings; the standby retries on attach.
async fn ensure_sibling_slots(local: &UxSession, siblings: &[Sibling], config: &Config) {
    if !config.replication.use_replication_slots {
        return;
    }
    let version = match engine::get_server_version_num(local).await {
        Ok(v) => v,
        Err(e) => {
            warn!("could not determine server version for slot creation: {e}");
            return;
        }
    };
    for sibling in siblings {
        let Some(slot_name) = &sibling.record.slot_name else {
            continue;
        };
        if let Err(e) = slots::create_slot_sql(local, slot_name, version).await {
            warn!(
                "could not prepare slot \"{slot_name}\" for node {}: {e}",
                sibling.record.node_id
            );
        }
    }
}

fn bind_virtual_address(config: &Config) {
    let addresses = config.vip.addresses();
    if addresses.is_empty() {
        return;
    }
    let arbitrator = VipArbitrator::new(addresses, config.vip.command_config());
    if let Err(e) = arbitrator.bind_all() {
        warn!("virtual address takeover failed: {e}");
    }
}

/// Best-effort event recording used throughout the failover path.
async fn events_best_effort(
    sess: &UxSession,
    notification: &NotificationSettings,
    record: &NodeRecord,
    event: &str,
    successful: bool,
    details: &str,
) {
    crate::core::catalog::events::record_event(
        sess,
        notification,
        record.node_id,
        &record.node_name,
        event,
        successful,
        details,
    )
    .await;
}
