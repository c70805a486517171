// src/daemon/monitor.rs

//! The per-node monitoring loops.
//!
//! One loop runs at a time, selected by the local node's catalogued role.
//! All loops are single-threaded and cooperative: signals only set flags,
//! and every tick starts by observing them. A loop hands control back to
//! the outer daemon loop on shutdown, reload, or role change.

use crate::config::{Config, ConnectionCheckType, FailoverMode};
use crate::core::catalog::monitoring::MonitoringRecord;
use crate::core::catalog::{
    NodeRecord, NodeType, engine, event_names, events, monitoring, nodes, shared, slots, voting,
};
use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::notify::NotificationSettings;
use crate::core::shmem::{ELECTION_RERUN_NOTIFICATION, SharedNodeState};
use crate::core::vip::VipArbitrator;
use crate::daemon::failover::{FailoverOutcome, handle_upstream_failure};
use crate::daemon::state::{LoopExit, MonitoringState, SignalFlags};
use chrono::Utc;
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Ticks between monitoring-history purges on the primary.
const HISTORY_PURGE_TICKS: u64 = 300;

pub struct NodeMonitor {
    pub config: Config,
    pub shared: Arc<SharedNodeState>,
    pub flags: Arc<SignalFlags>,
    pub notification: NotificationSettings,
}

impl NodeMonitor {
    /// Selects and runs the loop matching the local node's catalogued role.
    /// Returns when the daemon should stop or reload.
    pub async fn run(&mut self) -> UxMgrResult<LoopExit> {
        loop {
            let local = UxSession::open_str(&self.config.node.conninfo).await?;
            let record = nodes::get_node_record(&local, self.config.node.node_id)
                .await?
                .ok_or_else(|| {
                    UxMgrError::NotFound(format!(
                        "node {} is not registered in the catalog",
                        self.config.node.node_id
                    ))
                })?;

            info!(
                "monitoring node {} ({}) as {}",
                record.node_id, record.node_name, record.node_type
            );

            let exit = match record.node_type {
                NodeType::Primary => self.run_primary_loop(local, &record).await?,
                NodeType::Standby => self.run_standby_loop(local, &record).await?,
                NodeType::Witness => self.run_witness_loop(local, &record).await?,
                NodeType::Unknown => {
                    return Err(UxMgrError::Consistency(format!(
                        "node {} has unknown type in catalog",
                        record.node_id
                    )));
                }
            };

            match exit {
                LoopExit::RoleChanged => {
                    info!("node role changed; re-reading catalog");
                    continue;
                }
                other => return Ok(other),
            }
        }
    }

    fn paused(&self) -> bool {
        self.shared.is_paused().unwrap_or(false)
    }

    /// Checks the flags at a tick boundary; `None` means keep going.
    fn observe_flags(&self) -> Option<LoopExit> {
        if self.flags.terminate_requested() {
            return Some(LoopExit::Terminate);
        }
        if self.flags.take_reload_request() {
            return Some(LoopExit::Reload);
        }
        None
    }

    // --- Primary loop -----------------------------------------------------

    async fn run_primary_loop(
        &mut self,
        local: UxSession,
        record: &NodeRecord,
    ) -> UxMgrResult<LoopExit> {
        let mut interval = tokio::time::interval(self.config.failover.monitor_interval);
        let mut known_standbys: BTreeSet<i32> = BTreeSet::new();
        let mut missing_slots: BTreeSet<String> = BTreeSet::new();
        let mut tick: u64 = 0;
        let mut seeded = false;
        let mut session = Some(local);

        loop {
            interval.tick().await;
            if let Some(exit) = self.observe_flags() {
                return Ok(exit);
            }
            tick += 1;

            let local = match session.take() {
                Some(sess) => match sess.ping_with_reset().await {
                    Ok(sess) => sess,
                    Err(e) => {
                        warn!("local primary unreachable: {e}; retrying");
                        tokio::time::sleep(self.config.failover.reconnect_interval).await;
                        continue;
                    }
                },
                None => match UxSession::open_str(&self.config.node.conninfo).await {
                    Ok(sess) => sess,
                    Err(e) => {
                        debug!("local reconnect failed: {e}");
                        continue;
                    }
                },
            };

            // A rejoined former primary keeps its daemon running; the role
            // flip is observed here.
            if engine::is_in_recovery(&local).await.unwrap_or(false) {
                warn!("local node is in recovery but catalogued as primary");
                return Ok(LoopExit::RoleChanged);
            }

            let inventory = match nodes::get_all_node_records(&local).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("could not read node inventory: {e}");
                    session = Some(local);
                    continue;
                }
            };

            let current_standbys: BTreeSet<i32> = inventory
                .iter()
                .filter(|n| {
                    n.node_type == NodeType::Standby
                        && n.active
                        && n.upstream_node_id == Some(record.node_id)
                })
                .map(|n| n.node_id)
                .collect();

            if seeded {
                for id in current_standbys.difference(&known_standbys) {
                    info!("standby node {id} registered");
                }
                for id in known_standbys.difference(&current_standbys) {
                    info!("standby node {id} no longer attached to this primary");
                }
            }
            known_standbys = current_standbys;
            seeded = true;

            self.check_standby_slots(&local, record, &inventory, &mut missing_slots)
                .await;

            if self.config.failover.monitoring_history && tick % HISTORY_PURGE_TICKS == 0 {
                match monitoring::purge_monitoring_history(
                    &local,
                    self.config.failover.monitoring_history_keep,
                )
                .await
                {
                    Ok(n) if n > 0 => debug!("purged {n} monitoring-history rows"),
                    Ok(_) => {}
                    Err(e) => warn!("monitoring-history purge failed: {e}"),
                }
            }

            // Re-assert the virtual address; a no-op when already bound.
            if record.virtual_ip.is_some() {
                let addresses = self.config.vip.addresses();
                if !addresses.is_empty() {
                    let arbitrator =
                        VipArbitrator::new(addresses, self.config.vip.command_config());
                    if let Err(e) = arbitrator.bind_all() {
                        warn!("could not assert virtual address: {e}");
                    }
                }
            }

            session = Some(local);
        }
    }

    /// Emits events when catalogued slots go missing or reappear.
    async fn check_standby_slots(
        &self,
        local: &UxSession,
        record: &NodeRecord,
        inventory: &[NodeRecord],
        missing: &mut BTreeSet<String>,
    ) {
        if !self.config.replication.use_replication_slots {
            return;
        }
        for node in inventory {
            let Some(slot_name) = &node.slot_name else { continue };
            if node.upstream_node_id != Some(record.node_id) || !node.active {
                continue;
            }
            match slots::get_slot(local, slot_name).await {
                Ok(Some(_)) => {
                    if missing.remove(slot_name) {
                        events::record_event(
                            local,
                            &self.notification,
                            record.node_id,
                            &record.node_name,
                            event_names::DAEMON_SLOT_RESTORED,
                            true,
                            &format!("slot \"{slot_name}\" for node {} restored", node.node_id),
                        )
                        .await;
                    }
                }
                Ok(None) => {
                    if missing.insert(slot_name.clone()) {
                        events::record_event(
                            local,
                            &self.notification,
                            record.node_id,
                            &record.node_name,
                            event_names::DAEMON_SLOT_MISSING,
                            false,
                            &format!("slot \"{slot_name}\" for node {} is missing", node.node_id),
                        )
                        .await;
                    }
                }
                Err(e) => debug!("slot probe for \"{slot_name}\" failed: {e}"),
            }
        }
    }

    // --- Standby loop -----------------------------------------------------

    async fn run_standby_loop(
        &mut self,
        mut local: UxSession,
        record: &NodeRecord,
    ) -> UxMgrResult<LoopExit> {
        let upstream_id = record.upstream_node_id.ok_or_else(|| {
            UxMgrError::Consistency(format!("standby {} has no upstream", record.node_id))
        })?;
        let mut upstream_record = nodes::get_node_record(&local, upstream_id)
            .await?
            .ok_or_else(|| {
                UxMgrError::NotFound(format!("upstream node {upstream_id} not in catalog"))
            })?;

        let mut upstream = match UxSession::open_str(&upstream_record.conninfo).await {
            Ok(sess) => Some(sess),
            Err(e) => {
                warn!(
                    "upstream {} unreachable at startup: {e}",
                    upstream_record.node_name
                );
                None
            }
        };

        let mut state = MonitoringState::Normal;
        let mut interval = tokio::time::interval(self.config.failover.monitor_interval);

        loop {
            interval.tick().await;
            if let Some(exit) = self.observe_flags() {
                return Ok(exit);
            }

            if local.is_closed() {
                local = UxSession::open_str(&self.config.node.conninfo).await?;
            }

            // The winner of an election, or an operator, may have asked this
            // node to follow a new primary.
            match voting::get_new_primary(&local).await {
                Ok(Some(id)) if id == ELECTION_RERUN_NOTIFICATION => {
                    info!("election rerun requested");
                    let _ = voting::reset_voting_status(&local).await;
                    if let Some(exit) = self
                        .enter_failover(&mut local, record, &upstream_record)
                        .await?
                    {
                        return Ok(exit);
                    }
                }
                Ok(Some(new_primary_id)) if new_primary_id != upstream_id => {
                    info!("notified to follow new primary {new_primary_id}");
                    let _ = voting::reset_voting_status(&local).await;
                    self.execute_follow(&local, record, new_primary_id).await;
                    return Ok(LoopExit::RoleChanged);
                }
                _ => {}
            }

            let mut replinfo = match engine::get_replication_info(&local).await {
                Ok(info) => info,
                Err(e) => {
                    warn!("could not refresh local replication info: {e}");
                    continue;
                }
            };
            replinfo.upstream_node_id = upstream_id;
            replinfo.upstream_last_seen = self.shared.upstream_last_seen_secs();

            if !replinfo.in_recovery {
                warn!("local node left recovery but is catalogued as standby");
                return Ok(LoopExit::RoleChanged);
            }

            let upstream_ok = match upstream.take() {
                Some(sess) => {
                    let (sess, ok) = self.check_upstream(sess).await;
                    upstream = sess;
                    ok
                }
                None => {
                    upstream = UxSession::open_str(&upstream_record.conninfo).await.ok();
                    upstream.is_some()
                }
            };

            if upstream_ok {
                self.shared.set_upstream_last_seen(upstream_id);
                if let Some(sess) = &upstream {
                    let _ = shared::set_upstream_last_seen(&local, upstream_id).await;
                    if state.is_degraded() {
                        info!(
                            "upstream {} is reachable again after {}s degraded",
                            upstream_record.node_name,
                            state.degraded_seconds()
                        );
                        events::record_event(
                            sess,
                            &self.notification,
                            record.node_id,
                            &record.node_name,
                            event_names::DAEMON_STANDBY_RECONNECT,
                            true,
                            &format!(
                                "upstream {} reachable again after {}s",
                                upstream_record.node_id,
                                state.degraded_seconds()
                            ),
                        )
                        .await;
                        state = MonitoringState::Normal;
                    }
                    if self.config.failover.monitoring_history && !self.paused() {
                        self.write_monitoring_record(sess, record, upstream_id, &replinfo)
                            .await;
                    }
                }
                continue;
            }

            // Upstream ping failed: burn through the timed reconnect cycle
            // before declaring degraded monitoring.
            if !state.is_degraded() {
                if let Some(sess) = self.reconnect_cycle(&upstream_record).await {
                    upstream = Some(sess);
                    continue;
                }
                warn!(
                    "upstream {} unreachable after {} attempts; entering degraded monitoring",
                    upstream_record.node_name, self.config.failover.reconnect_attempts
                );
                events::record_event(
                    &local,
                    &self.notification,
                    record.node_id,
                    &record.node_name,
                    event_names::DAEMON_STANDBY_DISCONNECT,
                    false,
                    &format!("unable to reach upstream node {}", upstream_record.node_id),
                )
                .await;
                state = MonitoringState::Degraded {
                    since: Instant::now(),
                };
                continue;
            }

            // Already degraded: keep trying at a slower cadence, with jitter
            // so siblings do not stampede the failed host.
            let backoff = self.config.failover.reconnect_interval
                + Duration::from_millis(rand::thread_rng().gen_range(0..500));
            tokio::time::sleep(backoff).await;
            if let Ok(sess) = UxSession::open_str(&upstream_record.conninfo).await {
                upstream = Some(sess);
                continue;
            }

            let degraded_for = Duration::from_secs(state.degraded_seconds());
            debug!(
                "degraded monitoring: {}s elapsed of {:?} threshold",
                degraded_for.as_secs(),
                self.config.failover.degraded_monitoring_timeout
            );

            if degraded_for >= self.config.failover.degraded_monitoring_timeout {
                if self.config.failover.failover != FailoverMode::Automatic {
                    debug!("manual failover mode; staying degraded");
                    continue;
                }
                if self.paused() {
                    debug!("daemon is paused; staying degraded");
                    continue;
                }
                if let Some(exit) = self
                    .enter_failover(&mut local, record, &upstream_record)
                    .await?
                {
                    return Ok(exit);
                }
                // Failed or deferred: refresh the upstream record in case an
                // operator repaired the topology meanwhile.
                if let Ok(Some(fresh)) = nodes::get_node_record(&local, upstream_id).await {
                    upstream_record = fresh;
                }
            }
        }
    }

    /// Runs the failover engine and translates its outcome into loop
    /// control. `Some(exit)` bubbles a loop exit to the caller.
    async fn enter_failover(
        &mut self,
        local: &mut UxSession,
        record: &NodeRecord,
        upstream_record: &NodeRecord,
    ) -> UxMgrResult<Option<LoopExit>> {
        let outcome = handle_upstream_failure(
            &self.config,
            &self.shared,
            &self.notification,
            local,
            record,
            upstream_record,
        )
        .await;

        match outcome {
            FailoverOutcome::Promoted => Ok(Some(LoopExit::RoleChanged)),
            FailoverOutcome::AwaitingWinner(winner) => {
                info!("waiting for node {winner} to complete the failover");
                Ok(None)
            }
            FailoverOutcome::RerunRequested => {
                info!("election will be rerun next tick");
                Ok(None)
            }
            FailoverOutcome::PrimaryStillVisible => Ok(None),
            FailoverOutcome::NoCandidate | FailoverOutcome::Failed => {
                warn!("failover did not complete; remaining in degraded monitoring");
                Ok(None)
            }
        }
    }

    /// Probes the upstream session according to the configured check type.
    async fn check_upstream(&self, sess: UxSession) -> (Option<UxSession>, bool) {
        match self.config.failover.connection_check_type {
            ConnectionCheckType::Ping => {
                let ok = sess.ping().await;
                (Some(sess), ok)
            }
            ConnectionCheckType::Query => {
                let ok = sess
                    .client()
                    .simple_query("SELECT current_timestamp")
                    .await
                    .is_ok();
                (Some(sess), ok)
            }
            // A fresh connection proves more than a live socket: the
            // listener still accepts and authenticates.
            ConnectionCheckType::Connection => match sess.duplicate(None).await {
                Ok(probe) => {
                    probe.close();
                    (Some(sess), true)
                }
                Err(_) => (Some(sess), false),
            },
        }
    }

    /// The timed reconnect cycle run before declaring the upstream gone.
    async fn reconnect_cycle(&self, upstream_record: &NodeRecord) -> Option<UxSession> {
        for attempt in 1..=self.config.failover.reconnect_attempts {
            debug!(
                "reconnect attempt {attempt}/{} to {}",
                self.config.failover.reconnect_attempts, upstream_record.node_name
            );
            if let Ok(sess) = UxSession::open_str(&upstream_record.conninfo).await {
                if sess.ping().await {
                    info!(
                        "reconnected to upstream {} on attempt {attempt}",
                        upstream_record.node_name
                    );
                    return Some(sess);
                }
            }
            tokio::time::sleep(self.config.failover.reconnect_interval).await;
        }
        None
    }

    async fn write_monitoring_record(
        &self,
        upstream: &UxSession,
        record: &NodeRecord,
        upstream_id: i32,
        replinfo: &engine::ReplicationInfo,
    ) {
        let primary_location = match engine::get_current_wal_lsn(upstream).await {
            Ok(lsn) => lsn,
            Err(e) => {
                debug!("could not read primary WAL position: {e}");
                return;
            }
        };
        let (replication_lag, apply_lag) = MonitoringRecord::lag_from_positions(
            primary_location,
            replinfo.last_wal_receive_lsn,
            replinfo.last_wal_replay_lsn,
        );
        let mrec = MonitoringRecord {
            primary_node_id: upstream_id,
            standby_node_id: record.node_id,
            last_monitor_time: Utc::now(),
            last_apply_time: replinfo.last_xact_replay_timestamp,
            primary_location,
            standby_location: replinfo.last_wal_receive_lsn,
            replication_lag_bytes: replication_lag,
            apply_lag_bytes: apply_lag,
        };
        if let Err(e) = monitoring::write_monitoring_record(upstream, &mrec).await {
            debug!("monitoring record write failed: {e}");
        }
        let _ = shared::standby_set_last_updated(upstream).await;
    }

    /// Executes the follow action after a follow-new-primary notification:
    /// the configured follow command when set, the built-in follow
    /// otherwise.
    async fn execute_follow(&self, local: &UxSession, record: &NodeRecord, new_primary_id: i32) {
        let result = match &self.config.failover.follow_command {
            Some(cmd) => match crate::core::exec::local_command(cmd).await {
                Ok(out) if out.success => Ok(()),
                Ok(out) => Err(UxMgrError::CommandFailed {
                    exit_code: out.exit_code,
                    stderr: out.stderr,
                }),
                Err(e) => Err(e),
            },
            None => {
                crate::actions::follow::follow_new_upstream(&self.config, new_primary_id).await
            }
        };

        match result {
            Ok(()) => {
                events::record_event(
                    local,
                    &self.notification,
                    record.node_id,
                    &record.node_name,
                    event_names::DAEMON_FAILOVER_FOLLOW,
                    true,
                    &format!("node {} now follows node {new_primary_id}", record.node_id),
                )
                .await;
            }
            Err(e) => {
                warn!("follow action failed: {e}");
                events::record_event(
                    local,
                    &self.notification,
                    record.node_id,
                    &record.node_name,
                    event_names::DAEMON_FAILOVER_FOLLOW,
                    false,
                    &format!("follow of node {new_primary_id} failed: {e}"),
                )
                .await;
            }
        }
    }

    // --- Witness loop -----------------------------------------------------

    async fn run_witness_loop(
        &mut self,
        local: UxSession,
        record: &NodeRecord,
    ) -> UxMgrResult<LoopExit> {
        let mut local = local;
        let mut primary_sess: Option<UxSession> = None;
        let mut interval = tokio::time::interval(self.config.failover.monitor_interval);
        // The node-table copy is heavier than a health probe; run it on a
        // multiple of the monitor interval.
        let mut tick: u64 = 0;
        const COPY_EVERY_TICKS: u64 = 15;

        loop {
            interval.tick().await;
            if let Some(exit) = self.observe_flags() {
                return Ok(exit);
            }
            tick += 1;

            if local.is_closed() {
                local = UxSession::open_str(&self.config.node.conninfo).await?;
            }

            let primary_alive = match &primary_sess {
                Some(sess) => sess.ping().await,
                None => false,
            };

            if !primary_alive {
                primary_sess = None;
                match nodes::get_primary_node_record(&local).await {
                    Ok(Some(primary)) => {
                        match UxSession::open_str(&primary.conninfo).await {
                            Ok(sess) => {
                                info!(
                                    "witness {} connected to primary {}",
                                    record.node_name, primary.node_name
                                );
                                self.shared.set_upstream_last_seen(primary.node_id);
                                primary_sess = Some(sess);
                            }
                            Err(e) => {
                                debug!("witness cannot reach primary {}: {e}", primary.node_name);
                            }
                        }
                    }
                    Ok(None) => debug!("witness sees no active primary in its catalog copy"),
                    Err(e) => warn!("witness could not read its catalog copy: {e}"),
                }
            } else if let Some(primary) = &primary_sess {
                if let Ok(Some(rec)) = nodes::get_primary_node_record(&local).await {
                    self.shared.set_upstream_last_seen(rec.node_id);
                    let _ = shared::set_upstream_last_seen(&local, rec.node_id).await;
                }
                if tick % COPY_EVERY_TICKS == 0 {
                    if let Err(e) = nodes::witness_copy_node_records(primary, &mut local).await {
                        warn!("witness node-table copy failed: {e}");
                    }
                }
            }
        }
    }
}
