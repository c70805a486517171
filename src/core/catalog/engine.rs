// src/core/catalog/engine.rs

//! Queries and control calls against the engine itself (as opposed to the
//! `uxmgr` schema): recovery state, WAL positions, attached standbys, and
//! promotion.

use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::lsn::Lsn;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Engine version from which promotion is available as a SQL procedure
/// instead of the signal-based control tool.
pub const PROMOTE_PROCEDURE_MIN_VERSION: i32 = 120000;

/// Point-in-time replication view of one node, refreshed every monitor
/// tick. Lives only in memory.
#[derive(Debug, Clone)]
pub struct ReplicationInfo {
    pub now: DateTime<Utc>,
    pub in_recovery: bool,
    pub timeline_id: u32,
    pub last_wal_receive_lsn: Option<Lsn>,
    pub last_wal_replay_lsn: Option<Lsn>,
    pub last_xact_replay_timestamp: Option<DateTime<Utc>>,
    pub replication_lag_secs: i64,
    pub receiving_streamed_wal: bool,
    pub wal_replay_paused: bool,
    /// Seconds since the local daemon last saw its upstream; `-1` when
    /// never. Filled in from the shared segment, not from this query.
    pub upstream_last_seen: i64,
    pub upstream_node_id: i32,
}

fn parse_lsn_text(v: Option<String>) -> UxMgrResult<Option<Lsn>> {
    v.map(|s| Lsn::from_str(&s)).transpose()
}

/// Fetches the SQL-derived portion of [`ReplicationInfo`].
pub async fn get_replication_info(sess: &UxSession) -> UxMgrResult<ReplicationInfo> {
    let row = sess
        .client()
        .query_one(
            "SELECT current_timestamp AS now, \
                    ux_is_in_recovery() AS in_recovery, \
                    (ux_control_checkpoint()).timeline_id::bigint AS timeline_id, \
                    ux_last_wal_receive_lsn()::text AS receive_lsn, \
                    ux_last_wal_replay_lsn()::text AS replay_lsn, \
                    ux_last_xact_replay_timestamp() AS last_xact_ts, \
                    CASE WHEN ux_is_in_recovery() AND ux_last_xact_replay_timestamp() IS NOT NULL \
                         THEN floor(extract(epoch FROM current_timestamp - ux_last_xact_replay_timestamp()))::bigint \
                         ELSE 0 END AS lag_secs, \
                    EXISTS (SELECT 1 FROM ux_stat_wal_receiver WHERE status = 'streaming') \
                        AS receiving, \
                    CASE WHEN ux_is_in_recovery() THEN ux_is_wal_replay_paused() ELSE FALSE END \
                        AS replay_paused",
            &[],
        )
        .await?;

    Ok(ReplicationInfo {
        now: row.get("now"),
        in_recovery: row.get("in_recovery"),
        timeline_id: row.get::<_, i64>("timeline_id") as u32,
        last_wal_receive_lsn: parse_lsn_text(row.get("receive_lsn"))?,
        last_wal_replay_lsn: parse_lsn_text(row.get("replay_lsn"))?,
        last_xact_replay_timestamp: row.get("last_xact_ts"),
        replication_lag_secs: row.get("lag_secs"),
        receiving_streamed_wal: row.get("receiving"),
        wal_replay_paused: row.get("replay_paused"),
        upstream_last_seen: -1,
        upstream_node_id: -1,
    })
}

pub async fn is_in_recovery(sess: &UxSession) -> UxMgrResult<bool> {
    let row = sess
        .client()
        .query_one("SELECT ux_is_in_recovery()", &[])
        .await?;
    Ok(row.get(0))
}

/// Current WAL write position; only meaningful on a primary.
pub async fn get_current_wal_lsn(sess: &UxSession) -> UxMgrResult<Lsn> {
    let row = sess
        .client()
        .query_one("SELECT ux_current_wal_lsn()::text", &[])
        .await?;
    let text: String = row.get(0);
    Lsn::from_str(&text)
}

pub async fn get_last_wal_receive_lsn(sess: &UxSession) -> UxMgrResult<Option<Lsn>> {
    let row = sess
        .client()
        .query_one("SELECT ux_last_wal_receive_lsn()::text", &[])
        .await?;
    parse_lsn_text(row.get(0))
}

pub async fn get_server_version_num(sess: &UxSession) -> UxMgrResult<i32> {
    let row = sess
        .client()
        .query_one("SELECT current_setting('server_version_num')::int", &[])
        .await?;
    Ok(row.get(0))
}

pub async fn get_data_directory_setting(sess: &UxSession) -> UxMgrResult<String> {
    let row = sess
        .client()
        .query_one("SELECT current_setting('data_directory')", &[])
        .await?;
    Ok(row.get(0))
}

/// `application_name`s of standbys currently attached to this node.
pub async fn get_attached_standby_names(sess: &UxSession) -> UxMgrResult<Vec<String>> {
    let rows = sess
        .client()
        .query(
            "SELECT application_name FROM ux_stat_replication ORDER BY application_name",
            &[],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

/// Whether a standby named `application_name` is attached and streaming.
pub async fn standby_is_attached(sess: &UxSession, application_name: &str) -> UxMgrResult<bool> {
    let row = sess
        .client()
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM ux_stat_replication \
             WHERE application_name = $1 AND state = 'streaming')",
            &[&application_name],
        )
        .await?;
    Ok(row.get(0))
}

/// Issues a CHECKPOINT; requires a superuser session.
pub async fn request_checkpoint(sess: &UxSession) -> UxMgrResult<()> {
    sess.client().batch_execute("CHECKPOINT").await?;
    Ok(())
}

/// Asks the engine to leave recovery via the promotion procedure.
/// `ux_promote(wait := false)` returns immediately; the caller polls.
pub async fn promote_sql(sess: &UxSession) -> UxMgrResult<()> {
    let row = sess
        .client()
        .query_one("SELECT ux_promote(FALSE)", &[])
        .await?;
    let accepted: bool = row.get(0);
    if !accepted {
        return Err(UxMgrError::Protocol(
            "engine rejected the promotion request".to_string(),
        ));
    }
    Ok(())
}

/// Polls until recovery ends or the timeout elapses. Returns `true` when
/// the node left recovery.
pub async fn wait_for_promotion(sess: &UxSession, timeout: Duration) -> UxMgrResult<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match is_in_recovery(sess).await {
            Ok(false) => return Ok(true),
            Ok(true) => {}
            // The engine briefly refuses connections mid-promotion.
            Err(e) => debug!("recovery-state probe failed while promoting: {e}"),
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("node still in recovery after {timeout:?}");
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

pub async fn wal_replay_pause(sess: &UxSession) -> UxMgrResult<()> {
    sess.client()
        .batch_execute("SELECT ux_wal_replay_pause()")
        .await?;
    Ok(())
}

pub async fn wal_replay_resume(sess: &UxSession) -> UxMgrResult<()> {
    sess.client()
        .batch_execute("SELECT ux_wal_replay_resume()")
        .await?;
    Ok(())
}

/// Receive positions reported by `ux_stat_replication`, keyed by
/// `application_name`; the failover engine compares these across siblings.
pub async fn get_standby_receive_lsns(sess: &UxSession) -> UxMgrResult<Vec<(String, Lsn)>> {
    let rows = sess
        .client()
        .query(
            "SELECT application_name, COALESCE(flush_lsn, write_lsn)::text \
             FROM ux_stat_replication",
            &[],
        )
        .await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row.get(0);
        let lsn_text: Option<String> = row.get(1);
        if let Some(lsn) = parse_lsn_text(lsn_text)? {
            out.push((name, lsn));
        }
    }
    Ok(out)
}
