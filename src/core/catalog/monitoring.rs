// src/core/catalog/monitoring.rs

//! Per-standby heartbeat records in `uxmgr.monitoring_history`.

use crate::core::conn::UxSession;
use crate::core::errors::UxMgrResult;
use crate::core::lsn::Lsn;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One monitoring heartbeat, written by a standby into the primary's
/// catalog every monitor tick.
#[derive(Debug, Clone)]
pub struct MonitoringRecord {
    pub primary_node_id: i32,
    pub standby_node_id: i32,
    pub last_monitor_time: DateTime<Utc>,
    pub last_apply_time: Option<DateTime<Utc>>,
    pub primary_location: Lsn,
    pub standby_location: Option<Lsn>,
    /// Bytes the standby's receive position trails the primary.
    pub replication_lag_bytes: u64,
    /// Bytes the standby's replay position trails its receive position.
    pub apply_lag_bytes: u64,
}

impl MonitoringRecord {
    /// Derives the byte-valued lags from the three WAL positions.
    pub fn lag_from_positions(
        primary_location: Lsn,
        receive_location: Option<Lsn>,
        replay_location: Option<Lsn>,
    ) -> (u64, u64) {
        let replication_lag = receive_location
            .map(|recv| primary_location.bytes_since(recv))
            .unwrap_or_else(|| u64::from(primary_location));
        let apply_lag = match (receive_location, replay_location) {
            (Some(recv), Some(replay)) => recv.bytes_since(replay),
            _ => 0,
        };
        (replication_lag, apply_lag)
    }
}

/// Appends one heartbeat. Runs on the upstream session so the record lands
/// in the primary's catalog.
pub async fn write_monitoring_record(
    upstream: &UxSession,
    record: &MonitoringRecord,
) -> UxMgrResult<()> {
    upstream
        .client()
        .execute(
            "INSERT INTO uxmgr.monitoring_history \
             (primary_node_id, standby_node_id, last_monitor_time, last_apply_time, \
              last_wal_primary_location, last_wal_standby_location, replication_lag, apply_lag) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &record.primary_node_id,
                &record.standby_node_id,
                &record.last_monitor_time,
                &record.last_apply_time,
                &record.primary_location.to_string(),
                &record.standby_location.map(|l| l.to_string()),
                &(record.replication_lag_bytes as i64),
                &(record.apply_lag_bytes as i64),
            ],
        )
        .await?;
    Ok(())
}

/// Deletes heartbeats older than `keep`. Returns the number removed.
pub async fn purge_monitoring_history(sess: &UxSession, keep: Duration) -> UxMgrResult<u64> {
    let keep_secs = keep.as_secs() as f64;
    let n = sess
        .client()
        .execute(
            "DELETE FROM uxmgr.monitoring_history \
             WHERE last_monitor_time < current_timestamp - make_interval(secs => $1)",
            &[&keep_secs],
        )
        .await?;
    Ok(n)
}
