// src/core/catalog/nodes.rs

//! Read and write operations on the `uxmgr.nodes` table.

use super::{NodeRecord, NodeType};
use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use std::str::FromStr;
use tokio_postgres::Row;
use tracing::{debug, warn};

const NODE_COLUMNS: &str = "node_id, type, upstream_node_id, node_name, conninfo, repluser, \
     slot_name, location, priority, active, config_file, virtual_ip, network_card";

fn record_from_row(row: &Row) -> UxMgrResult<NodeRecord> {
    let type_str: String = row.try_get("type").map_err(map_row_err)?;
    Ok(NodeRecord {
        node_id: row.try_get("node_id").map_err(map_row_err)?,
        node_type: NodeType::from_str(&type_str).unwrap_or(NodeType::Unknown),
        upstream_node_id: row.try_get("upstream_node_id").map_err(map_row_err)?,
        node_name: row.try_get("node_name").map_err(map_row_err)?,
        conninfo: row.try_get("conninfo").map_err(map_row_err)?,
        repluser: row.try_get("repluser").map_err(map_row_err)?,
        slot_name: row.try_get("slot_name").map_err(map_row_err)?,
        location: row.try_get("location").map_err(map_row_err)?,
        priority: row.try_get("priority").map_err(map_row_err)?,
        active: row.try_get("active").map_err(map_row_err)?,
        config_file: row.try_get("config_file").map_err(map_row_err)?,
        virtual_ip: row.try_get("virtual_ip").map_err(map_row_err)?,
        network_card: row.try_get("network_card").map_err(map_row_err)?,
    })
}

fn map_row_err(e: tokio_postgres::Error) -> UxMgrError {
    UxMgrError::Query(format!("malformed nodes row: {e}"))
}

/// Fetches one node record. `Ok(None)` means the row does not exist.
pub async fn get_node_record(sess: &UxSession, node_id: i32) -> UxMgrResult<Option<NodeRecord>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM uxmgr.nodes WHERE node_id = $1");
    let row = sess.client().query_opt(&sql, &[&node_id]).await?;
    row.as_ref().map(record_from_row).transpose()
}

pub async fn get_node_record_by_name(
    sess: &UxSession,
    node_name: &str,
) -> UxMgrResult<Option<NodeRecord>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM uxmgr.nodes WHERE node_name = $1");
    let row = sess.client().query_opt(&sql, &[&node_name]).await?;
    row.as_ref().map(record_from_row).transpose()
}

/// All node records, ordered by id.
pub async fn get_all_node_records(sess: &UxSession) -> UxMgrResult<Vec<NodeRecord>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM uxmgr.nodes ORDER BY node_id");
    let rows = sess.client().query(&sql, &[]).await?;
    rows.iter().map(record_from_row).collect()
}

/// The record with `type = primary AND active`, if any.
pub async fn get_primary_node_record(sess: &UxSession) -> UxMgrResult<Option<NodeRecord>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM uxmgr.nodes WHERE type = 'primary' AND active IS TRUE"
    );
    let row = sess.client().query_opt(&sql, &[]).await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Records whose upstream is `upstream_id`, ordered by id.
pub async fn get_downstream_node_records(
    sess: &UxSession,
    upstream_id: i32,
) -> UxMgrResult<Vec<NodeRecord>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM uxmgr.nodes WHERE upstream_node_id = $1 ORDER BY node_id"
    );
    let rows = sess.client().query(&sql, &[&upstream_id]).await?;
    rows.iter().map(record_from_row).collect()
}

/// Active records sharing `upstream_id`, excluding the caller itself.
pub async fn get_active_sibling_node_records(
    sess: &UxSession,
    self_id: i32,
    upstream_id: i32,
) -> UxMgrResult<Vec<NodeRecord>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM uxmgr.nodes \
         WHERE upstream_node_id = $1 AND node_id != $2 AND active IS TRUE \
         ORDER BY node_id"
    );
    let rows = sess.client().query(&sql, &[&upstream_id, &self_id]).await?;
    rows.iter().map(record_from_row).collect()
}

/// `INSERT` and `UPDATE` share the same parameter shape; only the statement
/// differs.
pub async fn create_node_record(sess: &UxSession, record: &NodeRecord) -> UxMgrResult<()> {
    let sql = "INSERT INTO uxmgr.nodes \
               (node_id, type, upstream_node_id, node_name, conninfo, repluser, \
                slot_name, location, priority, active, config_file, virtual_ip, network_card) \
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";
    write_node_record(sess, record, sql).await
}

pub async fn update_node_record(sess: &UxSession, record: &NodeRecord) -> UxMgrResult<()> {
    let sql = "UPDATE uxmgr.nodes SET \
               node_id = $1, type = $2, upstream_node_id = $3, node_name = $4, \
               conninfo = $5, repluser = $6, slot_name = $7, location = $8, \
               priority = $9, active = $10, config_file = $11, virtual_ip = $12, \
               network_card = $13 \
               WHERE node_id = $1";
    write_node_record(sess, record, sql).await
}

async fn write_node_record(sess: &UxSession, record: &NodeRecord, sql: &str) -> UxMgrResult<()> {
    if record.upstream_node_id == Some(record.node_id) {
        return Err(UxMgrError::Consistency(format!(
            "node {} cannot be its own upstream",
            record.node_id
        )));
    }
    let type_str = record.node_type.to_string();
    let n = sess
        .client()
        .execute(
            sql,
            &[
                &record.node_id,
                &type_str,
                &record.upstream_node_id,
                &record.node_name,
                &record.conninfo,
                &record.repluser,
                &record.slot_name,
                &record.location,
                &record.priority,
                &record.active,
                &record.config_file,
                &record.virtual_ip,
                &record.network_card,
            ],
        )
        .await?;
    if n == 0 {
        return Err(UxMgrError::NotFound(format!(
            "node {} not present in catalog",
            record.node_id
        )));
    }
    Ok(())
}

/// Marks `node_id` as the active primary.
///
/// The two statements run in one transaction: any previously active primary
/// is deactivated first, then the new row is flipped, so no commit boundary
/// ever exposes two active primaries. Rolls back on any failure.
pub async fn update_node_record_set_primary(sess: &mut UxSession, node_id: i32) -> UxMgrResult<()> {
    let txn = sess.client_mut().transaction().await?;
    txn.execute(
        "UPDATE uxmgr.nodes SET active = FALSE \
         WHERE type = 'primary' AND active IS TRUE AND node_id != $1",
        &[&node_id],
    )
    .await?;
    let n = txn
        .execute(
            "UPDATE uxmgr.nodes SET type = 'primary', upstream_node_id = NULL, active = TRUE \
             WHERE node_id = $1",
            &[&node_id],
        )
        .await?;
    if n == 0 {
        // Dropping the transaction rolls it back.
        return Err(UxMgrError::NotFound(format!(
            "node {node_id} not present in catalog"
        )));
    }
    txn.commit().await?;
    debug!("node {node_id} published as active primary");
    Ok(())
}

pub async fn update_node_record_set_upstream(
    sess: &UxSession,
    node_id: i32,
    upstream_node_id: i32,
) -> UxMgrResult<()> {
    if node_id == upstream_node_id {
        return Err(UxMgrError::Consistency(format!(
            "node {node_id} cannot be its own upstream"
        )));
    }
    let n = sess
        .client()
        .execute(
            "UPDATE uxmgr.nodes SET upstream_node_id = $2 WHERE node_id = $1",
            &[&node_id, &upstream_node_id],
        )
        .await?;
    if n == 0 {
        return Err(UxMgrError::NotFound(format!(
            "node {node_id} not present in catalog"
        )));
    }
    Ok(())
}

pub async fn update_node_record_set_active(
    sess: &UxSession,
    node_id: i32,
    active: bool,
) -> UxMgrResult<()> {
    sess.client()
        .execute(
            "UPDATE uxmgr.nodes SET active = $2 WHERE node_id = $1",
            &[&node_id, &active],
        )
        .await?;
    Ok(())
}

/// Demotes a former primary's row to standby under the given upstream.
pub async fn update_node_record_set_standby(
    sess: &UxSession,
    node_id: i32,
    upstream_node_id: i32,
) -> UxMgrResult<()> {
    sess.client()
        .execute(
            "UPDATE uxmgr.nodes SET type = 'standby', upstream_node_id = $2, active = TRUE \
             WHERE node_id = $1",
            &[&node_id, &upstream_node_id],
        )
        .await?;
    Ok(())
}

pub async fn delete_node_record(sess: &UxSession, node_id: i32) -> UxMgrResult<()> {
    let n = sess
        .client()
        .execute("DELETE FROM uxmgr.nodes WHERE node_id = $1", &[&node_id])
        .await?;
    if n == 0 {
        return Err(UxMgrError::NotFound(format!(
            "node {node_id} not present in catalog"
        )));
    }
    Ok(())
}

/// Replaces the witness-side copy of the nodes table with the primary's.
///
/// Constraints are deferred, the local table truncated and repopulated
/// inside one transaction; any failure rolls the whole copy back.
pub async fn witness_copy_node_records(
    primary: &UxSession,
    witness: &mut UxSession,
) -> UxMgrResult<()> {
    let records = get_all_node_records(primary).await?;

    let txn = witness.client_mut().transaction().await?;
    txn.batch_execute("SET CONSTRAINTS ALL DEFERRED; TRUNCATE TABLE uxmgr.nodes")
        .await?;
    let insert = "INSERT INTO uxmgr.nodes \
                  (node_id, type, upstream_node_id, node_name, conninfo, repluser, \
                   slot_name, location, priority, active, config_file, virtual_ip, network_card) \
                  VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";
    for record in &records {
        let type_str = record.node_type.to_string();
        txn.execute(
            insert,
            &[
                &record.node_id,
                &type_str,
                &record.upstream_node_id,
                &record.node_name,
                &record.conninfo,
                &record.repluser,
                &record.slot_name,
                &record.location,
                &record.priority,
                &record.active,
                &record.config_file,
                &record.virtual_ip,
                &record.network_card,
            ],
        )
        .await?;
    }
    txn.commit().await?;
    debug!("copied {} node records to witness", records.len());
    Ok(())
}

/// Installs the catalog schema on a freshly registered primary. Safe to run
/// repeatedly.
pub async fn install_catalog(sess: &UxSession) -> UxMgrResult<()> {
    let ddl = "\
        CREATE SCHEMA IF NOT EXISTS uxmgr;
        CREATE TABLE IF NOT EXISTS uxmgr.nodes (
            node_id          INTEGER PRIMARY KEY,
            type             TEXT NOT NULL,
            upstream_node_id INTEGER,
            node_name        TEXT NOT NULL,
            conninfo         TEXT NOT NULL,
            repluser         TEXT NOT NULL,
            slot_name        TEXT,
            location         TEXT NOT NULL DEFAULT 'default',
            priority         INTEGER NOT NULL DEFAULT 100,
            active           BOOLEAN NOT NULL DEFAULT TRUE,
            config_file      TEXT NOT NULL,
            virtual_ip       TEXT,
            network_card     TEXT
        );
        CREATE TABLE IF NOT EXISTS uxmgr.events (
            node_id          INTEGER,
            event_type       TEXT NOT NULL,
            successful       BOOLEAN NOT NULL DEFAULT TRUE,
            event_timestamp  TIMESTAMPTZ NOT NULL DEFAULT current_timestamp,
            details          TEXT
        );
        CREATE TABLE IF NOT EXISTS uxmgr.monitoring_history (
            primary_node_id            INTEGER NOT NULL,
            standby_node_id            INTEGER NOT NULL,
            last_monitor_time          TIMESTAMPTZ NOT NULL,
            last_apply_time            TIMESTAMPTZ,
            last_wal_primary_location  TEXT NOT NULL,
            last_wal_standby_location  TEXT,
            replication_lag            BIGINT NOT NULL DEFAULT 0,
            apply_lag                  BIGINT NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS uxmgr.voting_term (
            term BIGINT NOT NULL
        );";
    sess.client().batch_execute(ddl).await?;
    warn_if_missing_extension(sess).await;
    Ok(())
}

/// The shared-state procedures come from the preloaded extension; a missing
/// extension degrades the daemon to manual failover, so say so early.
async fn warn_if_missing_extension(sess: &UxSession) {
    let probe = sess
        .client()
        .query_opt(
            "SELECT 1 FROM ux_proc p JOIN ux_namespace n ON n.oid = p.pronamespace \
             WHERE n.nspname = 'uxmgr' AND p.proname = 'set_local_node_id'",
            &[],
        )
        .await;
    match probe {
        Ok(Some(_)) => {}
        Ok(None) => warn!(
            "uxmgr extension procedures not found; is the extension preloaded on this node?"
        ),
        Err(e) => debug!("could not probe for extension procedures: {e}"),
    }
}
