// src/core/catalog/shared.rs

//! SQL surface of the in-engine shared state segment.
//!
//! These wrappers call the `uxmgr` extension procedures over a session to
//! the target node. The procedure names, including the historical
//! `repmgrd_` prefix of the daemon-related ones, are stable across releases
//! and used over the network. The segment itself returns sentinels instead
//! of errors for uninitialised state; the wrappers translate those to
//! `Option` values.

use crate::core::conn::UxSession;
use crate::core::errors::UxMgrResult;

pub async fn set_local_node_id(sess: &UxSession, node_id: i32) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.set_local_node_id($1)", &[&node_id])
        .await?;
    Ok(())
}

pub async fn get_local_node_id(sess: &UxSession) -> UxMgrResult<Option<i32>> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.get_local_node_id()", &[])
        .await?;
    Ok(row.get(0))
}

/// Refreshes the "standby has reported in" timestamp on the local node.
pub async fn standby_set_last_updated(sess: &UxSession) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.standby_set_last_updated()", &[])
        .await?;
    Ok(())
}

pub async fn set_upstream_last_seen(sess: &UxSession, upstream_node_id: i32) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.set_upstream_last_seen($1)", &[&upstream_node_id])
        .await?;
    Ok(())
}

/// Seconds since the node last saw its upstream, `-1` when never seen.
pub async fn get_upstream_last_seen(sess: &UxSession) -> UxMgrResult<i64> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.get_upstream_last_seen()", &[])
        .await?;
    Ok(row.get::<_, Option<i64>>(0).unwrap_or(-1))
}

pub async fn get_upstream_node_id(sess: &UxSession) -> UxMgrResult<Option<i32>> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.get_upstream_node_id()", &[])
        .await?;
    Ok(row.get(0))
}

pub async fn set_upstream_node_id(sess: &UxSession, node_id: i32) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.set_upstream_node_id($1)", &[&node_id])
        .await?;
    Ok(())
}

/// Registers the daemon's PID and PID-file path in the shared segment.
pub async fn set_daemon_pid(
    sess: &UxSession,
    pid: i32,
    pidfile: Option<&str>,
) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.set_repmgrd_pid($1, $2)", &[&pid, &pidfile])
        .await?;
    Ok(())
}

pub async fn get_daemon_pid(sess: &UxSession) -> UxMgrResult<Option<i32>> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.get_repmgrd_pid()", &[])
        .await?;
    Ok(row.get(0))
}

/// Whether the registered daemon PID answers a null signal on that node.
pub async fn daemon_is_running(sess: &UxSession) -> UxMgrResult<bool> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.repmgrd_is_running()", &[])
        .await?;
    Ok(row.get::<_, Option<bool>>(0).unwrap_or(false))
}

pub async fn daemon_pause(sess: &UxSession, pause: bool) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.repmgrd_pause($1)", &[&pause])
        .await?;
    Ok(())
}

pub async fn daemon_is_paused(sess: &UxSession) -> UxMgrResult<Option<bool>> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.repmgrd_is_paused()", &[])
        .await?;
    Ok(row.get(0))
}

/// PID of the engine's WAL receiver process, when one is active.
pub async fn get_wal_receiver_pid(sess: &UxSession) -> UxMgrResult<Option<i32>> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.get_wal_receiver_pid()", &[])
        .await?;
    Ok(row.get(0))
}
