// src/core/catalog/events.rs

//! The append-only event log.
//!
//! Events double as the audit trail for notification commands. Recording is
//! best-effort everywhere: a failed insert is logged and swallowed, it must
//! never abort the action that produced the event.

use crate::core::conn::UxSession;
use crate::core::errors::UxMgrResult;
use crate::core::exec::EventTemplateContext;
use crate::core::notify::{self, NotificationSettings};
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::warn;

/// One row of `uxmgr.events`. Rows are never updated.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub node_id: i32,
    pub event_type: String,
    pub successful: bool,
    pub event_timestamp: DateTime<Utc>,
    pub details: String,
}

/// Inserts an event row and returns its server-side timestamp.
async fn insert_event(
    sess: &UxSession,
    node_id: i32,
    event_type: &str,
    successful: bool,
    details: &str,
) -> UxMgrResult<DateTime<Utc>> {
    let row = sess
        .client()
        .query_one(
            "INSERT INTO uxmgr.events (node_id, event_type, successful, details) \
             VALUES ($1, $2, $3, $4) RETURNING event_timestamp",
            &[&node_id, &event_type, &successful, &details],
        )
        .await?;
    Ok(row.get(0))
}

/// Records an event and dispatches the configured notification command.
///
/// Never fails: on insert failure the notification still runs with the
/// local clock as the event timestamp, and the error is only logged.
pub async fn record_event(
    sess: &UxSession,
    settings: &NotificationSettings,
    node_id: i32,
    node_name: &str,
    event_type: &str,
    successful: bool,
    details: &str,
) {
    record_event_ext(
        sess, settings, node_id, node_name, event_type, successful, details, None, None,
    )
    .await;
}

/// Variant carrying the optional conninfo and auxiliary-node template
/// parameters (`%c`, `%p`).
#[allow(clippy::too_many_arguments)]
pub async fn record_event_ext(
    sess: &UxSession,
    settings: &NotificationSettings,
    node_id: i32,
    node_name: &str,
    event_type: &str,
    successful: bool,
    details: &str,
    conninfo: Option<&str>,
    peer_node_id: Option<i32>,
) {
    let timestamp = match insert_event(sess, node_id, event_type, successful, details).await {
        Ok(ts) => ts,
        Err(e) => {
            warn!("could not record \"{event_type}\" event for node {node_id}: {e}");
            Utc::now()
        }
    };

    let ctx = EventTemplateContext {
        node_id,
        node_name: node_name.to_string(),
        event: event_type.to_string(),
        details: details.to_string(),
        successful,
        timestamp: timestamp.format("%Y-%m-%d %H:%M:%S%:z").to_string(),
        conninfo: conninfo.map(str::to_string),
        peer_node_id,
    };
    notify::dispatch(settings, &ctx).await;
}

fn event_from_row(row: &Row) -> EventRecord {
    EventRecord {
        node_id: row.get("node_id"),
        event_type: row.get("event_type"),
        successful: row.get("successful"),
        event_timestamp: row.get("event_timestamp"),
        details: row.get::<_, Option<String>>("details").unwrap_or_default(),
    }
}

/// Most recent events, newest first, optionally filtered by node and type.
pub async fn get_events(
    sess: &UxSession,
    node_id: Option<i32>,
    event_type: Option<&str>,
    limit: i64,
) -> UxMgrResult<Vec<EventRecord>> {
    let mut sql = String::from(
        "SELECT node_id, event_type, successful, event_timestamp, details FROM uxmgr.events",
    );
    let mut clauses = Vec::new();
    if node_id.is_some() {
        clauses.push("node_id = $1");
    }
    if event_type.is_some() {
        clauses.push(if node_id.is_some() {
            "event_type = $2"
        } else {
            "event_type = $1"
        });
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY event_timestamp DESC LIMIT ");
    sql.push_str(&limit.to_string());

    let rows = match (node_id, event_type) {
        (Some(id), Some(ty)) => sess.client().query(&sql, &[&id, &ty]).await?,
        (Some(id), None) => sess.client().query(&sql, &[&id]).await?,
        (None, Some(ty)) => sess.client().query(&sql, &[&ty]).await?,
        (None, None) => sess.client().query(&sql, &[]).await?,
    };
    Ok(rows.iter().map(event_from_row).collect())
}
