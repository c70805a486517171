// src/core/catalog/slots.rs

//! Physical replication-slot management.
//!
//! Two creation paths exist because early engine versions only allowed slot
//! creation over a replication channel. Both first check for an existing
//! slot: a physical, inactive slot of the right name is reused, anything
//! else of that name is an error.

use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use tracing::{debug, info};

/// Engine version from which `ux_create_physical_replication_slot` accepts
/// the immediate-reservation flag.
const SLOT_RESERVE_MIN_VERSION: i32 = 100000;

/// One row of the engine's replication-slot view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot_name: String,
    pub slot_type: String,
    pub active: bool,
}

/// Verification result for a named slot on the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCheck {
    /// Physical and inactive: attach to it as-is.
    ReuseOk,
    /// No slot of that name exists yet.
    Missing,
}

pub async fn get_slot(sess: &UxSession, slot_name: &str) -> UxMgrResult<Option<SlotInfo>> {
    let row = sess
        .client()
        .query_opt(
            "SELECT slot_name, slot_type, active FROM ux_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?;
    Ok(row.map(|r| SlotInfo {
        slot_name: r.get(0),
        slot_type: r.get(1),
        active: r.get(2),
    }))
}

/// All physical slots on a node, for the check and status surfaces.
pub async fn get_physical_slots(sess: &UxSession) -> UxMgrResult<Vec<SlotInfo>> {
    let rows = sess
        .client()
        .query(
            "SELECT slot_name, slot_type, active FROM ux_replication_slots \
             WHERE slot_type = 'physical' ORDER BY slot_name",
            &[],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|r| SlotInfo {
            slot_name: r.get(0),
            slot_type: r.get(1),
            active: r.get(2),
        })
        .collect())
}

/// Checks whether `slot_name` can serve this standby: reusable, missing, or
/// in a state that must not be attached to.
pub async fn verify_slot(sess: &UxSession, slot_name: &str) -> UxMgrResult<SlotCheck> {
    match get_slot(sess, slot_name).await? {
        None => Ok(SlotCheck::Missing),
        Some(slot) if slot.slot_type != "physical" => Err(UxMgrError::Protocol(format!(
            "slot \"{}\" exists but has type \"{}\"",
            slot_name, slot.slot_type
        ))),
        Some(slot) if slot.active => Err(UxMgrError::Protocol(format!(
            "slot \"{slot_name}\" exists but is active for another consumer"
        ))),
        Some(_) => {
            debug!("slot \"{slot_name}\" exists and is inactive, reusing");
            Ok(SlotCheck::ReuseOk)
        }
    }
}

/// Creates the slot through the SQL function, reserving WAL immediately on
/// engine versions that support it. Reuses a verified existing slot.
pub async fn create_slot_sql(
    sess: &UxSession,
    slot_name: &str,
    server_version_num: i32,
) -> UxMgrResult<()> {
    if verify_slot(sess, slot_name).await? == SlotCheck::ReuseOk {
        return Ok(());
    }
    if server_version_num >= SLOT_RESERVE_MIN_VERSION {
        sess.client()
            .execute(
                "SELECT ux_create_physical_replication_slot($1, TRUE)",
                &[&slot_name],
            )
            .await?;
    } else {
        sess.client()
            .execute(
                "SELECT ux_create_physical_replication_slot($1)",
                &[&slot_name],
            )
            .await?;
    }
    info!("created physical replication slot \"{slot_name}\"");
    Ok(())
}

/// Creates the slot over a replication-protocol session, for engine
/// versions whose SQL function is unavailable to replication roles.
pub async fn create_slot_replication_protocol(
    repl_sess: &UxSession,
    slot_name: &str,
) -> UxMgrResult<()> {
    if verify_slot_over_replication(repl_sess, slot_name).await? == SlotCheck::ReuseOk {
        return Ok(());
    }
    // Slot names are validated identifiers, not user-typed SQL.
    let cmd = format!("CREATE_REPLICATION_SLOT \"{slot_name}\" PHYSICAL RESERVE_WAL");
    repl_sess.client().simple_query(&cmd).await?;
    info!("created physical replication slot \"{slot_name}\" via replication protocol");
    Ok(())
}

/// `READ_REPLICATION_SLOT` is unavailable on the engine versions that need
/// this path; fall back to the view, which replication sessions may read.
async fn verify_slot_over_replication(
    repl_sess: &UxSession,
    slot_name: &str,
) -> UxMgrResult<SlotCheck> {
    let rows = repl_sess
        .client()
        .simple_query(&format!(
            "SELECT slot_type, active FROM ux_replication_slots WHERE slot_name = '{}'",
            slot_name.replace('\'', "''")
        ))
        .await?;
    for msg in rows {
        if let tokio_postgres::SimpleQueryMessage::Row(row) = msg {
            let slot_type = row.get(0).unwrap_or_default();
            let active = row.get(1) == Some("t");
            if slot_type != "physical" {
                return Err(UxMgrError::Protocol(format!(
                    "slot \"{slot_name}\" exists but has type \"{slot_type}\""
                )));
            }
            if active {
                return Err(UxMgrError::Protocol(format!(
                    "slot \"{slot_name}\" exists but is active for another consumer"
                )));
            }
            return Ok(SlotCheck::ReuseOk);
        }
    }
    Ok(SlotCheck::Missing)
}

pub async fn drop_slot(sess: &UxSession, slot_name: &str) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT ux_drop_replication_slot($1)", &[&slot_name])
        .await?;
    info!("dropped replication slot \"{slot_name}\"");
    Ok(())
}
