// src/core/catalog/mod.rs

//! Typed access to the replication manager's catalog.
//!
//! The catalog lives inside the primary database in the `uxmgr` schema and
//! reaches standbys through the engine's own WAL stream. Every catalog
//! mutation in the whole program goes through this layer; free-form strings
//! are always passed as statement parameters.

pub mod engine;
pub mod events;
pub mod monitoring;
pub mod nodes;
pub mod shared;
pub mod slots;
pub mod voting;

use strum_macros::{Display, EnumString};

/// Role a node record declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "lowercase")]
pub enum NodeType {
    Primary,
    Standby,
    Witness,
    #[default]
    Unknown,
}

/// The authoritative row describing one node, as stored in `uxmgr.nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeRecord {
    /// Cluster-unique and never reassigned.
    pub node_id: i32,
    pub node_type: NodeType,
    /// Required and non-self for standbys, absent for primaries, optional
    /// for witnesses.
    pub upstream_node_id: Option<i32>,
    /// Unique across the cluster; streaming attachment checks rely on it
    /// via `application_name`.
    pub node_name: String,
    pub conninfo: String,
    pub repluser: String,
    /// When set, equals the deterministic encoding of `node_id`.
    pub slot_name: Option<String>,
    /// Failure-domain grouping used during election tie-breaking.
    pub location: String,
    /// Zero disables the node as a promotion candidate.
    pub priority: i32,
    /// Inactive rows are ignored by election and status aggregation.
    pub active: bool,
    pub config_file: String,
    pub virtual_ip: Option<String>,
    pub network_card: Option<String>,
}

impl NodeRecord {
    pub fn is_promotion_candidate(&self) -> bool {
        self.active && self.priority > 0 && self.node_type == NodeType::Standby
    }

    /// Deterministic slot-name encoding of a node id. The `repmgr_` prefix
    /// is retained for compatibility with clusters provisioned by the
    /// legacy tooling.
    pub fn slot_name_for(node_id: i32) -> String {
        format!("repmgr_slot_{node_id}")
    }
}

/// Well-known event names written to the event log. The daemon-era names
/// keep their historical `repmgrd_` prefix; they are part of the catalog's
/// wire surface.
pub mod event_names {
    pub const PRIMARY_REGISTER: &str = "primary_register";
    pub const PRIMARY_UNREGISTER: &str = "primary_unregister";
    pub const STANDBY_REGISTER: &str = "standby_register";
    pub const STANDBY_UNREGISTER: &str = "standby_unregister";
    pub const STANDBY_CLONE: &str = "standby_clone";
    pub const STANDBY_PROMOTE: &str = "standby_promote";
    pub const STANDBY_FOLLOW: &str = "standby_follow";
    pub const STANDBY_FOLLOW_PENDING: &str = "standby_follow_pending";
    pub const STANDBY_SWITCHOVER: &str = "standby_switchover";
    pub const WITNESS_REGISTER: &str = "witness_register";
    pub const WITNESS_UNREGISTER: &str = "witness_unregister";
    pub const NODE_REJOIN: &str = "node_rejoin";
    pub const DAEMON_START: &str = "repmgrd_start";
    pub const DAEMON_SHUTDOWN: &str = "repmgrd_shutdown";
    pub const DAEMON_RELOAD: &str = "repmgrd_reload";
    pub const DAEMON_FAILOVER_PROMOTE: &str = "repmgrd_failover_promote";
    pub const DAEMON_FAILOVER_FOLLOW: &str = "repmgrd_failover_follow";
    pub const DAEMON_FAILOVER_ABORT: &str = "repmgrd_failover_abort";
    pub const DAEMON_STANDBY_DISCONNECT: &str = "repmgrd_upstream_disconnect";
    pub const DAEMON_STANDBY_RECONNECT: &str = "repmgrd_upstream_reconnect";
    pub const DAEMON_SLOT_MISSING: &str = "repmgrd_slot_missing";
    pub const DAEMON_SLOT_RESTORED: &str = "repmgrd_slot_restored";
}
