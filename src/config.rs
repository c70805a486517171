// src/config.rs

//! Manages uxmgr configuration: loading, validation, and defaults.
//!
//! The configuration file is TOML. Unknown keys produce warnings so a typo
//! never silently disables a feature; invalid values are errors and abort
//! with the bad-configuration exit code.

use crate::core::conninfo::ConnInfo;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::notify::NotificationSettings;
use crate::core::vip::{VipCommandConfig, VirtualAddress};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Failover handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMode {
    Manual,
    #[default]
    Automatic,
}

/// How the daemon probes its upstream each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionCheckType {
    #[default]
    Ping,
    Query,
    Connection,
}

/// Replication flavour; only physical streaming replication is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationType {
    #[default]
    Physical,
}

/// Node identity and cluster placement.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub node_id: i32,
    pub node_name: String,
    pub conninfo: String,
    pub data_directory: PathBuf,
    /// Path to the engine's main configuration file.
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_replication_user")]
    pub replication_user: String,
}

fn default_location() -> String {
    "default".to_string()
}
fn default_priority() -> i32 {
    100
}
fn default_replication_user() -> String {
    "uxrepl".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub replication_type: ReplicationType,
    #[serde(default)]
    pub use_replication_slots: bool,
}

/// Logging sink settings. Size-based rotation is handled by the sink
/// implementation; age-based rotation maps onto daily/hourly file cycling.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_facility")]
    pub log_facility: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub log_rotation_size: Option<u64>,
    #[serde(with = "humantime_serde", default = "default_log_rotation_age")]
    pub log_rotation_age: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_facility() -> String {
    "stderr".to_string()
}
fn default_log_rotation_age() -> Duration {
    Duration::from_secs(24 * 3600)
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_facility: default_log_facility(),
            log_file: None,
            log_rotation_size: None,
            log_rotation_age: default_log_rotation_age(),
        }
    }
}

/// Monitoring cadence and failover behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct FailoverConfig {
    #[serde(default)]
    pub failover: FailoverMode,
    #[serde(default)]
    pub promote_command: Option<String>,
    #[serde(default)]
    pub follow_command: Option<String>,
    #[serde(with = "humantime_serde", default = "default_monitor_interval")]
    pub monitor_interval: Duration,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(with = "humantime_serde", default = "default_reconnect_interval")]
    pub reconnect_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_degraded_monitoring_timeout")]
    pub degraded_monitoring_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_async_query_timeout")]
    pub async_query_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_promote_check_timeout")]
    pub promote_check_timeout: Duration,
    #[serde(default)]
    pub connection_check_type: ConnectionCheckType,
    #[serde(default)]
    pub primary_visibility_consensus: bool,
    #[serde(default = "default_monitoring_history")]
    pub monitoring_history: bool,
    #[serde(with = "humantime_serde", default = "default_monitoring_history_keep")]
    pub monitoring_history_keep: Duration,
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(2)
}
fn default_reconnect_attempts() -> u32 {
    6
}
fn default_reconnect_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_degraded_monitoring_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_async_query_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_promote_check_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_monitoring_history() -> bool {
    true
}
fn default_monitoring_history_keep() -> Duration {
    Duration::from_secs(24 * 3600)
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failover: FailoverMode::default(),
            promote_command: None,
            follow_command: None,
            monitor_interval: default_monitor_interval(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_interval: default_reconnect_interval(),
            degraded_monitoring_timeout: default_degraded_monitoring_timeout(),
            async_query_timeout: default_async_query_timeout(),
            promote_check_timeout: default_promote_check_timeout(),
            connection_check_type: ConnectionCheckType::default(),
            primary_visibility_consensus: false,
            monitoring_history: default_monitoring_history(),
            monitoring_history_keep: default_monitoring_history_keep(),
        }
    }
}

/// Warning/critical thresholds for `node check`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_archive_ready_warning")]
    pub archive_ready_warning: usize,
    #[serde(default = "default_archive_ready_critical")]
    pub archive_ready_critical: usize,
    /// Seconds of replication lag.
    #[serde(default = "default_replication_lag_warning")]
    pub replication_lag_warning: i64,
    #[serde(default = "default_replication_lag_critical")]
    pub replication_lag_critical: i64,
}

fn default_archive_ready_warning() -> usize {
    16
}
fn default_archive_ready_critical() -> usize {
    128
}
fn default_replication_lag_warning() -> i64 {
    300
}
fn default_replication_lag_critical() -> i64 {
    600
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            archive_ready_warning: default_archive_ready_warning(),
            archive_ready_critical: default_archive_ready_critical(),
            replication_lag_warning: default_replication_lag_warning(),
            replication_lag_critical: default_replication_lag_critical(),
        }
    }
}

/// Shell commands for engine service control.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub start_command: Option<String>,
    #[serde(default)]
    pub stop_command: Option<String>,
    #[serde(default)]
    pub restart_command: Option<String>,
    #[serde(default)]
    pub reload_command: Option<String>,
    #[serde(default)]
    pub promote_command: Option<String>,
}

/// Event-notification command settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventConfig {
    #[serde(default)]
    pub event_notification_command: Option<String>,
    /// When non-empty, only these event names are dispatched.
    #[serde(default)]
    pub event_notifications: Vec<String>,
}

impl EventConfig {
    pub fn notification_settings(&self) -> NotificationSettings {
        NotificationSettings {
            command: self.event_notification_command.clone(),
            event_allow_list: self.event_notifications.clone(),
        }
    }
}

/// Virtual-IP arbitration settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VipConfig {
    /// Addresses in CIDR form.
    #[serde(default)]
    pub virtual_ip: Vec<String>,
    #[serde(default)]
    pub network_card: Option<String>,
    /// Template for the gratuitous-ARP announcement; `%a` address, `%i`
    /// interface.
    #[serde(default)]
    pub arping_command: Option<String>,
    #[serde(default = "default_sudo_command")]
    pub sudo_command: String,
    #[serde(default)]
    pub sudo_password: Option<String>,
}

fn default_sudo_command() -> String {
    "sudo -n".to_string()
}

impl VipConfig {
    pub fn addresses(&self) -> Vec<VirtualAddress> {
        let Some(card) = &self.network_card else {
            return Vec::new();
        };
        self.virtual_ip
            .iter()
            .map(|address| VirtualAddress {
                address: address.clone(),
                interface: card.clone(),
            })
            .collect()
    }

    pub fn command_config(&self) -> VipCommandConfig {
        VipCommandConfig {
            arping_command: self.arping_command.clone(),
            sudo_command: self.sudo_command.clone(),
            sudo_password: self.sudo_password.clone(),
        }
    }
}

/// SSH transport settings for switchover and remote status checks.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_options")]
    pub ssh_options: String,
    #[serde(default)]
    pub ssh_password: Option<String>,
    #[serde(with = "humantime_serde", default = "default_ssh_timeout")]
    pub ssh_timeout: Duration,
}

fn default_ssh_options() -> String {
    "-o Batchmode=no -o ConnectTimeout=10".to_string()
}
fn default_ssh_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_options: default_ssh_options(),
            ssh_password: None,
            ssh_timeout: default_ssh_timeout(),
        }
    }
}

/// Daemon process bookkeeping.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/uxmgrd.pid")
}
fn default_state_file() -> PathBuf {
    PathBuf::from("/tmp/uxmgrd.state")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            state_file: default_state_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    node: NodeConfig,
    #[serde(default)]
    replication: ReplicationConfig,
    #[serde(default)]
    log: LogConfig,
    #[serde(default)]
    failover: FailoverConfig,
    #[serde(default)]
    thresholds: ThresholdConfig,
    #[serde(default)]
    service: ServiceConfig,
    #[serde(default)]
    events: EventConfig,
    #[serde(default)]
    vip: VipConfig,
    #[serde(default)]
    ssh: SshConfig,
    #[serde(default)]
    daemon: DaemonConfig,
}

/// The validated process-wide configuration. Immutable after load; a reload
/// replaces the whole structure atomically from the main loop.
#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub replication: ReplicationConfig,
    pub log: LogConfig,
    pub failover: FailoverConfig,
    pub thresholds: ThresholdConfig,
    pub service: ServiceConfig,
    pub events: EventConfig,
    pub vip: VipConfig,
    pub ssh: SshConfig,
    pub daemon: DaemonConfig,
}

impl Config {
    /// Reads and validates a configuration file, warning about unknown keys.
    pub fn from_file(path: &Path) -> UxMgrResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            UxMgrError::Config(format!("could not read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> UxMgrResult<Self> {
        let table: toml::Table = contents
            .parse()
            .map_err(|e| UxMgrError::Config(format!("could not parse configuration: {e}")))?;

        for key in unknown_keys(&table) {
            warn!("unknown configuration key \"{key}\"");
        }

        let raw: RawConfig = table
            .try_into()
            .map_err(|e| UxMgrError::Config(format!("invalid configuration: {e}")))?;

        let config = Config {
            node: raw.node,
            replication: raw.replication,
            log: raw.log,
            failover: raw.failover,
            thresholds: raw.thresholds,
            service: raw.service,
            events: raw.events,
            vip: raw.vip,
            ssh: raw.ssh,
            daemon: raw.daemon,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration for logical consistency.
    fn validate(&self) -> UxMgrResult<()> {
        if self.node.node_id < 1 {
            return Err(UxMgrError::Config("node_id must be a positive integer".into()));
        }
        if self.node.node_name.trim().is_empty() {
            return Err(UxMgrError::Config("node_name cannot be empty".into()));
        }
        if self.node.node_name.len() > 63 {
            return Err(UxMgrError::Config(
                "node_name exceeds 63 characters; it must fit application_name".into(),
            ));
        }
        if self.node.priority < 0 {
            return Err(UxMgrError::Config("priority cannot be negative".into()));
        }
        // Surface a malformed conninfo at load time instead of on first use.
        ConnInfo::parse(&self.node.conninfo)?;

        if self.failover.monitor_interval.is_zero() {
            return Err(UxMgrError::Config("monitor_interval cannot be 0".into()));
        }
        if self.failover.reconnect_attempts == 0 {
            return Err(UxMgrError::Config("reconnect_attempts cannot be 0".into()));
        }
        if self.failover.failover == FailoverMode::Automatic
            && self.failover.degraded_monitoring_timeout.is_zero()
        {
            return Err(UxMgrError::Config(
                "degraded_monitoring_timeout cannot be 0 with automatic failover".into(),
            ));
        }

        if self.thresholds.archive_ready_critical < self.thresholds.archive_ready_warning {
            return Err(UxMgrError::Config(
                "archive_ready_critical cannot be below archive_ready_warning".into(),
            ));
        }
        if self.thresholds.replication_lag_critical < self.thresholds.replication_lag_warning {
            return Err(UxMgrError::Config(
                "replication_lag_critical cannot be below replication_lag_warning".into(),
            ));
        }

        if !self.vip.virtual_ip.is_empty() && self.vip.network_card.is_none() {
            return Err(UxMgrError::Config(
                "virtual_ip requires network_card to be set".into(),
            ));
        }

        Ok(())
    }

    /// Parsed form of the local node's conninfo.
    pub fn local_conninfo(&self) -> ConnInfo {
        // Validated at load time.
        ConnInfo::parse(&self.node.conninfo).unwrap_or_default()
    }
}

const TOP_LEVEL_SECTIONS: &[&str] = &[
    "node",
    "replication",
    "log",
    "failover",
    "thresholds",
    "service",
    "events",
    "vip",
    "ssh",
    "daemon",
];

const SECTION_KEYS: &[(&str, &[&str])] = &[
    (
        "node",
        &[
            "node_id",
            "node_name",
            "conninfo",
            "data_directory",
            "config_file",
            "location",
            "priority",
            "replication_user",
        ],
    ),
    ("replication", &["replication_type", "use_replication_slots"]),
    (
        "log",
        &[
            "log_level",
            "log_facility",
            "log_file",
            "log_rotation_size",
            "log_rotation_age",
        ],
    ),
    (
        "failover",
        &[
            "failover",
            "promote_command",
            "follow_command",
            "monitor_interval",
            "reconnect_attempts",
            "reconnect_interval",
            "degraded_monitoring_timeout",
            "async_query_timeout",
            "promote_check_timeout",
            "connection_check_type",
            "primary_visibility_consensus",
            "monitoring_history",
            "monitoring_history_keep",
        ],
    ),
    (
        "thresholds",
        &[
            "archive_ready_warning",
            "archive_ready_critical",
            "replication_lag_warning",
            "replication_lag_critical",
        ],
    ),
    (
        "service",
        &[
            "start_command",
            "stop_command",
            "restart_command",
            "reload_command",
            "promote_command",
        ],
    ),
    (
        "events",
        &["event_notification_command", "event_notifications"],
    ),
    (
        "vip",
        &[
            "virtual_ip",
            "network_card",
            "arping_command",
            "sudo_command",
            "sudo_password",
        ],
    ),
    ("ssh", &["ssh_options", "ssh_password", "ssh_timeout"]),
    ("daemon", &["pid_file", "state_file"]),
];

/// Returns dotted paths of keys the configuration schema does not know.
pub fn unknown_keys(table: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    let sections: BTreeSet<&str> = TOP_LEVEL_SECTIONS.iter().copied().collect();

    for (key, value) in table {
        if !sections.contains(key.as_str()) {
            unknown.push(key.clone());
            continue;
        }
        let Some(known) = SECTION_KEYS
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, keys)| *keys)
        else {
            continue;
        };
        if let toml::Value::Table(inner) = value {
            for inner_key in inner.keys() {
                if !known.contains(&inner_key.as_str()) {
                    unknown.push(format!("{key}.{inner_key}"));
                }
            }
        }
    }
    unknown
}
