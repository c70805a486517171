use std::time::Duration;
use uxmgr::config::{Config, ConnectionCheckType, FailoverMode, unknown_keys};

const MINIMAL: &str = r#"
[node]
node_id = 2
node_name = "node2"
conninfo = "host=node2 port=5432 dbname=uxdb user=uxmgr"
data_directory = "/var/lib/uxsinodb/data"
"#;

#[test]
fn test_minimal_config_gets_defaults() {
    let config = Config::from_toml_str(MINIMAL).unwrap();
    assert_eq!(config.node.node_id, 2);
    assert_eq!(config.node.location, "default");
    assert_eq!(config.node.priority, 100);
    assert_eq!(config.failover.failover, FailoverMode::Automatic);
    assert_eq!(config.failover.monitor_interval, Duration::from_secs(2));
    assert_eq!(config.failover.reconnect_attempts, 6);
    assert_eq!(config.failover.connection_check_type, ConnectionCheckType::Ping);
    assert_eq!(config.thresholds.archive_ready_warning, 16);
    assert_eq!(config.thresholds.archive_ready_critical, 128);
    assert!(!config.replication.use_replication_slots);
    assert_eq!(config.log.log_level, "info");
}

#[test]
fn test_full_config_parses() {
    let toml = r#"
[node]
node_id = 1
node_name = "node1"
conninfo = "host=node1 dbname=uxdb user=uxmgr"
data_directory = "/data"
location = "dc-west"
priority = 150
replication_user = "replicator"

[replication]
use_replication_slots = true

[failover]
failover = "manual"
monitor_interval = "5s"
reconnect_attempts = 3
reconnect_interval = "15s"
degraded_monitoring_timeout = "2m"
connection_check_type = "query"
primary_visibility_consensus = true

[thresholds]
archive_ready_warning = 10
archive_ready_critical = 50

[service]
start_command = "systemctl start uxsinodb"
stop_command = "systemctl stop uxsinodb"

[events]
event_notification_command = "/bin/send --node=%n --event=%e"
event_notifications = ["standby_promote", "repmgrd_failover_promote"]

[vip]
virtual_ip = ["192.0.2.10/24"]
network_card = "eth0"
arping_command = "arping -U -I %i %a"

[daemon]
pid_file = "/run/uxmgrd.pid"
state_file = "/run/uxmgrd.state"
"#;
    let config = Config::from_toml_str(toml).unwrap();
    assert_eq!(config.node.location, "dc-west");
    assert_eq!(config.failover.failover, FailoverMode::Manual);
    assert_eq!(config.failover.monitor_interval, Duration::from_secs(5));
    assert_eq!(
        config.failover.degraded_monitoring_timeout,
        Duration::from_secs(120)
    );
    assert_eq!(config.failover.connection_check_type, ConnectionCheckType::Query);
    assert!(config.failover.primary_visibility_consensus);
    assert_eq!(config.thresholds.archive_ready_warning, 10);
    assert_eq!(config.vip.addresses().len(), 1);
    assert_eq!(config.vip.addresses()[0].interface, "eth0");
    assert_eq!(
        config.events.event_notifications,
        vec!["standby_promote", "repmgrd_failover_promote"]
    );
}

#[test]
fn test_missing_node_section_is_error() {
    assert!(Config::from_toml_str("[log]\nlog_level = \"debug\"").is_err());
}

#[test]
fn test_malformed_conninfo_is_rejected_at_load() {
    let toml = MINIMAL.replace("host=node2 port=5432 dbname=uxdb user=uxmgr", "host node2");
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn test_negative_priority_is_rejected() {
    let toml = format!("{MINIMAL}priority = -1\n");
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn test_zero_monitor_interval_is_rejected() {
    let toml = format!("{MINIMAL}\n[failover]\nmonitor_interval = \"0s\"\n");
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn test_inverted_thresholds_are_rejected() {
    let toml = format!(
        "{MINIMAL}\n[thresholds]\narchive_ready_warning = 50\narchive_ready_critical = 10\n"
    );
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn test_vip_without_interface_is_rejected() {
    let toml = format!("{MINIMAL}\n[vip]\nvirtual_ip = [\"192.0.2.10/24\"]\n");
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn test_invalid_enum_value_is_error() {
    let toml = format!("{MINIMAL}\n[failover]\nfailover = \"sometimes\"\n");
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn test_unknown_keys_are_reported_not_fatal() {
    let toml = format!(
        "{MINIMAL}monitor_intervall = 3\n\n[failover]\nreconnect_atempts = 2\n\n[bogus]\nx = 1\n"
    );
    let table: toml::Table = toml.parse().unwrap();
    let unknown = unknown_keys(&table);
    assert!(unknown.contains(&"node.monitor_intervall".to_string()), "{unknown:?}");
    assert!(unknown.contains(&"failover.reconnect_atempts".to_string()), "{unknown:?}");
    assert!(unknown.contains(&"bogus".to_string()), "{unknown:?}");

    // The config still loads; typos warn rather than silently dropping
    // recognised settings.
    assert!(Config::from_toml_str(&toml).is_ok());
}
