use std::fs;
use tempfile::TempDir;
use uxmgr::actions::follow::{upstream_conninfo_for, write_recovery_settings};
use uxmgr::core::catalog::{NodeRecord, NodeType};

fn upstream_record() -> NodeRecord {
    NodeRecord {
        node_id: 2,
        node_type: NodeType::Primary,
        upstream_node_id: None,
        node_name: "node2".to_string(),
        conninfo: "host=node2 port=5432 dbname=uxdb user=uxmgr".to_string(),
        repluser: "uxrepl".to_string(),
        slot_name: None,
        location: "default".to_string(),
        priority: 100,
        active: true,
        config_file: String::new(),
        virtual_ip: None,
        network_card: None,
    }
}

#[test]
fn test_upstream_conninfo_substitutes_role_and_application_name() {
    let conninfo = upstream_conninfo_for(&upstream_record(), "uxrepl", "node3").unwrap();
    assert_eq!(
        conninfo,
        "host=node2 port=5432 dbname=uxdb user=uxrepl application_name=node3"
    );
}

#[test]
fn test_write_recovery_settings_creates_overlay() {
    let dir = TempDir::new().unwrap();
    write_recovery_settings(dir.path(), "host=node2 user=uxrepl", Some("repmgr_slot_3"))
        .unwrap();

    let content = fs::read_to_string(dir.path().join("uxsinodb.auto.conf")).unwrap();
    assert!(content.contains("primary_conninfo = 'host=node2 user=uxrepl'"));
    assert!(content.contains("primary_slot_name = 'repmgr_slot_3'"));
}

#[test]
fn test_write_recovery_settings_replaces_previous_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("uxsinodb.auto.conf");
    fs::write(
        &path,
        "shared_buffers = '128MB'\nprimary_conninfo = 'host=deadnode'\nprimary_slot_name = 'old'\n",
    )
    .unwrap();

    write_recovery_settings(dir.path(), "host=node2 user=uxrepl", None).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    // Unrelated settings survive; stale replication settings do not.
    assert!(content.contains("shared_buffers = '128MB'"));
    assert!(!content.contains("deadnode"));
    assert!(!content.contains("primary_slot_name"));
    assert_eq!(
        content.matches("primary_conninfo").count(),
        1,
        "{content:?}"
    );
}

#[test]
fn test_slot_name_encoding_is_deterministic() {
    assert_eq!(NodeRecord::slot_name_for(5), "repmgr_slot_5");
    assert_eq!(NodeRecord::slot_name_for(42), "repmgr_slot_42");
}
