use std::fs;
use tempfile::TempDir;
use uxmgr::core::datadir::{
    self, CONTROL_FILE_PATH, ENGINE_CONFIG_FILES, RECOVERY_DONE, STANDBY_SIGNAL,
};

/// Lays out the well-known files of a data directory.
fn make_ux_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("UX_VERSION"), b"13\n").unwrap();
    fs::create_dir_all(dir.path().join("global")).unwrap();
    fs::write(dir.path().join(CONTROL_FILE_PATH), b"\0").unwrap();
    fs::create_dir_all(dir.path().join("base")).unwrap();
    dir
}

#[test]
fn test_is_ux_dir_requires_all_markers() {
    let dir = make_ux_dir();
    assert!(datadir::is_ux_dir(dir.path()));

    fs::remove_file(dir.path().join("UX_VERSION")).unwrap();
    assert!(!datadir::is_ux_dir(dir.path()));
}

#[test]
fn test_empty_dir_is_not_ux_dir() {
    let dir = TempDir::new().unwrap();
    assert!(!datadir::is_ux_dir(dir.path()));
}

#[test]
fn test_standby_signal_stash_and_restore() {
    let dir = make_ux_dir();
    fs::write(dir.path().join(STANDBY_SIGNAL), b"").unwrap();
    assert!(datadir::has_standby_signal(dir.path()));

    let stash = datadir::stash_standby_signal(dir.path()).unwrap().unwrap();
    assert!(!datadir::has_standby_signal(dir.path()));
    assert!(stash.is_file());

    datadir::restore_standby_signal(dir.path(), &stash).unwrap();
    assert!(datadir::has_standby_signal(dir.path()));
    assert!(!stash.exists());
}

#[test]
fn test_stash_without_marker_is_none() {
    let dir = make_ux_dir();
    assert!(datadir::stash_standby_signal(dir.path()).unwrap().is_none());
}

#[test]
fn test_remove_recovery_done() {
    let dir = make_ux_dir();
    // Absent: nothing to do.
    assert!(!datadir::remove_recovery_done(dir.path()).unwrap());

    fs::write(dir.path().join(RECOVERY_DONE), b"").unwrap();
    assert!(datadir::remove_recovery_done(dir.path()).unwrap());
    assert!(!dir.path().join(RECOVERY_DONE).exists());
}

#[test]
fn test_config_archive_round_trip() {
    let dir = make_ux_dir();
    for name in ENGINE_CONFIG_FILES {
        fs::write(dir.path().join(name), format!("# {name}\n")).unwrap();
    }

    let archive = dir.path().join("uxmgr_config_archive");
    let archived = datadir::archive_config_files(dir.path(), &archive).unwrap();
    assert_eq!(archived.len(), ENGINE_CONFIG_FILES.len());

    // Simulate a resync clobbering the configuration.
    for name in ENGINE_CONFIG_FILES {
        fs::write(dir.path().join(name), b"clobbered").unwrap();
    }
    datadir::restore_config_files(dir.path(), &archived).unwrap();
    for name in ENGINE_CONFIG_FILES {
        let content = fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(content, format!("# {name}\n"));
    }
}

#[test]
fn test_config_archive_skips_missing_files() {
    let dir = make_ux_dir();
    fs::write(dir.path().join(ENGINE_CONFIG_FILES[0]), b"x").unwrap();

    let archive = dir.path().join("uxmgr_config_archive");
    let archived = datadir::archive_config_files(dir.path(), &archive).unwrap();
    assert_eq!(archived.len(), 1);
}

#[test]
fn test_write_standby_signal() {
    let dir = make_ux_dir();
    assert!(!datadir::has_standby_signal(dir.path()));
    datadir::write_standby_signal(dir.path()).unwrap();
    assert!(datadir::has_standby_signal(dir.path()));
}
