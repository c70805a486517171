use std::fs;
use tempfile::TempDir;
use uxmgr::core::datadir::archive::{ARCHIVE_STATUS_DIR, ready_file_count};

fn make_data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(ARCHIVE_STATUS_DIR)).unwrap();
    dir
}

#[test]
fn test_counts_only_ready_files() {
    let dir = make_data_dir();
    let status_dir = dir.path().join(ARCHIVE_STATUS_DIR);
    for i in 0..60 {
        fs::write(status_dir.join(format!("0000000100000001000000{i:02X}.ready")), b"").unwrap();
    }
    for i in 0..7 {
        fs::write(status_dir.join(format!("0000000100000000000000{i:02X}.done")), b"").unwrap();
    }
    assert_eq!(ready_file_count(dir.path()).unwrap(), 60);
}

#[test]
fn test_empty_directory_counts_zero() {
    let dir = make_data_dir();
    assert_eq!(ready_file_count(dir.path()).unwrap(), 0);
}

#[test]
fn test_missing_directory_is_error() {
    let dir = TempDir::new().unwrap();
    assert!(ready_file_count(dir.path()).is_err());
}
