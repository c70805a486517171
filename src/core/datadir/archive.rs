// src/core/datadir/archive.rs

//! WAL archive-status inspection.

use crate::core::errors::{UxMgrError, UxMgrResult};
use std::path::Path;

/// Suffix the archiver puts on files that are ready to be shipped.
pub const READY_SUFFIX: &str = ".ready";

/// Relative path of the archive-status directory.
pub const ARCHIVE_STATUS_DIR: &str = "ux_wal/archive_status";

/// Counts files waiting to be archived. An unreadable or missing directory
/// is an error; callers that need the legacy `-1` sentinel map it at the
/// boundary.
pub fn ready_file_count(data_dir: &Path) -> UxMgrResult<usize> {
    let dir = data_dir.join(ARCHIVE_STATUS_DIR);
    let entries = std::fs::read_dir(&dir).map_err(|e| UxMgrError::Io {
        path: dir.clone(),
        source: e,
    })?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| UxMgrError::Io {
            path: dir.clone(),
            source: e,
        })?;
        if entry.file_name().to_string_lossy().ends_with(READY_SUFFIX) {
            count += 1;
        }
    }
    Ok(count)
}
