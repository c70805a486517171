// src/core/datadir/mod.rs

//! Read-only inspection of a UxsinoDB data directory.
//!
//! The core never writes into the data directory; the one exception is the
//! rejoin workflow, which temporarily moves the standby-signal marker aside
//! so the block-level resynchronisation tool can run recovery.

pub mod archive;
pub mod control_file;

use crate::core::errors::{UxMgrError, UxMgrResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Marker file whose presence makes the engine start as a standby.
pub const STANDBY_SIGNAL: &str = "standby.signal";

/// Leftover marker the resynchronisation tool copies in from its source;
/// must not survive a rejoin.
pub const RECOVERY_DONE: &str = "recovery.done";

/// Relative path of the binary control file.
pub const CONTROL_FILE_PATH: &str = "global/ux_control";

/// Engine configuration files archived and restored around a resync run.
pub const ENGINE_CONFIG_FILES: &[&str] = &["uxsinodb.conf", "ux_hba.conf", "ux_ident.conf"];

/// Returns `true` only when the path carries the well-known files of a
/// UxsinoDB data directory.
pub fn is_ux_dir(path: &Path) -> bool {
    path.join("UX_VERSION").is_file()
        && path.join(CONTROL_FILE_PATH).is_file()
        && path.join("base").is_dir()
}

pub fn has_standby_signal(data_dir: &Path) -> bool {
    data_dir.join(STANDBY_SIGNAL).is_file()
}

/// Moves the standby-signal marker aside, returning the stash path so it
/// can be restored afterwards. Returns `None` when no marker exists.
pub fn stash_standby_signal(data_dir: &Path) -> UxMgrResult<Option<PathBuf>> {
    let marker = data_dir.join(STANDBY_SIGNAL);
    if !marker.is_file() {
        return Ok(None);
    }
    let stash = data_dir.join(format!("{STANDBY_SIGNAL}.uxmgr"));
    fs::rename(&marker, &stash).map_err(|e| UxMgrError::Io {
        path: marker,
        source: e,
    })?;
    Ok(Some(stash))
}

pub fn restore_standby_signal(data_dir: &Path, stash: &Path) -> UxMgrResult<()> {
    let marker = data_dir.join(STANDBY_SIGNAL);
    fs::rename(stash, &marker).map_err(|e| UxMgrError::Io {
        path: stash.to_path_buf(),
        source: e,
    })
}

/// Creates an empty standby-signal marker.
pub fn write_standby_signal(data_dir: &Path) -> UxMgrResult<()> {
    let marker = data_dir.join(STANDBY_SIGNAL);
    fs::write(&marker, b"").map_err(|e| UxMgrError::Io {
        path: marker,
        source: e,
    })
}

/// Removes the copied-in recovery-done marker if the resync tool left one.
pub fn remove_recovery_done(data_dir: &Path) -> UxMgrResult<bool> {
    let marker = data_dir.join(RECOVERY_DONE);
    match fs::remove_file(&marker) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(UxMgrError::Io {
            path: marker,
            source: e,
        }),
    }
}

/// Copies the engine configuration files into `archive_dir` before a resync
/// run overwrites the data directory. Missing files are skipped.
pub fn archive_config_files(data_dir: &Path, archive_dir: &Path) -> UxMgrResult<Vec<PathBuf>> {
    fs::create_dir_all(archive_dir).map_err(|e| UxMgrError::Io {
        path: archive_dir.to_path_buf(),
        source: e,
    })?;
    let mut archived = Vec::new();
    for name in ENGINE_CONFIG_FILES {
        let src = data_dir.join(name);
        if !src.is_file() {
            continue;
        }
        let dst = archive_dir.join(name);
        fs::copy(&src, &dst).map_err(|e| UxMgrError::Io {
            path: src.clone(),
            source: e,
        })?;
        archived.push(dst);
    }
    Ok(archived)
}

/// Restores previously archived engine configuration files.
pub fn restore_config_files(data_dir: &Path, archived: &[PathBuf]) -> UxMgrResult<()> {
    for src in archived {
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = data_dir.join(name);
        fs::copy(src, &dst).map_err(|e| UxMgrError::Io {
            path: src.clone(),
            source: e,
        })?;
    }
    Ok(())
}
