// src/core/errors.rs

//! Defines the primary error type for the entire application, plus the
//! process exit codes the control tool reports.

use std::path::PathBuf;
use thiserror::Error;

/// The main error enum, representing all possible failures within uxmgr.
/// Each variant corresponds to one kind in the error taxonomy: configuration,
/// connectivity, catalog, protocol-local, file-system and consistency
/// failures are kept apart so callers can decide how far to propagate.
#[derive(Error, Debug)]
pub enum UxMgrError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database connection error: {0}")]
    DbConn(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// The engine refused an operation (promote, slot creation, replay
    /// control). Fatal to the current attempt, never to the daemon.
    #[error("engine refused operation: {0}")]
    Protocol(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("control file at {path} is truncated: need {needed} bytes, found {found}")]
    ControlFileTruncated {
        path: PathBuf,
        needed: usize,
        found: usize,
    },

    #[error("unsupported control file version {0}")]
    ControlFileVersion(u32),

    #[error("not a UxsinoDB data directory: {0}")]
    NotADataDirectory(PathBuf),

    #[error("malformed conninfo string: {0}")]
    ConnInfo(String),

    #[error("invalid WAL position: {0}")]
    BadLsn(String),

    /// Two reachable primaries, a diverged timeline, or similar topology
    /// contradictions. Resolved by rejoin or operator action.
    #[error("cluster consistency error: {0}")]
    Consistency(String),

    #[error("local command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("promotion failed: {0}")]
    PromotionFailed(String),

    #[error("switchover failed: {0}")]
    SwitchoverFailed(String),

    #[error("rejoin failed: {0}")]
    RejoinFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl UxMgrError {
    /// Maps an error to the exit code the control tool reports.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            UxMgrError::Config(_) | UxMgrError::ConnInfo(_) => ExitCode::BadConfig,
            UxMgrError::DbConn(_) => ExitCode::DbConn,
            UxMgrError::PromotionFailed(_) => ExitCode::PromotionFail,
            UxMgrError::SwitchoverFailed(_) => ExitCode::SwitchoverFail,
            UxMgrError::RejoinFailed(_) => ExitCode::RejoinFail,
            UxMgrError::CommandFailed { .. } => ExitCode::LocalCommand,
            UxMgrError::ControlFileTruncated { .. }
            | UxMgrError::ControlFileVersion(_)
            | UxMgrError::NotADataDirectory(_)
            | UxMgrError::Io { .. } => ExitCode::NodeStatus,
            _ => ExitCode::Unknown,
        }
    }
}

/// Process exit codes reported by the control tool. The numeric values are
/// part of the tool's scripting interface and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    BadConfig,
    OutOfMemory,
    NoUxStart,
    DbConn,
    PromotionFail,
    NodeStatus,
    SwitchoverFail,
    LocalCommand,
    RejoinFail,
    Unknown,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::BadConfig => 1,
            ExitCode::OutOfMemory => 3,
            ExitCode::NoUxStart => 4,
            ExitCode::DbConn => 6,
            ExitCode::PromotionFail => 8,
            ExitCode::NodeStatus => 12,
            ExitCode::SwitchoverFail => 18,
            ExitCode::LocalCommand => 19,
            ExitCode::RejoinFail => 24,
            ExitCode::Unknown => 25,
        }
    }
}

impl From<tokio_postgres::Error> for UxMgrError {
    fn from(e: tokio_postgres::Error) -> Self {
        // A server-reported statement error is a catalog failure; anything
        // else (socket, timeout, TLS) is a connectivity failure.
        if e.as_db_error().is_some() {
            UxMgrError::Query(e.to_string())
        } else {
            UxMgrError::DbConn(e.to_string())
        }
    }
}

impl From<std::io::Error> for UxMgrError {
    fn from(e: std::io::Error) -> Self {
        UxMgrError::Io {
            path: PathBuf::new(),
            source: e,
        }
    }
}

/// Shorthand used across the crate.
pub type UxMgrResult<T> = Result<T, UxMgrError>;
