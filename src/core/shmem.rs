// src/core/shmem.rs

//! The daemon-side image of the per-node cluster shared state.
//!
//! Inside the engine this state lives in a preloaded shared segment exposed
//! through the `uxmgr` extension procedures; the daemon keeps the same
//! record locally. One reader-writer lock guards every field: readers take
//! it shared, writers exclusively, and the paired fields of the
//! follow-new-primary transition are always read and written under a single
//! acquisition.

use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Sentinel for "no node": shared-state fields start out with this value
/// until the daemon registers itself.
pub const UNKNOWN_NODE_ID: i32 = -1;

/// Sentinel candidate id carried by `notify_follow_primary` when the target
/// should rerun its own election evaluation instead of following.
pub const ELECTION_RERUN_NOTIFICATION: i32 = -2;

/// Voting status of the local node, as the failover engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VotingStatus {
    #[default]
    NoVote,
    VoteRequested,
    VotingTerminates,
}

#[derive(Debug)]
struct SharedInner {
    local_node_id: i32,
    daemon_pid: i32,
    daemon_pidfile: Option<PathBuf>,
    paused: bool,
    upstream_last_seen: Option<Instant>,
    upstream_node_id: i32,
    voting_status: VotingStatus,
    current_electoral_term: u64,
    candidate_node_id: i32,
    follow_new_primary: bool,
}

impl Default for SharedInner {
    fn default() -> Self {
        Self {
            local_node_id: UNKNOWN_NODE_ID,
            daemon_pid: 0,
            daemon_pidfile: None,
            paused: false,
            upstream_last_seen: None,
            upstream_node_id: UNKNOWN_NODE_ID,
            voting_status: VotingStatus::NoVote,
            current_electoral_term: 0,
            candidate_node_id: UNKNOWN_NODE_ID,
            follow_new_primary: false,
        }
    }
}

/// The shared node-state segment.
#[derive(Debug, Default)]
pub struct SharedNodeState {
    inner: RwLock<SharedInner>,
}

impl SharedNodeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the local node id. Idempotent: only the first call takes
    /// effect. The pause flag is rehydrated from the state file when the
    /// recorded node id matches; a mismatched id leaves it unchanged.
    pub fn set_local_node_id(&self, node_id: i32, state_file: Option<&Path>) {
        let mut inner = self.inner.write();
        if inner.local_node_id != UNKNOWN_NODE_ID {
            debug!(
                "local node id already registered as {}, ignoring {}",
                inner.local_node_id, node_id
            );
            return;
        }
        inner.local_node_id = node_id;

        if let Some(path) = state_file {
            match read_state_file(path) {
                Some((recorded_id, paused)) if recorded_id == node_id => {
                    inner.paused = paused;
                }
                Some((recorded_id, _)) => {
                    warn!(
                        "state file {} records node {}, local node is {}; pause flag unchanged",
                        path.display(),
                        recorded_id,
                        node_id
                    );
                }
                None => {}
            }
        }
    }

    /// Returns the registered node id, or `None` while unset. Every other
    /// reader goes through this guard so callers never act on a segment
    /// that has not been initialised.
    pub fn local_node_id(&self) -> Option<i32> {
        let inner = self.inner.read();
        (inner.local_node_id != UNKNOWN_NODE_ID).then_some(inner.local_node_id)
    }

    pub fn set_daemon_pid(&self, pid: i32, pidfile: Option<PathBuf>) {
        let mut inner = self.inner.write();
        inner.daemon_pid = pid;
        inner.daemon_pidfile = pidfile;
    }

    pub fn daemon_pid(&self) -> Option<i32> {
        let inner = self.inner.read();
        if inner.local_node_id == UNKNOWN_NODE_ID || inner.daemon_pid == 0 {
            None
        } else {
            Some(inner.daemon_pid)
        }
    }

    pub fn daemon_pidfile(&self) -> Option<PathBuf> {
        self.inner.read().daemon_pidfile.clone()
    }

    /// Probes the registered daemon PID with a null signal. A stale PID
    /// left by an abrupt termination fails the probe.
    pub fn daemon_is_running(&self) -> bool {
        match self.daemon_pid() {
            // kill(pid, 0) checks deliverability without sending anything.
            Some(pid) => unsafe { libc::kill(pid, 0) == 0 },
            None => false,
        }
    }

    pub fn set_paused(&self, paused: bool, state_file: Option<&Path>) {
        let node_id;
        {
            let mut inner = self.inner.write();
            inner.paused = paused;
            node_id = inner.local_node_id;
        }
        if let Some(path) = state_file {
            if node_id != UNKNOWN_NODE_ID {
                write_state_file(path, node_id, paused);
            }
        }
    }

    pub fn is_paused(&self) -> Option<bool> {
        let inner = self.inner.read();
        (inner.local_node_id != UNKNOWN_NODE_ID).then_some(inner.paused)
    }

    pub fn set_upstream_last_seen(&self, upstream_node_id: i32) {
        let mut inner = self.inner.write();
        inner.upstream_last_seen = Some(Instant::now());
        inner.upstream_node_id = upstream_node_id;
    }

    /// Seconds since the upstream was last seen, `-1` if it never was.
    /// The sentinel keeps "never updated" distinguishable from merely old.
    pub fn upstream_last_seen_secs(&self) -> i64 {
        let inner = self.inner.read();
        if inner.local_node_id == UNKNOWN_NODE_ID {
            return -1;
        }
        match inner.upstream_last_seen {
            Some(at) => at.elapsed().as_secs() as i64,
            None => -1,
        }
    }

    pub fn upstream_node_id(&self) -> Option<i32> {
        let inner = self.inner.read();
        (inner.upstream_node_id != UNKNOWN_NODE_ID).then_some(inner.upstream_node_id)
    }

    pub fn set_upstream_node_id(&self, node_id: i32) {
        self.inner.write().upstream_node_id = node_id;
    }

    pub fn voting_status(&self) -> VotingStatus {
        self.inner.read().voting_status
    }

    pub fn set_voting_status(&self, status: VotingStatus) {
        self.inner.write().voting_status = status;
    }

    pub fn current_electoral_term(&self) -> u64 {
        self.inner.read().current_electoral_term
    }

    /// Observes an announced term. Returns `true` when the announcement is
    /// newer than the local term (which is then advanced).
    pub fn observe_term(&self, term: u64) -> bool {
        let mut inner = self.inner.write();
        if term > inner.current_electoral_term {
            inner.current_electoral_term = term;
            true
        } else {
            false
        }
    }

    pub fn set_candidate(&self, candidate_node_id: i32, term: u64) {
        let mut inner = self.inner.write();
        inner.candidate_node_id = candidate_node_id;
        if term > inner.current_electoral_term {
            inner.current_electoral_term = term;
        }
    }

    pub fn candidate_node_id(&self) -> Option<i32> {
        let inner = self.inner.read();
        (inner.candidate_node_id != UNKNOWN_NODE_ID).then_some(inner.candidate_node_id)
    }

    /// Sets the follow-new-primary notification. Both fields are written
    /// under the same exclusive acquisition.
    pub fn notify_follow_primary(&self, new_primary_id: i32) {
        let mut inner = self.inner.write();
        inner.candidate_node_id = new_primary_id;
        inner.follow_new_primary = true;
    }

    /// Reads the follow-new-primary notification: the candidate id when the
    /// flag is set, `None` otherwise. Both fields are read under one shared
    /// acquisition.
    pub fn new_primary(&self) -> Option<i32> {
        let inner = self.inner.read();
        if inner.local_node_id == UNKNOWN_NODE_ID || !inner.follow_new_primary {
            None
        } else {
            Some(inner.candidate_node_id)
        }
    }

    /// Clears voting status, candidate and the follow flag.
    pub fn reset_voting_status(&self) {
        let mut inner = self.inner.write();
        inner.voting_status = VotingStatus::NoVote;
        inner.candidate_node_id = UNKNOWN_NODE_ID;
        inner.follow_new_primary = false;
    }

    /// Unregisters the daemon PID on graceful shutdown.
    pub fn clear_daemon_pid(&self) {
        let mut inner = self.inner.write();
        inner.daemon_pid = 0;
        inner.daemon_pidfile = None;
    }
}

/// Reads the `<node_id>:<0|1>` state file.
fn read_state_file(path: &Path) -> Option<(i32, bool)> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    let (id, flag) = line.split_once(':')?;
    let id: i32 = id.trim().parse().ok()?;
    let paused = match flag.trim() {
        "0" => false,
        "1" => true,
        other => {
            warn!("state file {}: bad pause flag {:?}", path.display(), other);
            return None;
        }
    };
    Some((id, paused))
}

fn write_state_file(path: &Path, node_id: i32, paused: bool) {
    let line = format!("{}:{}\n", node_id, if paused { 1 } else { 0 });
    if let Err(e) = fs::write(path, line) {
        warn!("could not write state file {}: {}", path.display(), e);
    }
}
