// src/daemon/state.rs

//! State carried by a running monitor: signal flags, the normal/degraded
//! mode machine, and reconnect bookkeeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Flags set by signal handlers and read at the top of every tick. Handlers
/// never touch any other state.
#[derive(Debug, Default)]
pub struct SignalFlags {
    terminate: AtomicBool,
    reload: AtomicBool,
}

impl SignalFlags {
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Consumes a pending reload request.
    pub fn take_reload_request(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }
}

/// Monitoring mode with respect to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringState {
    /// Upstream reachable; last-seen refreshed each tick.
    Normal,
    /// Upstream unreachable; reconnects continue at a slower cadence while
    /// the elapsed degraded time accumulates towards the failover
    /// threshold.
    Degraded { since: Instant },
}

impl MonitoringState {
    pub fn is_degraded(&self) -> bool {
        matches!(self, MonitoringState::Degraded { .. })
    }

    pub fn degraded_seconds(&self) -> u64 {
        match self {
            MonitoringState::Normal => 0,
            MonitoringState::Degraded { since } => since.elapsed().as_secs(),
        }
    }
}

/// Why a node-type loop handed control back to the daemon's outer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// SIGTERM observed; shut down.
    Terminate,
    /// SIGHUP observed; reload configuration and re-enter.
    Reload,
    /// The node's role changed (promotion, follow, rejoin); re-read the
    /// catalog and pick the matching loop.
    RoleChanged,
}
