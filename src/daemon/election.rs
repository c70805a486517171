// src/daemon/election.rs

//! Candidate selection for failover.
//!
//! Ranking is a pure total order over the collected candidate set, so two
//! nodes evaluating the same inputs always name the same winner. The order
//! is: furthest WAL receive position first, then highest priority, then
//! preference for the failed primary's location, then lowest node id.

use crate::core::lsn::Lsn;
use std::cmp::Ordering;

/// A promotion candidate as collected at election time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub node_id: i32,
    pub priority: i32,
    pub location: String,
    pub last_receive_lsn: Lsn,
    pub is_witness: bool,
    pub reachable: bool,
}

impl Candidate {
    /// Priority 0 disables a node as a candidate; witnesses never carry
    /// replication and unreachable nodes cannot be promoted.
    pub fn is_eligible(&self) -> bool {
        self.reachable && !self.is_witness && self.priority > 0
    }
}

/// Orders two eligible candidates; `Less` means `a` ranks ahead of `b`.
fn compare(a: &Candidate, b: &Candidate, primary_location: &str) -> Ordering {
    b.last_receive_lsn
        .cmp(&a.last_receive_lsn)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| {
            let a_local = a.location == primary_location;
            let b_local = b.location == primary_location;
            b_local.cmp(&a_local)
        })
        .then_with(|| a.node_id.cmp(&b.node_id))
}

/// Filters ineligible candidates and returns the rest in promotion order.
///
/// The comparison key ends in `node_id`, so the order is total and
/// insensitive to the input permutation.
pub fn rank_candidates(candidates: &[Candidate], primary_location: &str) -> Vec<Candidate> {
    let mut eligible: Vec<Candidate> = candidates
        .iter()
        .filter(|c| c.is_eligible())
        .cloned()
        .collect();
    eligible.sort_by(|a, b| compare(a, b, primary_location));
    eligible
}

/// The winner of a ranking, if any candidate survived filtering.
pub fn select_winner(candidates: &[Candidate], primary_location: &str) -> Option<Candidate> {
    rank_candidates(candidates, primary_location).into_iter().next()
}
