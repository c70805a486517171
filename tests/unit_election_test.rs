use proptest::prelude::*;
use uxmgr::core::lsn::Lsn;
use uxmgr::daemon::election::{Candidate, rank_candidates, select_winner};

fn standby(node_id: i32, priority: i32, location: &str, lsn: u64) -> Candidate {
    Candidate {
        node_id,
        priority,
        location: location.to_string(),
        last_receive_lsn: Lsn(lsn),
        is_witness: false,
        reachable: true,
    }
}

#[test]
fn test_highest_receive_lsn_wins() {
    let candidates = vec![
        standby(2, 100, "default", 0x1000),
        standby(3, 100, "default", 0x2000),
    ];
    let winner = select_winner(&candidates, "default").unwrap();
    assert_eq!(winner.node_id, 3);
}

#[test]
fn test_priority_breaks_lsn_tie() {
    let candidates = vec![
        standby(2, 50, "default", 0x2000),
        standby(3, 150, "default", 0x2000),
    ];
    let winner = select_winner(&candidates, "default").unwrap();
    assert_eq!(winner.node_id, 3);
}

#[test]
fn test_equal_lsn_and_priority_prefers_lower_node_id() {
    // Two standbys with identical positions and priorities: the tie must
    // break deterministically towards the lower node id.
    let candidates = vec![
        standby(3, 100, "default", 0x2000),
        standby(2, 100, "default", 0x2000),
    ];
    let winner = select_winner(&candidates, "default").unwrap();
    assert_eq!(winner.node_id, 2);

    // Swapping the input order must not change the winner.
    let swapped = vec![
        standby(2, 100, "default", 0x2000),
        standby(3, 100, "default", 0x2000),
    ];
    assert_eq!(select_winner(&swapped, "default").unwrap().node_id, 2);
}

#[test]
fn test_location_preference_on_equal_keys() {
    let candidates = vec![
        standby(2, 100, "dc-east", 0x2000),
        standby(3, 100, "dc-west", 0x2000),
    ];
    // The failed primary was in dc-west; prefer the candidate there.
    let winner = select_winner(&candidates, "dc-west").unwrap();
    assert_eq!(winner.node_id, 3);
}

#[test]
fn test_lsn_outranks_location() {
    let candidates = vec![
        standby(2, 100, "dc-east", 0x3000),
        standby(3, 100, "dc-west", 0x2000),
    ];
    let winner = select_winner(&candidates, "dc-west").unwrap();
    assert_eq!(winner.node_id, 2);
}

#[test]
fn test_priority_zero_is_ineligible() {
    let candidates = vec![
        standby(2, 0, "default", 0x9000),
        standby(3, 100, "default", 0x1000),
    ];
    let winner = select_winner(&candidates, "default").unwrap();
    assert_eq!(winner.node_id, 3);
}

#[test]
fn test_witness_never_becomes_candidate() {
    let mut witness = standby(4, 100, "default", 0x9000);
    witness.is_witness = true;
    let candidates = vec![witness, standby(3, 100, "default", 0x1000)];
    let winner = select_winner(&candidates, "default").unwrap();
    assert_eq!(winner.node_id, 3);
}

#[test]
fn test_unreachable_candidate_is_skipped() {
    let mut down = standby(2, 100, "default", 0x9000);
    down.reachable = false;
    let candidates = vec![down, standby(3, 100, "default", 0x1000)];
    let winner = select_winner(&candidates, "default").unwrap();
    assert_eq!(winner.node_id, 3);
}

#[test]
fn test_no_eligible_candidates() {
    let mut witness = standby(4, 100, "default", 0x9000);
    witness.is_witness = true;
    let candidates = vec![witness, standby(2, 0, "default", 0x1000)];
    assert!(select_winner(&candidates, "default").is_none());
}

proptest! {
    /// The ranking is a total order: any permutation of the same candidate
    /// set yields the same ordered result.
    #[test]
    fn prop_ranking_is_permutation_invariant(
        seed in proptest::collection::vec((0i32..4, 0u64..4, 0usize..2), 1..8),
        rotate in 0usize..8,
    ) {
        let locations = ["dc-east", "dc-west"];
        let candidates: Vec<Candidate> = seed
            .iter()
            .enumerate()
            .map(|(i, (priority, lsn, loc))| {
                standby(i as i32 + 2, *priority, locations[*loc], *lsn * 0x1000)
            })
            .collect();

        let baseline = rank_candidates(&candidates, "dc-west");

        let mut permuted = candidates.clone();
        let permuted_len = permuted.len().max(1);
        permuted.rotate_left(rotate % permuted_len);
        let ranked = rank_candidates(&permuted, "dc-west");

        prop_assert_eq!(
            baseline.iter().map(|c| c.node_id).collect::<Vec<_>>(),
            ranked.iter().map(|c| c.node_id).collect::<Vec<_>>()
        );
    }

    /// Every adjacent pair in the ranking is strictly ordered by the
    /// comparison key, node id included, so no two candidates ever compare
    /// equal.
    #[test]
    fn prop_ranking_has_no_equal_neighbours(
        seed in proptest::collection::vec((0i32..3, 0u64..3), 2..8),
    ) {
        let candidates: Vec<Candidate> = seed
            .iter()
            .enumerate()
            .map(|(i, (priority, lsn))| standby(i as i32 + 2, *priority, "default", *lsn))
            .collect();

        let ranked = rank_candidates(&candidates, "default");
        for pair in ranked.windows(2) {
            let key = |c: &Candidate| {
                (
                    std::cmp::Reverse(c.last_receive_lsn),
                    std::cmp::Reverse(c.priority),
                    c.node_id,
                )
            };
            prop_assert!(key(&pair[0]) < key(&pair[1]));
        }
    }
}
