use std::fs;
use tempfile::TempDir;
use uxmgr::core::shmem::{SharedNodeState, VotingStatus};

#[test]
fn test_sentinels_before_registration() {
    let state = SharedNodeState::new();
    assert_eq!(state.local_node_id(), None);
    assert_eq!(state.daemon_pid(), None);
    assert_eq!(state.is_paused(), None);
    assert_eq!(state.upstream_last_seen_secs(), -1);
    assert_eq!(state.upstream_node_id(), None);
    assert_eq!(state.new_primary(), None);
}

#[test]
fn test_set_local_node_id_is_idempotent() {
    let state = SharedNodeState::new();
    state.set_local_node_id(3, None);
    assert_eq!(state.local_node_id(), Some(3));

    // A later registration with a different id must not take effect.
    state.set_local_node_id(9, None);
    assert_eq!(state.local_node_id(), Some(3));
}

#[test]
fn test_state_file_rehydrates_pause_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("uxmgrd.state");
    fs::write(&path, "5:1\n").unwrap();

    let state = SharedNodeState::new();
    state.set_local_node_id(5, Some(&path));
    assert_eq!(state.is_paused(), Some(true));
}

#[test]
fn test_state_file_with_mismatched_id_leaves_pause_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("uxmgrd.state");
    fs::write(&path, "8:1\n").unwrap();

    let state = SharedNodeState::new();
    state.set_local_node_id(5, Some(&path));
    assert_eq!(state.is_paused(), Some(false));
}

#[test]
fn test_state_file_garbage_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("uxmgrd.state");
    fs::write(&path, "not-a-state-file\n").unwrap();

    let state = SharedNodeState::new();
    state.set_local_node_id(5, Some(&path));
    assert_eq!(state.is_paused(), Some(false));
}

#[test]
fn test_pause_round_trips_through_state_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("uxmgrd.state");

    let state = SharedNodeState::new();
    state.set_local_node_id(5, Some(&path));
    state.set_paused(true, Some(&path));
    assert_eq!(fs::read_to_string(&path).unwrap(), "5:1\n");

    // A restarted daemon recovers the flag.
    let restarted = SharedNodeState::new();
    restarted.set_local_node_id(5, Some(&path));
    assert_eq!(restarted.is_paused(), Some(true));

    state.set_paused(false, Some(&path));
    assert_eq!(fs::read_to_string(&path).unwrap(), "5:0\n");
}

#[test]
fn test_upstream_last_seen_tracks_updates() {
    let state = SharedNodeState::new();
    state.set_local_node_id(2, None);
    assert_eq!(state.upstream_last_seen_secs(), -1);

    state.set_upstream_last_seen(1);
    assert!(state.upstream_last_seen_secs() >= 0);
    assert!(state.upstream_last_seen_secs() < 5);
    assert_eq!(state.upstream_node_id(), Some(1));
}

#[test]
fn test_follow_notification_is_two_phase() {
    let state = SharedNodeState::new();
    state.set_local_node_id(2, None);

    // Candidate alone does not constitute a follow notification.
    state.set_candidate(4, 7);
    assert_eq!(state.new_primary(), None);
    assert_eq!(state.candidate_node_id(), Some(4));
    assert_eq!(state.current_electoral_term(), 7);

    state.notify_follow_primary(4);
    assert_eq!(state.new_primary(), Some(4));

    state.reset_voting_status();
    assert_eq!(state.new_primary(), None);
    assert_eq!(state.candidate_node_id(), None);
    assert_eq!(state.voting_status(), VotingStatus::NoVote);
}

#[test]
fn test_observe_term_only_advances() {
    let state = SharedNodeState::new();
    state.set_local_node_id(2, None);

    assert!(state.observe_term(3));
    assert_eq!(state.current_electoral_term(), 3);
    assert!(!state.observe_term(3));
    assert!(!state.observe_term(2));
    assert_eq!(state.current_electoral_term(), 3);
    assert!(state.observe_term(4));
}

#[test]
fn test_daemon_pid_registration() {
    let state = SharedNodeState::new();
    state.set_local_node_id(2, None);
    assert_eq!(state.daemon_pid(), None);

    let self_pid = std::process::id() as i32;
    state.set_daemon_pid(self_pid, None);
    assert_eq!(state.daemon_pid(), Some(self_pid));
    // The null-signal probe sees this very process.
    assert!(state.daemon_is_running());

    state.clear_daemon_pid();
    assert_eq!(state.daemon_pid(), None);
    assert!(!state.daemon_is_running());
}
