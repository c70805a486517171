use std::str::FromStr;
use uxmgr::actions::status::{ShutdownState, classify_shutdown, shutdown_status_line};
use uxmgr::actions::switchover::parse_shutdown_status;
use uxmgr::core::datadir::control_file::{ControlFileData, DbState};
use uxmgr::core::lsn::Lsn;

fn control_with_state(state: DbState) -> ControlFileData {
    ControlFileData {
        system_identifier: 0x1122_3344_5566_7788,
        control_version: 1300,
        catalog_version: 202307241,
        state,
        checkpoint: Lsn::from_str("16/B374D848").unwrap(),
        prev_checkpoint: None,
        redo: Lsn::from_str("16/B374D7F0").unwrap(),
        timeline_id: 4,
        prev_timeline_id: 3,
        full_page_writes: true,
        next_xid: 1000,
        oldest_xid: 561,
        min_recovery_point: Lsn::INVALID,
        min_recovery_end_timeline: 0,
        max_wal_senders: Some(10),
        data_checksum_version: 1,
    }
}

#[test]
fn test_clean_shutdown_classification() {
    let control = control_with_state(DbState::Shutdowned);
    assert_eq!(classify_shutdown(&control, false), ShutdownState::Shutdown);

    let control = control_with_state(DbState::ShutdownedInRecovery);
    assert_eq!(classify_shutdown(&control, false), ShutdownState::Shutdown);
}

#[test]
fn test_running_engine_overrides_stale_control_state() {
    let control = control_with_state(DbState::Shutdowned);
    assert_eq!(classify_shutdown(&control, true), ShutdownState::Running);
}

#[test]
fn test_in_production_without_engine_is_unclean() {
    let control = control_with_state(DbState::InProduction);
    assert_eq!(
        classify_shutdown(&control, false),
        ShutdownState::UncleanShutdown
    );
    assert_eq!(classify_shutdown(&control, true), ShutdownState::Running);
}

#[test]
fn test_shutdowning_state() {
    let control = control_with_state(DbState::Shutdowning);
    assert_eq!(
        classify_shutdown(&control, false),
        ShutdownState::ShuttingDown
    );
}

#[test]
fn test_status_line_carries_checkpoint_only_when_shut_down() {
    let lsn = Lsn::from_str("16/B374D848").unwrap();
    assert_eq!(
        shutdown_status_line(ShutdownState::Shutdown, Some(lsn)),
        "--state=SHUTDOWN --last-checkpoint-lsn=16/B374D848"
    );
    assert_eq!(
        shutdown_status_line(ShutdownState::Running, Some(lsn)),
        "--state=RUNNING"
    );
    assert_eq!(
        shutdown_status_line(ShutdownState::UncleanShutdown, None),
        "--state=UNCLEAN_SHUTDOWN"
    );
}

#[test]
fn test_status_line_round_trips_through_parser() {
    let lsn = Lsn::from_str("16/B374D848").unwrap();
    let line = shutdown_status_line(ShutdownState::Shutdown, Some(lsn));
    let (state, parsed_lsn) = parse_shutdown_status(&line).unwrap();
    assert_eq!(state, ShutdownState::Shutdown);
    assert_eq!(parsed_lsn, Some(lsn));

    let line = shutdown_status_line(ShutdownState::ShuttingDown, None);
    let (state, parsed_lsn) = parse_shutdown_status(&line).unwrap();
    assert_eq!(state, ShutdownState::ShuttingDown);
    assert_eq!(parsed_lsn, None);
}

#[test]
fn test_parser_rejects_garbage() {
    assert!(parse_shutdown_status("nothing to see here").is_err());
}

#[test]
fn test_parser_tolerates_surrounding_output() {
    // SSH banners and login noise may precede the status line.
    let output = "Warning: motd\n--state=SHUTDOWN --last-checkpoint-lsn=0/A000028\n";
    let (state, lsn) = parse_shutdown_status(output).unwrap();
    assert_eq!(state, ShutdownState::Shutdown);
    assert_eq!(lsn, Some(Lsn::from_str("0/A000028").unwrap()));
}
