use std::str::FromStr;
use uxmgr::core::catalog::monitoring::MonitoringRecord;
use uxmgr::core::lsn::Lsn;

#[test]
fn test_lag_from_positions() {
    let primary = Lsn::from_str("0/3000").unwrap();
    let receive = Lsn::from_str("0/2000").unwrap();
    let replay = Lsn::from_str("0/1800").unwrap();

    let (replication_lag, apply_lag) =
        MonitoringRecord::lag_from_positions(primary, Some(receive), Some(replay));
    assert_eq!(replication_lag, 0x1000);
    assert_eq!(apply_lag, 0x800);
}

#[test]
fn test_caught_up_standby_has_zero_lag() {
    let lsn = Lsn::from_str("1/A000").unwrap();
    let (replication_lag, apply_lag) =
        MonitoringRecord::lag_from_positions(lsn, Some(lsn), Some(lsn));
    assert_eq!(replication_lag, 0);
    assert_eq!(apply_lag, 0);
}

#[test]
fn test_receive_ahead_of_primary_saturates() {
    // The primary position was sampled before the standby's; clock skew
    // between the two queries must not produce negative lag.
    let primary = Lsn::from_str("0/1000").unwrap();
    let receive = Lsn::from_str("0/2000").unwrap();
    let (replication_lag, _) =
        MonitoringRecord::lag_from_positions(primary, Some(receive), Some(receive));
    assert_eq!(replication_lag, 0);
}

#[test]
fn test_missing_positions() {
    let primary = Lsn::from_str("0/5000").unwrap();
    // No receive position yet: the whole primary position counts as lag.
    let (replication_lag, apply_lag) =
        MonitoringRecord::lag_from_positions(primary, None, None);
    assert_eq!(replication_lag, 0x5000);
    assert_eq!(apply_lag, 0);

    // Receive without replay: apply lag is unknown, reported as zero.
    let receive = Lsn::from_str("0/4000").unwrap();
    let (_, apply_lag) = MonitoringRecord::lag_from_positions(primary, Some(receive), None);
    assert_eq!(apply_lag, 0);
}
