use std::str::FromStr;
use uxmgr::core::lsn::Lsn;

#[test]
fn test_parse_and_display_round_trip() {
    let lsn = Lsn::from_str("16/B374D848").unwrap();
    assert_eq!(u64::from(lsn), 0x16_B374_D848);
    assert_eq!(lsn.to_string(), "16/B374D848");
}

#[test]
fn test_parse_zero() {
    let lsn = Lsn::from_str("0/0").unwrap();
    assert_eq!(lsn, Lsn::INVALID);
    assert!(!lsn.is_valid());
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(Lsn::from_str("").is_err());
    assert!(Lsn::from_str("16").is_err());
    assert!(Lsn::from_str("xx/yy").is_err());
    assert!(Lsn::from_str("1/100000000").is_err());
}

#[test]
fn test_ordering_follows_stream_position() {
    let a = Lsn::from_str("0/1000").unwrap();
    let b = Lsn::from_str("0/2000").unwrap();
    let c = Lsn::from_str("1/0").unwrap();
    assert!(a < b);
    assert!(b < c);
}

#[test]
fn test_bytes_since_saturates() {
    let a = Lsn::from_str("0/1000").unwrap();
    let b = Lsn::from_str("0/3000").unwrap();
    assert_eq!(b.bytes_since(a), 0x2000);
    assert_eq!(a.bytes_since(b), 0);
}
