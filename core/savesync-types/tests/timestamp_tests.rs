use proptest::prelude::*;
use savesync_types::{Error, Timestamp};
use std::time::Duration;

// ── Parsing ──────────────────────────────────────────────────────

#[test]
fn parse_utc_with_millis() {
    let ts = Timestamp::parse("2024-03-01T10:00:00.250Z").unwrap();
    assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00.250Z");
}

#[test]
fn parse_normalizes_offset_to_utc() {
    let ts = Timestamp::parse("2024-03-01T12:00:00+02:00").unwrap();
    assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00.000Z");
}

#[test]
fn parse_trims_whitespace() {
    let ts = Timestamp::parse("  2024-03-01T10:00:00Z ").unwrap();
    assert_eq!(ts, Timestamp::parse("2024-03-01T10:00:00Z").unwrap());
}

#[test]
fn parse_rejects_empty() {
    assert!(matches!(Timestamp::parse(""), Err(Error::InvalidTimestamp(_))));
}

#[test]
fn parse_rejects_garbage() {
    let err = Timestamp::parse("yesterday").unwrap_err();
    assert!(err.to_string().contains("yesterday"));
}

#[test]
fn from_str_matches_parse() {
    let a: Timestamp = "2024-03-01T10:00:00Z".parse().unwrap();
    assert_eq!(a, Timestamp::parse("2024-03-01T10:00:00Z").unwrap());
}

// ── Millis ───────────────────────────────────────────────────────

#[test]
fn millis_round_trip() {
    let ts = Timestamp::from_millis(1_700_000_000_123).unwrap();
    assert_eq!(ts.as_millis(), 1_700_000_000_123);
}

#[test]
fn now_is_after_2020() {
    assert!(Timestamp::now().as_millis() > 1_577_836_800_000);
}

// ── Ordering & arithmetic ────────────────────────────────────────

#[test]
fn ordering_follows_time() {
    let a = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
    let b = Timestamp::parse("2024-03-01T10:00:01Z").unwrap();
    assert!(a < b);
}

#[test]
fn abs_diff_is_symmetric() {
    let a = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
    let b = a + Duration::from_secs(90);
    assert_eq!(a.abs_diff(&b), Duration::from_secs(90));
    assert_eq!(b.abs_diff(&a), Duration::from_secs(90));
}

#[test]
fn sub_duration() {
    let a = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
    assert_eq!((a - Duration::from_secs(3600)).to_rfc3339(), "2024-03-01T09:00:00.000Z");
}

#[test]
fn arithmetic_keeps_millisecond_precision() {
    let a = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
    assert_eq!(a + Duration::from_micros(1_500), a + Duration::from_millis(1));
    assert_eq!(
        a.checked_add(Duration::from_micros(999)),
        Some(a),
    );
}

#[test]
fn checked_arithmetic_reports_overflow() {
    let a = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
    assert!(a.checked_add(Duration::MAX).is_none());
    assert!(a.checked_add(Duration::from_secs(1 << 50)).is_none());
    assert!(a.checked_sub(Duration::from_secs(1 << 50)).is_none());
    assert_eq!(
        a.checked_sub(Duration::from_secs(60)).unwrap().to_rfc3339(),
        "2024-03-01T09:59:00.000Z"
    );
}

#[test]
fn operators_saturate_instead_of_panicking() {
    let a = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
    let late = a + Duration::MAX;
    let early = a - Duration::from_secs(1 << 50);

    assert!(late > a);
    assert!(early < a);
    assert_eq!(late, late + Duration::from_secs(1));
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn serializes_as_string() {
    let ts = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
    let json = serde_json::to_string(&ts).unwrap();
    assert_eq!(json, "\"2024-03-01T10:00:00.000Z\"");
}

#[test]
fn deserialize_rejects_unparsable() {
    let result: Result<Timestamp, _> = serde_json::from_str("\"not a date\"");
    assert!(result.is_err());
}

proptest! {
    #[test]
    fn string_form_round_trips(millis in 0i64..4_102_444_800_000) {
        let ts = Timestamp::from_millis(millis).unwrap();
        let parsed = Timestamp::parse(&ts.to_rfc3339()).unwrap();
        prop_assert_eq!(parsed, ts);
    }
}
