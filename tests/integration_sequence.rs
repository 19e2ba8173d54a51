//! Integration tests for the sequence lifecycle: ingestion, window
//! sliding, trimming, and binary round-trips through the public API.

use cadence::{Sequence, State, MAX_SEQUENCE_LENGTH};
use chrono::{DateTime, Utc};
use rand::Rng;

const TS: i64 = 946_782_245; // 2000-01-02 03:04:05 UTC
const F: i64 = 60;

fn at(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap()
}

fn states(xs: &[u8]) -> Vec<State> {
    xs.iter().map(|&x| State::from(x)).collect()
}

#[test]
fn test_ingestion_compresses_into_runs() {
    let values = states(&[1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 0]);
    let s = Sequence::with_values(at(TS), 60, &values);

    assert_eq!(s.count(), 20);
    assert_eq!(s.values(), values);

    let bytes = s.to_bytes();
    assert_eq!(
        bytes,
        vec![
            0x25, 0xc0, 0x6e, 0x38, // reference timestamp
            0x3c, 0x00, // frequency
            0x00, 0x00, 0x00, 0x00, // length, 0 = maximum
            0x14, 0x00, 0x00, 0x00, // count
            0x15, 0x14, 0x15, 0x12, 0x04, // five run records
        ]
    );
}

#[test]
fn test_incremental_add_equals_bulk_construction() {
    let values = states(&[1, 1, 0, 2, 2, 1, 0, 0]);
    let bulk = Sequence::with_values(at(TS), 60, &values);

    let mut incremental = Sequence::new(at(TS), 60);
    for (i, &value) in values.iter().enumerate() {
        incremental.add(at(TS + i as i64 * F), value).unwrap();
    }
    assert_eq!(incremental, bulk);
}

#[test]
fn test_serialization_round_trip_preserves_observable_state() {
    let mut s = Sequence::with_values(at(TS), 60, &states(&[1, 0, 2, 1, 1, 1]));
    s.set_length(1000);
    let restored = Sequence::from_bytes(&s.to_bytes()).unwrap();

    assert_eq!(restored.timestamp(), s.timestamp());
    assert_eq!(restored.frequency(), s.frequency());
    assert_eq!(restored.length(), s.length());
    assert_eq!(restored.count(), s.count());
    assert_eq!(restored.values(), s.values());
    assert_eq!(restored.to_bytes(), s.to_bytes());
}

#[test]
fn test_round_trip_of_default_length_sequence() {
    let s = Sequence::new(at(TS), 1);
    let restored = Sequence::from_bytes(&s.to_bytes()).unwrap();
    assert_eq!(restored.length(), MAX_SEQUENCE_LENGTH);
    assert!(restored.is_empty());
}

#[test]
fn test_randomized_round_trips() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let frequency: u16 = rng.gen_range(1..=3600);
        let n = rng.gen_range(0..300);
        let values: Vec<State> = (0..n).map(|_| State::from(rng.gen_range(0u8..3))).collect();
        let s = Sequence::with_values(at(rng.gen_range(0..=u32::MAX as i64)), frequency, &values);

        let restored = Sequence::from_bytes(&s.to_bytes()).unwrap();
        assert_eq!(restored, s);
        assert_eq!(restored.values(), values);
    }
}

#[test]
fn test_rolling_window_lifecycle() {
    // A week-long window of one-minute slots, as a monitoring daemon
    // would configure it.
    let mut s = Sequence::new(at(TS), 60);
    s.set_length(140);

    for i in 0..135 {
        s.roll(at(TS + i * F), State::Active).unwrap();
    }
    assert_eq!(s.count(), 135);

    // Within capacity: plain append.
    s.roll(at(TS + 135 * F), State::Active).unwrap();
    assert_eq!(s.timestamp(), TS);
    assert_eq!(s.count(), 136);

    // Six slots past capacity: the window slides.
    s.roll(at(TS + 145 * F), State::Inactive).unwrap();
    assert_eq!(s.timestamp(), TS + 6 * F);
    assert_eq!(s.count(), 140);
    let values = s.values();
    assert_eq!(values[0], State::Active);
    assert_eq!(values[139], State::Inactive);

    // Far past capacity: everything current shifts out.
    let t = s.timestamp();
    s.roll(at(t + 4133 * F), State::Active).unwrap();
    assert_eq!(s.timestamp(), t + (4134 - 140) * F);
    assert_eq!(s.count(), 140);
    let values = s.values();
    assert_eq!(values[..139], vec![State::Unknown; 139][..]);
    assert_eq!(values[139], State::Active);
}

#[test]
fn test_roll_steady_state_is_cheap() {
    // A full window holding one single-byte run advances without
    // rewriting the payload.
    let mut s = Sequence::new(at(TS), 60);
    s.set_length(30);
    for i in 0..30 {
        s.roll(at(TS + i * F), State::Active).unwrap();
    }
    let bytes = s.to_bytes();

    for i in 30..60 {
        s.roll(at(TS + i * F), State::Active).unwrap();
    }
    assert_eq!(s.timestamp(), TS + 30 * F);
    assert_eq!(s.count(), 30);
    // Only the header timestamp differs.
    assert_eq!(s.to_bytes()[14..], bytes[14..]);
}

#[test]
fn test_trim_left_composes_with_values() {
    let values = states(&[1, 1, 1, 0, 0, 2, 2, 1, 0, 1]);
    for skip in 0..values.len() as i64 {
        let mut s = Sequence::with_values(at(TS), 60, &values);
        s.trim_left(at(TS + skip * F)).unwrap();
        assert_eq!(s.timestamp(), TS + skip * F);
        assert_eq!(s.values(), values[skip as usize..].to_vec(), "skip {skip}");
    }
}

#[test]
fn test_trim_left_then_round_trip() {
    let mut s = Sequence::with_values(at(TS), 60, &states(&[1, 1, 0, 0, 0, 1, 2, 2, 1]));
    s.trim_left(at(TS + 4 * F)).unwrap();
    let restored = Sequence::from_bytes(&s.to_bytes()).unwrap();
    assert_eq!(restored, s);
    assert_eq!(restored.values(), states(&[0, 1, 2, 2, 1]));
}

#[test]
fn test_gap_fill_then_query_round_trip() {
    let mut s = Sequence::new(at(TS), 60);
    s.add(at(TS), State::Active).unwrap();
    s.add(at(TS + 10 * F), State::Active).unwrap();

    let restored = Sequence::from_bytes(&s.to_bytes()).unwrap();
    let set = restored.query_values(at(TS), at(TS + 10 * F)).unwrap();
    let mut want = vec![State::Unknown; 11];
    want[0] = State::Active;
    want[10] = State::Active;
    assert_eq!(set.values, want);
}
