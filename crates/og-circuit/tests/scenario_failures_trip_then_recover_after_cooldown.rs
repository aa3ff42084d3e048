//! Scenario: six failures open the breaker; cooldown plus three trial
//! successes close it again.
//!
//! # Invariants under test
//!
//! 1. Six failed requests with defaults leave the breaker OPEN with
//!    `trip_count = 1` (the sixth lands on an already OPEN breaker).
//! 2. `can_pass` denies until exactly `cooldown_until` and admits (moving to
//!    HALF_OPEN) at that instant.
//! 3. Three half-open successes close the breaker; `trip_count` survives,
//!    request counters are reset.
//! 4. Each transition emits exactly one event.

use og_circuit::{
    can_pass, record_request, CircuitBreakerState, CircuitConfig, CircuitEvent, CircuitStatus,
    RequestRecord,
};
use og_schemas::{FeedId, Price};

const T0: i64 = 1_700_000_000_000;

fn req(ts: i64) -> RequestRecord {
    RequestRecord {
        price: Price::from_u64(2_000),
        timestamp_ms: ts,
        source: "consumer".into(),
        latency_ms: 20,
        trial: false,
    }
}

#[test]
fn round_trip_closed_open_half_open_closed() {
    let cfg = CircuitConfig::default();
    let mut st = CircuitBreakerState::new(FeedId::new("ETH_USD"));
    let mut events = Vec::new();

    for i in 0..6 {
        record_request(&cfg, &mut st, T0 + i, false, &req(T0 + i), None, &mut events);
    }
    assert_eq!(st.status, CircuitStatus::Open);
    assert_eq!(st.trip_count, 1);
    assert_eq!(events.len(), 1);
    let tripped_at = T0 + 4;
    let until = tripped_at + cfg.cooldown_ms;
    assert_eq!(st.cooldown_until_ms, Some(until));

    let d = can_pass(&cfg, &mut st, until - 1, &mut events);
    assert!(!d.allowed);
    assert_eq!(d.cooldown_until_ms, Some(until));
    assert!(d.reason.unwrap().starts_with("circuit open"));
    assert_eq!(st.status, CircuitStatus::Open);

    let d = can_pass(&cfg, &mut st, until, &mut events);
    assert!(d.allowed);
    assert!(d.trial);
    assert_eq!(st.status, CircuitStatus::HalfOpen);
    assert!(matches!(events.last(), Some(CircuitEvent::HalfOpen { .. })));

    for i in 0..3 {
        record_request(&cfg, &mut st, until + i, true, &req(until + i), None, &mut events);
    }
    assert_eq!(st.status, CircuitStatus::Closed);
    assert_eq!(st.trip_count, 1);
    assert_eq!(st.metrics.failed_requests, 0);
    assert_eq!(st.metrics.total_requests, 0);
    assert_eq!(st.cooldown_until_ms, None);
    assert!(matches!(
        events.last(),
        Some(CircuitEvent::Reset { forced: false, .. })
    ));
    assert_eq!(events.len(), 3);
}

#[test]
fn snapshot_is_stable_without_requests() {
    let cfg = CircuitConfig::default();
    let mut st = CircuitBreakerState::new(FeedId::new("ETH_USD"));
    let mut events = Vec::new();
    record_request(&cfg, &mut st, T0, false, &req(T0), None, &mut events);

    let a = st.clone();
    let b = st.clone();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_value(&a).unwrap(),
        serde_json::to_value(&st).unwrap()
    );
}
