//! Scenario: the façade wires verdicts into the bus, the breaker and the
//! query surface.
//!
//! # Invariants under test
//!
//! 1. First access to a feed emits exactly one `CircuitInitialized`.
//! 2. A blocked submission emits one `SpoofDetected` per alert, then one
//!    `SubmissionBlocked`, and counts as a failure on the feed's breaker.
//! 3. With `trip_on_critical_alert` a CRITICAL alert opens the feed at once;
//!    further CRITICAL alerts on the OPEN feed neither re-trip it nor move
//!    its cooldown, even when the same submission already tripped it.
//! 4. `circuit_state` is a stable snapshot without intervening requests.
//! 5. Statistics aggregate circuits and alerts.
//! 6. Price history is kept per feed, oldest first; an unknown feed reads
//!    as empty and is not created by the read.

use og_circuit::CircuitStatus;
use og_config::GuardConfig;
use og_coord::MemoryStore;
use og_guard::{GuardEvent, IntegrityGuard};
use og_schemas::{FeedId, Identity, ManualClock, Price, Severity};
use og_spoof::{AlertKind, Submission};
use std::sync::Arc;

const NOW: i64 = 1_700_000_000_000;

fn guard_with(cfg: GuardConfig) -> (Arc<ManualClock>, IntegrityGuard) {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let guard = IntegrityGuard::new(cfg, store, clock.clone()).unwrap();
    (clock, guard)
}

fn seed_flat_history(guard: &IntegrityGuard, feed: &FeedId) {
    for i in 0..25 {
        guard.add_price_point(
            feed,
            Price::from_u64(2_000),
            NOW - (25 - i) * 60_000,
            "collector",
            0.99,
        )
        .unwrap();
    }
}

fn outlier(feed: &FeedId) -> Submission {
    Submission {
        feed: feed.clone(),
        price: Price::from_u64(2_400),
        timestamp_ms: NOW,
        identity: Identity::new("0xbad"),
        proof_token: "p-1".into(),
    }
}

#[tokio::test]
async fn blocked_submission_emits_events_and_counts_as_failure() {
    let (_clock, guard) = guard_with(GuardConfig::default());
    let mut rx = guard.subscribe();
    let feed = FeedId::new("ETH_USD");

    seed_flat_history(&guard, &feed);
    match rx.try_recv().unwrap() {
        GuardEvent::CircuitInitialized { feed: f, .. } => assert_eq!(f, feed),
        other => panic!("unexpected event {other:?}"),
    }

    let res = guard.validate_submission(&outlier(&feed)).await;
    assert!(res.blocked);

    let mut detected = 0;
    loop {
        match rx.try_recv().unwrap() {
            GuardEvent::SpoofDetected { alert } => {
                assert_eq!(alert.feed, feed);
                detected += 1;
            }
            GuardEvent::SubmissionBlocked { alert_ids, .. } => {
                assert_eq!(alert_ids.len(), res.alerts.len());
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(detected, res.alerts.len());

    let st = guard.circuit_state(&feed).unwrap();
    assert_eq!(st.status, CircuitStatus::Closed);
    assert_eq!(st.metrics.failed_requests, 1);
    assert_eq!(guard.circuit_state(&feed).unwrap(), st);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn critical_alert_can_trip_the_feed() {
    let cfg = GuardConfig {
        trip_on_critical_alert: true,
        ..GuardConfig::default()
    };
    let (_clock, guard) = guard_with(cfg);
    let feed = FeedId::new("ETH_USD");
    seed_flat_history(&guard, &feed);

    let res = guard.validate_submission(&outlier(&feed)).await;
    assert_eq!(res.max_severity(), Some(Severity::Critical));

    let st = guard.circuit_state(&feed).unwrap();
    assert_eq!(st.status, CircuitStatus::Open);
    assert_eq!(
        st.reason.as_deref(),
        Some("critical spoof alert: PRICE_MANIPULATION")
    );
    assert!(!guard.can_pass_through(&feed).unwrap().allowed);
}

#[tokio::test]
async fn critical_alerts_on_open_feed_do_not_retrip() {
    let cfg = GuardConfig {
        trip_on_critical_alert: true,
        ..GuardConfig::default()
    };
    let (clock, guard) = guard_with(cfg);
    let feed = FeedId::new("ETH_USD");
    seed_flat_history(&guard, &feed);
    let mut rx = guard.subscribe();

    for i in 0..3 {
        let sub = Submission {
            proof_token: format!("p-{i}"),
            ..outlier(&feed)
        };
        let res = guard.validate_submission(&sub).await;
        assert_eq!(res.max_severity(), Some(Severity::Critical));
        if i == 0 {
            clock.advance(1_000);
        }
    }

    let st = guard.circuit_state(&feed).unwrap();
    assert_eq!(st.status, CircuitStatus::Open);
    assert_eq!(st.trip_count, 1);
    assert_eq!(st.cooldown_until_ms, Some(NOW + guard.config().circuit.cooldown_ms));

    let mut tripped = 0;
    while let Ok(ev) = rx.try_recv() {
        if matches!(ev, GuardEvent::CircuitTripped { .. }) {
            tripped += 1;
        }
    }
    assert_eq!(tripped, 1);
    assert_eq!(guard.statistics().total_trips, 1);
}

#[tokio::test]
async fn rejection_trip_and_critical_alert_trip_once() {
    let mut cfg = GuardConfig {
        trip_on_critical_alert: true,
        ..GuardConfig::default()
    };
    cfg.circuit.failure_threshold = 1;
    let (_clock, guard) = guard_with(cfg);
    let feed = FeedId::new("ETH_USD");
    seed_flat_history(&guard, &feed);

    let res = guard.validate_submission(&outlier(&feed)).await;
    assert!(res.blocked);

    let st = guard.circuit_state(&feed).unwrap();
    assert_eq!(st.status, CircuitStatus::Open);
    assert_eq!(st.trip_count, 1);
    assert_eq!(
        st.reason.as_deref(),
        Some("failure threshold reached (1 recent failures)")
    );
}

#[tokio::test]
async fn statistics_aggregate_feeds_and_alerts() {
    let (_clock, guard) = guard_with(GuardConfig::default());
    let eth = FeedId::new("ETH_USD");
    let btc = FeedId::new("BTC_USD");
    seed_flat_history(&guard, &eth);
    guard.validate_submission(&outlier(&eth)).await;
    guard.force_trip(&btc, "maintenance").unwrap();

    let stats = guard.statistics();
    assert_eq!(stats.feeds, 2);
    assert_eq!(stats.circuits_open, 1);
    assert_eq!(stats.circuits_closed, 1);
    assert_eq!(stats.total_trips, 1);
    assert_eq!(stats.validations, 1);
    assert_eq!(stats.blocked_submissions, 1);
    assert_eq!(stats.total_alerts, guard.alerts().len());
    assert_eq!(
        stats.alerts_by_kind.get(&AlertKind::PriceManipulation),
        Some(&1)
    );
    assert_eq!(guard.alerts_for_feed(&btc).len(), 0);

    let states = guard.all_circuit_states();
    assert_eq!(states[0].feed, btc);
    assert_eq!(states[1].feed, eth);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["alerts_by_kind"]["PRICE_MANIPULATION"], 1);
}

#[tokio::test]
async fn price_history_is_per_feed() {
    let (_clock, guard) = guard_with(GuardConfig::default());
    let eth = FeedId::new("ETH_USD");
    let btc = FeedId::new("BTC_USD");
    seed_flat_history(&guard, &eth);
    guard
        .add_price_point(&btc, Price::from_u64(60_000), NOW, "collector", 0.99)
        .unwrap();

    let tail = guard.price_history(&eth, 3);
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[2].timestamp_ms, NOW - 60_000);
    assert!(tail[0].timestamp_ms < tail[1].timestamp_ms);
    assert_eq!(guard.price_history(&eth, usize::MAX).len(), 25);
    assert_eq!(guard.price_history(&btc, 10).len(), 1);

    assert!(guard.price_history(&FeedId::new("SOL_USD"), 10).is_empty());
    assert_eq!(guard.all_circuit_states().len(), 2);
}
