//! Scenario: a sharp swing and reversion inside one second is blocked.
//!
//! # Invariants under test
//!
//! 1. History 2000 @ t-900 and 2300 @ t-500 followed by 2000 @ t yields a
//!    CRITICAL FLASH_LOAN_ATTACK that blocks the submission.
//! 2. The same prices spread over minutes raise nothing.

use og_coord::MemoryStore;
use og_history::{PricePoint, PriceWindow};
use og_schemas::{FeedId, Identity, ManualClock, Price, Severity};
use og_spoof::{AlertKind, DetectionConfig, SpoofEngine, Submission};
use std::sync::Arc;
use std::time::Duration;

const NOW: i64 = 1_700_000_000_000;

fn window(points: &[(u64, i64)]) -> PriceWindow {
    let mut w = PriceWindow::new();
    for (price, ts) in points {
        w.push(PricePoint::new(Price::from_u64(*price), *ts, "collector", 1.0));
    }
    w
}

fn submission() -> Submission {
    Submission {
        feed: FeedId::new("ETH_USD"),
        price: Price::from_u64(2_000),
        timestamp_ms: NOW,
        identity: Identity::new("0xoracle"),
        proof_token: "flash-1".into(),
    }
}

#[tokio::test]
async fn swing_inside_window_is_critical() {
    let store = MemoryStore::with_clock(Arc::new(ManualClock::new(NOW)));
    let engine =
        SpoofEngine::new(DetectionConfig::default(), Duration::from_millis(500), 100).unwrap();

    let w = window(&[(2_000, NOW - 900), (2_300, NOW - 500)]);
    let res = engine.validate(&store, &w, &submission(), NOW).await;

    assert!(res.blocked);
    let alert = res
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::FlashLoanAttack)
        .expect("flash loan alert");
    assert_eq!(alert.severity, Severity::Critical);
    assert!(alert.recommendation.starts_with("EMERGENCY"));
}

#[tokio::test]
async fn same_prices_over_minutes_are_clean() {
    let store = MemoryStore::with_clock(Arc::new(ManualClock::new(NOW)));
    let engine =
        SpoofEngine::new(DetectionConfig::default(), Duration::from_millis(500), 100).unwrap();

    let w = window(&[(2_000, NOW - 180_000), (2_300, NOW - 120_000)]);
    let res = engine.validate(&store, &w, &submission(), NOW).await;

    assert!(res.valid, "unexpected alerts: {:?}", res.alerts);
}
