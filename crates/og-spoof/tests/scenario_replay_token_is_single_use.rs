//! Scenario: a proof token is accepted at most once per feed.
//!
//! # Invariants under test
//!
//! 1. Reusing a token raises a CRITICAL REPLAY_ATTACK and blocks.
//! 2. Concurrent validations with the same token: exactly one passes the
//!    replay check.
//! 3. The token is free again once its TTL has elapsed.
//! 4. Tokens are scoped per feed.

use og_coord::MemoryStore;
use og_history::PriceWindow;
use og_schemas::{FeedId, Identity, ManualClock, Price, Severity};
use og_spoof::{AlertKind, DetectionConfig, SpoofEngine, Submission};
use std::sync::Arc;
use std::time::Duration;

const NOW: i64 = 1_700_000_000_000;

fn submission(feed: &str, who: &str, token: &str) -> Submission {
    Submission {
        feed: FeedId::new(feed),
        price: Price::from_u64(2_000),
        timestamp_ms: NOW,
        identity: Identity::new(who),
        proof_token: token.to_string(),
    }
}

fn replayed(res: &og_spoof::ValidationResult) -> bool {
    res.alerts.iter().any(|a| a.kind == AlertKind::ReplayAttack)
}

#[tokio::test]
async fn reused_token_is_blocked_until_ttl() {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = MemoryStore::with_clock(clock.clone());
    let cfg = DetectionConfig {
        proof_ttl_ms: 10_000,
        ..DetectionConfig::default()
    };
    let engine = SpoofEngine::new(cfg, Duration::from_millis(500), 100).unwrap();
    let empty = PriceWindow::new();

    let first = engine
        .validate(&store, &empty, &submission("ETH_USD", "0xa", "tok"), NOW)
        .await;
    assert!(!replayed(&first));

    let second = engine
        .validate(&store, &empty, &submission("ETH_USD", "0xa", "tok"), NOW)
        .await;
    assert!(second.blocked);
    let alert = second
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::ReplayAttack)
        .unwrap();
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.details.get("reason").map(String::as_str), Some("proof_reused"));

    let other_feed = engine
        .validate(&store, &empty, &submission("BTC_USD", "0xa", "tok"), NOW)
        .await;
    assert!(!replayed(&other_feed));

    clock.advance(10_000);
    let after_ttl = engine
        .validate(&store, &empty, &submission("ETH_USD", "0xa", "tok"), NOW + 10_000)
        .await;
    assert!(!replayed(&after_ttl));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reuse_passes_exactly_once() {
    let store = Arc::new(MemoryStore::with_clock(Arc::new(ManualClock::new(NOW))));
    let engine = Arc::new(
        SpoofEngine::new(DetectionConfig::default(), Duration::from_millis(500), 1_000).unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let sub = submission("ETH_USD", &format!("0x{i}"), "shared-token");
            let res = engine
                .validate(store.as_ref(), &PriceWindow::new(), &sub, NOW)
                .await;
            replayed(&res)
        }));
    }

    let mut passed = 0;
    for h in handles {
        if !h.await.unwrap() {
            passed += 1;
        }
    }
    assert_eq!(passed, 1);
}
