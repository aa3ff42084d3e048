//! Scenario: the three blocking attack patterns, driven through the façade.
//!
//! # Invariants under test
//!
//! 1. A 20% jump over a flat 25-point history raises PRICE_MANIPULATION at
//!    HIGH or CRITICAL and blocks.
//! 2. A swing and reversion across submissions under a second apart raises
//!    FLASH_LOAN_ATTACK once the window holds two prior points.
//! 3. Three identities agreeing on one price within two seconds are blocked
//!    on the third submission, naming all three.
//! 4. Blocked verdicts are mirrored in the alert log and the statistics.

use og_schemas::{FeedId, Identity, Price, Severity};
use og_spoof::AlertKind;
use og_testkit::{submission, GuardHarness, T0};

#[tokio::test]
async fn jump_over_flat_history_is_blocked() -> anyhow::Result<()> {
    let h = GuardHarness::new()?;
    let feed = FeedId::new("ETH_USD");
    h.seed_flat(&feed, 2_000, 25)?;

    let res = h
        .guard
        .validate_submission(&submission(&feed, "0xoracle", 2_400, T0, "a-1"))
        .await;

    assert!(!res.valid);
    assert!(res.blocked);
    let alert = res
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::PriceManipulation)
        .expect("manipulation alert");
    assert!(alert.severity >= Severity::High);
    assert_eq!(h.guard.alerts_for_feed(&feed).len(), res.alerts.len());
    Ok(())
}

#[tokio::test]
async fn swing_and_reversion_inside_a_second_is_blocked() -> anyhow::Result<()> {
    let h = GuardHarness::new()?;
    let feed = FeedId::new("ETH_USD");

    for (i, (at, price)) in [(T0, 2_000), (T0 + 500, 2_300)].into_iter().enumerate() {
        h.clock.set(at);
        let res = h
            .guard
            .validate_submission(&submission(&feed, "0xoracle", price, at, &format!("b-{i}")))
            .await;
        assert!(res.valid, "leg {i} flagged: {:?}", res.alerts);
        h.guard
            .add_price_point(&feed, Price::from_u64(price), at, "0xoracle", 0.99)?;
    }

    h.clock.set(T0 + 900);
    let res = h
        .guard
        .validate_submission(&submission(&feed, "0xoracle", 2_000, T0 + 900, "b-2"))
        .await;

    assert!(res.blocked);
    let alert = res
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::FlashLoanAttack)
        .expect("flash loan alert");
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.details.get("window_points").map(String::as_str), Some("2"));
    Ok(())
}

#[tokio::test]
async fn third_colluding_identity_is_blocked() -> anyhow::Result<()> {
    let h = GuardHarness::new()?;
    let feed = FeedId::new("BTC_USD");
    let price = 100_000; // 1000.00

    let mut verdicts = Vec::new();
    for (i, who) in ["0xaaa", "0xbbb", "0xccc"].into_iter().enumerate() {
        let at = T0 + i as i64 * 1_000;
        h.clock.set(at);
        verdicts.push(
            h.guard
                .validate_submission(&submission(&feed, who, price, at, &format!("c-{i}")))
                .await,
        );
    }

    assert!(verdicts[0].valid);
    assert!(verdicts[1].valid);
    let last = &verdicts[2];
    assert!(last.blocked);
    let alert = last
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::CoordinatedAttack)
        .expect("coordinated alert");
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(
        alert.affected,
        vec![
            Identity::new("0xaaa"),
            Identity::new("0xbbb"),
            Identity::new("0xccc")
        ]
    );

    let stats = h.guard.statistics();
    assert_eq!(stats.validations, 3);
    assert_eq!(stats.blocked_submissions, 1);
    assert_eq!(
        stats.alerts_by_kind.get(&AlertKind::CoordinatedAttack),
        Some(&1)
    );
    Ok(())
}
