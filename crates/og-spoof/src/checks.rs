//! Pure detectors.
//!
//! Each check returns `Some(alert)` or `None` and never touches IO. The
//! store-backed checks read their records through `coordination` and then
//! call the `evaluate_*` functions here.

use crate::types::{AlertKind, DetectionConfig, SpoofAlert, Submission};
use og_coord::{PendingTxRecord, SubmissionRecord};
use og_history::{mean, population_std_dev, relative_change, PriceWindow};
use og_reputation::{LookalikeTolerance, OracleProfile, ReputationTracker};
use og_schemas::{Identity, Severity};
use std::collections::BTreeSet;

/// z-score above which a manipulation alert is HIGH.
pub const Z_HIGH: f64 = 4.0;
/// z-score above which a manipulation alert is CRITICAL.
pub const Z_CRITICAL: f64 = 5.0;

fn fmt6(v: f64) -> String {
    format!("{v:.6}")
}

// ---------------------------------------------------------------------------
// Price manipulation
// ---------------------------------------------------------------------------

/// Compare the submitted price with the mean of the last `price_window`
/// points. Needs a full window. A flat history (std = 0) makes any
/// over-threshold deviation infinitely unlikely, so z is `+inf` there.
pub fn check_price_manipulation(
    cfg: &DetectionConfig,
    window: &PriceWindow,
    sub: &Submission,
    now_ms: i64,
) -> Option<SpoofAlert> {
    if window.len() < cfg.price_window {
        return None;
    }
    let xs = window.recent_prices_f64(cfg.price_window);
    let m = mean(&xs)?;
    if m <= 0.0 {
        return None;
    }
    let std = population_std_dev(&xs)?;
    let p = sub.price.to_f64();

    let deviation = (p - m).abs() / m;
    if deviation <= cfg.price_deviation_threshold {
        return None;
    }
    let z = if std > 0.0 {
        (p - m).abs() / std
    } else {
        f64::INFINITY
    };
    if z <= cfg.z_score_threshold {
        return None;
    }

    let severity = if z > Z_CRITICAL {
        Severity::Critical
    } else if z > Z_HIGH {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(
        SpoofAlert::new(
            AlertKind::PriceManipulation,
            severity,
            &sub.feed,
            vec![sub.identity.clone()],
            now_ms,
        )
        .with_detail("price", sub.price.to_string())
        .with_detail("window_mean", fmt6(m))
        .with_detail("window_std_dev", fmt6(std))
        .with_detail("deviation", fmt6(deviation))
        .with_detail("z_score", fmt6(z)),
    )
}

// ---------------------------------------------------------------------------
// Flash loan
// ---------------------------------------------------------------------------

/// Average relative change across the short sequence of history points
/// inside `±flash_loan_window_ms` of the submission, followed by the
/// submitted price.
pub fn check_flash_loan(
    cfg: &DetectionConfig,
    window: &PriceWindow,
    sub: &Submission,
    now_ms: i64,
) -> Option<SpoofAlert> {
    let mut seq: Vec<f64> = window
        .iter()
        .filter(|pt| (pt.timestamp_ms - sub.timestamp_ms).abs() <= cfg.flash_loan_window_ms)
        .map(|pt| pt.price.to_f64())
        .collect();
    if seq.len() < cfg.flash_loan_min_points {
        return None;
    }
    let prior = seq.len();
    seq.push(sub.price.to_f64());

    let changes: Vec<f64> = seq
        .windows(2)
        .filter_map(|w| relative_change(w[0], w[1]))
        .collect();
    let avg = mean(&changes)?;
    if avg <= cfg.flash_loan_change_threshold {
        return None;
    }

    Some(
        SpoofAlert::new(
            AlertKind::FlashLoanAttack,
            Severity::Critical,
            &sub.feed,
            vec![sub.identity.clone()],
            now_ms,
        )
        .with_detail("window_points", prior.to_string())
        .with_detail("average_change", fmt6(avg))
        .with_detail("window_ms", cfg.flash_loan_window_ms.to_string()),
    )
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Future timestamps beyond the skew tolerance are HIGH. Latency far above
/// the identity's usual response time is MEDIUM; that half only runs once
/// the profile has a non-zero average.
pub fn check_timestamp(
    cfg: &DetectionConfig,
    profile: Option<&OracleProfile>,
    sub: &Submission,
    now_ms: i64,
) -> Option<SpoofAlert> {
    let skew = sub.timestamp_ms.saturating_sub(now_ms);
    if skew > cfg.future_tolerance_ms {
        return Some(
            SpoofAlert::new(
                AlertKind::TimestampManipulation,
                Severity::High,
                &sub.feed,
                vec![sub.identity.clone()],
                now_ms,
            )
            .with_detail("direction", "future")
            .with_detail("skew_ms", skew.to_string()),
        );
    }

    let avg = profile.map(|p| p.average_response_time_ms).unwrap_or(0.0);
    if avg <= 0.0 {
        return None;
    }
    let latency = now_ms.saturating_sub(sub.timestamp_ms) as f64;
    if latency <= cfg.delay_multiplier * avg {
        return None;
    }

    Some(
        SpoofAlert::new(
            AlertKind::TimestampManipulation,
            Severity::Medium,
            &sub.feed,
            vec![sub.identity.clone()],
            now_ms,
        )
        .with_detail("direction", "delayed")
        .with_detail("latency_ms", format!("{latency:.0}"))
        .with_detail("average_response_time_ms", fmt6(avg)),
    )
}

// ---------------------------------------------------------------------------
// Sybil
// ---------------------------------------------------------------------------

pub fn sybil_tolerance(cfg: &DetectionConfig) -> LookalikeTolerance {
    LookalikeTolerance {
        response_time_ms: cfg.sybil_response_time_tolerance_ms,
        accuracy: cfg.sybil_accuracy_tolerance,
        correlation: cfg.sybil_correlation_tolerance,
        min_observations: cfg.sybil_min_observations,
    }
}

/// Identities whose behavioral profile is indistinguishable from the
/// submitter's. Unknown identities never match.
pub fn check_sybil(
    cfg: &DetectionConfig,
    tracker: &ReputationTracker,
    sub: &Submission,
    now_ms: i64,
) -> Option<SpoofAlert> {
    let lookalikes = tracker.lookalikes(&sub.identity, &sybil_tolerance(cfg));
    if lookalikes.len() < cfg.sybil_min_matches {
        return None;
    }

    let mut affected = vec![sub.identity.clone()];
    affected.extend(lookalikes.iter().map(|p| p.identity.clone()));

    Some(
        SpoofAlert::new(
            AlertKind::SybilAttack,
            Severity::High,
            &sub.feed,
            affected,
            now_ms,
        )
        .with_detail("lookalike_count", lookalikes.len().to_string()),
    )
}

// ---------------------------------------------------------------------------
// Store-backed evaluators
// ---------------------------------------------------------------------------

/// Many distinct identities converging on the same price at the same time.
/// `records` is the shared recent-submission list and already contains the
/// current submission.
pub fn evaluate_coordinated(
    cfg: &DetectionConfig,
    sub: &Submission,
    records: &[SubmissionRecord],
    now_ms: i64,
) -> Option<SpoofAlert> {
    let p = sub.price.to_f64();
    if p <= 0.0 {
        return None;
    }

    let similar: Vec<&SubmissionRecord> = records
        .iter()
        .filter(|r| (r.timestamp_ms - sub.timestamp_ms).abs() <= cfg.coordinated_window_ms)
        .filter(|r| (r.price.to_f64() - p).abs() / p < cfg.coordinated_price_tolerance)
        .collect();

    let identities: BTreeSet<&Identity> = similar.iter().map(|r| &r.identity).collect();
    if similar.len() < cfg.coordinated_min_submissions
        || identities.len() < cfg.coordinated_min_identities
    {
        return None;
    }

    Some(
        SpoofAlert::new(
            AlertKind::CoordinatedAttack,
            Severity::Critical,
            &sub.feed,
            identities.iter().map(|i| (*i).clone()).collect(),
            now_ms,
        )
        .with_detail("similar_submissions", similar.len().to_string())
        .with_detail("distinct_identities", identities.len().to_string()),
    )
}

/// Pending transactions recorded within `front_running_window_ms` of the
/// submission timestamp.
pub fn evaluate_front_running(
    cfg: &DetectionConfig,
    sub: &Submission,
    pending: &[PendingTxRecord],
    now_ms: i64,
) -> Option<SpoofAlert> {
    let close: Vec<&PendingTxRecord> = pending
        .iter()
        .filter(|tx| (tx.timestamp_ms - sub.timestamp_ms).abs() <= cfg.front_running_window_ms)
        .collect();
    if close.is_empty() {
        return None;
    }

    let tx_ids = close
        .iter()
        .map(|tx| tx.tx_id.as_str())
        .collect::<Vec<_>>()
        .join(",");

    Some(
        SpoofAlert::new(
            AlertKind::FrontRunning,
            Severity::Medium,
            &sub.feed,
            vec![sub.identity.clone()],
            now_ms,
        )
        .with_detail("pending_tx_count", close.len().to_string())
        .with_detail("pending_tx_ids", tx_ids),
    )
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Agreement of the submitted price with the recent window mean, `[0, 1]`.
/// 1.0 when there is no history to disagree with.
pub fn consensus_score(cfg: &DetectionConfig, window: &PriceWindow, sub: &Submission) -> f64 {
    let xs = window.recent_prices_f64(cfg.price_window);
    match mean(&xs) {
        Some(m) if m > 0.0 => {
            let dev = (sub.price.to_f64() - m).abs() / m;
            (1.0 - dev / cfg.price_deviation_threshold).max(0.0)
        }
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_history::PricePoint;
    use og_reputation::ProfileObservation;
    use og_schemas::{FeedId, Price};

    fn sub(price: u64, ts: i64, who: &str) -> Submission {
        Submission {
            feed: FeedId::new("ETH_USD"),
            price: Price::from_u64(price),
            timestamp_ms: ts,
            identity: Identity::new(who),
            proof_token: format!("{who}-{ts}"),
        }
    }

    fn window_of(prices: &[u64], start_ms: i64, step_ms: i64) -> PriceWindow {
        let mut w = PriceWindow::new();
        for (i, p) in prices.iter().enumerate() {
            w.push(PricePoint::new(
                Price::from_u64(*p),
                start_ms + i as i64 * step_ms,
                "test",
                1.0,
            ));
        }
        w
    }

    #[test]
    fn manipulation_needs_full_window() {
        let cfg = DetectionConfig::default();
        let w = window_of(&[2_000; 19], 0, 60_000);
        assert!(check_price_manipulation(&cfg, &w, &sub(4_000, 2_000_000, "a"), 2_000_000).is_none());
    }

    #[test]
    fn manipulation_on_flat_history_is_critical() {
        let cfg = DetectionConfig::default();
        let w = window_of(&[2_000; 25], 0, 60_000);
        let a = check_price_manipulation(&cfg, &w, &sub(2_400, 2_000_000, "a"), 2_000_000)
            .expect("alert");
        assert_eq!(a.severity, Severity::Critical);
        assert!(a.blocked);
        assert_eq!(a.details.get("z_score").map(String::as_str), Some("inf"));
    }

    #[test]
    fn small_deviation_is_ignored_even_with_high_z() {
        let cfg = DetectionConfig::default();
        let w = window_of(&[2_000; 25], 0, 60_000);
        // 1% move: z is infinite but deviation stays under 5%.
        assert!(check_price_manipulation(&cfg, &w, &sub(2_020, 2_000_000, "a"), 2_000_000).is_none());
    }

    #[test]
    fn manipulation_severity_bands_follow_z() {
        let cfg = DetectionConfig::default();
        // mean 1000, population std 100.
        let mut prices = vec![900u64; 10];
        prices.extend(vec![1_100u64; 10]);
        let w = window_of(&prices, 0, 60_000);

        // deviation 35%, z = 3.5
        let a = check_price_manipulation(&cfg, &w, &sub(1_350, 5_000_000, "a"), 5_000_000).unwrap();
        assert_eq!(a.severity, Severity::Medium);
        assert!(!a.blocked);

        // z = 4.5
        let a = check_price_manipulation(&cfg, &w, &sub(1_450, 5_000_000, "a"), 5_000_000).unwrap();
        assert_eq!(a.severity, Severity::High);
        assert!(a.blocked);

        // z = 2.5: large deviation but within the noise
        assert!(check_price_manipulation(&cfg, &w, &sub(1_250, 5_000_000, "a"), 5_000_000).is_none());
    }

    #[test]
    fn flash_loan_needs_two_prior_points() {
        let cfg = DetectionConfig::default();
        let w = window_of(&[2_000], 9_500, 1);
        assert!(check_flash_loan(&cfg, &w, &sub(2_600, 10_000, "a"), 10_000).is_none());
    }

    #[test]
    fn flash_loan_swing_is_critical() {
        let cfg = DetectionConfig::default();
        // 2000 @ t-900, 2300 @ t-500, then 2000 @ t.
        let mut w = PriceWindow::new();
        w.push(PricePoint::new(Price::from_u64(2_000), 9_100, "t", 1.0));
        w.push(PricePoint::new(Price::from_u64(2_300), 9_500, "t", 1.0));
        let a = check_flash_loan(&cfg, &w, &sub(2_000, 10_000, "a"), 10_000).expect("alert");
        assert_eq!(a.kind, AlertKind::FlashLoanAttack);
        assert_eq!(a.severity, Severity::Critical);
        assert!(a.blocked);
    }

    #[test]
    fn flash_loan_ignores_points_outside_window() {
        let cfg = DetectionConfig::default();
        let mut w = PriceWindow::new();
        w.push(PricePoint::new(Price::from_u64(2_000), 8_000, "t", 1.0));
        w.push(PricePoint::new(Price::from_u64(2_300), 8_500, "t", 1.0));
        assert!(check_flash_loan(&cfg, &w, &sub(2_000, 10_000, "a"), 10_000).is_none());
    }

    #[test]
    fn future_timestamp_is_high_and_not_blocking() {
        let cfg = DetectionConfig::default();
        let a = check_timestamp(&cfg, None, &sub(2_000, 12_000, "a"), 10_000).unwrap();
        assert_eq!(a.severity, Severity::High);
        assert!(!a.blocked);
        assert!(check_timestamp(&cfg, None, &sub(2_000, 11_000, "a"), 10_000).is_none());
    }

    #[test]
    fn delayed_timestamp_needs_a_baseline() {
        let cfg = DetectionConfig::default();
        let id = Identity::new("a");
        assert!(check_timestamp(&cfg, None, &sub(2_000, 1, "a"), 10_000).is_none());

        let mut t = ReputationTracker::new();
        t.update_profile(
            &id,
            false,
            &[],
            ProfileObservation {
                response_time_ms: 50.0,
                consensus_score: 1.0,
            },
            0,
        );
        let p = t.profile(&id);
        let a = check_timestamp(&cfg, p, &sub(2_000, 9_000, "a"), 10_000).unwrap();
        assert_eq!(a.severity, Severity::Medium);
        assert!(check_timestamp(&cfg, p, &sub(2_000, 9_600, "a"), 10_000).is_none());
    }

    #[test]
    fn coordinated_requires_distinct_identities() {
        let cfg = DetectionConfig::default();
        let rec = |who: &str, price: u64, ts: i64| SubmissionRecord {
            identity: Identity::new(who),
            price: Price::from_u64(price),
            timestamp_ms: ts,
        };

        let same_identity = vec![rec("a", 2_000, 1_000), rec("a", 2_000, 1_500), rec("a", 2_001, 2_000)];
        assert!(evaluate_coordinated(&cfg, &sub(2_001, 2_000, "a"), &same_identity, 2_000).is_none());

        let three = vec![rec("c", 2_001, 2_000), rec("b", 2_000, 1_500), rec("a", 2_000, 1_000)];
        let a = evaluate_coordinated(&cfg, &sub(2_001, 2_000, "c"), &three, 2_000).unwrap();
        assert_eq!(a.severity, Severity::Critical);
        assert_eq!(a.affected.len(), 3);
    }

    #[test]
    fn front_running_window_is_inclusive() {
        let cfg = DetectionConfig::default();
        let pending = vec![PendingTxRecord {
            tx_id: "0xdead".into(),
            timestamp_ms: 10_100,
        }];
        let a = evaluate_front_running(&cfg, &sub(2_000, 10_000, "a"), &pending, 10_000).unwrap();
        assert_eq!(a.severity, Severity::Medium);
        assert!(!a.blocked);
        assert!(evaluate_front_running(&cfg, &sub(2_000, 9_899, "a"), &pending, 10_000).is_none());
    }

    #[test]
    fn consensus_score_without_history_is_one() {
        let cfg = DetectionConfig::default();
        assert_eq!(consensus_score(&cfg, &PriceWindow::new(), &sub(2_000, 1, "a")), 1.0);
        let w = window_of(&[2_000; 5], 0, 1);
        assert_eq!(consensus_score(&cfg, &w, &sub(2_200, 10, "a")), 0.0);
        assert!((consensus_score(&cfg, &w, &sub(2_050, 10, "a")) - 0.5).abs() < 1e-9);
    }
}
