use og_schemas::{Identity, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_REPUTATION: u32 = 10_000;

/// Below this an identity is blacklisted.
pub const BLACKLIST_THRESHOLD: u32 = 1_000;

/// Reputation regained per clean submission.
pub const CLEAN_RECOVERY: u32 = 10;

/// Penalty per severity rank of the worst alert on a suspicious submission.
pub const PENALTY_PER_RANK: u32 = 100;

/// Smoothing factor for the behavioral moving averages.
pub const EMA_ALPHA: f64 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleProfile {
    pub identity: Identity,
    /// `0..=MAX_REPUTATION`.
    pub reputation: u32,
    /// Moving average of clean (1.0) vs suspicious (0.0) outcomes.
    pub historical_accuracy: f64,
    /// Moving average of submission latency (`now - timestamp`).
    pub average_response_time_ms: f64,
    /// Moving average of agreement with the feed's recent consensus, `[0, 1]`.
    pub consensus_correlation: f64,
    pub suspicious_activity_count: u32,
    pub last_suspicious_ms: Option<i64>,
    /// Number of validations folded into this profile.
    pub submission_count: u64,
}

impl OracleProfile {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            reputation: MAX_REPUTATION,
            historical_accuracy: 1.0,
            average_response_time_ms: 0.0,
            consensus_correlation: 1.0,
            suspicious_activity_count: 0,
            last_suspicious_ms: None,
            submission_count: 0,
        }
    }

    pub fn is_blacklisted(&self) -> bool {
        self.reputation < BLACKLIST_THRESHOLD
    }
}

/// Behavioral measurements taken from one validation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProfileObservation {
    /// `now - submission timestamp`, clamped at 0.
    pub response_time_ms: f64,
    /// Agreement with consensus in `[0, 1]` (1.0 = on the window mean).
    pub consensus_score: f64,
}

/// Closeness bands used to decide whether two profiles behave identically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LookalikeTolerance {
    pub response_time_ms: f64,
    pub accuracy: f64,
    pub correlation: f64,
    /// Profiles with fewer submissions are not compared at all.
    pub min_observations: u64,
}

fn ema(prev: f64, sample: f64, first: bool) -> f64 {
    if first {
        sample
    } else {
        prev + EMA_ALPHA * (sample - prev)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReputationTracker {
    profiles: BTreeMap<Identity, OracleProfile>,
}

impl ReputationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one validation outcome into `identity`'s profile.
    ///
    /// Suspicious: counter + stamp, reputation minus
    /// `PENALTY_PER_RANK * max rank` (floored at 0).
    /// Clean: reputation plus `CLEAN_RECOVERY` (capped).
    pub fn update_profile(
        &mut self,
        identity: &Identity,
        suspicious: bool,
        alert_severities: &[Severity],
        observation: ProfileObservation,
        now_ms: i64,
    ) -> &OracleProfile {
        let p = self
            .profiles
            .entry(identity.clone())
            .or_insert_with(|| OracleProfile::new(identity.clone()));

        let first = p.submission_count == 0;
        p.submission_count = p.submission_count.saturating_add(1);
        p.average_response_time_ms = ema(
            p.average_response_time_ms,
            observation.response_time_ms.max(0.0),
            first,
        );
        p.consensus_correlation = ema(
            p.consensus_correlation,
            observation.consensus_score.clamp(0.0, 1.0),
            first,
        );
        p.historical_accuracy = ema(
            p.historical_accuracy,
            if suspicious { 0.0 } else { 1.0 },
            first,
        );

        if suspicious {
            let worst = alert_severities.iter().map(Severity::rank).max().unwrap_or(0);
            p.suspicious_activity_count = p.suspicious_activity_count.saturating_add(1);
            p.last_suspicious_ms = Some(now_ms);
            p.reputation = p.reputation.saturating_sub(PENALTY_PER_RANK * worst);
        } else {
            p.reputation = p
                .reputation
                .saturating_add(CLEAN_RECOVERY)
                .min(MAX_REPUTATION);
        }
        p
    }

    pub fn profile(&self, identity: &Identity) -> Option<&OracleProfile> {
        self.profiles.get(identity)
    }

    /// Unknown identities are not blacklisted.
    pub fn is_blacklisted(&self, identity: &Identity) -> bool {
        self.profiles
            .get(identity)
            .is_some_and(OracleProfile::is_blacklisted)
    }

    pub fn blacklisted(&self) -> Vec<Identity> {
        self.profiles
            .values()
            .filter(|p| p.is_blacklisted())
            .map(|p| p.identity.clone())
            .collect()
    }

    /// Other profiles whose response time, accuracy and correlation all sit
    /// strictly within `tol` of `identity`'s. Empty if `identity` is unknown
    /// or has too few observations.
    pub fn lookalikes(&self, identity: &Identity, tol: &LookalikeTolerance) -> Vec<&OracleProfile> {
        let Some(me) = self.profiles.get(identity) else {
            return Vec::new();
        };
        if me.submission_count < tol.min_observations {
            return Vec::new();
        }
        self.profiles
            .values()
            .filter(|o| o.identity != me.identity)
            .filter(|o| o.submission_count >= tol.min_observations)
            .filter(|o| {
                (o.average_response_time_ms - me.average_response_time_ms).abs()
                    < tol.response_time_ms
                    && (o.historical_accuracy - me.historical_accuracy).abs() < tol.accuracy
                    && (o.consensus_correlation - me.consensus_correlation).abs()
                        < tol.correlation
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(rt: f64) -> ProfileObservation {
        ProfileObservation {
            response_time_ms: rt,
            consensus_score: 1.0,
        }
    }

    #[test]
    fn first_sample_seeds_moving_averages() {
        let mut t = ReputationTracker::new();
        let id = Identity::new("0xabc");
        let p = t.update_profile(&id, false, &[], obs(120.0), 1);
        assert_eq!(p.average_response_time_ms, 120.0);
        assert_eq!(p.submission_count, 1);

        let p = t.update_profile(&id, false, &[], obs(220.0), 2);
        assert!((p.average_response_time_ms - 130.0).abs() < 1e-9);
    }

    #[test]
    fn penalty_uses_worst_severity() {
        let mut t = ReputationTracker::new();
        let id = Identity::new("0xabc");
        let p = t.update_profile(
            &id,
            true,
            &[Severity::Medium, Severity::Critical, Severity::Low],
            obs(10.0),
            77,
        );
        assert_eq!(p.reputation, MAX_REPUTATION - 400);
        assert_eq!(p.suspicious_activity_count, 1);
        assert_eq!(p.last_suspicious_ms, Some(77));
        assert_eq!(p.historical_accuracy, 0.0);
    }

    #[test]
    fn unknown_identity_is_not_blacklisted() {
        let t = ReputationTracker::new();
        assert!(!t.is_blacklisted(&Identity::new("nobody")));
        assert!(t.blacklisted().is_empty());
    }
}
