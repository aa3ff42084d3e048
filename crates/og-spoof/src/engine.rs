use crate::alert_log::AlertLog;
use crate::checks::{
    check_flash_loan, check_price_manipulation, check_sybil, check_timestamp, consensus_score,
};
use crate::coordination::{self, replay_unverifiable};
use crate::types::{
    AlertKind, DetectionConfig, DetectionConfigError, SpoofAlert, Submission, ValidationResult,
};
use og_coord::{CoordinationStore, StoreError};
use og_history::PriceWindow;
use og_reputation::{OracleProfile, ProfileObservation, ReputationTracker};
use og_schemas::{FeedId, Identity, Severity};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Runs the seven checks for one submission and keeps the state they share
/// across feeds: reputation profiles, the alert log, diagnostic counters.
///
/// Per-feed state (the price window) is owned by the caller and lent in, so
/// two feeds never contend on anything but the short reputation/log locks.
/// No lock is held across a store call.
pub struct SpoofEngine {
    cfg: DetectionConfig,
    store_timeout: Duration,
    reputation: RwLock<ReputationTracker>,
    alerts: Mutex<AlertLog>,
    check_failures: Mutex<BTreeMap<AlertKind, u64>>,
    validations: AtomicU64,
    blocked: AtomicU64,
}

impl SpoofEngine {
    pub fn new(
        cfg: DetectionConfig,
        store_timeout: Duration,
        alert_log_cap: usize,
    ) -> Result<Self, DetectionConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            store_timeout,
            reputation: RwLock::new(ReputationTracker::new()),
            alerts: Mutex::new(AlertLog::new(alert_log_cap)),
            check_failures: Mutex::new(BTreeMap::new()),
            validations: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.cfg
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Judge one submission against `window` (the feed's history before this
    /// submission).
    ///
    /// Malformed input is rejected without running any check and without
    /// touching reputation. Otherwise every check runs; a failing store call
    /// disables only its own check (replay fails closed).
    pub async fn validate(
        &self,
        store: &dyn CoordinationStore,
        window: &PriceWindow,
        sub: &Submission,
        now_ms: i64,
    ) -> ValidationResult {
        if let Err(reason) = sub.check_well_formed() {
            tracing::warn!(
                feed = %sub.feed,
                identity = %sub.identity,
                reason = reason.as_str(),
                "malformed submission rejected"
            );
            return ValidationResult::rejected(reason);
        }
        self.validations.fetch_add(1, Ordering::Relaxed);

        let (timestamp, sybil) = {
            let rep = self.reputation.read();
            (
                check_timestamp(&self.cfg, rep.profile(&sub.identity), sub, now_ms),
                check_sybil(&self.cfg, &rep, sub, now_ms),
            )
        };
        let manipulation = check_price_manipulation(&self.cfg, window, sub, now_ms);
        let flash_loan = check_flash_loan(&self.cfg, window, sub, now_ms);

        let coordinated = self.fail_open(
            AlertKind::CoordinatedAttack,
            sub,
            coordination::check_coordinated(store, self.store_timeout, &self.cfg, sub, now_ms)
                .await,
        );
        let replay =
            match coordination::check_replay(store, self.store_timeout, &self.cfg, sub, now_ms)
                .await
            {
                Ok(alert) => alert,
                Err(e) => {
                    self.note_check_failure(AlertKind::ReplayAttack, sub, &e);
                    Some(replay_unverifiable(sub, &e, now_ms))
                }
            };
        let front_running = self.fail_open(
            AlertKind::FrontRunning,
            sub,
            coordination::check_front_running(store, self.store_timeout, &self.cfg, sub, now_ms)
                .await,
        );

        let alerts: Vec<SpoofAlert> = [
            manipulation,
            flash_loan,
            coordinated,
            timestamp,
            replay,
            sybil,
            front_running,
        ]
        .into_iter()
        .flatten()
        .collect();
        let result = ValidationResult::from_alerts(alerts);

        let severities: Vec<Severity> = result.alerts.iter().map(|a| a.severity).collect();
        let observation = ProfileObservation {
            response_time_ms: now_ms.saturating_sub(sub.timestamp_ms).max(0) as f64,
            consensus_score: consensus_score(&self.cfg, window, sub),
        };
        let reputation = self
            .reputation
            .write()
            .update_profile(&sub.identity, !result.valid, &severities, observation, now_ms)
            .reputation;

        {
            let mut log = self.alerts.lock();
            for a in &result.alerts {
                log.push(a.clone());
            }
        }

        for a in &result.alerts {
            tracing::warn!(
                alert_id = %a.id,
                kind = a.kind.as_str(),
                severity = a.severity.as_str(),
                feed = %a.feed,
                identity = %sub.identity,
                blocked = a.blocked,
                "spoof alert"
            );
        }
        if result.blocked {
            self.blocked.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                feed = %sub.feed,
                identity = %sub.identity,
                alerts = result.alerts.len(),
                reputation,
                "submission blocked"
            );
        } else {
            tracing::debug!(
                feed = %sub.feed,
                identity = %sub.identity,
                alerts = result.alerts.len(),
                reputation,
                "submission accepted"
            );
        }

        result
    }

    fn fail_open(
        &self,
        kind: AlertKind,
        sub: &Submission,
        res: Result<Option<SpoofAlert>, StoreError>,
    ) -> Option<SpoofAlert> {
        match res {
            Ok(alert) => alert,
            Err(e) => {
                self.note_check_failure(kind, sub, &e);
                None
            }
        }
    }

    fn note_check_failure(&self, kind: AlertKind, sub: &Submission, err: &StoreError) {
        *self.check_failures.lock().entry(kind).or_insert(0) += 1;
        tracing::warn!(
            check = kind.as_str(),
            feed = %sub.feed,
            error = %err,
            "detection check failed on coordination store"
        );
    }

    /// Publish a pending transaction for the front-running check.
    pub async fn record_pending_transaction(
        &self,
        store: &dyn CoordinationStore,
        feed: &FeedId,
        tx_id: &str,
        timestamp_ms: i64,
    ) -> Result<(), StoreError> {
        coordination::publish_pending_transaction(
            store,
            self.store_timeout,
            &self.cfg,
            feed,
            tx_id,
            timestamp_ms,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn alerts(&self) -> Vec<SpoofAlert> {
        self.alerts.lock().all()
    }

    pub fn alerts_by_severity(&self, severity: Severity) -> Vec<SpoofAlert> {
        self.alerts.lock().by_severity(severity)
    }

    pub fn alerts_for_feed(&self, feed: &FeedId) -> Vec<SpoofAlert> {
        self.alerts.lock().for_feed(feed)
    }

    pub fn alert_counts_by_kind(&self) -> BTreeMap<AlertKind, u64> {
        self.alerts.lock().counts_by_kind()
    }

    pub fn alert_counts_by_severity(&self) -> BTreeMap<Severity, u64> {
        self.alerts.lock().counts_by_severity()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn oracle_profile(&self, identity: &Identity) -> Option<OracleProfile> {
        self.reputation.read().profile(identity).cloned()
    }

    pub fn is_blacklisted(&self, identity: &Identity) -> bool {
        self.reputation.read().is_blacklisted(identity)
    }

    pub fn blacklisted_identities(&self) -> Vec<Identity> {
        self.reputation.read().blacklisted()
    }

    /// Store failures per check since start.
    pub fn check_failures(&self) -> BTreeMap<AlertKind, u64> {
        self.check_failures.lock().clone()
    }

    /// Well-formed submissions validated since start.
    pub fn validations(&self) -> u64 {
        self.validations.load(Ordering::Relaxed)
    }

    pub fn blocked_submissions(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }
}
