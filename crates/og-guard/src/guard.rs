use crate::error::GuardError;
use crate::events::GuardEvent;
use crate::stats::GuardStatistics;
use og_circuit::{
    CircuitBreakerState, CircuitEvent, CircuitStatus, PassDecision, RecordOutcome, RequestRecord,
    TripTrigger,
};
use og_config::{GuardConfig, GuardConfigError};
use og_coord::{bounded, keys, CoordinationStore, StoreError};
use og_history::{PricePoint, PriceWindow};
use og_reputation::OracleProfile;
use og_schemas::{Clock, FeedId, Identity, Price, Severity};
use og_spoof::{AlertKind, InputRejection, SpoofAlert, SpoofEngine, Submission, ValidationResult};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Per-feed state
// ---------------------------------------------------------------------------

/// Everything the guard keeps for one feed.
///
/// `history` is copy-on-write: validations take a cheap `Arc` snapshot and
/// never hold the lock across a store call.
struct FeedSlot {
    history: RwLock<Arc<PriceWindow>>,
    circuit: Mutex<CircuitBreakerState>,
    /// Serializes validations of this feed.
    validation: tokio::sync::Mutex<()>,
}

impl FeedSlot {
    fn new(feed: FeedId) -> Self {
        Self {
            history: RwLock::new(Arc::new(PriceWindow::new())),
            circuit: Mutex::new(CircuitBreakerState::new(feed)),
            validation: tokio::sync::Mutex::new(()),
        }
    }
}

/// Blank feed ids never reach a slot.
fn check_feed(feed: &FeedId) -> Result<(), GuardError> {
    if feed.as_str().trim().is_empty() {
        return Err(InputRejection::EmptyFeedId.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

pub struct IntegrityGuard {
    cfg: GuardConfig,
    store: Arc<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
    spoof: SpoofEngine,
    feeds: RwLock<HashMap<FeedId, Arc<FeedSlot>>>,
    bus: broadcast::Sender<GuardEvent>,
}

impl IntegrityGuard {
    /// Invalid thresholds reject construction.
    pub fn new(
        cfg: GuardConfig,
        store: Arc<dyn CoordinationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GuardError> {
        cfg.validate()?;
        let spoof = SpoofEngine::new(
            cfg.detection.clone(),
            Duration::from_millis(cfg.store_timeout_ms),
            cfg.max_alert_log,
        )
        .map_err(GuardConfigError::Detection)?;
        let (bus, _rx) = broadcast::channel::<GuardEvent>(cfg.event_bus_capacity);

        tracing::info!(
            store = store.name(),
            store_timeout_ms = cfg.store_timeout_ms,
            max_alert_log = cfg.max_alert_log,
            "integrity guard ready"
        );

        Ok(Self {
            cfg,
            store,
            clock,
            spoof,
            feeds: RwLock::new(HashMap::new()),
            bus,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardEvent> {
        self.bus.subscribe()
    }

    fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.store_timeout_ms)
    }

    fn publish(&self, ev: GuardEvent) {
        // No receivers is fine.
        let _ = self.bus.send(ev);
    }

    fn publish_circuit(&self, events: Vec<CircuitEvent>) {
        for ev in events {
            match &ev {
                CircuitEvent::Initialized { feed, .. } => {
                    tracing::info!(feed = %feed, "circuit initialized");
                }
                CircuitEvent::Tripped {
                    feed,
                    reason,
                    trip_count,
                    cooldown_until_ms,
                    ..
                } => {
                    tracing::info!(
                        feed = %feed,
                        reason = %reason,
                        trip_count,
                        cooldown_until_ms,
                        "circuit tripped"
                    );
                }
                CircuitEvent::Reset { feed, forced, .. } => {
                    tracing::info!(feed = %feed, forced, "circuit reset");
                }
                CircuitEvent::HalfOpen { feed, .. } => {
                    tracing::info!(feed = %feed, "circuit half-open");
                }
            }
            self.publish(ev.into());
        }
    }

    /// Get or lazily create the feed's state.
    fn slot(&self, feed: &FeedId) -> Arc<FeedSlot> {
        if let Some(slot) = self.feeds.read().get(feed) {
            return slot.clone();
        }

        let mut created = None;
        let slot = {
            let mut feeds = self.feeds.write();
            feeds
                .entry(feed.clone())
                .or_insert_with(|| {
                    let slot = Arc::new(FeedSlot::new(feed.clone()));
                    created = Some(slot.circuit.lock().initialized_event(self.clock.now_ms()));
                    slot
                })
                .clone()
        };
        if let Some(ev) = created {
            self.publish_circuit(vec![ev]);
        }
        slot
    }

    fn existing_slots(&self) -> Vec<(FeedId, Arc<FeedSlot>)> {
        let mut out: Vec<(FeedId, Arc<FeedSlot>)> = self
            .feeds
            .read()
            .iter()
            .map(|(f, s)| (f.clone(), s.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    // -----------------------------------------------------------------------
    // Submissions
    // -----------------------------------------------------------------------

    /// Judge one submission. Always returns a verdict.
    pub async fn validate_submission(&self, sub: &Submission) -> ValidationResult {
        if let Err(reason) = sub.check_well_formed() {
            tracing::warn!(
                feed = %sub.feed,
                identity = %sub.identity,
                reason = reason.as_str(),
                "malformed submission rejected"
            );
            return ValidationResult::rejected(reason);
        }

        let slot = self.slot(&sub.feed);
        let _serial = slot.validation.lock().await;
        let window = slot.history.read().clone();
        let now_ms = self.clock.now_ms();

        let result = self
            .spoof
            .validate(self.store.as_ref(), &window, sub, now_ms)
            .await;

        for alert in &result.alerts {
            self.publish(GuardEvent::SpoofDetected {
                alert: alert.clone(),
            });
        }
        if result.blocked {
            self.publish(GuardEvent::SubmissionBlocked {
                feed: sub.feed.clone(),
                identity: sub.identity.clone(),
                at_ms: now_ms,
                alert_ids: result.alerts.iter().map(|a| a.id.clone()).collect(),
            });
        }

        if result.blocked && self.cfg.spoof_blocks_count_as_failures {
            let shared = self.bump_failures(&sub.feed).await;
            let mut events = Vec::new();
            {
                let mut st = slot.circuit.lock();
                og_circuit::record_rejection(
                    &self.cfg.circuit,
                    &mut st,
                    now_ms,
                    shared,
                    &mut events,
                );
            }
            self.publish_circuit(events);
        }

        if self.cfg.trip_on_critical_alert {
            if let Some(critical) = result
                .alerts
                .iter()
                .find(|a| a.severity == Severity::Critical)
            {
                let trigger = TripTrigger::CriticalAlert {
                    kind: critical.kind.as_str().to_string(),
                };
                self.trip_unless_open(&slot, now_ms, &trigger);
            }
        }

        result
    }

    /// Extend the feed's history after a submission was accepted downstream.
    pub fn add_price_point(
        &self,
        feed: &FeedId,
        price: Price,
        timestamp_ms: i64,
        source: &str,
        confidence: f64,
    ) -> Result<(), GuardError> {
        check_feed(feed)?;
        let slot = self.slot(feed);
        let mut history = slot.history.write();
        Arc::make_mut(&mut *history).push(PricePoint::new(price, timestamp_ms, source, confidence));
        Ok(())
    }

    /// Last `n` points of the feed's history, oldest first.
    pub fn price_history(&self, feed: &FeedId, n: usize) -> Vec<PricePoint> {
        match self.feeds.read().get(feed) {
            Some(slot) => slot.history.read().recent(n),
            None => Vec::new(),
        }
    }

    /// Publish a pending transaction for every instance's front-running
    /// check.
    pub async fn record_pending_transaction(
        &self,
        feed: &FeedId,
        tx_id: &str,
        timestamp_ms: i64,
    ) -> Result<(), GuardError> {
        check_feed(feed)?;
        self.spoof
            .record_pending_transaction(self.store.as_ref(), feed, tx_id, timestamp_ms)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Circuit breaker
    // -----------------------------------------------------------------------

    /// Admission check before forwarding a request to the feed's consumers.
    ///
    /// An admission while HALF_OPEN carries `trial`; pass it back on the
    /// request's `RequestRecord` so its slot is returned.
    pub fn can_pass_through(&self, feed: &FeedId) -> Result<PassDecision, GuardError> {
        check_feed(feed)?;
        let slot = self.slot(feed);
        let mut events = Vec::new();
        let decision = {
            let mut st = slot.circuit.lock();
            og_circuit::can_pass(&self.cfg.circuit, &mut st, self.clock.now_ms(), &mut events)
        };
        self.publish_circuit(events);

        if !decision.allowed {
            tracing::debug!(
                feed = %feed,
                reason = decision.reason.as_deref().unwrap_or(""),
                "request denied by circuit"
            );
        }
        Ok(decision)
    }

    /// Fold a completed request into the feed's breaker.
    ///
    /// Negative latency is malformed input and leaves state untouched. A
    /// store failure while counting never fails the call; the breaker falls
    /// back to its local count.
    pub async fn record_request(
        &self,
        feed: &FeedId,
        success: bool,
        req: &RequestRecord,
    ) -> Result<(), GuardError> {
        check_feed(feed)?;
        if req.latency_ms < 0 {
            return Err(InputRejection::NegativeLatency.into());
        }

        let slot = self.slot(feed);
        let failed = og_circuit::counts_as_failure(&self.cfg.circuit, success, req);
        let shared = if failed {
            self.bump_failures(feed).await
        } else {
            None
        };

        let mut events = Vec::new();
        let outcome: RecordOutcome = {
            let mut st = slot.circuit.lock();
            og_circuit::record_request(
                &self.cfg.circuit,
                &mut st,
                self.clock.now_ms(),
                success,
                req,
                shared,
                &mut events,
            )
        };
        self.publish_circuit(events);

        if outcome.closed {
            self.clear_failures(feed).await;
        }
        Ok(())
    }

    /// Operator override: open the feed now.
    pub fn force_trip(&self, feed: &FeedId, reason: &str) -> Result<(), GuardError> {
        check_feed(feed)?;
        let slot = self.slot(feed);
        let trigger = TripTrigger::Manual {
            reason: reason.to_string(),
        };
        self.trip_slot(&slot, self.clock.now_ms(), &trigger);
        Ok(())
    }

    /// Operator override: close the feed now and clear its shared failure
    /// counter.
    pub async fn force_reset(&self, feed: &FeedId) -> Result<(), GuardError> {
        check_feed(feed)?;
        let slot = self.slot(feed);
        let mut events = Vec::new();
        {
            let mut st = slot.circuit.lock();
            og_circuit::force_reset(&mut st, self.clock.now_ms(), &mut events);
        }
        self.publish_circuit(events);
        self.clear_failures(feed).await;
        Ok(())
    }

    /// Automatic trips only move CLOSED/HALF_OPEN to OPEN. An OPEN feed,
    /// including one opened earlier in the same call, keeps its trip count
    /// and cooldown.
    fn trip_unless_open(&self, slot: &FeedSlot, now_ms: i64, trigger: &TripTrigger) {
        let mut events = Vec::new();
        {
            let mut st = slot.circuit.lock();
            if st.status == CircuitStatus::Open {
                return;
            }
            og_circuit::force_trip(&self.cfg.circuit, &mut st, now_ms, trigger, &mut events);
        }
        self.publish_circuit(events);
    }

    fn trip_slot(&self, slot: &FeedSlot, now_ms: i64, trigger: &TripTrigger) {
        let mut events = Vec::new();
        {
            let mut st = slot.circuit.lock();
            og_circuit::force_trip(&self.cfg.circuit, &mut st, now_ms, trigger, &mut events);
        }
        self.publish_circuit(events);
    }

    /// Increment the shared failure counter and refresh its window. `None`
    /// when the store is unavailable.
    async fn bump_failures(&self, feed: &FeedId) -> Option<i64> {
        let key = keys::circuit_failures(feed);
        let timeout = self.store_timeout();
        let window = Duration::from_millis(self.cfg.circuit.failure_window_ms.max(0) as u64);

        let res: Result<i64, StoreError> = async {
            let n = bounded(timeout, self.store.incr(&key)).await?;
            bounded(timeout, self.store.expire(&key, window)).await?;
            Ok(n)
        }
        .await;

        match res {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(
                    feed = %feed,
                    error = %e,
                    "failure counter unavailable; using local count"
                );
                None
            }
        }
    }

    async fn clear_failures(&self, feed: &FeedId) {
        let key = keys::circuit_failures(feed);
        if let Err(e) = bounded(self.store_timeout(), self.store.delete(&key)).await {
            tracing::warn!(feed = %feed, error = %e, "failed to clear failure counter");
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn alerts(&self) -> Vec<SpoofAlert> {
        self.spoof.alerts()
    }

    pub fn alerts_by_severity(&self, severity: Severity) -> Vec<SpoofAlert> {
        self.spoof.alerts_by_severity(severity)
    }

    pub fn alerts_for_feed(&self, feed: &FeedId) -> Vec<SpoofAlert> {
        self.spoof.alerts_for_feed(feed)
    }

    pub fn alert_counts_by_kind(&self) -> BTreeMap<AlertKind, u64> {
        self.spoof.alert_counts_by_kind()
    }

    pub fn alert_counts_by_severity(&self) -> BTreeMap<Severity, u64> {
        self.spoof.alert_counts_by_severity()
    }

    pub fn oracle_profile(&self, identity: &Identity) -> Option<OracleProfile> {
        self.spoof.oracle_profile(identity)
    }

    pub fn is_blacklisted(&self, identity: &Identity) -> bool {
        self.spoof.is_blacklisted(identity)
    }

    pub fn blacklisted_identities(&self) -> Vec<Identity> {
        self.spoof.blacklisted_identities()
    }

    /// Snapshot of the feed's breaker (initialized CLOSED on first access).
    pub fn circuit_state(&self, feed: &FeedId) -> Result<CircuitBreakerState, GuardError> {
        check_feed(feed)?;
        Ok(self.slot(feed).circuit.lock().clone())
    }

    /// Every known breaker, ordered by feed.
    pub fn all_circuit_states(&self) -> Vec<CircuitBreakerState> {
        self.existing_slots()
            .into_iter()
            .map(|(_, slot)| slot.circuit.lock().clone())
            .collect()
    }

    pub fn statistics(&self) -> GuardStatistics {
        let states = self.all_circuit_states();
        let count = |s: CircuitStatus| states.iter().filter(|c| c.status == s).count();
        let average_success_rate = if states.is_empty() {
            1.0
        } else {
            states.iter().map(|c| c.metrics.success_rate).sum::<f64>() / states.len() as f64
        };

        GuardStatistics {
            feeds: states.len(),
            circuits_closed: count(CircuitStatus::Closed),
            circuits_open: count(CircuitStatus::Open),
            circuits_half_open: count(CircuitStatus::HalfOpen),
            average_success_rate,
            total_trips: states.iter().map(|c| c.trip_count).sum(),
            total_alerts: self.spoof.alert_count(),
            alerts_by_severity: self.spoof.alert_counts_by_severity(),
            alerts_by_kind: self.spoof.alert_counts_by_kind(),
            validations: self.spoof.validations(),
            blocked_submissions: self.spoof.blocked_submissions(),
            check_failures: self.spoof.check_failures(),
            blacklisted_identities: self.spoof.blacklisted_identities().len(),
        }
    }
}
