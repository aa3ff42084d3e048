use crate::types::{
    CircuitBreakerState, CircuitConfig, CircuitEvent, CircuitStatus, PassDecision, RecordOutcome,
    RequestRecord, TripTrigger, HALF_OPEN_CAPACITY_EXHAUSTED,
};
use og_history::{coefficient_of_variation, mean, percentile, relative_change};

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

fn trip(
    cfg: &CircuitConfig,
    st: &mut CircuitBreakerState,
    now_ms: i64,
    trigger: &TripTrigger,
    events: &mut Vec<CircuitEvent>,
) {
    let cooldown_until = now_ms.saturating_add(cfg.cooldown_ms);
    let reason = trigger.to_string();

    st.status = CircuitStatus::Open;
    st.trip_count = st.trip_count.saturating_add(1);
    st.last_tripped_ms = Some(now_ms);
    st.cooldown_until_ms = Some(cooldown_until);
    st.reason = Some(reason.clone());
    st.half_open_successes = 0;
    st.half_open_in_flight = 0;

    events.push(CircuitEvent::Tripped {
        feed: st.feed.clone(),
        at_ms: now_ms,
        reason,
        trip_count: st.trip_count,
        cooldown_until_ms: cooldown_until,
    });
}

fn reset_counters(st: &mut CircuitBreakerState) {
    st.metrics.total_requests = 0;
    st.metrics.failed_requests = 0;
    st.metrics.success_rate = 1.0;
}

fn enter_half_open(st: &mut CircuitBreakerState, now_ms: i64, events: &mut Vec<CircuitEvent>) {
    st.status = CircuitStatus::HalfOpen;
    st.half_open_successes = 0;
    st.half_open_in_flight = 0;
    reset_counters(st);

    events.push(CircuitEvent::HalfOpen {
        feed: st.feed.clone(),
        at_ms: now_ms,
    });
}

fn close(st: &mut CircuitBreakerState, now_ms: i64, forced: bool, events: &mut Vec<CircuitEvent>) {
    st.status = CircuitStatus::Closed;
    st.cooldown_until_ms = None;
    st.reason = None;
    st.last_reset_ms = Some(now_ms);
    st.half_open_successes = 0;
    st.half_open_in_flight = 0;
    reset_counters(st);

    events.push(CircuitEvent::Reset {
        feed: st.feed.clone(),
        at_ms: now_ms,
        forced,
    });
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Admission check before forwarding a request.
///
/// An OPEN breaker whose cooldown has elapsed (`now_ms >= cooldown_until`)
/// moves to HALF_OPEN here. While HALF_OPEN each admitted request holds one
/// trial slot (`PassDecision::trial`) until it is recorded as a trial.
pub fn can_pass(
    cfg: &CircuitConfig,
    st: &mut CircuitBreakerState,
    now_ms: i64,
    events: &mut Vec<CircuitEvent>,
) -> PassDecision {
    if st.status == CircuitStatus::Open {
        let until = st.cooldown_until_ms.unwrap_or(now_ms);
        if now_ms < until {
            let reason = match &st.reason {
                Some(r) => format!("circuit open: {r}"),
                None => "circuit open".to_string(),
            };
            return PassDecision::deny(reason, Some(until));
        }
        enter_half_open(st, now_ms, events);
    }

    match st.status {
        CircuitStatus::Closed => PassDecision::allow(),
        CircuitStatus::HalfOpen => {
            if st.half_open_in_flight >= cfg.half_open_max_attempts {
                return PassDecision::deny(HALF_OPEN_CAPACITY_EXHAUSTED, None);
            }
            st.half_open_in_flight += 1;
            PassDecision::allow_trial()
        }
        CircuitStatus::Open => PassDecision::deny("circuit open", st.cooldown_until_ms),
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// A request is counted once as a failure when it failed or was too slow.
pub fn counts_as_failure(cfg: &CircuitConfig, success: bool, req: &RequestRecord) -> bool {
    !success || req.latency_ms > cfg.latency_threshold_ms
}

fn push_capped(buf: &mut std::collections::VecDeque<f64>, v: f64, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(v);
}

fn update_metrics(
    cfg: &CircuitConfig,
    st: &mut CircuitBreakerState,
    failed: bool,
    req: &RequestRecord,
) -> Option<f64> {
    let m = &mut st.metrics;
    m.total_requests = m.total_requests.saturating_add(1);
    if failed {
        m.failed_requests = m.failed_requests.saturating_add(1);
    }
    m.success_rate = 1.0 - m.failed_requests as f64 / m.total_requests as f64;

    push_capped(&mut st.latencies, req.latency_ms as f64, cfg.latency_buffer);
    let lat: Vec<f64> = st.latencies.iter().copied().collect();
    m.average_latency_ms = mean(&lat).unwrap_or(0.0);
    m.p99_latency_ms = percentile(&lat, 99.0).unwrap_or(0.0);

    let price = req.price.to_f64();
    let change = st.last_price.and_then(|prev| relative_change(prev, price));
    st.last_price = Some(price);

    push_capped(&mut st.prices, price, cfg.volatility_window);
    if st.prices.len() >= 2 {
        let px: Vec<f64> = st.prices.iter().copied().collect();
        m.price_volatility = coefficient_of_variation(&px).unwrap_or(0.0);
    }

    change
}

/// Fold one completed request into the breaker.
///
/// `shared_failures` is the cross-instance failure count after this request
/// was added to it, or `None` when the shared counter is unreachable; the
/// local count since the last reset is used then.
///
/// Order: metrics, then triggers (any status but OPEN can trip), then the
/// half-open success count.
pub fn record_request(
    cfg: &CircuitConfig,
    st: &mut CircuitBreakerState,
    now_ms: i64,
    success: bool,
    req: &RequestRecord,
    shared_failures: Option<i64>,
    events: &mut Vec<CircuitEvent>,
) -> RecordOutcome {
    let failed = counts_as_failure(cfg, success, req);
    let change = update_metrics(cfg, st, failed, req);

    if req.trial && st.status == CircuitStatus::HalfOpen {
        st.half_open_in_flight = st.half_open_in_flight.saturating_sub(1);
    }

    settle(cfg, st, now_ms, failed, change, shared_failures, events)
}

/// Count a blocked submission as one failed request. Its price and latency
/// stay out of the metrics buffers, and it holds no trial slot.
pub fn record_rejection(
    cfg: &CircuitConfig,
    st: &mut CircuitBreakerState,
    now_ms: i64,
    shared_failures: Option<i64>,
    events: &mut Vec<CircuitEvent>,
) -> RecordOutcome {
    let m = &mut st.metrics;
    m.total_requests = m.total_requests.saturating_add(1);
    m.failed_requests = m.failed_requests.saturating_add(1);
    m.success_rate = 1.0 - m.failed_requests as f64 / m.total_requests as f64;

    settle(cfg, st, now_ms, true, None, shared_failures, events)
}

fn settle(
    cfg: &CircuitConfig,
    st: &mut CircuitBreakerState,
    now_ms: i64,
    failed: bool,
    change: Option<f64>,
    shared_failures: Option<i64>,
    events: &mut Vec<CircuitEvent>,
) -> RecordOutcome {
    let mut outcome = RecordOutcome::default();
    if st.status == CircuitStatus::Open {
        return outcome;
    }

    if let Some(trigger) = evaluate_triggers(cfg, st, failed, change, shared_failures) {
        trip(cfg, st, now_ms, &trigger, events);
        outcome.tripped = Some(trigger);
        return outcome;
    }

    if st.status == CircuitStatus::HalfOpen && !failed {
        st.half_open_successes += 1;
        if st.half_open_successes >= cfg.success_threshold {
            close(st, now_ms, false, events);
            outcome.closed = true;
        }
    }
    outcome
}

fn evaluate_triggers(
    cfg: &CircuitConfig,
    st: &CircuitBreakerState,
    failed: bool,
    change: Option<f64>,
    shared_failures: Option<i64>,
) -> Option<TripTrigger> {
    if failed {
        if st.status == CircuitStatus::HalfOpen {
            return Some(TripTrigger::HalfOpenFailure);
        }
        let failures = shared_failures.unwrap_or(st.metrics.failed_requests as i64);
        if failures >= i64::from(cfg.failure_threshold) {
            return Some(TripTrigger::FailureThreshold { failures });
        }
    }

    if let Some(change) = change {
        if change > cfg.price_change_limit {
            return Some(TripTrigger::PriceChange { change });
        }
    }

    let m = &st.metrics;
    if m.total_requests >= cfg.min_requests_for_rate && m.success_rate < cfg.success_rate_floor {
        return Some(TripTrigger::SuccessRateFloor {
            success_rate: m.success_rate,
        });
    }

    if st.prices.len() >= 2 && m.price_volatility > cfg.volatility_limit {
        return Some(TripTrigger::Volatility {
            volatility: m.price_volatility,
        });
    }

    None
}

// ---------------------------------------------------------------------------
// Operator overrides
// ---------------------------------------------------------------------------

/// Trip regardless of the automatic triggers. An already OPEN breaker is
/// re-tripped and its cooldown restarts.
pub fn force_trip(
    cfg: &CircuitConfig,
    st: &mut CircuitBreakerState,
    now_ms: i64,
    trigger: &TripTrigger,
    events: &mut Vec<CircuitEvent>,
) {
    trip(cfg, st, now_ms, trigger, events);
}

/// Close regardless of state; counters and cooldown are cleared, the trip
/// count is kept.
pub fn force_reset(st: &mut CircuitBreakerState, now_ms: i64, events: &mut Vec<CircuitEvent>) {
    close(st, now_ms, true, events);
}
