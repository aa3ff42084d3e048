use og_schemas::{FeedId, Price};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Reason returned when a half-open breaker has no trial slot left.
pub const HALF_OPEN_CAPACITY_EXHAUSTED: &str = "half-open trial capacity exhausted";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Failures within `failure_window_ms` that trip a closed breaker.
    pub failure_threshold: u32,
    /// Half-open successes required to close again.
    pub success_threshold: u32,
    pub cooldown_ms: i64,
    /// Concurrent trial requests admitted while half-open.
    pub half_open_max_attempts: u32,
    /// Relative move vs the previous recorded price that trips.
    pub price_change_limit: f64,
    /// Slower requests count as failures.
    pub latency_threshold_ms: i64,
    pub success_rate_floor: f64,
    /// Requests since the last reset before the success-rate floor applies.
    pub min_requests_for_rate: u64,
    /// `std_dev / mean` of the last `volatility_window` prices that trips.
    pub volatility_limit: f64,
    pub volatility_window: usize,
    /// Latencies kept for the average / p99.
    pub latency_buffer: usize,
    /// TTL of the shared failure counter.
    pub failure_window_ms: i64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown_ms: 5 * 60 * 1_000,
            half_open_max_attempts: 3,
            price_change_limit: 0.5,
            latency_threshold_ms: 500,
            success_rate_floor: 0.5,
            min_requests_for_rate: 10,
            volatility_limit: 0.3,
            volatility_window: 20,
            latency_buffer: 100,
            failure_window_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitConfigError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl fmt::Display for CircuitConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid circuit config: {} {}", self.field, self.reason)
    }
}

impl std::error::Error for CircuitConfigError {}

impl CircuitConfig {
    pub fn validate(&self) -> Result<(), CircuitConfigError> {
        let err = |field: &'static str, reason: &'static str| -> Result<(), CircuitConfigError> {
            Err(CircuitConfigError { field, reason })
        };

        if self.failure_threshold == 0 {
            return err("failure_threshold", "must be >= 1");
        }
        if self.success_threshold == 0 {
            return err("success_threshold", "must be >= 1");
        }
        if self.cooldown_ms <= 0 {
            return err("cooldown_ms", "must be > 0");
        }
        if self.half_open_max_attempts == 0 {
            return err("half_open_max_attempts", "must be >= 1");
        }
        if !(self.price_change_limit.is_finite() && self.price_change_limit > 0.0) {
            return err("price_change_limit", "must be a finite number > 0");
        }
        if self.latency_threshold_ms <= 0 {
            return err("latency_threshold_ms", "must be > 0");
        }
        if !(0.0..=1.0).contains(&self.success_rate_floor) {
            return err("success_rate_floor", "must be within [0, 1]");
        }
        if !(self.volatility_limit.is_finite() && self.volatility_limit > 0.0) {
            return err("volatility_limit", "must be a finite number > 0");
        }
        if self.volatility_window < 2 {
            return err("volatility_window", "must be >= 2");
        }
        if self.latency_buffer == 0 {
            return err("latency_buffer", "must be >= 1");
        }
        if self.failure_window_ms <= 0 {
            return err("failure_window_ms", "must be > 0");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "CLOSED",
            CircuitStatus::Open => "OPEN",
            CircuitStatus::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed request forwarded to a feed's consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub price: Price,
    pub timestamp_ms: i64,
    pub source: String,
    pub latency_ms: i64,
    /// Set when the request was admitted on a HALF_OPEN trial slot
    /// ([`PassDecision::trial`]). Only such requests return a slot.
    #[serde(default)]
    pub trial: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    /// Set while the breaker is cooling down.
    pub cooldown_until_ms: Option<i64>,
    /// The admission holds a HALF_OPEN trial slot until the request is
    /// recorded with `RequestRecord::trial` set.
    #[serde(default)]
    pub trial: bool,
}

impl PassDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            cooldown_until_ms: None,
            trial: false,
        }
    }

    pub fn allow_trial() -> Self {
        Self {
            trial: true,
            ..Self::allow()
        }
    }

    pub fn deny(reason: impl Into<String>, cooldown_until_ms: Option<i64>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            cooldown_until_ms,
            trial: false,
        }
    }
}

/// Why a breaker tripped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TripTrigger {
    FailureThreshold { failures: i64 },
    HalfOpenFailure,
    PriceChange { change: f64 },
    SuccessRateFloor { success_rate: f64 },
    Volatility { volatility: f64 },
    CriticalAlert { kind: String },
    Manual { reason: String },
}

impl fmt::Display for TripTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripTrigger::FailureThreshold { failures } => {
                write!(f, "failure threshold reached ({failures} recent failures)")
            }
            TripTrigger::HalfOpenFailure => write!(f, "trial request failed while half-open"),
            TripTrigger::PriceChange { change } => {
                write!(f, "price change {:.2}% over limit", change * 100.0)
            }
            TripTrigger::SuccessRateFloor { success_rate } => {
                write!(f, "success rate {:.2}% under floor", success_rate * 100.0)
            }
            TripTrigger::Volatility { volatility } => {
                write!(f, "price volatility {:.2}% over limit", volatility * 100.0)
            }
            TripTrigger::CriticalAlert { kind } => write!(f, "critical spoof alert: {kind}"),
            TripTrigger::Manual { reason } => write!(f, "manual: {reason}"),
        }
    }
}

/// Transitions, one per state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CircuitEvent {
    Initialized {
        feed: FeedId,
        at_ms: i64,
    },
    Tripped {
        feed: FeedId,
        at_ms: i64,
        reason: String,
        trip_count: u64,
        cooldown_until_ms: i64,
    },
    Reset {
        feed: FeedId,
        at_ms: i64,
        forced: bool,
    },
    HalfOpen {
        feed: FeedId,
        at_ms: i64,
    },
}

/// What a `record_request` call did, for callers that keep shared state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordOutcome {
    pub tripped: Option<TripTrigger>,
    pub closed: bool,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitMetrics {
    /// Since the last reset.
    pub total_requests: u64,
    /// Since the last reset; slow requests count as failed.
    pub failed_requests: u64,
    /// `1 - failed / total`; 1.0 before the first request.
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub p99_latency_ms: f64,
    /// `std_dev / mean` over the recent price buffer.
    pub price_volatility: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub feed: FeedId,
    pub status: CircuitStatus,
    pub trip_count: u64,
    pub last_tripped_ms: Option<i64>,
    pub last_reset_ms: Option<i64>,
    pub cooldown_until_ms: Option<i64>,
    /// Why the breaker last tripped; cleared on close.
    pub reason: Option<String>,
    pub metrics: CircuitMetrics,
    pub half_open_successes: u32,
    /// Trial slots handed out by `can_pass` and not yet returned.
    pub half_open_in_flight: u32,
    #[serde(skip)]
    pub(crate) latencies: VecDeque<f64>,
    #[serde(skip)]
    pub(crate) prices: VecDeque<f64>,
    pub last_price: Option<f64>,
}

impl CircuitBreakerState {
    /// Fresh CLOSED state with zero metrics.
    pub fn new(feed: FeedId) -> Self {
        Self {
            feed,
            status: CircuitStatus::Closed,
            trip_count: 0,
            last_tripped_ms: None,
            last_reset_ms: None,
            cooldown_until_ms: None,
            reason: None,
            metrics: CircuitMetrics {
                success_rate: 1.0,
                ..CircuitMetrics::default()
            },
            half_open_successes: 0,
            half_open_in_flight: 0,
            latencies: VecDeque::new(),
            prices: VecDeque::new(),
            last_price: None,
        }
    }

    pub fn initialized_event(&self, at_ms: i64) -> CircuitEvent {
        CircuitEvent::Initialized {
            feed: self.feed.clone(),
            at_ms,
        }
    }
}
