//! og-circuit
//!
//! Circuit Breaker State Machine, one instance per feed.
//!
//! ```text
//!            failures / trigger                cooldown elapsed
//!   CLOSED ─────────────────────▶ OPEN ─────────────────────────▶ HALF_OPEN
//!      ▲                           ▲                                  │
//!      │                           └──────── any trial failure ───────┤
//!      └────────────────── success_threshold successes ───────────────┘
//! ```
//!
//! Goals:
//! - Trip on accumulated failures (counted across instances by the caller)
//! - Trip on price jumps, success-rate collapse and volatility spikes
//! - Bounded trial traffic while half-open
//! - Operator force-trip / force-reset
//!
//! Deterministic, pure logic. No IO, no clock; every function takes `now_ms`
//! and appends the transitions it caused to an event sink.

mod engine;
mod types;

pub use engine::{
    can_pass, counts_as_failure, force_reset, force_trip, record_rejection, record_request,
};
pub use types::*;
