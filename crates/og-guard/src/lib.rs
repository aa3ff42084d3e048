//! og-guard
//!
//! Integrity Guard Façade: the single entry point surrounding code calls.
//!
//! - routes submissions through the spoof engine and requests through the
//!   per-feed circuit breaker
//! - owns per-feed state (price window, breaker) behind per-feed locks;
//!   different feeds never contend
//! - publishes every alert and transition on a broadcast bus
//!
//! The coordination store and the clock are injected at construction.

mod error;
mod events;
mod guard;
mod stats;

pub use error::GuardError;
pub use events::GuardEvent;
pub use guard::IntegrityGuard;
pub use stats::GuardStatistics;
