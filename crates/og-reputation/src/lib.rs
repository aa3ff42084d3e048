//! og-reputation
//!
//! Oracle Reputation Tracker: one behavioral profile per submitting identity,
//! updated after every validation.
//!
//! Invariants:
//! - reputation is clamped to `[0, MAX_REPUTATION]`
//! - profiles are created lazily at `MAX_REPUTATION` and never removed
//! - consecutive suspicious updates never raise reputation; consecutive clean
//!   updates never lower it
//!
//! Pure deterministic logic; the caller supplies `now_ms`.

mod tracker;

pub use tracker::*;
