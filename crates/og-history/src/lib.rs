//! og-history
//!
//! Price History Store: a per-feed rolling window of accepted price
//! observations plus the small statistics toolkit the detectors and the
//! circuit breaker share.
//!
//! Pure data structures. No IO, no clock.

mod stats;
mod window;

pub use stats::{coefficient_of_variation, mean, percentile, population_std_dev, relative_change};
pub use window::{PricePoint, PriceWindow, MAX_POINTS_PER_FEED};
