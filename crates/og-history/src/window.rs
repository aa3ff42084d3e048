use og_schemas::Price;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Window cap per feed. Oldest points are evicted first.
pub const MAX_POINTS_PER_FEED: usize = 1_000;

/// One accepted price observation. Appended, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Price,
    /// Observation time in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Upstream collector that produced the price.
    pub source: String,
    /// Collector confidence in `[0, 1]`.
    pub confidence: f64,
}

impl PricePoint {
    pub fn new(price: Price, timestamp_ms: i64, source: impl Into<String>, confidence: f64) -> Self {
        Self {
            price,
            timestamp_ms,
            source: source.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Rolling window for a single feed.
#[derive(Clone, Debug, Default)]
pub struct PriceWindow {
    points: VecDeque<PricePoint>,
}

impl PriceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, evicting the oldest point once the window holds
    /// [`MAX_POINTS_PER_FEED`] entries.
    pub fn push(&mut self, point: PricePoint) {
        if self.points.len() == MAX_POINTS_PER_FEED {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Last `n` points in insertion order (fewer if the window is shorter).
    pub fn recent(&self, n: usize) -> Vec<PricePoint> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip).cloned().collect()
    }

    /// Last `n` prices as `f64`, in insertion order.
    pub fn recent_prices_f64(&self, n: usize) -> Vec<f64> {
        let skip = self.points.len().saturating_sub(n);
        self.points
            .iter()
            .skip(skip)
            .map(|p| p.price.to_f64())
            .collect()
    }

    /// All points in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
