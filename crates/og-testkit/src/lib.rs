//! og-testkit
//!
//! Shared fixtures for end-to-end scenarios: a guard wired to a
//! [`ManualClock`] and a [`FlakyStore`], plus builders for the inputs the
//! façade accepts.

mod flaky_store;

pub use flaky_store::{Fault, FlakyStore, StoreOp};

use anyhow::{Context, Result};
use og_circuit::RequestRecord;
use og_config::GuardConfig;
use og_coord::MemoryStore;
use og_guard::{GuardEvent, IntegrityGuard};
use og_schemas::{Clock, FeedId, Identity, ManualClock, Price};
use og_spoof::Submission;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Epoch millis every harness starts at.
pub const T0: i64 = 1_700_000_000_000;

/// Spacing between seeded history points; far outside the flash-loan window.
pub const HISTORY_STEP_MS: i64 = 60_000;

pub struct GuardHarness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<FlakyStore>,
    pub guard: IntegrityGuard,
}

impl GuardHarness {
    pub fn new() -> Result<Self> {
        Self::with_config(GuardConfig::default())
    }

    pub fn with_config(cfg: GuardConfig) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(FlakyStore::new(MemoryStore::with_clock(clock.clone())));
        let guard =
            IntegrityGuard::new(cfg, store.clone(), clock.clone()).context("build guard")?;
        Ok(Self {
            clock,
            store,
            guard,
        })
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Append `prices` to the feed's history, ending one step before now.
    pub fn seed_history(&self, feed: &FeedId, prices: &[u64]) -> Result<()> {
        let now = self.now_ms();
        let n = prices.len() as i64;
        for (i, p) in prices.iter().enumerate() {
            let ts = now - (n - i as i64) * HISTORY_STEP_MS;
            self.guard
                .add_price_point(feed, Price::from_u64(*p), ts, "collector", 0.99)
                .with_context(|| format!("seed history for {feed}"))?;
        }
        Ok(())
    }

    pub fn seed_flat(&self, feed: &FeedId, price: u64, n: usize) -> Result<()> {
        self.seed_history(feed, &vec![price; n])
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardEvent> {
        self.guard.subscribe()
    }
}

/// Submission stamped at `timestamp_ms` with a caller-chosen proof token.
pub fn submission(
    feed: &FeedId,
    identity: &str,
    price: u64,
    timestamp_ms: i64,
    proof_token: &str,
) -> Submission {
    Submission {
        feed: feed.clone(),
        price: Price::from_u64(price),
        timestamp_ms,
        identity: Identity::new(identity),
        proof_token: proof_token.to_string(),
    }
}

pub fn request(price: u64, timestamp_ms: i64, latency_ms: i64) -> RequestRecord {
    RequestRecord {
        price: Price::from_u64(price),
        timestamp_ms,
        source: "consumer".to_string(),
        latency_ms,
        trial: false,
    }
}

/// A request admitted on a half-open trial slot.
pub fn trial_request(price: u64, timestamp_ms: i64, latency_ms: i64) -> RequestRecord {
    RequestRecord {
        trial: true,
        ..request(price, timestamp_ms, latency_ms)
    }
}

/// Every event currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<GuardEvent>) -> Vec<GuardEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}
