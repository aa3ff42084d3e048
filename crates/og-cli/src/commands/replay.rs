//! `og replay`: drive a guard from a JSONL file.
//!
//! Each non-blank line is one call tagged by `op`, stamped with the
//! `now_ms` the guard's clock is set to before the call. The store is an
//! in-process `MemoryStore` on the same clock, so TTLs follow replay time.
//!
//! ```text
//! {"op":"price_point","now_ms":1000,"feed":"ETH_USD","price":"2000","timestamp_ms":1000}
//! {"op":"submission","now_ms":2000,"feed":"ETH_USD","price":"2400","timestamp_ms":2000,"identity":"0xa","proof_token":"p1"}
//! {"op":"request","now_ms":2100,"feed":"ETH_USD","success":false,"price":"2400","latency_ms":40}
//! ```
//!
//! stdout gets one JSON verdict per call, then one `summary` line.

use anyhow::{Context, Result};
use og_circuit::RequestRecord;
use og_config::UnusedKeyPolicy;
use og_coord::MemoryStore;
use og_guard::IntegrityGuard;
use og_schemas::{Clock, FeedId, Identity, ManualClock, Price};
use og_spoof::Submission;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::io::Read;
use std::sync::Arc;

fn default_source() -> String {
    "replay".to_string()
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayCall {
    Submission {
        now_ms: i64,
        feed: FeedId,
        price: Price,
        timestamp_ms: i64,
        identity: Identity,
        proof_token: String,
    },
    Request {
        now_ms: i64,
        feed: FeedId,
        success: bool,
        price: Price,
        /// Defaults to `now_ms`.
        #[serde(default)]
        timestamp_ms: Option<i64>,
        latency_ms: i64,
        #[serde(default = "default_source")]
        source: String,
        /// Set when the request was admitted on a half-open trial slot.
        #[serde(default)]
        trial: bool,
    },
    PricePoint {
        now_ms: i64,
        feed: FeedId,
        price: Price,
        timestamp_ms: i64,
        #[serde(default = "default_source")]
        source: String,
        #[serde(default = "default_confidence")]
        confidence: f64,
    },
    PendingTx {
        now_ms: i64,
        feed: FeedId,
        tx_id: String,
        timestamp_ms: i64,
    },
    CanPass {
        now_ms: i64,
        feed: FeedId,
    },
    ForceTrip {
        now_ms: i64,
        feed: FeedId,
        reason: String,
    },
    ForceReset {
        now_ms: i64,
        feed: FeedId,
    },
}

impl ReplayCall {
    pub fn now_ms(&self) -> i64 {
        match self {
            ReplayCall::Submission { now_ms, .. }
            | ReplayCall::Request { now_ms, .. }
            | ReplayCall::PricePoint { now_ms, .. }
            | ReplayCall::PendingTx { now_ms, .. }
            | ReplayCall::CanPass { now_ms, .. }
            | ReplayCall::ForceTrip { now_ms, .. }
            | ReplayCall::ForceReset { now_ms, .. } => *now_ms,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            ReplayCall::Submission { .. } => "submission",
            ReplayCall::Request { .. } => "request",
            ReplayCall::PricePoint { .. } => "price_point",
            ReplayCall::PendingTx { .. } => "pending_tx",
            ReplayCall::CanPass { .. } => "can_pass",
            ReplayCall::ForceTrip { .. } => "force_trip",
            ReplayCall::ForceReset { .. } => "force_reset",
        }
    }
}

/// Parse the input into calls, keeping 1-based line numbers. Blank lines
/// and `#` comments are skipped.
pub fn parse_calls(raw: &str) -> Result<Vec<(usize, ReplayCall)>> {
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let call: ReplayCall = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid replay call", idx + 1))?;
        out.push((idx + 1, call));
    }
    Ok(out)
}

/// Apply one call and render its verdict.
pub async fn apply(guard: &IntegrityGuard, call: ReplayCall) -> Result<Value> {
    let v = match call {
        ReplayCall::Submission {
            feed,
            price,
            timestamp_ms,
            identity,
            proof_token,
            ..
        } => {
            let sub = Submission {
                feed,
                price,
                timestamp_ms,
                identity,
                proof_token,
            };
            let res = guard.validate_submission(&sub).await;
            json!({ "result": res })
        }

        ReplayCall::Request {
            now_ms,
            feed,
            success,
            price,
            timestamp_ms,
            latency_ms,
            source,
            trial,
        } => {
            let req = RequestRecord {
                price,
                timestamp_ms: timestamp_ms.unwrap_or(now_ms),
                source,
                latency_ms,
                trial,
            };
            match guard.record_request(&feed, success, &req).await {
                Ok(()) => circuit_verdict(guard, &feed),
                Err(e) => json!({ "error": e.to_string() }),
            }
        }

        ReplayCall::PricePoint {
            feed,
            price,
            timestamp_ms,
            source,
            confidence,
            ..
        } => {
            match guard.add_price_point(&feed, price, timestamp_ms, &source, confidence) {
                Ok(()) => json!({ "history_len": guard.price_history(&feed, usize::MAX).len() }),
                Err(e) => json!({ "error": e.to_string() }),
            }
        }

        ReplayCall::PendingTx {
            feed,
            tx_id,
            timestamp_ms,
            ..
        } => match guard
            .record_pending_transaction(&feed, &tx_id, timestamp_ms)
            .await
        {
            Ok(()) => json!({ "recorded": true }),
            Err(e) => json!({ "recorded": false, "error": e.to_string() }),
        },

        ReplayCall::CanPass { feed, .. } => match guard.can_pass_through(&feed) {
            Ok(decision) => json!({ "decision": decision }),
            Err(e) => json!({ "error": e.to_string() }),
        },

        ReplayCall::ForceTrip { feed, reason, .. } => match guard.force_trip(&feed, &reason) {
            Ok(()) => circuit_verdict(guard, &feed),
            Err(e) => json!({ "error": e.to_string() }),
        },

        ReplayCall::ForceReset { feed, .. } => match guard.force_reset(&feed).await {
            Ok(()) => circuit_verdict(guard, &feed),
            Err(e) => json!({ "error": e.to_string() }),
        },
    };
    Ok(v)
}

fn circuit_verdict(guard: &IntegrityGuard, feed: &FeedId) -> Value {
    match guard.circuit_state(feed) {
        Ok(st) => json!({ "circuit": st }),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut s = String::new();
        std::io::stdin()
            .read_to_string(&mut s)
            .context("read replay input from stdin")?;
        return Ok(s);
    }
    fs::read_to_string(input).with_context(|| format!("read replay input: {input}"))
}

/// Execute `og replay`.
pub async fn run(config_paths: &[String], input: &str) -> Result<()> {
    let (cfg, _report, config_hash) =
        super::load_guard_config(config_paths, UnusedKeyPolicy::Warn)?;
    let raw = read_input(input)?;
    let calls = parse_calls(&raw)?;

    let start = calls.first().map(|(_, c)| c.now_ms()).unwrap_or(0);
    let clock = Arc::new(ManualClock::new(start));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let guard = IntegrityGuard::new(cfg, store, clock.clone()).context("build guard")?;

    tracing::info!(calls = calls.len(), input, "replay started");

    for (line, call) in calls {
        let now_ms = call.now_ms();
        if now_ms < clock.now_ms() {
            tracing::warn!(line, now_ms, "replay clock moves backwards");
        }
        clock.set(now_ms);

        let op = call.op();
        let mut verdict = apply(&guard, call).await?;
        if let Value::Object(map) = &mut verdict {
            map.insert("line".to_string(), json!(line));
            map.insert("op".to_string(), json!(op));
            map.insert("now_ms".to_string(), json!(now_ms));
        }
        println!("{}", serde_json::to_string(&verdict).context("serialize verdict")?);
    }

    let summary = json!({
        "summary": guard.statistics(),
        "config_hash": config_hash,
    });
    println!("{}", serde_json::to_string(&summary).context("serialize summary")?);
    Ok(())
}
