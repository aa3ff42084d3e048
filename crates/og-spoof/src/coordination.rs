//! Checks backed by the shared coordination store.
//!
//! Every call goes through [`bounded`]. Errors are returned to the engine,
//! which decides per check whether to fail open or closed.

use crate::checks::{evaluate_coordinated, evaluate_front_running};
use crate::types::{AlertKind, DetectionConfig, SpoofAlert, Submission};
use og_coord::{bounded, keys, CoordinationStore, PendingTxRecord, StoreError, SubmissionRecord};
use og_schemas::{FeedId, Severity};
use serde::de::DeserializeOwned;
use std::time::Duration;

fn ms(v: i64) -> Duration {
    Duration::from_millis(v.max(0) as u64)
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        detail: e.to_string(),
    })
}

/// Decode list entries, skipping any that do not parse. One bad writer must
/// not blind the check for everyone else.
fn decode_all<T: DeserializeOwned>(key: &str, raw: &[String]) -> Vec<T> {
    raw.iter()
        .filter_map(|s| match serde_json::from_str::<T>(s) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(key, error = %e, "skipping undecodable list entry");
                None
            }
        })
        .collect()
}

/// Record the submission in the shared recent list (trimmed to the cap),
/// then evaluate against everything visible. The current submission is
/// always written exactly once.
pub(crate) async fn check_coordinated(
    store: &dyn CoordinationStore,
    timeout: Duration,
    cfg: &DetectionConfig,
    sub: &Submission,
    now_ms: i64,
) -> Result<Option<SpoofAlert>, StoreError> {
    let key = keys::recent_submissions(&sub.feed);
    let record = SubmissionRecord {
        identity: sub.identity.clone(),
        price: sub.price.clone(),
        timestamp_ms: sub.timestamp_ms,
    };
    let encoded = encode(&key, &record)?;
    let last = cfg.recent_submissions_cap - 1;

    bounded(timeout, store.list_push(&key, &encoded)).await?;
    bounded(timeout, store.list_trim(&key, 0, last)).await?;
    let raw = bounded(timeout, store.list_range(&key, 0, last)).await?;

    let records: Vec<SubmissionRecord> = decode_all(&key, &raw);
    Ok(evaluate_coordinated(cfg, sub, &records, now_ms))
}

/// Atomically claim the proof token. A token that was already claimed within
/// its TTL is a replay.
pub(crate) async fn check_replay(
    store: &dyn CoordinationStore,
    timeout: Duration,
    cfg: &DetectionConfig,
    sub: &Submission,
    now_ms: i64,
) -> Result<Option<SpoofAlert>, StoreError> {
    let key = keys::used_proofs(&sub.feed);
    let ttl = ms(cfg.proof_ttl_ms);

    let fresh = bounded(timeout, store.set_add(&key, &sub.proof_token, Some(ttl))).await?;
    if fresh {
        return Ok(None);
    }

    Ok(Some(
        SpoofAlert::new(
            AlertKind::ReplayAttack,
            Severity::Critical,
            &sub.feed,
            vec![sub.identity.clone()],
            now_ms,
        )
        .with_detail("reason", "proof_reused"),
    ))
}

/// Alert raised when the replay check cannot reach the store. Replay
/// protection fails closed.
pub(crate) fn replay_unverifiable(sub: &Submission, err: &StoreError, now_ms: i64) -> SpoofAlert {
    SpoofAlert::new(
        AlertKind::ReplayAttack,
        Severity::Critical,
        &sub.feed,
        vec![sub.identity.clone()],
        now_ms,
    )
    .with_detail("reason", "store_error")
    .with_detail("error", err.to_string())
}

pub(crate) async fn check_front_running(
    store: &dyn CoordinationStore,
    timeout: Duration,
    cfg: &DetectionConfig,
    sub: &Submission,
    now_ms: i64,
) -> Result<Option<SpoofAlert>, StoreError> {
    let key = keys::pending_transactions(&sub.feed);
    let raw = bounded(timeout, store.list_range(&key, 0, cfg.pending_tx_cap - 1)).await?;
    let pending: Vec<PendingTxRecord> = decode_all(&key, &raw);
    Ok(evaluate_front_running(cfg, sub, &pending, now_ms))
}

/// Publish a pending transaction observed against `feed` so every instance's
/// front-running check can see it. The list is trimmed to `pending_tx_cap`
/// and expires `pending_tx_ttl_ms` after the last write.
pub async fn publish_pending_transaction(
    store: &dyn CoordinationStore,
    timeout: Duration,
    cfg: &DetectionConfig,
    feed: &FeedId,
    tx_id: &str,
    timestamp_ms: i64,
) -> Result<(), StoreError> {
    let key = keys::pending_transactions(feed);
    let encoded = encode(
        &key,
        &PendingTxRecord {
            tx_id: tx_id.to_string(),
            timestamp_ms,
        },
    )?;

    bounded(timeout, store.list_push(&key, &encoded)).await?;
    bounded(timeout, store.list_trim(&key, 0, cfg.pending_tx_cap - 1)).await?;
    bounded(timeout, store.expire(&key, ms(cfg.pending_tx_ttl_ms))).await?;
    Ok(())
}
