//! Record shapes stored in coordination-store lists (JSON-encoded).

use og_schemas::{Identity, Price};
use serde::{Deserialize, Serialize};

/// One submission as seen by any instance; feeds the coordinated-attack check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub identity: Identity,
    pub price: Price,
    pub timestamp_ms: i64,
}

/// A transaction observed pending against a feed by an upstream mempool
/// watcher; feeds the front-running check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingTxRecord {
    pub tx_id: String,
    pub timestamp_ms: i64,
}
