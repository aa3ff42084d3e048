//! Key layout shared by every instance. Everything is scoped per feed.

use og_schemas::FeedId;

/// Head-first list of recent [`crate::SubmissionRecord`]s (coordinated-attack check).
pub fn recent_submissions(feed: &FeedId) -> String {
    format!("og:spoof:recent:{feed}")
}

/// Set of proof tokens already used on this feed (replay check).
pub fn used_proofs(feed: &FeedId) -> String {
    format!("og:spoof:proofs:{feed}")
}

/// Head-first list of [`crate::PendingTxRecord`]s (front-running check).
pub fn pending_transactions(feed: &FeedId) -> String {
    format!("og:pending:{feed}")
}

/// Rolling failure counter driving CLOSED -> OPEN.
pub fn circuit_failures(feed: &FeedId) -> String {
    format!("og:circuit:failures:{feed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_feed_scoped() {
        let a = FeedId::new("ETH_USD");
        let b = FeedId::new("BTC_USD");
        assert_ne!(used_proofs(&a), used_proofs(&b));
        assert_eq!(circuit_failures(&a), "og:circuit:failures:ETH_USD");
    }
}
