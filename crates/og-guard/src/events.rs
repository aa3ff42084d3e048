use og_circuit::CircuitEvent;
use og_schemas::{FeedId, Identity};
use og_spoof::SpoofAlert;
use serde::{Deserialize, Serialize};

/// Messages on the guard's broadcast bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardEvent {
    SpoofDetected {
        alert: SpoofAlert,
    },
    SubmissionBlocked {
        feed: FeedId,
        identity: Identity,
        at_ms: i64,
        alert_ids: Vec<String>,
    },
    CircuitInitialized {
        feed: FeedId,
        at_ms: i64,
    },
    CircuitTripped {
        feed: FeedId,
        at_ms: i64,
        reason: String,
        trip_count: u64,
        cooldown_until_ms: i64,
    },
    CircuitReset {
        feed: FeedId,
        at_ms: i64,
        forced: bool,
    },
    CircuitHalfOpen {
        feed: FeedId,
        at_ms: i64,
    },
}

impl From<CircuitEvent> for GuardEvent {
    fn from(ev: CircuitEvent) -> Self {
        match ev {
            CircuitEvent::Initialized { feed, at_ms } => {
                GuardEvent::CircuitInitialized { feed, at_ms }
            }
            CircuitEvent::Tripped {
                feed,
                at_ms,
                reason,
                trip_count,
                cooldown_until_ms,
            } => GuardEvent::CircuitTripped {
                feed,
                at_ms,
                reason,
                trip_count,
                cooldown_until_ms,
            },
            CircuitEvent::Reset {
                feed,
                at_ms,
                forced,
            } => GuardEvent::CircuitReset {
                feed,
                at_ms,
                forced,
            },
            CircuitEvent::HalfOpen { feed, at_ms } => GuardEvent::CircuitHalfOpen { feed, at_ms },
        }
    }
}
