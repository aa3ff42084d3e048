use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`CoordinationStore`] call may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The call did not complete within its deadline.
    Timeout,
    /// Transport or backend failure.
    Unavailable(String),
    /// The key exists but holds a value of the wrong shape.
    Corrupt { key: String, detail: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "coordination store timeout"),
            StoreError::Unavailable(msg) => write!(f, "coordination store unavailable: {msg}"),
            StoreError::Corrupt { key, detail } => {
                write!(f, "coordination store key {key} corrupt: {detail}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Durable key/value + list + set + counter store shared by every guard
/// instance behind the load balancer.
///
/// Every operation may race with other instances. Implementations must make
/// `set_add` and `incr` atomic; everything else only needs last-writer-wins.
///
/// Lists are head-first: `list_push` prepends, index 0 is the newest entry,
/// and `list_range`/`list_trim` take inclusive indexes.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Human-readable backend name for logs (e.g. `"memory"`).
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Prepend `value`; returns the new list length.
    async fn list_push(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    async fn list_range(&self, key: &str, start: usize, stop: usize)
        -> Result<Vec<String>, StoreError>;

    /// Keep only indexes `start..=stop`.
    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<(), StoreError>;

    /// Add `member`; returns `true` if it was not already present.
    /// A member stays visible for at least `ttl` after its last add.
    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>)
        -> Result<bool, StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Atomically increment the integer at `key` (missing = 0); returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Integer at `key`, 0 when missing.
    async fn counter_get(&self, key: &str) -> Result<i64, StoreError>;

    /// Set the key's expiry; returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Run a store call under a deadline. Elapsed deadlines become
/// [`StoreError::Timeout`].
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout),
    }
}
