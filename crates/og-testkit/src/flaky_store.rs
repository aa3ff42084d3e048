//! Coordination store with injectable faults.
//!
//! Wraps a [`MemoryStore`] and, per operation, either forwards the call,
//! fails it with [`StoreError::Unavailable`], or stalls it before forwarding
//! so the caller's deadline fires. Faults can be changed while a guard is
//! running against the store.

use async_trait::async_trait;
use og_coord::{CoordinationStore, MemoryStore, StoreError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// One method of [`CoordinationStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    Get,
    Set,
    ListPush,
    ListRange,
    ListTrim,
    SetAdd,
    SetContains,
    Incr,
    CounterGet,
    Expire,
    Delete,
}

impl StoreOp {
    pub const ALL: [StoreOp; 11] = [
        StoreOp::Get,
        StoreOp::Set,
        StoreOp::ListPush,
        StoreOp::ListRange,
        StoreOp::ListTrim,
        StoreOp::SetAdd,
        StoreOp::SetContains,
        StoreOp::Incr,
        StoreOp::CounterGet,
        StoreOp::Expire,
        StoreOp::Delete,
    ];
}

/// What happens to a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Healthy,
    Fail,
    /// Sleep this long, then forward.
    Stall(Duration),
}

pub struct FlakyStore {
    inner: MemoryStore,
    faults: Mutex<BTreeMap<StoreOp, Fault>>,
    calls: Mutex<BTreeMap<StoreOp, u64>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(BTreeMap::new()),
        }
    }

    /// Direct access to the healthy backend, bypassing faults.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn set_fault(&self, op: StoreOp, fault: Fault) {
        let mut faults = self.faults.lock();
        if fault == Fault::Healthy {
            faults.remove(&op);
        } else {
            faults.insert(op, fault);
        }
    }

    pub fn fail(&self, op: StoreOp) {
        self.set_fault(op, Fault::Fail);
    }

    pub fn fail_all(&self) {
        for op in StoreOp::ALL {
            self.set_fault(op, Fault::Fail);
        }
    }

    pub fn stall_all(&self, delay: Duration) {
        for op in StoreOp::ALL {
            self.set_fault(op, Fault::Stall(delay));
        }
    }

    pub fn heal(&self) {
        self.faults.lock().clear();
    }

    /// Calls attempted for `op`, including faulted ones.
    pub fn calls(&self, op: StoreOp) -> u64 {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    async fn gate(&self, op: StoreOp) -> Result<(), StoreError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        let fault = self.faults.lock().get(&op).copied().unwrap_or(Fault::Healthy);
        match fault {
            Fault::Healthy => Ok(()),
            Fault::Fail => Err(StoreError::Unavailable(format!("injected fault on {op:?}"))),
            Fault::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CoordinationStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.gate(StoreOp::Get).await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.gate(StoreOp::Set).await?;
        self.inner.set(key, value, ttl).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.gate(StoreOp::ListPush).await?;
        self.inner.list_push(key, value).await
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.gate(StoreOp::ListRange).await?;
        self.inner.list_range(key, start, stop).await
    }

    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<(), StoreError> {
        self.gate(StoreOp::ListTrim).await?;
        self.inner.list_trim(key, start, stop).await
    }

    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.gate(StoreOp::SetAdd).await?;
        self.inner.set_add(key, member, ttl).await
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.gate(StoreOp::SetContains).await?;
        self.inner.set_contains(key, member).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.gate(StoreOp::Incr).await?;
        self.inner.incr(key).await
    }

    async fn counter_get(&self, key: &str) -> Result<i64, StoreError> {
        self.gate(StoreOp::CounterGet).await?;
        self.inner.counter_get(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.gate(StoreOp::Expire).await?;
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.gate(StoreOp::Delete).await?;
        self.inner.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn faults_are_per_operation_and_heal() {
        let store = FlakyStore::new(MemoryStore::new());
        store.fail(StoreOp::Incr);

        assert!(matches!(
            store.incr("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.counter_get("k").await.unwrap(), 0);

        store.heal();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.calls(StoreOp::Incr), 2);
    }

    #[tokio::test]
    async fn stall_trips_the_caller_deadline() {
        let store = FlakyStore::new(MemoryStore::new());
        store.stall_all(Duration::from_millis(200));

        let res = og_coord::bounded(Duration::from_millis(10), store.get("k")).await;
        assert_eq!(res, Err(StoreError::Timeout));
    }
}
