//! In-process [`CoordinationStore`].
//!
//! Single-process only: it gives one guard instance (or a test) the same
//! semantics a shared backend would, including TTL expiry driven by the
//! injected [`Clock`]. Expired keys are purged lazily on access.

use crate::{CoordinationStore, StoreError};
use async_trait::async_trait;
use og_schemas::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

enum Value {
    Str(String),
    List(VecDeque<String>),
    /// member -> member expiry (epoch ms)
    Set(HashMap<String, Option<i64>>),
}

struct Entry {
    value: Value,
    expires_at_ms: Option<i64>,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn deadline(&self, ttl: Duration) -> i64 {
        let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_ms().saturating_add(ms)
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: i64) {
    let expired = entries
        .get(key)
        .and_then(|e| e.expires_at_ms)
        .is_some_and(|t| t <= now);
    if expired {
        entries.remove(key);
    }
}

fn wrong_type(key: &str, expected: &str) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        detail: format!("expected {expected}"),
    }
}

fn inclusive_slice(list: &VecDeque<String>, start: usize, stop: usize) -> Vec<String> {
    if stop < start {
        return Vec::new();
    }
    list.iter()
        .skip(start)
        .take(stop - start + 1)
        .cloned()
        .collect()
}

fn read_counter(key: &str, entry: Option<&Entry>) -> Result<i64, StoreError> {
    match entry.map(|e| &e.value) {
        None => Ok(0),
        Some(Value::Str(s)) => s.trim().parse::<i64>().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            detail: format!("not an integer: {s:?}"),
        }),
        Some(_) => Err(wrong_type(key, "integer string")),
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at_ms = ttl.map(|t| self.deadline(t));
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len())
            }
            _ => Err(wrong_type(key, "list")),
        }
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(inclusive_slice(list, start, stop)),
            Some(_) => Err(wrong_type(key, "list")),
        }
    }

    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<(), StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        let now_empty = match entries.get_mut(key).map(|e| &mut e.value) {
            None => return Ok(()),
            Some(Value::List(list)) => {
                let kept: VecDeque<String> = inclusive_slice(list, start, stop).into();
                *list = kept;
                list.is_empty()
            }
            Some(_) => return Err(wrong_type(key, "list")),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_ms();
        let member_expiry = ttl.map(|t| self.deadline(t));
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashMap::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            Value::Set(members) => {
                members.retain(|_, exp| exp.map_or(true, |t| t > now));
                let inserted = members
                    .insert(member.to_string(), member_expiry)
                    .is_none();
                Ok(inserted)
            }
            _ => Err(wrong_type(key, "set")),
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(false),
            Some(Value::Set(members)) => Ok(members
                .get(member)
                .is_some_and(|exp| exp.map_or(true, |t| t > now))),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        let next = read_counter(key, entries.get(key))?.saturating_add(1);
        let expires_at_ms = entries.get(key).and_then(|e| e.expires_at_ms);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(next.to_string()),
                expires_at_ms,
            },
        );
        Ok(next)
    }

    async fn counter_get(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        read_counter(key, entries.get(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now_ms();
        let deadline = self.deadline(ttl);
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(e) => {
                e.expires_at_ms = Some(deadline);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
