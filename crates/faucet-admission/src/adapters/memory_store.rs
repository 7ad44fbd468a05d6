//! In-Memory Counter Store Adapter
//!
//! Implements the `CounterStore` port in process. Every primitive holds one
//! mutex for its whole duration, so each call is atomic. Suitable for a
//! single-instance deployment and for tests.
//!
//! Expired keys are dropped when read; window-bucketed keys are never read
//! again, so long-running deployments start [`InMemoryCounterStore::spawn_purge_task`].

use crate::domain::{CounterStoreError, Timestamp};
use crate::ports::outbound::{BoundedIncrement, CounterStore, TimeSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
enum Value {
    Counter(u128),
    Record(Vec<u8>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Timestamp>,
}

impl Entry {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Counter store backed by a `HashMap`, expiring keys lazily.
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn TimeSource>,
    unavailable: AtomicBool,
}

impl InMemoryCounterStore {
    /// Create an empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop expired keys. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("[faucet] Purged {} expired counter keys", removed);
        }
        removed
    }

    /// Purge expired keys every `period` until the store is dropped.
    pub fn spawn_purge_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.purge_expired();
            }
            debug!("[faucet] Counter store dropped, purge task stopped");
        })
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Whether no live keys are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), CounterStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            warn!("[faucet] In-memory counter store is marked unavailable");
            return Err(CounterStoreError::Unavailable(
                "store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn expiry(now: Timestamp, ttl: Duration) -> Option<Timestamp> {
        Some(now.saturating_add(ttl.as_secs().max(1)))
    }

    fn live_counter(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        now: Timestamp,
    ) -> Result<Option<u128>, CounterStoreError> {
        let live = match entries.get(key) {
            Some(entry) if entry.is_live(now) => entry.clone(),
            Some(_) => {
                entries.remove(key);
                return Ok(None);
            }
            None => return Ok(None),
        };
        match live.value {
            Value::Counter(value) => Ok(Some(value)),
            Value::Record(_) => Err(CounterStoreError::Corrupt {
                key: key.to_string(),
                detail: "expected counter, found record".to_string(),
            }),
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_get(
        &self,
        key: &str,
        by: u128,
        ttl: Duration,
    ) -> Result<u128, CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let next = match Self::live_counter(&mut entries, key, now)? {
            Some(current) => {
                let next = current.saturating_add(by);
                if let Some(entry) = entries.get_mut(key) {
                    entry.value = Value::Counter(next);
                }
                next
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Counter(by),
                        expires_at: Self::expiry(now, ttl),
                    },
                );
                by
            }
        };
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<u128>, CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Self::live_counter(&mut entries, key, now)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: u128,
        ttl: Duration,
    ) -> Result<bool, CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Counter(value),
                expires_at: Self::expiry(now, ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let removed = self.entries.lock().remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete_if_equals(&self, key: &str, expected: u128) -> Result<bool, CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if Self::live_counter(&mut entries, key, now)? != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    async fn increment_within(
        &self,
        increments: &[BoundedIncrement],
    ) -> Result<bool, CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let mut current = Vec::with_capacity(increments.len());
        for inc in increments {
            let value = Self::live_counter(&mut entries, &inc.key, now)?.unwrap_or(0);
            match value.checked_add(inc.by) {
                Some(next) if next <= inc.cap => current.push(value),
                _ => return Ok(false),
            }
        }

        for (inc, value) in increments.iter().zip(current) {
            match entries.get_mut(&inc.key) {
                Some(entry) => entry.value = Value::Counter(value + inc.by),
                None => {
                    entries.insert(
                        inc.key.clone(),
                        Entry {
                            value: Value::Counter(inc.by),
                            expires_at: Self::expiry(now, inc.ttl),
                        },
                    );
                }
            }
        }
        Ok(true)
    }

    async fn put_record(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Record(value),
                expires_at: Self::expiry(now, ttl),
            },
        );
        Ok(())
    }

    async fn get_record(&self, key: &str) -> Result<Option<Vec<u8>>, CounterStoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let live = match entries.get(key) {
            Some(entry) if entry.is_live(now) => entry.clone(),
            Some(_) => {
                entries.remove(key);
                return Ok(None);
            }
            None => return Ok(None),
        };
        match live.value {
            Value::Record(bytes) => Ok(Some(bytes)),
            Value::Counter(_) => Err(CounterStoreError::Corrupt {
                key: key.to_string(),
                detail: "expected record, found counter".to_string(),
            }),
        }
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        self.ensure_available()
    }
}
