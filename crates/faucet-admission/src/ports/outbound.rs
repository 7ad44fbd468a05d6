//! # Outbound Ports
//!
//! Traits for external dependencies: the shared counter store, per-network
//! chain clients and the clock.

use crate::domain::{
    Amount, ChainError, CounterStoreError, NetworkId, ResourceSymbol, Timestamp, TxReference,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// One leg of an all-or-nothing capped increment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundedIncrement {
    /// Counter key.
    pub key: String,
    /// Amount to add.
    pub by: u128,
    /// Maximum value the counter may reach.
    pub cap: u128,
    /// TTL applied when the key is created.
    pub ttl: Duration,
}

/// Networked key-value store with atomic counters and TTL - outbound port.
///
/// Every method is atomic with respect to concurrent callers, including
/// callers in other processes sharing the same store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add `by`, setting `ttl` only if the key is created. Returns the new value.
    async fn increment_and_get(
        &self,
        key: &str,
        by: u128,
        ttl: Duration,
    ) -> Result<u128, CounterStoreError>;

    /// Current counter value.
    async fn get(&self, key: &str) -> Result<Option<u128>, CounterStoreError>;

    /// Store `value` iff the key is absent. Returns whether it was stored.
    async fn set_if_absent(
        &self,
        key: &str,
        value: u128,
        ttl: Duration,
    ) -> Result<bool, CounterStoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CounterStoreError>;

    /// Remove a counter only if it holds `expected`. Returns whether it was removed.
    async fn delete_if_equals(&self, key: &str, expected: u128) -> Result<bool, CounterStoreError>;

    /// Apply every increment iff each stays within its cap. Returns whether applied.
    async fn increment_within(
        &self,
        increments: &[BoundedIncrement],
    ) -> Result<bool, CounterStoreError>;

    /// Store an opaque record.
    async fn put_record(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CounterStoreError>;

    /// Load an opaque record.
    async fn get_record(&self, key: &str) -> Result<Option<Vec<u8>>, CounterStoreError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), CounterStoreError>;
}

/// On-chain transaction state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Submitted, not yet included.
    Pending,
    /// Included and successful.
    Confirmed,
    /// Reverted or dropped.
    Failed(String),
}

/// Per-network chain client - outbound port.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Network this client serves.
    fn network(&self) -> NetworkId;

    /// Check address syntax for this network.
    fn validate_address(&self, address: &str) -> Result<(), ChainError>;

    /// Canonical address form.
    fn normalize_address(&self, address: &str) -> String;

    /// Disbursable resources, in request order.
    fn supported_resources(&self) -> Vec<ResourceSymbol>;

    /// Faucet's own account.
    fn faucet_address(&self) -> String;

    /// Balance of `address` in base units.
    async fn get_balance(
        &self,
        address: &str,
        resource: &ResourceSymbol,
    ) -> Result<Amount, ChainError>;

    /// Submit a transfer from the faucet account.
    async fn transfer(
        &self,
        recipient: &str,
        resource: &ResourceSymbol,
        amount: Amount,
    ) -> Result<TxReference, ChainError>;

    /// Poll a transaction once.
    async fn transaction_status(&self, tx: &TxReference) -> Result<TxStatus, ChainError>;

    /// Poll until the transaction settles or `deadline` passes.
    async fn await_confirmation(
        &self,
        tx: &TxReference,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<(), ChainError> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.transaction_status(tx).await? {
                TxStatus::Confirmed => return Ok(()),
                TxStatus::Failed(reason) => return Err(ChainError::TransactionFailed(reason)),
                TxStatus::Pending => {}
            }
            if started.elapsed() >= deadline {
                return Err(ChainError::ConfirmationTimeout(tx.clone()));
            }
        }
    }

    /// Block explorer URL for a transaction.
    fn explorer_link(&self, tx: &TxReference) -> String;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current unix time in seconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    time: AtomicU64,
}

impl ManualClock {
    /// Start at `initial` unix seconds.
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: AtomicU64::new(initial),
        }
    }

    /// Move forward.
    pub fn advance(&self, by: Duration) {
        self.time.fetch_add(by.as_secs(), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, time: Timestamp) {
        self.time.store(time, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}
