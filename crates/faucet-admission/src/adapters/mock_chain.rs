//! Mock Chain Client Adapter
//!
//! Implements the `ChainClient` port against in-memory balances, with
//! switches for injecting RPC failures, reverts and slow confirmations.

use crate::config::NetworkConfig;
use crate::domain::{AddressFormat, Amount, ChainError, NetworkId, ResourceSymbol, TxReference};
use crate::ports::outbound::{ChainClient, TxStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// A transfer the mock accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedTransfer {
    /// Recipient as passed to `transfer`.
    pub recipient: String,
    /// Resource sent.
    pub resource: ResourceSymbol,
    /// Amount in base units.
    pub amount: Amount,
    /// Returned reference.
    pub tx: TxReference,
}

/// In-memory chain client for tests and local runs.
pub struct MockChainClient {
    network: NetworkId,
    format: AddressFormat,
    resources: Vec<ResourceSymbol>,
    faucet_address: String,
    explorer_url: String,
    balances: RwLock<HashMap<ResourceSymbol, Amount>>,
    transfers: RwLock<Vec<RecordedTransfer>>,
    failing_transfers: RwLock<HashSet<ResourceSymbol>>,
    reverting_transfers: RwLock<HashSet<ResourceSymbol>>,
    tx_resources: RwLock<HashMap<TxReference, ResourceSymbol>>,
    balance_reads_fail: AtomicBool,
    pending_polls: AtomicU32,
    transfer_delay_ms: AtomicU64,
    nonce: AtomicU64,
}

impl MockChainClient {
    /// Create a client for `network` offering `resources`, all with zero balance.
    pub fn new(network: impl Into<NetworkId>, format: AddressFormat, resources: &[&str]) -> Self {
        let resources: Vec<ResourceSymbol> = resources.iter().map(ResourceSymbol::new).collect();
        let network = network.into();
        Self {
            explorer_url: format!("https://explorer.{}.test", network),
            network,
            format,
            balances: RwLock::new(resources.iter().map(|r| (r.clone(), 0)).collect()),
            resources,
            faucet_address: match format {
                AddressFormat::Evm => format!("0x{}", "fa".repeat(20)),
                AddressFormat::Starknet => format!("0x{}", "fa".repeat(32)),
            },
            transfers: RwLock::new(Vec::new()),
            failing_transfers: RwLock::new(HashSet::new()),
            reverting_transfers: RwLock::new(HashSet::new()),
            tx_resources: RwLock::new(HashMap::new()),
            balance_reads_fail: AtomicBool::new(false),
            pending_polls: AtomicU32::new(0),
            transfer_delay_ms: AtomicU64::new(0),
            nonce: AtomicU64::new(0),
        }
    }

    /// Create a client for a configured network: its resources and explorer URL.
    pub fn from_config(
        network: impl Into<NetworkId>,
        format: AddressFormat,
        config: &NetworkConfig,
    ) -> Self {
        let resources: Vec<&str> = config.resources.keys().map(ResourceSymbol::as_str).collect();
        let client = Self::new(network, format, &resources);
        if config.explorer_url.is_empty() {
            client
        } else {
            client.with_explorer_url(config.explorer_url.clone())
        }
    }

    /// Set the faucet balance of a resource.
    pub fn with_balance(self, resource: &str, amount: Amount) -> Self {
        self.set_balance(resource, amount);
        self
    }

    /// Override the explorer base URL.
    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = url.into();
        self
    }

    /// Set the faucet balance of a resource.
    pub fn set_balance(&self, resource: &str, amount: Amount) {
        self.balances
            .write()
            .insert(ResourceSymbol::new(resource), amount);
    }

    /// Current faucet balance of a resource.
    pub fn balance(&self, resource: &str) -> Amount {
        self.balances
            .read()
            .get(&ResourceSymbol::new(resource))
            .copied()
            .unwrap_or(0)
    }

    /// Make balance reads fail with an RPC error.
    pub fn fail_balance_reads(&self, fail: bool) {
        self.balance_reads_fail.store(fail, Ordering::SeqCst);
    }

    /// Make transfers of `resource` fail at submission.
    pub fn fail_transfers_of(&self, resource: &str) {
        self.failing_transfers
            .write()
            .insert(ResourceSymbol::new(resource));
    }

    /// Make transfers of `resource` revert on-chain.
    pub fn revert_transfers_of(&self, resource: &str) {
        self.reverting_transfers
            .write()
            .insert(ResourceSymbol::new(resource));
    }

    /// Report `polls` pending statuses before each confirmation.
    pub fn set_pending_polls(&self, polls: u32) {
        self.pending_polls.store(polls, Ordering::SeqCst);
    }

    /// Delay every transfer submission.
    pub fn set_transfer_delay(&self, delay: Duration) {
        self.transfer_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Transfers accepted so far.
    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.read().clone()
    }

    fn next_tx(&self) -> TxReference {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(self.network.as_str().as_bytes());
        hasher.update(nonce.to_be_bytes());
        TxReference::new(format!("0x{}", hex::encode(hasher.finalize())))
    }

    fn ensure_supported(&self, resource: &ResourceSymbol) -> Result<(), ChainError> {
        if self.resources.contains(resource) {
            Ok(())
        } else {
            Err(ChainError::UnsupportedResource(resource.clone()))
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn network(&self) -> NetworkId {
        self.network.clone()
    }

    fn validate_address(&self, address: &str) -> Result<(), ChainError> {
        self.format
            .validate(address)
            .map_err(ChainError::InvalidAddress)
    }

    fn normalize_address(&self, address: &str) -> String {
        self.format.normalize(address)
    }

    fn supported_resources(&self) -> Vec<ResourceSymbol> {
        self.resources.clone()
    }

    fn faucet_address(&self) -> String {
        self.faucet_address.clone()
    }

    async fn get_balance(
        &self,
        address: &str,
        resource: &ResourceSymbol,
    ) -> Result<Amount, ChainError> {
        debug!("[faucet] Mock balance read {} {} on {}", address, resource, self.network);
        self.ensure_supported(resource)?;
        if self.balance_reads_fail.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc("mock balance read failure".to_string()));
        }
        if address != self.faucet_address {
            return Ok(0);
        }
        Ok(self.balances.read().get(resource).copied().unwrap_or(0))
    }

    async fn transfer(
        &self,
        recipient: &str,
        resource: &ResourceSymbol,
        amount: Amount,
    ) -> Result<TxReference, ChainError> {
        self.ensure_supported(resource)?;
        let delay = self.transfer_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing_transfers.read().contains(resource) {
            return Err(ChainError::Rpc(format!("mock {} transfer rejected", resource)));
        }

        {
            let mut balances = self.balances.write();
            let balance = balances.entry(resource.clone()).or_insert(0);
            *balance = balance
                .checked_sub(amount)
                .ok_or_else(|| ChainError::TransactionFailed("insufficient funds".to_string()))?;
        }

        let tx = self.next_tx();
        self.tx_resources.write().insert(tx.clone(), resource.clone());
        self.transfers.write().push(RecordedTransfer {
            recipient: recipient.to_string(),
            resource: resource.clone(),
            amount,
            tx: tx.clone(),
        });
        info!(
            "[faucet] Mock transfer {} {} to {} on {}: {}",
            amount, resource, recipient, self.network, tx
        );
        Ok(tx)
    }

    async fn transaction_status(&self, tx: &TxReference) -> Result<TxStatus, ChainError> {
        let resource = self
            .tx_resources
            .read()
            .get(tx)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("unknown transaction {}", tx)))?;

        if self.reverting_transfers.read().contains(&resource) {
            return Ok(TxStatus::Failed("execution reverted".to_string()));
        }
        let pending = self.pending_polls.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_polls.store(pending - 1, Ordering::SeqCst);
            return Ok(TxStatus::Pending);
        }
        Ok(TxStatus::Confirmed)
    }

    fn explorer_link(&self, tx: &TxReference) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT: &str = "0x742d35cc6634c0532925a3b844bc454e4438f44e";

    fn client() -> MockChainClient {
        MockChainClient::new("ethereum", AddressFormat::Evm, &["ETH"]).with_balance("ETH", 1_000)
    }

    #[tokio::test]
    async fn test_transfer_debits_balance() {
        let client = client();
        let eth = ResourceSymbol::new("ETH");
        let tx = client.transfer(RECIPIENT, &eth, 100).await.unwrap();
        assert_eq!(client.balance("ETH"), 900);
        assert_eq!(client.transfers().len(), 1);
        assert_eq!(
            client.transaction_status(&tx).await.unwrap(),
            TxStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_unsupported_resource() {
        let client = client();
        let err = client
            .transfer(RECIPIENT, &ResourceSymbol::new("STRK"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::UnsupportedResource(_)));
    }

    #[tokio::test]
    async fn test_balance_read_failure() {
        let client = client();
        client.fail_balance_reads(true);
        let faucet = client.faucet_address();
        assert!(client
            .get_balance(&faucet, &ResourceSymbol::new("ETH"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_revert_reported_as_failed_status() {
        let client = client();
        client.revert_transfers_of("ETH");
        let tx = client
            .transfer(RECIPIENT, &ResourceSymbol::new("ETH"), 1)
            .await
            .unwrap();
        assert!(matches!(
            client.transaction_status(&tx).await.unwrap(),
            TxStatus::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_pending_polls_then_confirmed() {
        let client = client();
        client.set_pending_polls(2);
        let tx = client
            .transfer(RECIPIENT, &ResourceSymbol::new("ETH"), 1)
            .await
            .unwrap();
        assert_eq!(client.transaction_status(&tx).await.unwrap(), TxStatus::Pending);
        assert_eq!(client.transaction_status(&tx).await.unwrap(), TxStatus::Pending);
        assert_eq!(client.transaction_status(&tx).await.unwrap(), TxStatus::Confirmed);
    }

    #[test]
    fn test_explorer_link() {
        let client = client().with_explorer_url("https://sepolia.etherscan.io/");
        let link = client.explorer_link(&TxReference::new("0xabc"));
        assert_eq!(link, "https://sepolia.etherscan.io/tx/0xabc");
    }

    #[test]
    fn test_from_config_uses_configured_explorer() {
        let config = crate::config::FaucetConfig::default();
        let starknet = &config.networks[&NetworkId::new("starknet")];
        let client = MockChainClient::from_config("starknet", AddressFormat::Starknet, starknet);
        assert_eq!(
            client.supported_resources(),
            vec![ResourceSymbol::new("ETH"), ResourceSymbol::new("STRK")]
        );
        assert_eq!(
            client.explorer_link(&TxReference::new("0x1")),
            "https://sepolia.voyager.online/tx/0x1"
        );
    }

    #[test]
    fn test_address_rules_follow_format() {
        let client = client();
        assert!(client.validate_address(RECIPIENT).is_ok());
        assert!(client.validate_address("0x1234").is_err());
    }
}
