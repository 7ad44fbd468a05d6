//! # End-to-end admission tests
//!
//! Drive `AdmissionService` through its public API against the in-memory
//! counter store, mock chain clients and a manual clock.
//!
//! ## Test Categories
//!
//! 1. **Quota** - daily cap, cooldown, throttle, concurrent requests
//! 2. **Proof of work** - replay, expiry
//! 3. **Global caps and reserve** - distribution windows, balance floor
//! 4. **Multi-resource** - partial success accounting
//! 5. **Degraded collaborators** - store outage, health

use faucet_admission::algorithms::keys;
use faucet_admission::domain::{codes, DistributionWindow, PowError, RateLimit};
use faucet_admission::{
    solve, AddressFormat, AdmissionApi, AdmissionError, AdmissionRequest, AdmissionService,
    CallerId, ChainRegistry, CounterStore, FaucetConfig, InMemoryCounterStore, ManualClock,
    MockChainClient, NetworkConfig, NetworkId, ResourceConfig, ResourceSymbol, TimeSource,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// TEST HELPERS
// =============================================================================

/// 2024-03-15 13:45:00 UTC
const START: u64 = 1_710_510_300;
const EVM_RECIPIENT: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";
const STARKNET_RECIPIENT: &str = "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7";
const WEI: u128 = 1_000_000_000_000_000_000;

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<InMemoryCounterStore>,
    ethereum: Arc<MockChainClient>,
    starknet: Arc<MockChainClient>,
    service: Arc<AdmissionService>,
}

fn base_config() -> FaucetConfig {
    let mut config = FaucetConfig::default();
    config.pow.difficulty = 4;
    config
}

/// Ethereum-only config paying whole units of ETH.
fn unit_config(drip: &str, max_per_hour: &str) -> FaucetConfig {
    let mut config = base_config();
    config.networks = BTreeMap::from([(
        NetworkId::new("ethereum"),
        NetworkConfig {
            min_balance_protect_pct: 10,
            explorer_url: "https://sepolia.etherscan.io".to_string(),
            resources: BTreeMap::from([(
                ResourceSymbol::new("ETH"),
                ResourceConfig::new(drip, 0).with_caps(max_per_hour, "0"),
            )]),
        },
    )]);
    config
}

fn client_for(
    config: &FaucetConfig,
    network: &str,
    format: AddressFormat,
    resources: &[&str],
) -> MockChainClient {
    match config.networks.get(&NetworkId::new(network)) {
        Some(section) => MockChainClient::from_config(network, format, section),
        None => MockChainClient::new(network, format, resources),
    }
}

fn harness(config: FaucetConfig, eth_balance: u128) -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(InMemoryCounterStore::new(clock.clone()));
    let ethereum = Arc::new(
        client_for(&config, "ethereum", AddressFormat::Evm, &["ETH"])
            .with_balance("ETH", eth_balance),
    );
    let starknet = Arc::new(
        client_for(&config, "starknet", AddressFormat::Starknet, &["ETH", "STRK"])
            .with_balance("ETH", 100 * WEI)
            .with_balance("STRK", 100_000 * WEI),
    );
    let registry = ChainRegistry::new()
        .with_client(ethereum.clone())
        .with_client(starknet.clone());
    let service = AdmissionService::new(config, registry, store.clone(), clock.clone())
        .expect("valid config");
    Harness {
        clock,
        store,
        ethereum,
        starknet,
        service: Arc::new(service),
    }
}

async fn request_for(
    h: &Harness,
    caller: &str,
    network: &str,
    resource: &str,
    recipient: &str,
) -> AdmissionRequest {
    let challenge = h
        .service
        .issue_challenge(&CallerId::new(caller))
        .await
        .expect("challenge issued");
    let seed: [u8; 32] = hex::decode(&challenge.puzzle_seed)
        .expect("hex seed")
        .try_into()
        .expect("32-byte seed");
    let solution = solve(&seed, challenge.difficulty, 10_000_000).expect("solvable");
    AdmissionRequest::new(
        CallerId::new(caller),
        Some(NetworkId::new(network)),
        resource,
        recipient,
        challenge.challenge_id,
        solution,
    )
}

async fn eth_request(h: &Harness, caller: &str) -> AdmissionRequest {
    request_for(h, caller, "ethereum", "ETH", EVM_RECIPIENT).await
}

// =============================================================================
// QUOTA
// =============================================================================

#[tokio::test]
async fn test_sixth_request_of_the_day_is_rejected() {
    let h = harness(base_config(), 100 * WEI);
    let caller = CallerId::new("203.0.113.7");

    for i in 0..5 {
        let request = eth_request(&h, caller.as_str()).await;
        let receipt = h.service.submit(request).await.unwrap();
        assert_eq!(receipt.disbursements.len(), 1, "request {} admitted", i + 1);
        // Step past the hourly throttle, staying within the same UTC day.
        h.clock.advance(Duration::from_secs(3601));
    }

    let request = eth_request(&h, caller.as_str()).await;
    let err = h.service.submit(request).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::RATE_LIMITED);
    assert!(err.retry_after().is_some());
    assert_eq!(h.ethereum.transfers().len(), 5);

    let status = h
        .service
        .status(&caller, Some(&NetworkId::new("ethereum")), EVM_RECIPIENT)
        .await
        .unwrap();
    assert!(!status.eligible);
    assert!(status.cooldown_remaining_secs.unwrap() > 0);

    let quota = h.service.quota(&caller).await.unwrap();
    assert_eq!(quota.daily_limit.used, 5);
    assert_eq!(quota.daily_limit.remaining, 0);
    assert!(quota.daily_limit.in_cooldown);
}

#[tokio::test]
async fn test_throttle_blocks_same_resource_within_the_hour() {
    let h = harness(base_config(), 100 * WEI);
    let first = eth_request(&h, "198.51.100.1").await;
    h.service.submit(first).await.unwrap();

    h.clock.advance(Duration::from_secs(1800));
    let second = eth_request(&h, "198.51.100.1").await;
    let err = h.service.submit(second).await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::RateLimited(RateLimit::ResourceThrottled { .. })
    ));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(1800)));

    let quota = h.service.quota(&CallerId::new("198.51.100.1")).await.unwrap();
    let eth = &quota.hourly_throttle_by_network[&NetworkId::new("ethereum")]
        [&ResourceSymbol::new("ETH")];
    assert!(!eth.available);
    assert_eq!(eth.next_request_at, Some(START + 3600));
    // Throttle is per network.
    let starknet_eth = &quota.hourly_throttle_by_network[&NetworkId::new("starknet")]
        [&ResourceSymbol::new("ETH")];
    assert!(starknet_eth.available);
}

#[tokio::test]
async fn test_concurrent_requests_admit_exactly_one() {
    let h = harness(base_config(), 100 * WEI);
    h.ethereum.set_transfer_delay(Duration::from_millis(50));

    let a = eth_request(&h, "192.0.2.10").await;
    let b = eth_request(&h, "192.0.2.10").await;
    let (ra, rb) = tokio::join!(h.service.submit(a), h.service.submit(b));

    let admitted = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1);
    let rejected = if ra.is_err() { ra.unwrap_err() } else { rb.unwrap_err() };
    assert_eq!(rejected.reason_code(), codes::RATE_LIMITED);
    assert_eq!(h.ethereum.transfers().len(), 1);
}

#[tokio::test]
async fn test_slow_request_keeps_throttle_while_in_flight() {
    let h = harness(base_config(), 100 * WEI);
    h.ethereum.set_transfer_delay(Duration::from_millis(300));

    let first = eth_request(&h, "192.0.2.20").await;
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The first request is still inside its transfer five minutes later.
        h.clock.advance(Duration::from_secs(301));
        let request = eth_request(&h, "192.0.2.20").await;
        h.service.submit(request).await
    };
    let (first, second) = tokio::join!(h.service.submit(first), second);

    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::RateLimited(RateLimit::ResourceThrottled { .. })
    ));
    assert_eq!(h.ethereum.transfers().len(), 1);
}

// =============================================================================
// PROOF OF WORK
// =============================================================================

#[tokio::test]
async fn test_challenge_cannot_be_replayed() {
    let h = harness(base_config(), 100 * WEI);
    let original = eth_request(&h, "10.0.0.1").await;
    h.service.submit(original.clone()).await.unwrap();

    // Different caller so the throttle does not mask the replay.
    let mut replay = original;
    replay.caller = CallerId::new("10.0.0.2");
    let err = h.service.submit(replay).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::POW_ERROR);
    assert_eq!(h.ethereum.transfers().len(), 1);
}

#[tokio::test]
async fn test_expired_challenge_is_rejected() {
    let h = harness(base_config(), 100 * WEI);
    let request = eth_request(&h, "10.0.0.3").await;
    h.clock.advance(Duration::from_secs(6 * 60));

    let err = h.service.submit(request).await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Pow(PowError::Expired | PowError::NotFound)
    ));
    assert!(h.ethereum.transfers().is_empty());
}

#[tokio::test]
async fn test_challenge_past_expiry_is_expired_even_if_still_stored() {
    let h = harness(base_config(), 100 * WEI);
    let request = eth_request(&h, "10.0.0.4").await;
    let key = keys::challenge(&request.challenge_id);
    let record = h.store.get_record(&key).await.unwrap().unwrap();
    // A store whose TTL outlives the challenge's own expiry.
    h.store
        .put_record(&key, record, Duration::from_secs(3600))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(6 * 60));

    let err = h.service.submit(request).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Pow(PowError::Expired)));
    assert_eq!(h.store.get_record(&key).await.unwrap(), None);
    assert!(h.ethereum.transfers().is_empty());
}

// =============================================================================
// GLOBAL CAPS AND RESERVE
// =============================================================================

#[tokio::test]
async fn test_hourly_distribution_cap_is_not_exceeded() {
    let h = harness(unit_config("10", "100"), 1_000);
    let network = NetworkId::new("ethereum");
    let eth = ResourceSymbol::new("ETH");
    let key = keys::distribution(&network, &eth, DistributionWindow::Hour, h.clock.now());
    h.store
        .increment_and_get(&key, 95, Duration::from_secs(3600))
        .await
        .unwrap();

    let request = eth_request(&h, "172.16.0.1").await;
    let err = h.service.submit(request.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::RateLimited(RateLimit::DistributionCap { .. })
    ));
    assert_eq!(h.store.get(&key).await.unwrap(), Some(95));
    assert!(h.ethereum.transfers().is_empty());

    // The challenge was consumed before the cap rejected the request.
    let err = h.service.submit(request).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Pow(PowError::NotFound)));
}

#[tokio::test]
async fn test_distribution_cap_reached_exactly() {
    let h = harness(unit_config("10", "100"), 1_000);
    let key = keys::distribution(
        &NetworkId::new("ethereum"),
        &ResourceSymbol::new("ETH"),
        DistributionWindow::Hour,
        h.clock.now(),
    );
    h.store
        .increment_and_get(&key, 90, Duration::from_secs(3600))
        .await
        .unwrap();

    let first = eth_request(&h, "172.16.0.2").await;
    h.service.submit(first).await.unwrap();
    assert_eq!(h.store.get(&key).await.unwrap(), Some(100));

    let second = eth_request(&h, "172.16.0.3").await;
    let err = h.service.submit(second).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::RATE_LIMITED);
    assert_eq!(h.store.get(&key).await.unwrap(), Some(100));
}

#[tokio::test]
async fn test_reserve_boundary_is_inclusive() {
    // 100 - 90 leaves exactly the 10% reserve.
    let h = harness(unit_config("90", "0"), 100);
    let request = eth_request(&h, "172.16.1.1").await;
    h.service.submit(request).await.unwrap();
    assert_eq!(h.ethereum.balance("ETH"), 10);
}

#[tokio::test]
async fn test_reserve_violation_is_rejected() {
    let h = harness(unit_config("91", "0"), 100);
    let request = eth_request(&h, "172.16.1.2").await;
    let err = h.service.submit(request.clone()).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::RESERVE_EXHAUSTED);
    assert!(!err.is_retryable());
    assert_eq!(h.ethereum.balance("ETH"), 100);

    let err = h.service.submit(request).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::POW_ERROR);
}

// =============================================================================
// MULTI-RESOURCE
// =============================================================================

#[tokio::test]
async fn test_both_resources_disbursed() {
    let h = harness(base_config(), 100 * WEI);
    let request = request_for(&h, "10.1.0.1", "starknet", "BOTH", STARKNET_RECIPIENT).await;
    let receipt = h.service.submit(request).await.unwrap();
    assert_eq!(receipt.disbursements.len(), 2);
    assert_eq!(receipt.message, "Both tokens sent successfully");
    assert!(receipt.failed.is_none());
    assert!(receipt.disbursements[1]
        .explorer_url
        .starts_with("https://sepolia.voyager.online/tx/0x"));

    let quota = h.service.quota(&CallerId::new("10.1.0.1")).await.unwrap();
    assert_eq!(quota.daily_limit.used, 2);
}

#[tokio::test]
async fn test_partial_success_charges_only_delivered_resource() {
    let h = harness(base_config(), 100 * WEI);
    h.starknet.revert_transfers_of("STRK");

    let request = request_for(&h, "10.1.0.2", "starknet", "both", STARKNET_RECIPIENT).await;
    let receipt = h.service.submit(request).await.unwrap();
    assert!(receipt.is_partial());
    assert_eq!(receipt.disbursements[0].resource, ResourceSymbol::new("ETH"));
    let failed = receipt.failed.as_ref().unwrap();
    assert_eq!(failed.resource, ResourceSymbol::new("STRK"));
    assert_eq!(failed.reason_code, codes::DISBURSEMENT_FAILED);

    let caller = CallerId::new("10.1.0.2");
    let quota = h.service.quota(&caller).await.unwrap();
    assert_eq!(quota.daily_limit.used, 1);
    let starknet = &quota.hourly_throttle_by_network[&NetworkId::new("starknet")];
    assert!(!starknet[&ResourceSymbol::new("ETH")].available);
    assert!(starknet[&ResourceSymbol::new("STRK")].available);
}

#[tokio::test]
async fn test_both_needs_two_daily_units() {
    let mut config = base_config();
    config.rate_limits.max_requests_per_day = 1;
    let h = harness(config, 100 * WEI);
    let request = request_for(&h, "10.1.0.3", "starknet", "BOTH", STARKNET_RECIPIENT).await;
    let err = h.service.submit(request).await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::RateLimited(RateLimit::DailyQuotaExceeded { .. })
    ));
    assert!(h.starknet.transfers().is_empty());
}

// =============================================================================
// DEGRADED COLLABORATORS
// =============================================================================

#[tokio::test]
async fn test_store_outage_is_service_unavailable() {
    let h = harness(base_config(), 100 * WEI);
    let request = eth_request(&h, "10.2.0.1").await;
    h.store.set_unavailable(true);

    let err = h.service.submit(request).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::SERVICE_UNAVAILABLE);
    assert!(err.is_retryable());
    assert!(h.service.health().await.is_err());
    assert!(h.ethereum.transfers().is_empty());

    h.store.set_unavailable(false);
    assert_eq!(h.service.health().await.unwrap().status, "ok");
}

#[tokio::test]
async fn test_transfer_rpc_failure_commits_nothing() {
    let h = harness(base_config(), 100 * WEI);
    h.ethereum.fail_transfers_of("ETH");
    let caller = CallerId::new("10.2.0.3");

    let request = eth_request(&h, caller.as_str()).await;
    let err = h.service.submit(request).await.unwrap_err();
    assert!(matches!(err, AdmissionError::CollaboratorUnavailable { .. }));
    assert!(err.is_retryable());

    let quota = h.service.quota(&caller).await.unwrap();
    assert_eq!(quota.daily_limit.used, 0);
    assert!(
        quota.hourly_throttle_by_network[&NetworkId::new("ethereum")][&ResourceSymbol::new("ETH")]
            .available
    );
    // Lease released: a retry reaches the chain again instead of being throttled.
    let retry = eth_request(&h, caller.as_str()).await;
    let err = h.service.submit(retry).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_transfer_is_disbursement_failure() {
    let mut config = base_config();
    config.timeouts.confirmation_secs = 1;
    config.timeouts.confirmation_poll_ms = 100;
    let h = harness(config, 100 * WEI);
    h.ethereum.set_pending_polls(u32::MAX);
    let caller = CallerId::new("10.2.0.4");

    let request = eth_request(&h, caller.as_str()).await;
    let err = h.service.submit(request).await.unwrap_err();
    match &err {
        AdmissionError::DisbursementFailed { tx, .. } => {
            assert_eq!(tx.as_ref(), Some(&h.ethereum.transfers()[0].tx));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(err.reason_code(), codes::DISBURSEMENT_FAILED);
    assert_eq!(h.service.quota(&caller).await.unwrap().daily_limit.used, 0);
}

#[tokio::test]
async fn test_unknown_network_lists_available() {
    let h = harness(base_config(), 100 * WEI);
    let mut request = eth_request(&h, "10.2.0.2").await;
    request.network = Some(NetworkId::new("solana"));
    let err = h.service.submit(request).await.unwrap_err();
    assert_eq!(err.reason_code(), codes::VALIDATION_ERROR);
    assert!(err.to_string().contains("ethereum"));
    assert!(err.to_string().contains("starknet"));
}

#[tokio::test]
async fn test_info_defaults_to_preferred_network() {
    let h = harness(base_config(), 100 * WEI);
    let info = h.service.info(None).await.unwrap();
    assert_eq!(info.network, NetworkId::new("starknet"));
    assert_eq!(info.available_networks.len(), 2);
    assert_eq!(info.daily_requests_per_caller, 5);
    assert_eq!(info.resources[&ResourceSymbol::new("STRK")].per_request, "10");
}
