//! # Admission Coordinator
//!
//! Composes validation, rate limiting, PoW verification, the distribution cap,
//! the balance guard and the transfer into one admit/deny decision.
//!
//! ## Gate Order
//!
//! ```text
//! Received ─► Validated ─► RateChecked ─► PowVerified ─┬─► BalanceChecked ─► Authorized ─► Disbursed
//!                                                      └──────────── per resource ◄───────────┘
//! ```
//!
//! Cheap checks run first, then shared-state checks, then challenge
//! consumption, then the external transfer. A consumed challenge stays
//! consumed whatever happens afterwards.

use super::calls::{chain_call, store_call, ChainSite};
use super::rate_limiter::{DistributionCaps, RateLimiter, ThrottleLease};
use crate::adapters::ChainRegistry;
use crate::algorithms::{keys, BalanceSnapshot, ChallengeEngine};
use crate::config::{ConfigError, FaucetConfig, ResourceAmounts};
use crate::domain::{
    format_units, AdmissionError, AdmissionLifecycle, AdmissionReceipt, AdmissionRequest,
    AdmissionStage, CallerId, Challenge, ChallengeResponse, ChainGate, CounterStoreError,
    Disbursement, FailedResource, HealthResponse, InfoResponse, NetworkId, PowError,
    QuotaResponse, ResourceInfo, ResourceSelection, ResourceSymbol, StatusResponse,
    ValidationError,
};
use crate::ports::inbound::AdmissionApi;
use crate::ports::outbound::{ChainClient, CounterStore, TimeSource};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One resource of a validated request.
#[derive(Clone, Debug)]
struct PlannedResource {
    symbol: ResourceSymbol,
    amounts: ResourceAmounts,
    display_amount: String,
}

/// Output of the validation gate.
struct ValidatedRequest {
    network: NetworkId,
    client: Arc<dyn ChainClient>,
    recipient: String,
    min_reserve_pct: u8,
    resources: Vec<PlannedResource>,
}

/// Faucet admission service.
///
/// Holds no limit state of its own; share it behind an `Arc`.
pub struct AdmissionService {
    config: FaucetConfig,
    registry: ChainRegistry,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn TimeSource>,
    engine: ChallengeEngine,
    limiter: RateLimiter,
}

impl AdmissionService {
    /// Build a service. Fails if `config` does not validate.
    pub fn new(
        config: FaucetConfig,
        registry: ChainRegistry,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = match &config.default_network {
            Some(network) => registry.with_default(network.clone()),
            None => registry,
        };
        let engine = ChallengeEngine::new(
            config.pow.difficulty,
            config.pow.challenge_ttl(),
            config.deployment,
        );
        let limiter = RateLimiter::new(
            store.clone(),
            clock.clone(),
            config.rate_limits.clone(),
            config.timeouts.collaborator(),
        );
        info!(
            networks = ?registry.networks(),
            difficulty = config.pow.difficulty,
            deployment = ?config.deployment,
            "[faucet] Admission service ready"
        );
        Ok(Self {
            config,
            registry,
            store,
            clock,
            engine,
            limiter,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &FaucetConfig {
        &self.config
    }

    /// Chain registry.
    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// Challenge engine.
    pub fn engine(&self) -> &ChallengeEngine {
        &self.engine
    }

    /// Rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn call_timeout(&self) -> Duration {
        self.config.timeouts.collaborator()
    }

    // =========================================================================
    // GATE: VALIDATION
    // =========================================================================

    fn validate(&self, request: &AdmissionRequest) -> Result<ValidatedRequest, AdmissionError> {
        let (network, client) = self.registry.resolve(request.network.as_ref())?;
        let network_config = self.config.networks.get(&network).ok_or_else(|| {
            ValidationError::UnsupportedNetwork {
                network: network.to_string(),
                available: self
                    .config
                    .networks
                    .keys()
                    .map(NetworkId::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })?;

        let supported = client.supported_resources();
        let symbols = match &request.resources {
            ResourceSelection::Single(symbol) => {
                if !supported.contains(symbol) || !network_config.resources.contains_key(symbol) {
                    return Err(ValidationError::UnsupportedResource {
                        resource: symbol.clone(),
                        network: network.clone(),
                    }
                    .into());
                }
                vec![symbol.clone()]
            }
            ResourceSelection::All => request
                .resources
                .expand(&supported)
                .into_iter()
                .filter(|symbol| network_config.resources.contains_key(symbol))
                .collect(),
        };
        if symbols.is_empty() {
            return Err(ValidationError::EmptySelection(network).into());
        }

        let mut resources = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let resource_config = network_config.resources.get(&symbol).ok_or_else(|| {
                ValidationError::UnsupportedResource {
                    resource: symbol.clone(),
                    network: network.clone(),
                }
            })?;
            let amounts = resource_config
                .amounts()
                .map_err(|reason| AdmissionError::Internal(format!("{}: {}", symbol, reason)))?;
            resources.push(PlannedResource {
                symbol,
                amounts,
                display_amount: resource_config.drip_amount.clone(),
            });
        }

        client
            .validate_address(&request.recipient)
            .map_err(|err| {
                crate::domain::classify_chain_error(&network, None, ChainGate::Validation, None, err)
            })?;
        let recipient = client.normalize_address(&request.recipient);

        Ok(ValidatedRequest {
            min_reserve_pct: network_config.min_balance_protect_pct,
            network,
            client,
            recipient,
            resources,
        })
    }

    // =========================================================================
    // GATE: RATE LIMITS
    // =========================================================================

    async fn check_rate_limits(
        &self,
        caller: &CallerId,
        validated: &ValidatedRequest,
    ) -> Result<Vec<ThrottleLease>, AdmissionError> {
        let units = validated.resources.len() as u64;
        self.limiter.check_daily(caller, units).await?;

        let mut leases = Vec::with_capacity(validated.resources.len());
        for resource in &validated.resources {
            match self
                .limiter
                .acquire_throttle(caller, &validated.network, &resource.symbol)
                .await
            {
                Ok(lease) => leases.push(lease),
                Err(err) => {
                    self.release_leases(&leases).await;
                    return Err(err);
                }
            }
        }
        Ok(leases)
    }

    async fn release_leases(&self, leases: &[ThrottleLease]) {
        for lease in leases {
            if let Err(err) = self.limiter.release_throttle(lease).await {
                // The lease TTL bounds how long a failed release blocks the caller.
                warn!(
                    caller = %lease.caller,
                    resource = %lease.resource,
                    error = %err,
                    "[faucet] Failed to release throttle lease"
                );
            }
        }
    }

    // =========================================================================
    // GATE: PROOF OF WORK
    // =========================================================================

    async fn consume_challenge(
        &self,
        challenge_id: &str,
        solution: i64,
    ) -> Result<(), AdmissionError> {
        if challenge_id.is_empty() {
            return Err(PowError::NotFound.into());
        }
        let key = keys::challenge(challenge_id);
        let raw = store_call(self.call_timeout(), "challenge load", self.store.get_record(&key))
            .await?
            .ok_or(PowError::NotFound)?;
        let challenge: Challenge = serde_json::from_slice(&raw).map_err(|e| {
            AdmissionError::counter_store(
                "challenge load",
                CounterStoreError::Corrupt {
                    key: key.clone(),
                    detail: e.to_string(),
                },
            )
        })?;

        if challenge.is_expired(self.clock.now()) {
            store_call(self.call_timeout(), "challenge expiry", self.store.delete(&key)).await?;
            return Err(PowError::Expired.into());
        }

        if !self.engine.verify(&challenge, solution) {
            return Err(PowError::InvalidSolution.into());
        }
        if self.engine.is_bypass(solution) {
            warn!(challenge_id, "[faucet] PoW bypass used on test deployment");
        }

        // The delete is the claim: only the caller whose delete removes the key proceeds.
        let claimed =
            store_call(self.call_timeout(), "challenge consume", self.store.delete(&key)).await?;
        if !claimed {
            return Err(PowError::AlreadyConsumed.into());
        }
        debug!(challenge_id, "[faucet] Challenge consumed");
        Ok(())
    }

    // =========================================================================
    // PER-RESOURCE DISBURSEMENT
    // =========================================================================

    async fn disburse(
        &self,
        validated: &ValidatedRequest,
        resource: &PlannedResource,
        lease: &ThrottleLease,
        lifecycle: &mut AdmissionLifecycle,
    ) -> Result<Disbursement, AdmissionError> {
        let network = &validated.network;
        let client = &validated.client;
        let symbol = &resource.symbol;
        let amount = resource.amounts.drip;

        self.limiter
            .reserve_distribution(
                network,
                symbol,
                amount,
                DistributionCaps {
                    per_hour: resource.amounts.max_per_hour,
                    per_day: resource.amounts.max_per_day,
                },
            )
            .await?;

        let faucet = client.faucet_address();
        let balance = chain_call(
            self.call_timeout(),
            ChainSite {
                network,
                resource: Some(symbol),
                gate: ChainGate::Balance,
                tx: None,
            },
            client.get_balance(&faucet, symbol),
        )
        .await?;
        BalanceSnapshot {
            network: network.clone(),
            resource: symbol.clone(),
            balance,
            min_reserve_pct: validated.min_reserve_pct,
        }
        .evaluate(amount)?;
        lifecycle.advance(AdmissionStage::BalanceChecked)?;

        self.limiter.hold_throttle(lease).await?;
        lifecycle.advance(AdmissionStage::Authorized)?;
        info!(
            network = %network,
            resource = %symbol,
            recipient = %validated.recipient,
            amount = %resource.display_amount,
            "[faucet] Transferring"
        );
        let tx = chain_call(
            self.call_timeout(),
            ChainSite {
                network,
                resource: Some(symbol),
                gate: ChainGate::Transfer,
                tx: None,
            },
            client.transfer(&validated.recipient, symbol, amount),
        )
        .await?;

        let timeouts = &self.config.timeouts;
        if timeouts.await_confirmation {
            chain_call(
                timeouts.confirmation() + self.call_timeout(),
                ChainSite {
                    network,
                    resource: Some(symbol),
                    gate: ChainGate::Confirmation,
                    tx: Some(&tx),
                },
                client.await_confirmation(
                    &tx,
                    timeouts.confirmation(),
                    timeouts.confirmation_poll(),
                ),
            )
            .await?;
        }
        lifecycle.advance(AdmissionStage::Disbursed)?;

        info!(
            network = %network,
            resource = %symbol,
            tx = %tx,
            "[faucet] Disbursed"
        );
        Ok(Disbursement {
            resource: symbol.clone(),
            amount,
            display_amount: resource.display_amount.clone(),
            explorer_url: client.explorer_link(&tx),
            tx_reference: tx,
        })
    }

    /// Record consumption for a delivered resource.
    ///
    /// Failures are logged, not surfaced: the transfer already happened.
    async fn commit_consumption(&self, caller: &CallerId, lease: &ThrottleLease) {
        if let Err(err) = self.limiter.commit_throttle(lease).await {
            error!(
                caller = %caller,
                resource = %lease.resource,
                error = %err,
                "[faucet] Failed to commit throttle after disbursement"
            );
        }
        if let Err(err) = self.limiter.commit_daily(caller, 1).await {
            error!(
                caller = %caller,
                error = %err,
                "[faucet] Failed to commit daily quota after disbursement"
            );
        }
    }

    async fn run_pipeline(
        &self,
        request: &AdmissionRequest,
        lifecycle: &mut AdmissionLifecycle,
    ) -> Result<AdmissionReceipt, AdmissionError> {
        let validated = self.validate(request)?;
        lifecycle.advance(AdmissionStage::Validated)?;
        debug!(
            caller = %request.caller,
            network = %validated.network,
            resources = validated.resources.len(),
            "[faucet] Request validated"
        );

        let leases = self.check_rate_limits(&request.caller, &validated).await?;
        lifecycle.advance(AdmissionStage::RateChecked)?;

        if let Err(err) = self
            .consume_challenge(&request.challenge_id, request.solution)
            .await
        {
            self.release_leases(&leases).await;
            return Err(err);
        }
        lifecycle.advance(AdmissionStage::PowVerified)?;

        let mut disbursements = Vec::new();
        let mut failure: Option<(ResourceSymbol, AdmissionError)> = None;
        for (index, (resource, lease)) in validated.resources.iter().zip(&leases).enumerate() {
            match self.disburse(&validated, resource, lease, lifecycle).await {
                Ok(disbursement) => {
                    self.commit_consumption(&request.caller, lease).await;
                    disbursements.push(disbursement);
                }
                Err(err) => {
                    warn!(
                        caller = %request.caller,
                        network = %validated.network,
                        resource = %resource.symbol,
                        reason = err.reason_code(),
                        "[faucet] Resource not disbursed"
                    );
                    self.release_leases(&leases[index..]).await;
                    failure = Some((resource.symbol.clone(), err));
                    break;
                }
            }
        }

        match (disbursements.is_empty(), failure) {
            (true, Some((_, err))) => Err(err),
            (true, None) => Err(AdmissionError::Internal(
                "no resources were processed".to_string(),
            )),
            (false, failure) => {
                let failed = failure
                    .as_ref()
                    .map(|(symbol, err)| FailedResource::from_error(symbol.clone(), err));
                let message = match (&failed, disbursements.len()) {
                    (None, 1) => "Tokens sent successfully".to_string(),
                    (None, 2) => "Both tokens sent successfully".to_string(),
                    (None, n) => format!("All {} tokens sent successfully", n),
                    (Some(failed), _) => format!(
                        "Sent {} token(s) successfully, but {} failed: {}",
                        disbursements.len(),
                        failed.resource,
                        failed.message
                    ),
                };
                Ok(AdmissionReceipt {
                    network: validated.network,
                    disbursements,
                    failed,
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl AdmissionApi for AdmissionService {
    async fn issue_challenge(
        &self,
        caller: &CallerId,
    ) -> Result<ChallengeResponse, AdmissionError> {
        self.limiter.check_challenge_issuance(caller).await?;

        let challenge = self.engine.issue(self.clock.now());
        let record = serde_json::to_vec(&challenge)
            .map_err(|e| AdmissionError::Internal(format!("challenge encoding: {}", e)))?;
        store_call(
            self.call_timeout(),
            "challenge store",
            self.store.put_record(
                &keys::challenge(&challenge.id),
                record,
                self.engine.ttl(),
            ),
        )
        .await?;
        let issued = self.limiter.record_challenge_issuance(caller).await?;

        info!(
            caller = %caller,
            challenge_id = %challenge.id,
            difficulty = challenge.difficulty,
            issued_this_hour = issued,
            "[faucet] Challenge issued"
        );
        Ok(challenge.to_response())
    }

    async fn submit(&self, request: AdmissionRequest) -> Result<AdmissionReceipt, AdmissionError> {
        let mut lifecycle = AdmissionLifecycle::new();
        let outcome = self.run_pipeline(&request, &mut lifecycle).await;
        match &outcome {
            Ok(receipt) => info!(
                caller = %request.caller,
                network = %receipt.network,
                disbursed = receipt.disbursements.len(),
                partial = receipt.is_partial(),
                "[faucet] Request admitted"
            ),
            Err(err) => {
                let stage = lifecycle.stage();
                lifecycle.reject();
                if err.is_retryable() {
                    error!(
                        caller = %request.caller,
                        stage = ?stage,
                        error = %err,
                        "[faucet] Request failed on collaborator"
                    );
                } else {
                    warn!(
                        caller = %request.caller,
                        stage = ?stage,
                        reason = err.reason_code(),
                        "[faucet] Request rejected"
                    );
                }
            }
        }
        outcome
    }

    async fn status(
        &self,
        caller: &CallerId,
        network: Option<&NetworkId>,
        address: &str,
    ) -> Result<StatusResponse, AdmissionError> {
        let (network, client) = self.registry.resolve(network)?;
        client.validate_address(address).map_err(|err| {
            crate::domain::classify_chain_error(&network, None, ChainGate::Validation, None, err)
        })?;

        let now = self.clock.now();
        let quota = self.limiter.daily_status(caller).await?;
        debug!(
            caller = %caller,
            network = %network,
            used = quota.used,
            "[faucet] Status check"
        );
        Ok(StatusResponse {
            address: client.normalize_address(address),
            eligible: quota.allowed,
            cooldown_remaining_secs: quota.cooldown_until.map(|end| end.saturating_sub(now)),
        })
    }

    async fn quota(&self, caller: &CallerId) -> Result<QuotaResponse, AdmissionError> {
        let now = self.clock.now();
        let daily = self.limiter.daily_status(caller).await?;

        let mut by_network = BTreeMap::new();
        for network in self.registry.networks() {
            let Some(client) = self.registry.get(&network) else {
                continue;
            };
            let mut throttles = BTreeMap::new();
            for resource in client.supported_resources() {
                let view = self
                    .limiter
                    .throttle_status(caller, &network, &resource)
                    .await?;
                throttles.insert(resource, view);
            }
            by_network.insert(network, throttles);
        }

        Ok(QuotaResponse {
            daily_limit: daily.to_view(now),
            hourly_throttle_by_network: by_network,
        })
    }

    async fn info(&self, network: Option<&NetworkId>) -> Result<InfoResponse, AdmissionError> {
        let (network, client) = self.registry.resolve(network)?;
        let faucet = client.faucet_address();

        let mut resources = BTreeMap::new();
        for symbol in client.supported_resources() {
            let Some(resource_config) = self.config.resource(&network, &symbol) else {
                continue;
            };
            let balance = chain_call(
                self.call_timeout(),
                ChainSite {
                    network: &network,
                    resource: Some(&symbol),
                    gate: ChainGate::Balance,
                    tx: None,
                },
                client.get_balance(&faucet, &symbol),
            )
            .await;
            let faucet_balance = match balance {
                Ok(balance) => format_units(balance, resource_config.decimals, 4),
                Err(err) => {
                    warn!(
                        network = %network,
                        resource = %symbol,
                        error = %err,
                        "[faucet] Balance unavailable for info"
                    );
                    "0".to_string()
                }
            };
            resources.insert(
                symbol,
                ResourceInfo {
                    per_request: resource_config.drip_amount.clone(),
                    faucet_balance,
                },
            );
        }

        let limits = self.limiter.limits();
        Ok(InfoResponse {
            network,
            resources,
            daily_requests_per_caller: limits.max_requests_per_day,
            resource_throttle_hours: limits.throttle_secs / keys::HOUR_SECS,
            pow_enforced: !self.engine.mode().allows_pow_bypass(),
            pow_difficulty: self.engine.difficulty(),
            available_networks: self.registry.networks(),
        })
    }

    async fn health(&self) -> Result<HealthResponse, AdmissionError> {
        store_call(self.call_timeout(), "health ping", self.store.ping()).await?;
        Ok(HealthResponse {
            status: "ok".to_string(),
            timestamp: self.clock.now(),
        })
    }
}
