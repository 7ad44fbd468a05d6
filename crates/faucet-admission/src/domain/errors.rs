//! # Domain Errors
//!
//! Admission taxonomy and the port errors it wraps.
//!
//! Every gate failure is classified into exactly one [`AdmissionError`] kind
//! before it leaves the crate. Port errors ([`CounterStoreError`],
//! [`ChainError`]) never surface raw.

use super::value_objects::{Amount, DistributionWindow, NetworkId, ResourceSymbol, TxReference};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable reason codes returned to callers.
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const POW_ERROR: &str = "POW_ERROR";
    pub const RESERVE_EXHAUSTED: &str = "RESERVE_EXHAUSTED";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const DISBURSEMENT_FAILED: &str = "DISBURSEMENT_FAILED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Top-level admission failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Malformed address, network or resource. Nothing consumed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A quota, throttle or distribution cap was hit.
    #[error("{0}")]
    RateLimited(#[from] RateLimit),

    /// Challenge missing, expired, consumed, or solution wrong.
    #[error("{0}")]
    Pow(#[from] PowError),

    /// Balance guard tripped: the faucet reserve is too low.
    #[error("[LOW BALANCE] Faucet {resource} balance on {network} too low to disburse {amount} (balance {balance}, reserve {required_reserve}). Please try again later.")]
    ReserveExhausted {
        /// Network of the faucet account.
        network: NetworkId,
        /// Resource that could not be disbursed.
        resource: ResourceSymbol,
        /// Balance read at decision time.
        balance: Amount,
        /// Amount that would have been sent.
        amount: Amount,
        /// Minimum balance that must remain.
        required_reserve: Amount,
    },

    /// Counter store or chain RPC unreachable. Callers should try again.
    #[error("[SERVICE UNAVAILABLE] {collaborator} failed during {operation}: {detail}. Please try again.")]
    CollaboratorUnavailable {
        /// Which collaborator failed.
        collaborator: Collaborator,
        /// Operation being attempted.
        operation: String,
        /// Underlying detail.
        detail: String,
    },

    /// Transfer submitted but not confirmed, or rejected on-chain.
    #[error("[DISBURSEMENT FAILED] {resource} on {network}: {reason}")]
    DisbursementFailed {
        /// Network of the transfer.
        network: NetworkId,
        /// Resource being transferred.
        resource: ResourceSymbol,
        /// Transaction reference, when the transfer got that far.
        tx: Option<TxReference>,
        /// Failure reason.
        reason: String,
    },

    /// Pipeline invariant violated (illegal lifecycle transition).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Wrap a counter store failure observed during `operation`.
    pub fn counter_store(operation: impl Into<String>, err: CounterStoreError) -> Self {
        Self::CollaboratorUnavailable {
            collaborator: Collaborator::CounterStore,
            operation: operation.into(),
            detail: err.to_string(),
        }
    }

    /// Stable machine-readable code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => codes::VALIDATION_ERROR,
            Self::RateLimited(_) => codes::RATE_LIMITED,
            Self::Pow(_) => codes::POW_ERROR,
            Self::ReserveExhausted { .. } => codes::RESERVE_EXHAUSTED,
            Self::CollaboratorUnavailable { .. } => codes::SERVICE_UNAVAILABLE,
            Self::DisbursementFailed { .. } => codes::DISBURSEMENT_FAILED,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Hint for when a retry may succeed.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(limit) => Some(limit.retry_after()),
            _ => None,
        }
    }

    /// Whether the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. })
    }

    /// Transport-agnostic rejection body.
    pub fn to_rejection(&self) -> Rejection {
        Rejection {
            reason_code: self.reason_code().to_string(),
            message: self.to_string(),
            retry_after_secs: self.retry_after().map(|d| d.as_secs().max(1)),
        }
    }
}

/// Caller-facing rejection shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// One of [`codes`].
    pub reason_code: String,
    /// Human-readable, actionable message.
    pub message: String,
    /// Seconds until a retry may succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Input validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Network not in the registry.
    #[error("unsupported network: {network} (available: {available})")]
    UnsupportedNetwork {
        /// Requested network.
        network: String,
        /// Comma-separated configured networks.
        available: String,
    },

    /// Address rejected by the network's rules.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Resource not offered on this network.
    #[error("invalid token: {resource} is not supported on {network}")]
    UnsupportedResource {
        /// Requested resource.
        resource: ResourceSymbol,
        /// Target network.
        network: NetworkId,
    },

    /// Selection expanded to nothing.
    #[error("no resources available on {0}")]
    EmptySelection(NetworkId),
}

/// Which rate-limit tier denied the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimit {
    /// Caller hit the daily cap and is cooling down.
    #[error("[DAILY LIMIT] You've used all {limit} daily requests. 24-hour cooldown: {} remaining.", fmt_dur(.remaining))]
    DailyCooldown {
        /// Daily cap.
        limit: u64,
        /// Time left on the cooldown marker.
        remaining: Duration,
    },

    /// Request would exceed the daily cap.
    #[error("[DAILY LIMIT] Request would exceed daily limit ({used}/{limit} used, {requested} requested). Wait for quota reset.")]
    DailyQuotaExceeded {
        /// Units already consumed today.
        used: u64,
        /// Daily cap.
        limit: u64,
        /// Units this request needs.
        requested: u64,
        /// Time until the UTC day rolls over.
        resets_in: Duration,
    },

    /// (caller, network, resource) throttled or already in flight.
    #[error("[HOURLY LIMIT] {resource} on {network}: 1 request per hour. Try again in {}.", fmt_dur(.retry_after))]
    ResourceThrottled {
        /// Target network.
        network: NetworkId,
        /// Throttled resource.
        resource: ResourceSymbol,
        /// Time until eligible.
        retry_after: Duration,
    },

    /// Global anti-drain cap reached.
    #[error("[FAUCET LIMIT] Faucet has temporarily reached its per-{window} distribution limit for {resource} on {network}. Please try again in {}.", fmt_dur(.retry_after))]
    DistributionCap {
        /// Target network.
        network: NetworkId,
        /// Capped resource.
        resource: ResourceSymbol,
        /// Window whose cap would be exceeded.
        window: DistributionWindow,
        /// Time until the window rolls over.
        retry_after: Duration,
    },

    /// Too many challenges requested this hour.
    #[error("[CHALLENGE LIMIT] Too many PoW challenge requests this hour (max {limit}). Try again in {}.", fmt_dur(.retry_after))]
    ChallengeIssuance {
        /// Hourly cap.
        limit: u64,
        /// Time until the hour rolls over.
        retry_after: Duration,
    },
}

impl RateLimit {
    /// Time until the limiting condition clears.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::DailyCooldown { remaining, .. } => *remaining,
            Self::DailyQuotaExceeded { resets_in, .. } => *resets_in,
            Self::ResourceThrottled { retry_after, .. }
            | Self::DistributionCap { retry_after, .. }
            | Self::ChallengeIssuance { retry_after, .. } => *retry_after,
        }
    }
}

/// Proof-of-work failures. The caller must fetch a new challenge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PowError {
    /// Unknown id, or already garbage-collected.
    #[error("Invalid or expired challenge")]
    NotFound,

    /// Challenge outlived its TTL.
    #[error("Challenge expired, request a new one")]
    Expired,

    /// Another submission consumed the challenge first.
    #[error("Challenge already used, request a new one")]
    AlreadyConsumed,

    /// Hash does not meet the difficulty target.
    #[error("Invalid proof of work solution")]
    InvalidSolution,
}

/// Collaborator identity for unavailability errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collaborator {
    /// Shared counter store.
    CounterStore,
    /// Chain RPC for a network.
    Chain(NetworkId),
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CounterStore => f.write_str("counter store"),
            Self::Chain(network) => write!(f, "{} RPC", network),
        }
    }
}

/// Counter store port errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterStoreError {
    /// Store unreachable or refused the command.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its deadline.
    #[error("counter store call timed out")]
    Timeout,

    /// Stored value could not be decoded.
    #[error("corrupt value at {key}: {detail}")]
    Corrupt {
        /// Offending key.
        key: String,
        /// Decode failure.
        detail: String,
    },
}

/// Chain client port errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Address does not match the network's format.
    #[error("{0}")]
    InvalidAddress(String),

    /// Resource not handled by this chain client.
    #[error("unsupported token: {0}")]
    UnsupportedResource(ResourceSymbol),

    /// RPC transport or node error.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// RPC call exceeded its deadline.
    #[error("rpc call timed out")]
    Timeout,

    /// Transaction reverted or was dropped.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Transaction not confirmed before the deadline.
    #[error("transaction {0} not confirmed before deadline")]
    ConfirmationTimeout(TxReference),
}

/// Pipeline gate that observed a chain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainGate {
    /// Address/resource validation.
    Validation,
    /// Faucet balance read.
    Balance,
    /// Transfer submission.
    Transfer,
    /// Confirmation wait.
    Confirmation,
}

impl ChainGate {
    fn operation(&self) -> &'static str {
        match self {
            Self::Validation => "address validation",
            Self::Balance => "balance read",
            Self::Transfer => "transfer submission",
            Self::Confirmation => "confirmation wait",
        }
    }
}

/// Classify a chain error according to the gate that observed it.
pub fn classify_chain_error(
    network: &NetworkId,
    resource: Option<&ResourceSymbol>,
    gate: ChainGate,
    tx: Option<&TxReference>,
    err: ChainError,
) -> AdmissionError {
    match err {
        ChainError::InvalidAddress(reason) => ValidationError::InvalidAddress(reason).into(),
        ChainError::UnsupportedResource(symbol) => ValidationError::UnsupportedResource {
            resource: symbol,
            network: network.clone(),
        }
        .into(),
        ChainError::TransactionFailed(reason) => AdmissionError::DisbursementFailed {
            network: network.clone(),
            resource: resource.cloned().unwrap_or_else(|| ResourceSymbol::new("?")),
            tx: tx.cloned(),
            reason,
        },
        ChainError::ConfirmationTimeout(pending) => AdmissionError::DisbursementFailed {
            network: network.clone(),
            resource: resource.cloned().unwrap_or_else(|| ResourceSymbol::new("?")),
            reason: format!("transaction {} not confirmed in time", pending),
            tx: Some(pending),
        },
        // A submitted transfer whose confirmation poll fails is a disbursement failure,
        // not an outage: the funds may already be in flight.
        failure @ (ChainError::Rpc(_) | ChainError::Timeout)
            if gate == ChainGate::Confirmation && tx.is_some() =>
        {
            AdmissionError::DisbursementFailed {
                network: network.clone(),
                resource: resource.cloned().unwrap_or_else(|| ResourceSymbol::new("?")),
                tx: tx.cloned(),
                reason: format!("confirmation failed: {}", failure),
            }
        }
        other => AdmissionError::CollaboratorUnavailable {
            collaborator: Collaborator::Chain(network.clone()),
            operation: gate.operation().to_string(),
            detail: other.to_string(),
        },
    }
}

fn fmt_dur(duration: &Duration) -> String {
    format_duration(*duration)
}

/// Render a duration the way the CLI shows cooldowns: `"3h 12m"` or `"12m"`.
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.as_secs().div_ceil(60);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth() -> ResourceSymbol {
        ResourceSymbol::new("ETH")
    }

    fn ethereum() -> NetworkId {
        NetworkId::new("ethereum")
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 12 * 60)), "3h 12m");
        assert_eq!(format_duration(Duration::from_secs(59)), "1m");
        assert_eq!(format_duration(Duration::from_secs(0)), "0m");
    }

    #[test]
    fn test_reason_codes_are_distinct_per_kind() {
        let limited: AdmissionError = RateLimit::ChallengeIssuance {
            limit: 10,
            retry_after: Duration::from_secs(60),
        }
        .into();
        let reserve = AdmissionError::ReserveExhausted {
            network: ethereum(),
            resource: eth(),
            balance: 100,
            amount: 10,
            required_reserve: 95,
        };
        assert_eq!(limited.reason_code(), codes::RATE_LIMITED);
        assert_eq!(reserve.reason_code(), codes::RESERVE_EXHAUSTED);
        assert_ne!(limited.reason_code(), reserve.reason_code());
    }

    #[test]
    fn test_rate_limited_rejection_carries_retry_after() {
        let err: AdmissionError = RateLimit::DailyCooldown {
            limit: 5,
            remaining: Duration::from_secs(7200),
        }
        .into();
        let rejection = err.to_rejection();
        assert_eq!(rejection.retry_after_secs, Some(7200));
        assert!(rejection.message.contains("2h 0m"));
    }

    #[test]
    fn test_pow_rejection_has_no_retry_after() {
        let err: AdmissionError = PowError::Expired.into();
        assert_eq!(err.to_rejection().retry_after_secs, None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_counter_store_failure_is_retryable() {
        let err = AdmissionError::counter_store(
            "daily quota check",
            CounterStoreError::Unavailable("connection refused".into()),
        );
        assert!(err.is_retryable());
        assert_eq!(err.reason_code(), codes::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("daily quota check"));
    }

    #[test]
    fn test_classify_invalid_address_as_validation() {
        let err = classify_chain_error(
            &ethereum(),
            None,
            ChainGate::Validation,
            None,
            ChainError::InvalidAddress("bad".into()),
        );
        assert!(matches!(err, AdmissionError::Validation(ValidationError::InvalidAddress(_))));
    }

    #[test]
    fn test_classify_rpc_on_balance_as_unavailable() {
        let err = classify_chain_error(
            &ethereum(),
            Some(&eth()),
            ChainGate::Balance,
            None,
            ChainError::Rpc("503".into()),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_rpc_on_confirmation_as_disbursement_failure() {
        let tx = TxReference::new("0xabc");
        let err = classify_chain_error(
            &ethereum(),
            Some(&eth()),
            ChainGate::Confirmation,
            Some(&tx),
            ChainError::Timeout,
        );
        assert!(matches!(
            err,
            AdmissionError::DisbursementFailed { tx: Some(_), .. }
        ));
    }

    #[test]
    fn test_classify_reverted_transfer() {
        let tx = TxReference::new("0xdead");
        let err = classify_chain_error(
            &ethereum(),
            Some(&eth()),
            ChainGate::Confirmation,
            Some(&tx),
            ChainError::TransactionFailed("status 0".into()),
        );
        assert_eq!(err.reason_code(), codes::DISBURSEMENT_FAILED);
    }
}
