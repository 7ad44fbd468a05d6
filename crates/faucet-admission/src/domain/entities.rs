//! # Domain Entities
//!
//! Challenges, admission requests and the caller-facing response shapes.

use super::errors::AdmissionError;
use super::value_objects::{
    Amount, CallerId, NetworkId, ResourceSelection, ResourceSymbol, Timestamp, TxReference,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Proof-of-work puzzle.
///
/// Stored in the counter store under `challenge:{id}` for its TTL and deleted
/// when a solution is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Opaque unique id (UUID v4).
    pub id: String,
    /// Random seed material, hex encoded on the wire.
    #[serde(with = "hex_seed")]
    pub seed: [u8; 32],
    /// Required leading zero bits.
    pub difficulty: u8,
    /// Creation time.
    pub created_at: Timestamp,
    /// Expiry time.
    pub expires_at: Timestamp,
}

impl Challenge {
    /// Whether the challenge has outlived its TTL.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Caller-facing view.
    pub fn to_response(&self) -> ChallengeResponse {
        ChallengeResponse {
            challenge_id: self.id.clone(),
            puzzle_seed: hex::encode(self.seed),
            difficulty: self.difficulty,
            expires_at: self.expires_at,
        }
    }
}

mod hex_seed {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(seed: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(seed))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(&raw).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("seed must be 32 bytes"))
    }
}

/// Issue-challenge response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Id to echo back on submission.
    pub challenge_id: String,
    /// Hex seed to hash with the nonce.
    pub puzzle_seed: String,
    /// Required leading zero bits.
    pub difficulty: u8,
    /// Unix seconds after which the challenge is void.
    pub expires_at: Timestamp,
}

/// One admission attempt. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    /// Caller identity (implicit from the transport).
    pub caller: CallerId,
    /// Target network; `None` selects the default network.
    pub network: Option<NetworkId>,
    /// Resource or "both".
    pub resources: ResourceSelection,
    /// Recipient address.
    pub recipient: String,
    /// Challenge being answered.
    pub challenge_id: String,
    /// Proposed nonce.
    pub solution: i64,
}

impl AdmissionRequest {
    /// Build a request from the caller-facing string form of the resource.
    pub fn new(
        caller: CallerId,
        network: Option<NetworkId>,
        resource: &str,
        recipient: impl Into<String>,
        challenge_id: impl Into<String>,
        solution: i64,
    ) -> Self {
        Self {
            caller,
            network,
            resources: ResourceSelection::parse(resource),
            recipient: recipient.into(),
            challenge_id: challenge_id.into(),
            solution,
        }
    }
}

/// One completed transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disbursement {
    /// Resource sent.
    pub resource: ResourceSymbol,
    /// Amount in base units.
    pub amount: Amount,
    /// Configured drip amount as shown to users ("0.01").
    pub display_amount: String,
    /// Transaction hash.
    pub tx_reference: TxReference,
    /// Block explorer link.
    pub explorer_url: String,
}

/// The resource that stopped a multi-resource request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedResource {
    /// Resource that failed.
    pub resource: ResourceSymbol,
    /// Reason code of the failure.
    pub reason_code: String,
    /// Human-readable failure.
    pub message: String,
}

impl FailedResource {
    /// Summarise an error for a resource.
    pub fn from_error(resource: ResourceSymbol, err: &AdmissionError) -> Self {
        Self {
            resource,
            reason_code: err.reason_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Successful (possibly partial) admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionReceipt {
    /// Network disbursed on.
    pub network: NetworkId,
    /// Transfers that completed, in request order.
    pub disbursements: Vec<Disbursement>,
    /// First resource that failed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailedResource>,
    /// Summary line.
    pub message: String,
}

impl AdmissionReceipt {
    /// Whether some requested resource was not delivered.
    pub fn is_partial(&self) -> bool {
        self.failed.is_some()
    }
}

/// Status query response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Normalised address queried.
    pub address: String,
    /// Whether the caller can request right now.
    pub eligible: bool,
    /// Remaining cooldown in seconds, when cooling down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
}

/// Daily quota view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuotaView {
    /// Daily cap.
    pub total: u64,
    /// Units consumed today.
    pub used: u64,
    /// Units left today (0 while cooling down).
    pub remaining: u64,
    /// Cooldown end, unix seconds.
    pub cooldown_end: Option<Timestamp>,
    /// Whether a cooldown marker is present.
    pub in_cooldown: bool,
}

/// Throttle view for one (network, resource).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleView {
    /// Whether the resource can be requested now.
    pub available: bool,
    /// When the throttle lifts, unix seconds.
    pub next_request_at: Option<Timestamp>,
}

/// Quota query response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaResponse {
    /// Daily quota (global across networks).
    pub daily_limit: DailyQuotaView,
    /// network -> resource -> throttle.
    pub hourly_throttle_by_network: BTreeMap<NetworkId, BTreeMap<ResourceSymbol, ThrottleView>>,
}

/// Per-resource limits advertised by the info query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Drip amount per request.
    pub per_request: String,
    /// Faucet balance, formatted.
    pub faucet_balance: String,
}

/// Info query response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    /// Network described.
    pub network: NetworkId,
    /// Per-resource drip and balance.
    pub resources: BTreeMap<ResourceSymbol, ResourceInfo>,
    /// Daily requests per caller.
    pub daily_requests_per_caller: u64,
    /// Throttle window in hours.
    pub resource_throttle_hours: u64,
    /// Whether PoW is enforced (false only on test deployments).
    pub pow_enforced: bool,
    /// Difficulty in leading zero bits.
    pub pow_difficulty: u8,
    /// Every configured network.
    pub available_networks: Vec<NetworkId>,
}

/// Health check response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when returned.
    pub status: String,
    /// Probe time.
    pub timestamp: Timestamp,
}
