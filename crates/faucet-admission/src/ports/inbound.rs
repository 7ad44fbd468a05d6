//! # Inbound Ports
//!
//! API trait defining what the admission service offers a transport.

use crate::domain::{
    AdmissionError, AdmissionReceipt, AdmissionRequest, CallerId, ChallengeResponse,
    HealthResponse, InfoResponse, NetworkId, QuotaResponse, StatusResponse,
};
use async_trait::async_trait;

/// Faucet admission API - inbound port.
#[async_trait]
pub trait AdmissionApi: Send + Sync {
    /// Issue a PoW challenge, subject to the per-caller hourly issuance limit.
    async fn issue_challenge(&self, caller: &CallerId)
        -> Result<ChallengeResponse, AdmissionError>;

    /// Run the full admission pipeline and disburse on success.
    async fn submit(&self, request: AdmissionRequest) -> Result<AdmissionReceipt, AdmissionError>;

    /// Whether the caller may request now. `network = None` selects the default.
    async fn status(
        &self,
        caller: &CallerId,
        network: Option<&NetworkId>,
        address: &str,
    ) -> Result<StatusResponse, AdmissionError>;

    /// Daily quota and per-network throttle state for the caller.
    async fn quota(&self, caller: &CallerId) -> Result<QuotaResponse, AdmissionError>;

    /// Drip amounts, balances and limits for a network.
    async fn info(&self, network: Option<&NetworkId>) -> Result<InfoResponse, AdmissionError>;

    /// Counter store liveness.
    async fn health(&self) -> Result<HealthResponse, AdmissionError>;
}
