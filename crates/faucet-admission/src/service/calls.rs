//! Deadline-bounded collaborator calls.
//!
//! Every counter store and chain call goes through one of these so a stalled
//! collaborator becomes `CollaboratorUnavailable` instead of a hung request.

use crate::domain::{
    classify_chain_error, AdmissionError, ChainError, ChainGate, CounterStoreError, NetworkId,
    ResourceSymbol, TxReference,
};
use std::future::Future;
use std::time::Duration;
use tracing::error;

/// Run a counter store call under `deadline`.
pub(crate) async fn store_call<T, F>(
    deadline: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, AdmissionError>
where
    F: Future<Output = Result<T, CounterStoreError>>,
{
    let outcome = match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(CounterStoreError::Timeout),
    };
    outcome.map_err(|err| {
        error!(operation, error = %err, "[faucet] Counter store call failed");
        AdmissionError::counter_store(operation, err)
    })
}

/// Where a chain call happened, for error classification.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ChainSite<'a> {
    pub network: &'a NetworkId,
    pub resource: Option<&'a ResourceSymbol>,
    pub gate: ChainGate,
    pub tx: Option<&'a TxReference>,
}

/// Run a chain call under `deadline`, classifying any failure by gate.
pub(crate) async fn chain_call<T, F>(
    deadline: Duration,
    site: ChainSite<'_>,
    call: F,
) -> Result<T, AdmissionError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    let outcome = match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout),
    };
    outcome.map_err(|err| {
        let classified =
            classify_chain_error(site.network, site.resource, site.gate, site.tx, err);
        if classified.is_retryable() {
            error!(
                network = %site.network,
                gate = ?site.gate,
                error = %classified,
                "[faucet] Chain call failed"
            );
        }
        classified
    })
}
