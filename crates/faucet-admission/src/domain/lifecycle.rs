//! # Admission Lifecycle
//!
//! Per-request state machine. Stages only move forward; any non-terminal
//! stage may drop to `Rejected`.

use super::errors::AdmissionError;
use serde::{Deserialize, Serialize};

/// Stage of one admission attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionStage {
    /// Request accepted for processing.
    #[default]
    Received,
    /// Network, resources and address checked.
    Validated,
    /// Daily quota and throttle leases granted.
    RateChecked,
    /// Challenge verified and consumed.
    PowVerified,
    /// Distribution reservation and balance guard passed for a resource.
    BalanceChecked,
    /// Transfer about to be submitted.
    Authorized,
    /// At least one transfer confirmed.
    Disbursed,
    /// Request denied.
    Rejected,
}

impl AdmissionStage {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: AdmissionStage) -> bool {
        match (self, next) {
            (Self::Received, Self::Validated) => true,
            (Self::Validated, Self::RateChecked) => true,
            (Self::RateChecked, Self::PowVerified) => true,
            (Self::PowVerified, Self::BalanceChecked) => true,
            (Self::BalanceChecked, Self::Authorized) => true,
            (Self::Authorized, Self::Disbursed) => true,
            // Next resource of a multi-resource request
            (Self::Disbursed, Self::BalanceChecked) => true,
            (from, Self::Rejected) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Tracks one request through [`AdmissionStage`]s.
#[derive(Clone, Debug, Default)]
pub struct AdmissionLifecycle {
    stage: AdmissionStage,
    history: Vec<AdmissionStage>,
}

impl AdmissionLifecycle {
    /// Start a lifecycle at `Received`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage.
    pub fn stage(&self) -> AdmissionStage {
        self.stage
    }

    /// Stages left behind, oldest first.
    pub fn history(&self) -> &[AdmissionStage] {
        &self.history
    }

    /// Transition to a new stage.
    pub fn advance(&mut self, next: AdmissionStage) -> Result<(), AdmissionError> {
        if !self.stage.can_transition_to(next) {
            return Err(AdmissionError::Internal(format!(
                "illegal admission transition {:?} -> {:?}",
                self.stage, next
            )));
        }
        self.history.push(self.stage);
        self.stage = next;
        Ok(())
    }

    /// Mark the request rejected. A no-op once already rejected.
    pub fn reject(&mut self) {
        if !self.stage.is_terminal() {
            self.history.push(self.stage);
            self.stage = AdmissionStage::Rejected;
        }
    }
}
