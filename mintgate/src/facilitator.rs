//! The remote service that verifies and settles payments.
//!
//! The gateway treats the facilitator as trusted: it checks signatures,
//! balances and validity windows, and submits the transfer on-chain.

use std::sync::Arc;

use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse, VerificationResult};

/// An error talking to a facilitator.
pub trait FacilitatorFault: std::error::Error + Send + Sync + 'static {
    /// `true` when the request provably never reached the facilitator, so
    /// no funds can have moved.
    fn not_processed(&self) -> bool;
}

/// Verifies and settles payment payloads.
pub trait Facilitator: Send + Sync + 'static {
    /// Transport-level error.
    type Error: FacilitatorFault;

    /// Checks `payload` against `requirements` without moving funds.
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<VerificationResult, Self::Error>> + Send;

    /// Submits the authorized transfer.
    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<VerificationResult, Self::Error>> + Send {
        (**self).verify(payload, requirements)
    }

    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        (**self).settle(payload, requirements)
    }
}
