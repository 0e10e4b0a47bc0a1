//! Failure taxonomy of a gated call.
//!
//! Every failure says whether the caller has been charged, so the HTTP layer
//! can tell a retryable refusal from a payment that needs reconciliation.

use serde::Serialize;

use crate::codec::CodecError;
use crate::proto::SettlementReceipt;

/// Whether funds moved before the call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Charged {
    /// No funds moved.
    No,
    /// Funds moved; the settlement receipt is attached.
    Yes,
    /// Settlement may or may not have happened.
    Unknown,
}

/// Discriminant of a [`GatewayError`], also the payload of the failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    /// No `X-PAYMENT` header.
    MissingPayment,
    /// Header present but undecodable.
    MalformedPayload,
    /// No advertised requirement fits the payload.
    NoMatchingRequirement,
    /// Facilitator rejected the payment.
    InvalidPayment,
    /// Facilitator could not be reached or answered garbage.
    FacilitatorUnavailable,
    /// Facilitator reported that settlement did not happen.
    SettlementFailed,
    /// Settlement outcome unknown.
    SettlementAmbiguous,
    /// The gated action failed after funds moved.
    ActionExecutionFailed,
    /// The nonce was already settled.
    PaymentReplayed,
}

impl FailureKind {
    /// Stable name used in logs and response bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingPayment => "MissingPayment",
            Self::MalformedPayload => "MalformedPayload",
            Self::NoMatchingRequirement => "NoMatchingRequirement",
            Self::InvalidPayment => "InvalidPayment",
            Self::FacilitatorUnavailable => "FacilitatorUnavailable",
            Self::SettlementFailed => "SettlementFailed",
            Self::SettlementAmbiguous => "SettlementAmbiguous",
            Self::ActionExecutionFailed => "ActionExecutionFailed",
            Self::PaymentReplayed => "PaymentReplayed",
        }
    }

    /// Whether the caller was charged.
    #[must_use]
    pub const fn charged(self) -> Charged {
        match self {
            Self::ActionExecutionFailed | Self::PaymentReplayed => Charged::Yes,
            Self::SettlementAmbiguous => Charged::Unknown,
            _ => Charged::No,
        }
    }

    /// Whether the response re-issues the 402 challenge.
    #[must_use]
    pub const fn is_challenge(self) -> bool {
        matches!(
            self,
            Self::MissingPayment
                | Self::MalformedPayload
                | Self::NoMatchingRequirement
                | Self::InvalidPayment
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a gated call did not complete.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No payment presented.
    #[error("X-PAYMENT header is required")]
    MissingPayment,
    /// The payment header could not be decoded.
    #[error("malformed X-PAYMENT header: {0}")]
    MalformedPayload(#[source] CodecError),
    /// Nothing in `accepts` fits the payload and the policy is strict.
    #[error("no accepted requirement for scheme {scheme:?} on network {network:?}")]
    NoMatchingRequirement {
        /// Scheme declared by the payload.
        scheme: String,
        /// Network declared by the payload.
        network: String,
    },
    /// The facilitator rejected the payment.
    #[error("payment rejected: {reason}")]
    InvalidPayment {
        /// Machine-readable reason from the facilitator.
        reason: String,
        /// Human-readable detail, if given.
        message: Option<String>,
        /// Payer identified by the facilitator.
        payer: Option<String>,
    },
    /// The facilitator could not be consulted.
    #[error("facilitator unavailable: {0}")]
    FacilitatorUnavailable(String),
    /// Settlement definitely did not happen.
    #[error("settlement failed: {reason}")]
    SettlementFailed {
        /// Machine-readable reason.
        reason: String,
        /// Human-readable detail, if given.
        message: Option<String>,
    },
    /// Settlement may have happened.
    #[error("settlement outcome unknown: {0}")]
    SettlementAmbiguous(String),
    /// Funds moved but the gated action failed.
    #[error("action failed after settlement: {message}")]
    ActionExecutionFailed {
        /// What went wrong.
        message: String,
        /// Receipt of the settlement that charged the caller.
        receipt: Box<SettlementReceipt>,
    },
    /// This payment nonce already settled.
    #[error("payment already settled in {}", receipt.transaction)]
    PaymentReplayed {
        /// Receipt of the original settlement.
        receipt: Box<SettlementReceipt>,
    },
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// The failure's discriminant.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::MissingPayment => FailureKind::MissingPayment,
            Self::MalformedPayload(_) => FailureKind::MalformedPayload,
            Self::NoMatchingRequirement { .. } => FailureKind::NoMatchingRequirement,
            Self::InvalidPayment { .. } => FailureKind::InvalidPayment,
            Self::FacilitatorUnavailable(_) => FailureKind::FacilitatorUnavailable,
            Self::SettlementFailed { .. } => FailureKind::SettlementFailed,
            Self::SettlementAmbiguous(_) => FailureKind::SettlementAmbiguous,
            Self::ActionExecutionFailed { .. } => FailureKind::ActionExecutionFailed,
            Self::PaymentReplayed { .. } => FailureKind::PaymentReplayed,
        }
    }

    /// Whether the caller was charged.
    #[must_use]
    pub const fn charged(&self) -> Charged {
        self.kind().charged()
    }

    /// The settlement receipt, when the caller was charged.
    #[must_use]
    pub fn receipt(&self) -> Option<&SettlementReceipt> {
        match self {
            Self::ActionExecutionFailed { receipt, .. } | Self::PaymentReplayed { receipt } => {
                Some(receipt)
            }
            _ => None,
        }
    }

    /// The payer the facilitator named when rejecting the payment.
    #[must_use]
    pub fn payer(&self) -> Option<&str> {
        match self {
            Self::InvalidPayment { payer, .. } => payer.as_deref(),
            _ => None,
        }
    }
}
