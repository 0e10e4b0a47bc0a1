//! Wire format types for the x402 protocol.
//!
//! - [`v1`] - Requirements, payloads and the 402 body
//! - [`VerificationResult`] / [`SettleResponse`] - Facilitator replies
//! - [`SettlementReceipt`] - What the gateway reports in `X-PAYMENT-RESPONSE`
//!
//! # Wire Format
//!
//! All field names are camelCase JSON. Facilitator replies are modelled as
//! enums and decoded through a flat wire struct so that a reply claiming
//! success without the fields success implies is a decoding error rather
//! than a half-filled value.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::amount::TokenAmount;

pub mod v1;
mod version;

pub use v1::{
    Authorization, ExactPayload, FacilitatorRequest, PaymentPayload, PaymentRequired,
    PaymentRequirements, RequirementsExtra, V1, X402Version1,
};
pub use version::Version;

/// Outcome of a facilitator `/verify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// The payload satisfies the requirement.
    Valid {
        /// The payer resolved by the facilitator.
        payer: String,
    },
    /// The payload was understood but does not satisfy the requirement.
    Invalid {
        /// Machine-readable reason, e.g. `insufficient_funds`.
        reason: String,
        /// Optional human-readable description.
        message: Option<String>,
        /// The payer, if identifiable.
        payer: Option<String>,
    },
}

impl VerificationResult {
    /// Constructs a successful verification.
    #[must_use]
    pub const fn valid(payer: String) -> Self {
        Self::Valid { payer }
    }

    /// Constructs a failed verification.
    #[must_use]
    pub const fn invalid(payer: Option<String>, reason: String) -> Self {
        Self::Invalid {
            reason,
            message: None,
            payer,
        }
    }

    /// Returns `true` if the verification succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The payer reported by the facilitator, if any.
    #[must_use]
    pub fn payer(&self) -> Option<&str> {
        match self {
            Self::Valid { payer } => Some(payer),
            Self::Invalid { payer, .. } => payer.as_deref(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_message: Option<String>,
}

impl Serialize for VerificationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Valid { payer } => VerificationWire {
                is_valid: true,
                payer: Some(payer.clone()),
                invalid_reason: None,
                invalid_message: None,
            },
            Self::Invalid {
                reason,
                message,
                payer,
            } => VerificationWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(reason.clone()),
                invalid_message: message.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerificationResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerificationWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(Self::Valid { payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(Self::Invalid {
                reason,
                message: wire.invalid_message,
                payer: wire.payer,
            })
        }
    }
}

/// Outcome of a facilitator `/settle` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResponse {
    /// Funds moved on-chain.
    Success {
        /// The address that paid.
        payer: String,
        /// The settlement transaction hash.
        transaction: String,
        /// The network where settlement occurred.
        network: String,
    },
    /// The facilitator refused or failed to submit the transfer.
    Error {
        /// Machine-readable reason for failure.
        reason: String,
        /// Optional human-readable description.
        message: Option<String>,
        /// The network where settlement was attempted.
        network: String,
    },
}

impl SettleResponse {
    /// Returns `true` if the settlement succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    network: String,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success {
                payer,
                transaction,
                network,
            } => SettleWire {
                success: true,
                error_reason: None,
                error_message: None,
                payer: Some(payer.clone()),
                transaction: Some(transaction.clone()),
                network: network.clone(),
            },
            Self::Error {
                reason,
                message,
                network,
            } => SettleWire {
                success: false,
                error_reason: Some(reason.clone()),
                error_message: message.clone(),
                payer: None,
                transaction: None,
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleWire::deserialize(deserializer)?;
        if wire.success {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            Ok(Self::Success {
                payer,
                transaction,
                network: wire.network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(Self::Error {
                reason,
                message: wire.error_message,
                network: wire.network,
            })
        }
    }
}

/// Proof of a completed settlement, returned in `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    /// Always `true`; receipts exist only for settled payments.
    pub success: bool,
    /// The settlement transaction hash.
    pub transaction: String,
    /// The network where settlement occurred.
    pub network: String,
    /// The address that paid.
    pub payer: Address,
    /// Amount moved, in the asset's smallest unit.
    pub amount: TokenAmount,
}
