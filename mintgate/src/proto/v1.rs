//! x402 version 1 wire types.
//!
//! V1 identifies networks by name (`"base"`, `"base-sepolia"`) and carries an
//! EIP-3009 `transferWithAuthorization` in the `exact` scheme payload.
//!
//! # Key Types
//!
//! - [`PaymentRequirements`] - One acceptable way to pay, advertised in a 402
//! - [`PaymentPayload`] - The signed authorization sent back in `X-PAYMENT`
//! - [`PaymentRequired`] - The HTTP 402 response body
//! - [`FacilitatorRequest`] - Body of the facilitator's `/verify` and `/settle`

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::timestamp::UnixTimestamp;

/// Version marker for x402 protocol version 1, serialized as `1`.
pub type X402Version1 = super::Version<1>;

/// Convenience constant for constructing V1 protocol messages.
pub const V1: X402Version1 = super::Version;

/// EIP-712 signing domain of the token, echoed to clients so they can sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsExtra {
    /// Domain name (e.g. `"USD Coin"`).
    pub name: String,
    /// Domain version (e.g. `"2"`).
    pub version: String,
}

/// Payment terms for a protected resource.
///
/// Immutable once issued for a challenge: the gateway verifies and settles
/// against exactly the value it advertised.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme (always `"exact"` here).
    pub scheme: String,
    /// The network name (e.g. `"base-sepolia"`).
    pub network: String,
    /// Required amount in the asset's smallest unit.
    pub max_amount_required: TokenAmount,
    /// The resource URL being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// Optional JSON schema for the resource output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// The payee.
    pub pay_to: Address,
    /// Maximum time in seconds the server waits on the facilitator.
    pub max_timeout_seconds: u64,
    /// The token contract.
    pub asset: Address,
    /// EIP-712 domain of the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<RequirementsExtra>,
}

/// A signed payment authorization from the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The payment scheme (e.g. `"exact"`).
    pub scheme: String,
    /// The network name.
    pub network: String,
    /// The token the buyer signed for, when the client declares it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<Address>,
    /// The scheme-specific signed payload.
    pub payload: ExactPayload,
}

impl PaymentPayload {
    /// The paying address.
    #[must_use]
    pub const fn payer(&self) -> Address {
        self.payload.authorization.from
    }
}

/// Payload of the `exact` scheme: a signed EIP-3009 authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExactPayload {
    /// Signature over the EIP-712 typed authorization.
    pub signature: Bytes,
    /// The authorization that was signed.
    pub authorization: Authorization,
}

/// EIP-3009 `transferWithAuthorization` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Authorization {
    /// Payer.
    pub from: Address,
    /// Payee.
    pub to: Address,
    /// Amount in the asset's smallest unit.
    pub value: TokenAmount,
    /// Not valid before this instant.
    pub valid_after: UnixTimestamp,
    /// Not valid at or after this instant.
    pub valid_before: UnixTimestamp,
    /// Unique 32-byte nonce chosen by the payer.
    pub nonce: B256,
}

/// HTTP 402 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Why the request was refused.
    pub error: String,
    /// Acceptable ways to pay.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    /// The payer, when a presented payment identified one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl PaymentRequired {
    /// Builds a challenge body.
    #[must_use]
    pub fn new(error: impl Into<String>, accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            x402_version: V1,
            error: error.into(),
            accepts,
            payer: None,
        }
    }

    /// Attaches the payer identified by a rejected payment.
    #[must_use]
    pub fn with_payer(mut self, payer: Option<String>) -> Self {
        self.payer = payer;
        self
    }
}

/// Body of `POST /verify` and `POST /settle` on a facilitator.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest<'a> {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The buyer's payload.
    pub payment_payload: &'a PaymentPayload,
    /// The requirement the payload is checked against.
    pub payment_requirements: &'a PaymentRequirements,
}

impl<'a> FacilitatorRequest<'a> {
    /// Pairs a payload with the requirement it claims to satisfy.
    #[must_use]
    pub const fn new(
        payment_payload: &'a PaymentPayload,
        payment_requirements: &'a PaymentRequirements,
    ) -> Self {
        Self {
            x402_version: V1,
            payment_payload,
            payment_requirements,
        }
    }
}
