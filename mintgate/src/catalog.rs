//! Advertised payment requirements.
//!
//! A [`RequirementCatalog`] holds the assets the operator accepts and turns a
//! resource plus a [`Price`] into the ordered `accepts` list of a 402
//! challenge. Order is configuration order and doubles as the matcher's
//! fallback tie-break.

use alloy_primitives::Address;

use crate::amount::{AmountError, Price};
use crate::proto::{PaymentRequirements, RequirementsExtra};

/// Scheme tag for EIP-3009 exact-amount transfers.
pub const EXACT_SCHEME: &str = "exact";

/// Facilitator timeout advertised when an asset does not configure one.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 60;

/// Describes the resource a challenge is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Absolute URL of the resource.
    pub url: String,
    /// Human-readable description.
    pub description: String,
    /// MIME type of the resource response.
    pub mime_type: String,
}

/// A token contract and what clients need to sign for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    /// Contract address.
    pub address: Address,
    /// Number of decimals (6 for USDC).
    pub decimals: u8,
    /// EIP-712 domain of the token.
    pub eip712: Option<RequirementsExtra>,
}

/// One accepted way to pay: a token on a network, paid to a payee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedAsset {
    /// x402 v1 network name.
    pub network: String,
    /// The token.
    pub asset: AssetDescriptor,
    /// The payee.
    pub pay_to: Address,
    /// Facilitator timeout in seconds.
    pub max_timeout_seconds: u64,
}

/// Errors building a requirement list.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    /// No accepted assets configured.
    #[error("catalog has no accepted assets")]
    Empty,
    /// The price cannot be expressed in one of the accepted assets.
    #[error("invalid price for {network}: {source}")]
    Price {
        /// Network of the offending asset.
        network: String,
        /// Why the conversion failed.
        #[source]
        source: AmountError,
    },
}

/// The set of accepted assets, in preference order.
#[derive(Debug, Clone)]
pub struct RequirementCatalog {
    accepts: Vec<AcceptedAsset>,
}

impl RequirementCatalog {
    /// Creates a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Empty`] when `accepts` is empty.
    pub fn new(accepts: Vec<AcceptedAsset>) -> Result<Self, CatalogError> {
        if accepts.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { accepts })
    }

    /// The accepted assets in preference order.
    #[must_use]
    pub fn accepted(&self) -> &[AcceptedAsset] {
        &self.accepts
    }

    /// Builds the requirement list for `resource` priced at `price`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Price`] if the price is negative, too precise
    /// for an asset's decimals, or overflows.
    pub fn build(
        &self,
        resource: &ResourceInfo,
        price: &Price,
    ) -> Result<Vec<PaymentRequirements>, CatalogError> {
        self.accepts
            .iter()
            .map(|accepted| {
                let amount = price.to_atomic(accepted.asset.decimals).map_err(|source| {
                    CatalogError::Price {
                        network: accepted.network.clone(),
                        source,
                    }
                })?;
                let max_timeout_seconds = if accepted.max_timeout_seconds == 0 {
                    DEFAULT_MAX_TIMEOUT_SECONDS
                } else {
                    accepted.max_timeout_seconds
                };
                Ok(PaymentRequirements {
                    scheme: EXACT_SCHEME.to_owned(),
                    network: accepted.network.clone(),
                    max_amount_required: amount,
                    resource: resource.url.clone(),
                    description: resource.description.clone(),
                    mime_type: resource.mime_type.clone(),
                    output_schema: None,
                    pay_to: accepted.pay_to,
                    max_timeout_seconds,
                    asset: accepted.asset.address,
                    extra: accepted.asset.eip712.clone(),
                })
            })
            .collect()
    }
}
