//! Server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! port = 3000
//! base_url = "https://justapes.vercel.app"
//!
//! [facilitator]
//! url = "https://x402.org/facilitator"
//!
//! [offer]
//! unit_price = "$0.1"
//! description = "Mint JustApes NFT"
//!
//! [[accepts]]
//! network = "base"
//! pay_to = "$PAY_TO"
//!
//! [mint]
//! rpc_url = "$RPC_URL"
//! contract = "0x400707dd8bae16b2740e79a54d7a85c57acf3f2c"
//! minter_key = "$MINTER_PRIVATE_KEY"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: Path to configuration file (default: `config.toml`)
//! - `HOST`: Override server bind address
//! - `PORT`: Override server port
//! - Secrets referenced by `$VAR` in the config file

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use mintgate::amount::Price;
use mintgate::catalog::{
    AcceptedAsset, AssetDescriptor, CatalogError, DEFAULT_MAX_TIMEOUT_SECONDS, RequirementCatalog,
};
use mintgate::gateway::{DEFAULT_ACTION_TIMEOUT, GatewayConfig};
use mintgate::matcher::MatchPolicy;
use mintgate::proto::RequirementsExtra;
use mintgate_evm::networks;
use mintgate_http::constants::DEFAULT_FACILITATOR_URL;
use mintgate_http::paygate::{MintOffer, ResourceInfoBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

/// Errors loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}")]
    Read {
        /// Path that was tried.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ServerConfig`].
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    /// A secret still holds an unexpanded `$VAR` reference.
    #[error("{field} references an unset environment variable")]
    Unresolved {
        /// Dotted path of the field.
        field: &'static str,
    },
    /// An accepted asset omits its address and its network has no default.
    #[error("no default asset for network {network:?}; set `asset`")]
    UnknownAsset {
        /// The network.
        network: String,
    },
    /// `offer.max_quantity` is zero.
    #[error("offer.max_quantity must be at least 1")]
    MaxQuantity,
    /// The accepted assets cannot form a catalog.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `3000`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public origin used in `resource` URLs; the `Host` header otherwise.
    #[serde(default)]
    pub base_url: Option<Url>,

    /// Remote facilitator.
    #[serde(default)]
    pub facilitator: FacilitatorSection,

    /// Pipeline settings.
    #[serde(default)]
    pub gateway: GatewaySection,

    /// What is sold.
    pub offer: OfferSection,

    /// Accepted ways to pay, in advertisement order.
    pub accepts: Vec<AcceptSection>,

    /// The collection contract and minter wallet.
    pub mint: MintSection,

    /// Token metadata served under `/metadata`.
    #[serde(default)]
    pub collection: CollectionConfig,
}

/// `[facilitator]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorSection {
    /// Base URL; `/verify` and `/settle` are resolved against it.
    #[serde(default = "default_facilitator_url")]
    pub url: String,
    /// Sent as `Authorization: Bearer`.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Sent as `X-API-Key`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request HTTP timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for FacilitatorSection {
    fn default() -> Self {
        Self {
            url: default_facilitator_url(),
            bearer_token: None,
            api_key: None,
            timeout_secs: None,
        }
    }
}

/// `[gateway]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GatewaySection {
    /// `fallback` or `strict`.
    #[serde(default)]
    pub match_policy: MatchPolicy,
    /// Facilitator timeout when a requirement sets none.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Bound on the mint transaction.
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// How often settled nonces past `validBefore` are dropped.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            default_timeout_secs: default_timeout_secs(),
            action_timeout_secs: default_action_timeout_secs(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

/// `[offer]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferSection {
    /// Price of one token: `"$0.1"` in money or an integer in atomic units.
    #[serde(serialize_with = "serialize_price")]
    pub unit_price: Price,
    /// Resource description shown to payers.
    #[serde(default = "default_description")]
    pub description: String,
    /// Largest quantity per call.
    #[serde(default = "default_max_quantity")]
    pub max_quantity: u32,
}

/// `[[accepts]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptSection {
    /// x402 v1 network name.
    pub network: String,
    /// Payee.
    pub pay_to: Address,
    /// Token address; the network's USDC when absent.
    #[serde(default)]
    pub asset: Option<Address>,
    /// Token decimals, with `asset`.
    #[serde(default)]
    pub decimals: Option<u8>,
    /// EIP-712 domain name, with `asset`.
    #[serde(default)]
    pub eip712_name: Option<String>,
    /// EIP-712 domain version, with `asset`.
    #[serde(default)]
    pub eip712_version: Option<String>,
    /// Facilitator timeout.
    #[serde(default = "default_timeout_secs")]
    pub max_timeout_seconds: u64,
}

/// `[mint]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintSection {
    /// HTTP RPC endpoint URL.
    pub rpc_url: String,
    /// Collection contract.
    pub contract: Address,
    /// Private key of the contract owner (hex, with or without `0x` prefix).
    /// Supports `$VAR` / `${VAR}` for environment variable expansion.
    pub minter_key: String,
    /// Confirmations awaited before a mint counts as done.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// How long to wait for the mint receipt.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

/// `[collection]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name; tokens are named `"{name} #{id}"`.
    #[serde(default = "default_collection_name")]
    pub name: String,
    /// Token description.
    #[serde(default)]
    pub description: String,
    /// Image directory; the image of token `id` is `{image_base}/{id}.png`.
    #[serde(default)]
    pub image_base: String,
    /// Collection website.
    #[serde(default)]
    pub external_url: Option<String>,
    /// Attributes shared by every token.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: default_collection_name(),
            description: String::new(),
            image_base: String::new(),
            external_url: None,
            attributes: Vec::new(),
        }
    }
}

/// One ERC-721 metadata attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Trait name.
    pub trait_type: String,
    /// Trait value.
    pub value: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3000
}

fn default_facilitator_url() -> String {
    DEFAULT_FACILITATOR_URL.to_owned()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECONDS
}

const fn default_action_timeout_secs() -> u64 {
    DEFAULT_ACTION_TIMEOUT.as_secs()
}

const fn default_purge_interval_secs() -> u64 {
    300
}

fn default_description() -> String {
    "Mint JustApes NFT".to_owned()
}

const fn default_max_quantity() -> u32 {
    10
}

const fn default_confirmations() -> u64 {
    1
}

const fn default_receipt_timeout_secs() -> u64 {
    90
}

fn default_collection_name() -> String {
    "Just Apes".to_owned()
}

fn serialize_price<S: serde::Serializer>(price: &Price, serializer: S) -> Result<S::Ok, S::Error> {
    match price {
        Price::Money(amount) => serializer.serialize_str(&format!("${amount}")),
        Price::Atomic(amount) => {
            let atomic = u64::try_from(amount.0).map_err(|_| {
                <S::Error as serde::ser::Error>::custom(format!("atomic price {amount} exceeds u64"))
            })?;
            serializer.serialize_u64(atomic)
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path`.
    ///
    /// After loading, all `$VAR` / `${VAR}` references are expanded from the
    /// process environment. `HOST` and `PORT` env vars override the file
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::from_toml(&content, |name| std::env::var(name).ok())?;

        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        Ok(config)
    }

    /// Parses `content` after expanding variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or
    /// [`ConfigError::Unresolved`] if the minter key was not expanded.
    pub fn from_toml(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let expanded = expand_vars(content, lookup);
        let config: Self = toml::from_str(&expanded)?;
        let key = config.mint.minter_key.trim();
        if key.is_empty() || key.starts_with('$') {
            return Err(ConfigError::Unresolved {
                field: "mint.minter_key",
            });
        }
        if config.mint.rpc_url.starts_with('$') {
            return Err(ConfigError::Unresolved {
                field: "mint.rpc_url",
            });
        }
        Ok(config)
    }

    /// Pipeline settings.
    #[must_use]
    pub const fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            match_policy: self.gateway.match_policy,
            default_timeout: Duration::from_secs(self.gateway.default_timeout_secs),
            action_timeout: Duration::from_secs(self.gateway.action_timeout_secs),
        }
    }

    /// The requirement catalog built from `[[accepts]]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAsset`] for an asset-less entry on an
    /// unknown network and [`ConfigError::Catalog`] if the list is empty or
    /// the unit price does not fit an asset.
    pub fn catalog(&self) -> Result<RequirementCatalog, ConfigError> {
        let accepted = self
            .accepts
            .iter()
            .map(AcceptSection::accepted_asset)
            .collect::<Result<Vec<_>, _>>()?;
        let catalog = RequirementCatalog::new(accepted)?;
        for asset in catalog.accepted() {
            self.offer
                .unit_price
                .to_atomic(asset.asset.decimals)
                .map_err(|source| CatalogError::Price {
                    network: asset.network.clone(),
                    source,
                })?;
        }
        Ok(catalog)
    }

    /// The mint offer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MaxQuantity`] if `max_quantity` is zero.
    pub fn offer(&self) -> Result<MintOffer, ConfigError> {
        if self.offer.max_quantity == 0 {
            return Err(ConfigError::MaxQuantity);
        }
        Ok(MintOffer {
            unit_price: self.offer.unit_price,
            max_quantity: self.offer.max_quantity,
            resource: ResourceInfoBuilder {
                description: self.offer.description.clone(),
                ..ResourceInfoBuilder::default()
            },
        })
    }
}

impl AcceptSection {
    fn accepted_asset(&self) -> Result<AcceptedAsset, ConfigError> {
        let asset = match self.asset {
            Some(address) => {
                let default = networks::usdc(&self.network).filter(|d| d.address == address);
                let eip712 = match (&self.eip712_name, &self.eip712_version) {
                    (Some(name), Some(version)) => Some(RequirementsExtra {
                        name: name.clone(),
                        version: version.clone(),
                    }),
                    _ => default.as_ref().and_then(|d| d.eip712.clone()),
                };
                AssetDescriptor {
                    address,
                    decimals: self
                        .decimals
                        .or_else(|| default.as_ref().map(|d| d.decimals))
                        .unwrap_or(networks::USDC_DECIMALS),
                    eip712,
                }
            }
            None => networks::usdc(&self.network).ok_or_else(|| ConfigError::UnknownAsset {
                network: self.network.clone(),
            })?,
        };
        Ok(AcceptedAsset {
            network: self.network.clone(),
            asset,
            pay_to: self.pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
        })
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string through `lookup`.
///
/// Unresolved variables are left as-is. A `$` not followed by a name is
/// literal, so `"$0.1"` survives expansion.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            let valid = c == '_' || c.is_ascii_alphabetic() || (!name.is_empty() && c.is_ascii_digit());
            if !braced && !valid {
                break;
            }
            name.push(c);
            chars.next();
        }

        match lookup(&name) {
            Some(value) if !name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
