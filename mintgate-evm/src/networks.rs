//! USDC deployments on the networks mintgate sells on.

use alloy_primitives::{Address, address};
use mintgate::catalog::AssetDescriptor;
use mintgate::proto::RequirementsExtra;

/// x402 v1 name of Base mainnet.
pub const BASE: &str = "base";

/// x402 v1 name of Base Sepolia.
pub const BASE_SEPOLIA: &str = "base-sepolia";

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// EIP-712 domain name of USDC.
pub const USDC_NAME: &str = "USD Coin";

/// EIP-712 domain version of USDC.
pub const USDC_VERSION: &str = "2";

/// USDC decimals.
pub const USDC_DECIMALS: u8 = 6;

/// The USDC descriptor for a network, if mintgate knows one.
#[must_use]
pub fn usdc(network: &str) -> Option<AssetDescriptor> {
    let address = match network {
        BASE => USDC_BASE,
        BASE_SEPOLIA => USDC_BASE_SEPOLIA,
        _ => return None,
    };
    Some(AssetDescriptor {
        address,
        decimals: USDC_DECIMALS,
        eip712: Some(RequirementsExtra {
            name: USDC_NAME.to_owned(),
            version: USDC_VERSION.to_owned(),
        }),
    })
}
