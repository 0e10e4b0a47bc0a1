//! EVM side of mintgate.
//!
//! [`NftMinter`](minter::NftMinter) is the [`LedgerActuator`] that mints
//! tokens once a payment has settled, by sending an `ownerMint` call from a
//! minter wallet and waiting for its receipt. [`networks`] holds the USDC
//! deployments advertised in payment requirements.
//!
//! [`LedgerActuator`]: mintgate::actuator::LedgerActuator

pub mod contract;
pub mod minter;
pub mod networks;

pub use minter::{MintError, NftMinter};
