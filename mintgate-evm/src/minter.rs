//! Owner-mint actuator.
//!
//! The minter wallet owns the collection contract and mints on behalf of
//! paying callers. A mint is reported as confirmed only when its receipt
//! shows success after the configured number of confirmations.

use std::time::Duration;

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, U256};
use alloy_provider::{DynProvider, PendingTransactionError, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::{LocalSignerError, PrivateKeySigner};
use alloy_sol_types::SolCall;
use alloy_transport::TransportError;
use mintgate::actuator::{ActionReceipt, LedgerActuator, MintAction};
use mintgate::proto::SettlementReceipt;
use url::Url;

use crate::contract::IJustApes;

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Confirmations awaited when none are configured.
pub const DEFAULT_CONFIRMATIONS: u64 = 1;

/// Receipt wait when none is configured.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(90);

/// Errors building or running the minter.
#[derive(Debug, thiserror::Error)]
pub enum MintError {
    /// The minter key does not parse.
    #[error("invalid minter key")]
    Signer(#[source] LocalSignerError),
    /// The RPC URL does not parse.
    #[error("invalid RPC URL {url:?}")]
    RpcUrl {
        /// The rejected URL.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// The node refused the mint transaction.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The mint was sent but its receipt could not be obtained.
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
}

/// Mints through `ownerMint` on an EVM provider.
#[derive(Debug, Clone)]
pub struct NftMinter<P> {
    provider: P,
    contract: Address,
    signer: Address,
    confirmations: u64,
    receipt_timeout: Duration,
}

impl NftMinter<DynProvider> {
    /// Connects a wallet-backed HTTP provider for `minter_key`.
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Signer`] or [`MintError::RpcUrl`] if the key or
    /// URL does not parse. No RPC call is made.
    pub fn connect(rpc_url: &str, contract: Address, minter_key: &str) -> Result<Self, MintError> {
        let signer: PrivateKeySigner = minter_key.trim().parse().map_err(MintError::Signer)?;
        let url: Url = rpc_url.parse().map_err(|source| MintError::RpcUrl {
            url: rpc_url.to_owned(),
            source,
        })?;
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        Ok(Self::new(provider, contract, address))
    }
}

impl<P> NftMinter<P> {
    /// Wraps an existing provider whose wallet controls `signer`.
    pub const fn new(provider: P, contract: Address, signer: Address) -> Self {
        Self {
            provider,
            contract,
            signer,
            confirmations: DEFAULT_CONFIRMATIONS,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    /// Sets the number of confirmations to wait for.
    #[must_use]
    pub const fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Sets how long to wait for the receipt.
    #[must_use]
    pub const fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// The collection contract.
    #[must_use]
    pub const fn contract(&self) -> Address {
        self.contract
    }

    /// The minter wallet.
    #[must_use]
    pub const fn signer(&self) -> Address {
        self.signer
    }

    fn request(&self, recipient: Address, quantity: u32) -> TransactionRequest {
        let calldata = IJustApes::ownerMintCall {
            to: recipient,
            quantity: U256::from(quantity),
        }
        .abi_encode();
        TransactionRequest::default()
            .from(self.signer)
            .to(self.contract)
            .input(calldata.into())
    }
}

impl<P: Provider + Send + Sync + 'static> LedgerActuator for NftMinter<P> {
    type Action = MintAction;
    type Error = MintError;

    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "mintgate.mint_nft",
            skip_all,
            fields(payer = %settlement.payer, quantity = action.quantity, contract = %self.contract)
        )
    )]
    async fn execute(
        &self,
        action: &MintAction,
        settlement: &SettlementReceipt,
    ) -> Result<ActionReceipt, MintError> {
        let recipient = action.recipient_for(settlement);
        let pending = self
            .provider
            .send_transaction(self.request(recipient, action.quantity))
            .await?;
        #[cfg(feature = "telemetry")]
        tracing::info!(tx = %pending.tx_hash(), %recipient, "mint transaction sent");

        let receipt = pending
            .with_required_confirmations(self.confirmations)
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await?;
        let confirmed = receipt.status();
        #[cfg(feature = "telemetry")]
        if !confirmed {
            tracing::error!(tx = %receipt.transaction_hash, "mint transaction reverted");
        }
        Ok(ActionReceipt {
            transaction: format!("{:?}", receipt.transaction_hash),
            confirmed,
        })
    }
}
