//! The action a payment buys.
//!
//! The gateway only calls a [`LedgerActuator`] after funds have moved, and
//! never retries it: a failure is surfaced to the caller together with the
//! settlement receipt so it can be reconciled.

use std::sync::Arc;

use alloy_primitives::Address;

use crate::proto::SettlementReceipt;

/// Result of the gated action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    /// Identifier of the action (a transaction hash).
    pub transaction: String,
    /// Whether the action reached the required confirmations.
    pub confirmed: bool,
}

/// Validated parameters of a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintAction {
    /// Token recipient; the payer when absent.
    pub recipient: Option<Address>,
    /// Number of tokens, already bounds-checked.
    pub quantity: u32,
}

impl MintAction {
    /// The address that receives the tokens.
    #[must_use]
    pub fn recipient_for(&self, settlement: &SettlementReceipt) -> Address {
        self.recipient.unwrap_or(settlement.payer)
    }
}

/// Executes the gated action once a payment has settled.
pub trait LedgerActuator: Send + Sync + 'static {
    /// Parameters of the action, cloned into the settlement task.
    type Action: Clone + Send + Sync + 'static;
    /// Execution error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs `action`, paid for by `settlement`.
    fn execute(
        &self,
        action: &Self::Action,
        settlement: &SettlementReceipt,
    ) -> impl Future<Output = Result<ActionReceipt, Self::Error>> + Send;
}

impl<T: LedgerActuator> LedgerActuator for Arc<T> {
    type Action = T::Action;
    type Error = T::Error;

    fn execute(
        &self,
        action: &Self::Action,
        settlement: &SettlementReceipt,
    ) -> impl Future<Output = Result<ActionReceipt, Self::Error>> + Send {
        (**self).execute(action, settlement)
    }
}
