//! In-process fakes for the facilitator and the ledger.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes};

use crate::actuator::{ActionReceipt, LedgerActuator, MintAction};
use crate::codec;
use crate::facilitator::{Facilitator, FacilitatorFault};
use crate::proto::{
    Authorization, ExactPayload, PaymentPayload, PaymentRequirements, RequirementsExtra,
    SettleResponse, SettlementReceipt, V1, VerificationResult,
};
use crate::timestamp::UnixTimestamp;

pub const NETWORK: &str = "base-sepolia";

pub fn requirement(amount: u64) -> PaymentRequirements {
    PaymentRequirements {
        scheme: "exact".into(),
        network: NETWORK.into(),
        max_amount_required: amount.into(),
        resource: "https://apes.example/mint".into(),
        description: "Mint JustApes NFT".into(),
        mime_type: "application/json".into(),
        output_schema: None,
        pay_to: Address::repeat_byte(0x22),
        max_timeout_seconds: 60,
        asset: Address::repeat_byte(0x33),
        extra: Some(RequirementsExtra {
            name: "USDC".into(),
            version: "2".into(),
        }),
    }
}

pub fn payload(value: u64, nonce: u8) -> PaymentPayload {
    PaymentPayload {
        x402_version: V1,
        scheme: "exact".into(),
        network: NETWORK.into(),
        asset: None,
        payload: ExactPayload {
            signature: Bytes::from(vec![0xab; 65]),
            authorization: Authorization {
                from: Address::repeat_byte(0x11),
                to: Address::repeat_byte(0x22),
                value: value.into(),
                valid_after: UnixTimestamp::from_secs(0),
                valid_before: UnixTimestamp::from_secs(4_000_000_000),
                nonce: B256::with_last_byte(nonce),
            },
        },
    }
}

pub fn header(payload: &PaymentPayload) -> String {
    codec::encode_payment(payload).unwrap()
}

#[derive(Debug, thiserror::Error)]
#[error("fake transport failure (processed: {processed})")]
pub struct FakeError {
    pub processed: bool,
}

impl FacilitatorFault for FakeError {
    fn not_processed(&self) -> bool {
        !self.processed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    Succeed,
    Reject,
    Unreachable,
    LoseResponse,
}

/// Accepts a payment iff it pays at least the required amount.
#[derive(Debug)]
pub struct FakeFacilitator {
    verify_calls: AtomicUsize,
    settle_calls: AtomicUsize,
    unreachable: bool,
    delay: Duration,
    settle_mode: Mutex<SettleMode>,
}

impl Default for FakeFacilitator {
    fn default() -> Self {
        Self {
            verify_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
            unreachable: false,
            delay: Duration::ZERO,
            settle_mode: Mutex::new(SettleMode::Succeed),
        }
    }
}

impl FakeFacilitator {
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_settle_mode(&self, mode: SettleMode) {
        *self.settle_mode.lock().unwrap() = mode;
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn settle_calls(&self) -> usize {
        self.settle_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Facilitator for FakeFacilitator {
    type Error = FakeError;

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerificationResult, FakeError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.unreachable {
            return Err(FakeError { processed: false });
        }
        let payer = payload.payer().to_string();
        if payload.payload.authorization.value < requirements.max_amount_required {
            return Ok(VerificationResult::invalid(
                Some(payer),
                "invalid_exact_evm_payload_authorization_value".into(),
            ));
        }
        Ok(VerificationResult::valid(payer))
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FakeError> {
        let n = self.settle_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = *self.settle_mode.lock().unwrap();
        self.pause().await;
        match mode {
            SettleMode::Succeed => Ok(SettleResponse::Success {
                payer: payload.payer().to_string(),
                transaction: format!("0x{n:064x}"),
                network: requirements.network.clone(),
            }),
            SettleMode::Reject => Ok(SettleResponse::Error {
                reason: "insufficient_funds".into(),
                message: None,
                network: requirements.network.clone(),
            }),
            SettleMode::Unreachable => Err(FakeError { processed: false }),
            SettleMode::LoseResponse => Err(FakeError { processed: true }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuatorMode {
    #[default]
    Confirm,
    Unconfirmed,
    Fail,
}

#[derive(Debug, Default)]
pub struct FakeActuator {
    mode: ActuatorMode,
    calls: AtomicUsize,
    last_recipient: Mutex<Option<Address>>,
}

impl FakeActuator {
    pub fn with_mode(mode: ActuatorMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_recipient(&self) -> Option<Address> {
        *self.last_recipient.lock().unwrap()
    }
}

impl LedgerActuator for FakeActuator {
    type Action = MintAction;
    type Error = FakeError;

    async fn execute(
        &self,
        action: &MintAction,
        settlement: &SettlementReceipt,
    ) -> Result<ActionReceipt, FakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_recipient.lock().unwrap() = Some(action.recipient_for(settlement));
        match self.mode {
            ActuatorMode::Fail => Err(FakeError { processed: true }),
            mode => Ok(ActionReceipt {
                transaction: format!("0x{:064x}", 0xbeef),
                confirmed: mode == ActuatorMode::Confirm,
            }),
        }
    }
}
