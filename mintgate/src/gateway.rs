//! Orchestration of one gated call.
//!
//! ```text
//! Unauthorized → Decoding → Matching → Verifying → Verified
//!              → Settling → Settled → Executing → Completed
//! ```
//!
//! Any non-terminal state may move to `Failed(kind)`. A nonce that already
//! settled fails in `Matching` and neither verifies nor settles again: with
//! [`FailureKind::PaymentReplayed`] if its action completed, otherwise with
//! [`FailureKind::ActionExecutionFailed`] and the original receipt.
//!
//! Settlement and the action run in one detached task, so a caller that
//! disconnects after verification still gets its action executed and
//! recorded against the nonce.

use std::sync::Arc;
use std::time::Duration;

use crate::actuator::{ActionReceipt, LedgerActuator};
use crate::catalog::DEFAULT_MAX_TIMEOUT_SECONDS;
use crate::codec;
use crate::error::{FailureKind, GatewayError, GatewayResult};
use crate::facilitator::Facilitator;
use crate::matcher::{self, MatchPolicy, Selection};
use crate::proto::{PaymentPayload, PaymentRequirements, SettlementReceipt, VerificationResult};
use crate::settlement::{ActionOutcome, NonceKey, NonceStatus, SettlementCoordinator};
use crate::verifier::PaymentVerifier;

/// Default bound on the gated action, confirmations included.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Failure message for an action that settled but never reported back.
pub const ACTION_INCOMPLETE: &str = "action did not complete";

/// Immutable gateway settings, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Behaviour when no requirement matches a payload.
    pub match_policy: MatchPolicy,
    /// Facilitator timeout for requirements with `maxTimeoutSeconds = 0`.
    pub default_timeout: Duration,
    /// Bound on the gated action.
    pub action_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::Fallback,
            default_timeout: Duration::from_secs(DEFAULT_MAX_TIMEOUT_SECONDS),
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}

/// Where a call is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayState {
    /// No payment seen yet.
    Unauthorized,
    /// Decoding `X-PAYMENT`.
    Decoding,
    /// Choosing a requirement.
    Matching,
    /// Waiting on the facilitator's verification.
    Verifying,
    /// Payment verified.
    Verified,
    /// Waiting on settlement.
    Settling,
    /// Funds moved.
    Settled,
    /// Running the gated action.
    Executing,
    /// Action done.
    Completed,
    /// Stopped with the given failure.
    Failed(FailureKind),
}

impl GatewayState {
    /// `Completed` and `Failed` are terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Whether the pipeline may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed(_)) => !from.is_terminal(),
            (Self::Unauthorized, Self::Decoding)
            | (Self::Decoding, Self::Matching)
            | (Self::Matching, Self::Verifying)
            | (Self::Verifying, Self::Verified)
            | (Self::Verified, Self::Settling)
            | (Self::Settling, Self::Settled)
            | (Self::Settled, Self::Executing)
            | (Self::Executing, Self::Completed) => true,
            _ => false,
        }
    }
}

/// Per-call record of what the gateway saw and decided.
///
/// Created for one inbound call and dropped with its response.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    state: GatewayState,
    history: Vec<GatewayState>,
    accepts: Vec<PaymentRequirements>,
    payload: Option<PaymentPayload>,
    selected: Option<Selection>,
    verification: Option<VerificationResult>,
    receipt: Option<SettlementReceipt>,
    action: Option<ActionReceipt>,
}

impl GatewayRequest {
    /// Starts a call challenged with `accepts`.
    #[must_use]
    pub fn new(accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            state: GatewayState::Unauthorized,
            history: vec![GatewayState::Unauthorized],
            accepts,
            payload: None,
            selected: None,
            verification: None,
            receipt: None,
            action: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> GatewayState {
        self.state
    }

    /// Every state visited, in order.
    #[must_use]
    pub fn history(&self) -> &[GatewayState] {
        &self.history
    }

    /// The advertised requirements.
    #[must_use]
    pub fn accepts(&self) -> &[PaymentRequirements] {
        &self.accepts
    }

    /// The decoded payload.
    #[must_use]
    pub const fn payload(&self) -> Option<&PaymentPayload> {
        self.payload.as_ref()
    }

    /// How the requirement was chosen.
    #[must_use]
    pub const fn selection(&self) -> Option<Selection> {
        self.selected
    }

    /// The chosen requirement.
    #[must_use]
    pub fn selected_requirement(&self) -> Option<&PaymentRequirements> {
        self.selected.and_then(|s| self.accepts.get(s.index))
    }

    /// The facilitator's verdict.
    #[must_use]
    pub const fn verification(&self) -> Option<&VerificationResult> {
        self.verification.as_ref()
    }

    /// The settlement receipt, fresh or replayed.
    #[must_use]
    pub const fn receipt(&self) -> Option<&SettlementReceipt> {
        self.receipt.as_ref()
    }

    /// The action's receipt.
    #[must_use]
    pub const fn action(&self) -> Option<&ActionReceipt> {
        self.action.as_ref()
    }

    fn advance(&mut self, next: GatewayState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal gateway transition {:?} -> {next:?}",
            self.state
        );
        #[cfg(feature = "telemetry")]
        tracing::debug!(from = ?self.state, to = ?next, "gateway transition");
        self.state = next;
        self.history.push(next);
    }
}

/// A successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Settlement that paid for the action.
    pub receipt: SettlementReceipt,
    /// The action's result.
    pub action: ActionReceipt,
}

/// What the HTTP layer should answer.
#[derive(Debug)]
pub enum GatewayOutcome {
    /// Paid and executed.
    Completed(Completion),
    /// Re-issue the 402 challenge.
    PaymentRequired {
        /// Why the payment was refused.
        error: GatewayError,
        /// The challenge's requirements.
        accepts: Vec<PaymentRequirements>,
    },
    /// Any other failure.
    Failed(GatewayError),
}

/// Drives calls through the payment pipeline.
#[derive(Debug)]
pub struct Gateway<F, L> {
    verifier: PaymentVerifier<F>,
    coordinator: SettlementCoordinator<F>,
    actuator: Arc<L>,
    config: GatewayConfig,
}

impl<F, L> Clone for Gateway<F, L> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            coordinator: self.coordinator.clone(),
            actuator: Arc::clone(&self.actuator),
            config: self.config,
        }
    }
}

impl<F: Facilitator, L: LedgerActuator> Gateway<F, L> {
    /// Builds a gateway with a fresh nonce map.
    pub fn new(facilitator: Arc<F>, actuator: Arc<L>, config: GatewayConfig) -> Self {
        Self {
            verifier: PaymentVerifier::new(Arc::clone(&facilitator))
                .with_default_timeout(config.default_timeout),
            coordinator: SettlementCoordinator::new(facilitator)
                .with_default_timeout(config.default_timeout),
            actuator,
            config,
        }
    }

    /// The gateway's settings.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The settlement coordinator, for replay lookups and purging.
    #[must_use]
    pub const fn coordinator(&self) -> &SettlementCoordinator<F> {
        &self.coordinator
    }

    /// Runs one call challenged with `accepts` and maps it to an outcome.
    pub async fn process(
        &self,
        header: Option<&[u8]>,
        accepts: Vec<PaymentRequirements>,
        action: &L::Action,
    ) -> GatewayOutcome {
        let mut request = GatewayRequest::new(accepts);
        match self.run(&mut request, header, action).await {
            Ok(completion) => GatewayOutcome::Completed(completion),
            Err(error) if error.kind().is_challenge() => GatewayOutcome::PaymentRequired {
                error,
                accepts: request.accepts,
            },
            Err(error) => GatewayOutcome::Failed(error),
        }
    }

    /// Drives `request` to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the [`GatewayError`] recorded in the request's final
    /// `Failed` state.
    pub async fn run(
        &self,
        request: &mut GatewayRequest,
        header: Option<&[u8]>,
        action: &L::Action,
    ) -> GatewayResult<Completion> {
        let result = self.drive(request, header, action).await;
        if let Err(err) = &result {
            request.advance(GatewayState::Failed(err.kind()));
        }
        result
    }

    async fn drive(
        &self,
        request: &mut GatewayRequest,
        header: Option<&[u8]>,
        action: &L::Action,
    ) -> GatewayResult<Completion> {
        let header = header.ok_or(GatewayError::MissingPayment)?;

        request.advance(GatewayState::Decoding);
        let payload = codec::decode_payment(header).map_err(GatewayError::MalformedPayload)?;

        request.advance(GatewayState::Matching);
        let selection = matcher::select(&request.accepts, &payload, self.config.match_policy)
            .ok_or_else(|| GatewayError::NoMatchingRequirement {
                scheme: payload.scheme.clone(),
                network: payload.network.clone(),
            })?;
        #[cfg(feature = "telemetry")]
        {
            if !selection.exact {
                tracing::warn!(
                    kind = %FailureKind::NoMatchingRequirement,
                    scheme = %payload.scheme,
                    network = %payload.network,
                    "no exact requirement match, falling back to the first requirement"
                );
            }
        }
        let requirements = request.accepts[selection.index].clone();
        request.selected = Some(selection);
        request.payload = Some(payload.clone());

        match self
            .coordinator
            .lookup(&NonceKey::from_payment(&payload, &requirements))
            .await
        {
            NonceStatus::Unseen => {}
            NonceStatus::Settled { receipt, action } => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    payer = %payload.payer(),
                    transaction = %receipt.transaction,
                    "payment replayed"
                );
                request.receipt = Some(receipt.clone());
                return Err(replayed(receipt, action));
            }
            NonceStatus::Ambiguous(reason) => {
                return Err(GatewayError::SettlementAmbiguous(reason));
            }
        }

        request.advance(GatewayState::Verifying);
        let verification = self.verifier.verify(&payload, &requirements).await?;
        request.verification = Some(verification.clone());
        if let VerificationResult::Invalid {
            reason,
            message,
            payer,
        } = verification
        {
            return Err(GatewayError::InvalidPayment {
                reason,
                message,
                payer,
            });
        }
        request.advance(GatewayState::Verified);

        request.advance(GatewayState::Settling);
        let actuator = Arc::clone(&self.actuator);
        let action = action.clone();
        let action_timeout = self.config.action_timeout;
        let settlement = self
            .coordinator
            .settle_then(&payload, &requirements, move |receipt| async move {
                execute(actuator.as_ref(), &action, &receipt, action_timeout).await
            })
            .await?;
        request.receipt = Some(settlement.receipt.clone());
        if settlement.replayed {
            return Err(replayed(settlement.receipt, settlement.action));
        }
        let receipt = settlement.receipt;
        request.advance(GatewayState::Settled);

        request.advance(GatewayState::Executing);
        match settlement.action {
            ActionOutcome::Completed(done) => {
                request.action = Some(done.clone());
                request.advance(GatewayState::Completed);
                Ok(Completion {
                    receipt,
                    action: done,
                })
            }
            ActionOutcome::Failed(message) => Err(GatewayError::ActionExecutionFailed {
                message,
                receipt: Box::new(receipt),
            }),
            ActionOutcome::Pending => Err(GatewayError::ActionExecutionFailed {
                message: ACTION_INCOMPLETE.to_owned(),
                receipt: Box::new(receipt),
            }),
        }
    }
}

/// Runs the paid action within `timeout`. Runs inside the settlement task,
/// so a failure is logged for reconciliation even when the caller is gone.
async fn execute<L: LedgerActuator>(
    actuator: &L,
    action: &L::Action,
    receipt: &SettlementReceipt,
    timeout: Duration,
) -> ActionOutcome {
    let failure = match tokio::time::timeout(timeout, actuator.execute(action, receipt)).await {
        Ok(Ok(done)) if done.confirmed => return ActionOutcome::Completed(done),
        Ok(Ok(done)) => format!("transaction {} was not confirmed", done.transaction),
        Ok(Err(err)) => err.to_string(),
        Err(_) => format!("action timed out after {}s", timeout.as_secs()),
    };
    #[cfg(feature = "telemetry")]
    tracing::error!(
        payer = %receipt.payer,
        settlement = %receipt.transaction,
        error = %failure,
        "action failed after settlement, payment needs reconciliation"
    );
    ActionOutcome::Failed(failure)
}

/// Error for a nonce that settled earlier. A completed action makes the
/// call a replay; a failed or interrupted one is reported again as a failed
/// action, with the original receipt.
fn replayed(receipt: SettlementReceipt, action: ActionOutcome) -> GatewayError {
    let message = match action {
        ActionOutcome::Completed(_) => {
            return GatewayError::PaymentReplayed {
                receipt: Box::new(receipt),
            };
        }
        ActionOutcome::Failed(message) => message,
        ActionOutcome::Pending => ACTION_INCOMPLETE.to_owned(),
    };
    GatewayError::ActionExecutionFailed {
        message,
        receipt: Box::new(receipt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::MintAction;
    use crate::error::Charged;
    use crate::testing::{
        ActuatorMode, FakeActuator, FakeFacilitator, SettleMode, header, payload, requirement,
    };
    use alloy_primitives::Address;

    type TestGateway = Gateway<FakeFacilitator, FakeActuator>;

    fn gateway(
        facilitator: &Arc<FakeFacilitator>,
        actuator: &Arc<FakeActuator>,
        config: GatewayConfig,
    ) -> TestGateway {
        Gateway::new(Arc::clone(facilitator), Arc::clone(actuator), config)
    }

    fn fakes() -> (Arc<FakeFacilitator>, Arc<FakeActuator>) {
        (
            Arc::new(FakeFacilitator::default()),
            Arc::new(FakeActuator::default()),
        )
    }

    const MINT: MintAction = MintAction {
        recipient: None,
        quantity: 1,
    };

    #[test]
    fn transition_table() {
        use GatewayState::*;
        assert!(Unauthorized.can_transition_to(Decoding));
        assert!(Executing.can_transition_to(Completed));
        assert!(Matching.can_transition_to(Failed(FailureKind::PaymentReplayed)));
        assert!(!Unauthorized.can_transition_to(Verifying));
        assert!(!Settled.can_transition_to(Settling));
        assert!(!Completed.can_transition_to(Failed(FailureKind::ActionExecutionFailed)));
        assert!(!Failed(FailureKind::MissingPayment).can_transition_to(Decoding));
    }

    #[tokio::test]
    async fn missing_header_is_a_challenge() {
        let (facilitator, actuator) = fakes();
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let accepts = vec![requirement(100_000)];

        let outcome = gw.process(None, accepts.clone(), &MINT).await;
        match outcome {
            GatewayOutcome::PaymentRequired { error, accepts: got } => {
                assert!(matches!(error, GatewayError::MissingPayment));
                assert_eq!(got, accepts);
            }
            other => panic!("expected challenge, got {other:?}"),
        }
        assert_eq!(facilitator.verify_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_header_fails_in_decoding() {
        let (facilitator, actuator) = fakes();
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let mut request = GatewayRequest::new(vec![requirement(100_000)]);

        let err = gw
            .run(&mut request, Some(b"%%%not-base64"), &MINT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedPayload);
        assert_eq!(
            request.history(),
            &[
                GatewayState::Unauthorized,
                GatewayState::Decoding,
                GatewayState::Failed(FailureKind::MalformedPayload),
            ]
        );
    }

    #[tokio::test]
    async fn happy_path_settles_then_mints() {
        let (facilitator, actuator) = fakes();
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let mut request = GatewayRequest::new(vec![requirement(100_000)]);
        let h = header(&payload(100_000, 1));

        let done = gw.run(&mut request, Some(h.as_bytes()), &MINT).await.unwrap();
        assert!(done.receipt.success);
        assert_eq!(done.receipt.amount, 100_000u64.into());
        assert_eq!(done.receipt.payer, Address::repeat_byte(0x11));
        assert!(done.action.confirmed);
        assert_eq!(request.state(), GatewayState::Completed);
        assert_eq!(request.history().len(), 9);
        assert_eq!(facilitator.settle_calls(), 1);
        assert_eq!(actuator.calls(), 1);
        assert_eq!(actuator.last_recipient(), Some(Address::repeat_byte(0x11)));
    }

    #[tokio::test]
    async fn underpayment_is_rejected_before_settlement() {
        let (facilitator, actuator) = fakes();
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(50_000, 1));

        match gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await
        {
            GatewayOutcome::PaymentRequired { error, .. } => {
                assert!(matches!(
                    error,
                    GatewayError::InvalidPayment { ref reason, .. }
                        if reason == "invalid_exact_evm_payload_authorization_value"
                ));
                let payer = Address::repeat_byte(0x11).to_string();
                assert_eq!(error.payer(), Some(payer.as_str()));
            }
            other => panic!("expected challenge, got {other:?}"),
        }
        assert_eq!(facilitator.settle_calls(), 0);
        assert_eq!(actuator.calls(), 0);
    }

    #[tokio::test]
    async fn action_failure_after_settlement_reports_the_charge() {
        let facilitator = Arc::new(FakeFacilitator::default());
        let actuator = Arc::new(FakeActuator::with_mode(ActuatorMode::Fail));
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(100_000, 1));

        let outcome = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await;
        let GatewayOutcome::Failed(error) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.kind(), FailureKind::ActionExecutionFailed);
        assert_eq!(error.charged(), Charged::Yes);
        assert!(error.receipt().is_some());
    }

    #[tokio::test]
    async fn retry_after_failed_action_reports_the_failure_again() {
        let facilitator = Arc::new(FakeFacilitator::default());
        let actuator = Arc::new(FakeActuator::with_mode(ActuatorMode::Fail));
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(100_000, 4));

        let GatewayOutcome::Failed(first) = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await
        else {
            panic!("expected failure");
        };

        let mut request = GatewayRequest::new(vec![requirement(100_000)]);
        let again = gw.run(&mut request, Some(h.as_bytes()), &MINT).await.unwrap_err();
        assert_eq!(again.kind(), FailureKind::ActionExecutionFailed);
        assert_eq!(again.charged(), Charged::Yes);
        assert_eq!(again.receipt(), first.receipt());
        assert_eq!(again.to_string(), first.to_string());
        assert!(!request.history().contains(&GatewayState::Verifying));
        assert_eq!(facilitator.settle_calls(), 1);
        assert_eq!(actuator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_after_verification_still_mints() {
        let facilitator =
            Arc::new(FakeFacilitator::default().with_delay(Duration::from_millis(100)));
        let actuator = Arc::new(FakeActuator::default());
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let p = payload(100_000, 5);
        let h = header(&p);

        let caller = {
            let gw = gw.clone();
            let h = h.clone();
            tokio::spawn(async move {
                gw.process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(facilitator.settle_calls(), 1);
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        let key = NonceKey::from_payment(&p, &requirement(100_000));
        let NonceStatus::Settled { receipt, action } = gw.coordinator().lookup(&key).await else {
            panic!("nonce must be settled");
        };
        assert!(matches!(action, ActionOutcome::Completed(ref done) if done.confirmed));
        assert_eq!(actuator.calls(), 1);

        let retry = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await;
        let GatewayOutcome::Failed(error) = retry else {
            panic!("expected replay");
        };
        assert_eq!(error.kind(), FailureKind::PaymentReplayed);
        assert_eq!(error.receipt(), Some(&receipt));
        assert_eq!(facilitator.settle_calls(), 1);
        assert_eq!(actuator.calls(), 1);
    }

    #[tokio::test]
    async fn unconfirmed_action_is_a_failure() {
        let facilitator = Arc::new(FakeFacilitator::default());
        let actuator = Arc::new(FakeActuator::with_mode(ActuatorMode::Unconfirmed));
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(100_000, 1));
        let mut request = GatewayRequest::new(vec![requirement(100_000)]);

        let err = gw.run(&mut request, Some(h.as_bytes()), &MINT).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ActionExecutionFailed);
        assert!(request.receipt().is_some());
        assert!(request.action().is_none());
    }

    #[tokio::test]
    async fn replay_returns_stored_receipt_without_second_action() {
        let (facilitator, actuator) = fakes();
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(100_000, 1));

        let GatewayOutcome::Completed(first) = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await
        else {
            panic!("first call must complete");
        };

        let mut request = GatewayRequest::new(vec![requirement(100_000)]);
        let err = gw.run(&mut request, Some(h.as_bytes()), &MINT).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::PaymentReplayed);
        assert_eq!(err.receipt(), Some(&first.receipt));
        assert_eq!(
            request.history().last(),
            Some(&GatewayState::Failed(FailureKind::PaymentReplayed))
        );
        assert!(!request.history().contains(&GatewayState::Verifying));
        assert_eq!(facilitator.verify_calls(), 1);
        assert_eq!(facilitator.settle_calls(), 1);
        assert_eq!(actuator.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_mint_once() {
        let facilitator =
            Arc::new(FakeFacilitator::default().with_delay(Duration::from_millis(30)));
        let actuator = Arc::new(FakeActuator::default());
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(100_000, 2));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gw = gw.clone();
                let h = h.clone();
                tokio::spawn(async move {
                    gw.process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
                        .await
                })
            })
            .collect();

        let mut completed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                GatewayOutcome::Completed(_) => completed += 1,
                GatewayOutcome::Failed(err) => {
                    assert_eq!(err.kind(), FailureKind::PaymentReplayed);
                }
                other @ GatewayOutcome::PaymentRequired { .. } => {
                    panic!("unexpected {other:?}")
                }
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(facilitator.settle_calls(), 1);
        assert_eq!(actuator.calls(), 1);
    }

    #[tokio::test]
    async fn strict_policy_rejects_unknown_network() {
        let (facilitator, actuator) = fakes();
        let config = GatewayConfig {
            match_policy: MatchPolicy::Strict,
            ..GatewayConfig::default()
        };
        let gw = gateway(&facilitator, &actuator, config);
        let mut p = payload(100_000, 1);
        p.network = "polygon".into();
        let h = header(&p);

        let outcome = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await;
        assert!(matches!(
            outcome,
            GatewayOutcome::PaymentRequired {
                error: GatewayError::NoMatchingRequirement { .. },
                ..
            }
        ));
        assert_eq!(facilitator.verify_calls(), 0);
    }

    #[tokio::test]
    async fn fallback_policy_lets_the_facilitator_decide() {
        let (facilitator, actuator) = fakes();
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let mut p = payload(100_000, 1);
        p.network = "polygon".into();
        let h = header(&p);
        let mut request = GatewayRequest::new(vec![requirement(100_000)]);

        gw.run(&mut request, Some(h.as_bytes()), &MINT).await.unwrap();
        assert_eq!(
            request.selection(),
            Some(Selection {
                index: 0,
                exact: false
            })
        );
        assert_eq!(facilitator.verify_calls(), 1);
    }

    #[tokio::test]
    async fn unavailable_facilitator_is_not_a_challenge() {
        let facilitator = Arc::new(FakeFacilitator::default().unreachable());
        let actuator = Arc::new(FakeActuator::default());
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(100_000, 1));

        let outcome = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await;
        let GatewayOutcome::Failed(error) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.kind(), FailureKind::FacilitatorUnavailable);
        assert_eq!(error.charged(), Charged::No);
    }

    #[tokio::test]
    async fn ambiguous_nonce_is_not_reverified() {
        let (facilitator, actuator) = fakes();
        facilitator.set_settle_mode(SettleMode::LoseResponse);
        let gw = gateway(&facilitator, &actuator, GatewayConfig::default());
        let h = header(&payload(100_000, 3));

        let first = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await;
        assert!(matches!(
            first,
            GatewayOutcome::Failed(GatewayError::SettlementAmbiguous(_))
        ));

        facilitator.set_settle_mode(SettleMode::Succeed);
        let second = gw
            .process(Some(h.as_bytes()), vec![requirement(100_000)], &MINT)
            .await;
        let GatewayOutcome::Failed(error) = second else {
            panic!("expected failure");
        };
        assert_eq!(error.charged(), Charged::Unknown);
        assert_eq!(facilitator.verify_calls(), 1);
        assert_eq!(facilitator.settle_calls(), 1);
        assert_eq!(actuator.calls(), 0);
    }
}
