//! Exactly-once settlement per payment nonce.
//!
//! Every `(payer, asset, nonce)` gets a slot in a concurrent map. The slot's
//! async lock serializes settlement attempts for that nonce within this
//! process:
//!
//! - **Vacant**: the lock holder calls the facilitator.
//! - **Settled**: the stored receipt and action outcome are returned,
//!   flagged as replayed.
//! - **Ambiguous**: the outcome of an earlier attempt is unknown; the nonce
//!   is never resubmitted and needs reconciliation.
//!
//! Settlement and the action it pays for run in one spawned task that keeps
//! the slot locked until the action's outcome is recorded. A client
//! disconnecting mid-call therefore cannot abandon a transfer the
//! facilitator is already executing, nor the action that transfer paid for.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::actuator::ActionReceipt;
use crate::catalog::DEFAULT_MAX_TIMEOUT_SECONDS;
use crate::error::{GatewayError, GatewayResult};
use crate::facilitator::{Facilitator, FacilitatorFault};
use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse, SettlementReceipt};
use crate::timestamp::UnixTimestamp;
use crate::verifier::effective_timeout;

/// Settlement failure reason when the facilitator was never reached.
pub const FACILITATOR_UNREACHABLE: &str = "facilitator_unreachable";

/// Identity of a payment authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonceKey {
    /// The payer.
    pub payer: Address,
    /// The token being transferred.
    pub asset: Address,
    /// EIP-3009 nonce.
    pub nonce: B256,
}

impl NonceKey {
    /// Key of `payload` when settled against `requirements`.
    #[must_use]
    pub const fn from_payment(payload: &PaymentPayload, requirements: &PaymentRequirements) -> Self {
        Self {
            payer: payload.payload.authorization.from,
            asset: requirements.asset,
            nonce: payload.payload.authorization.nonce,
        }
    }
}

/// What became of the action a settlement paid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Not run, or interrupted before an outcome was known.
    Pending,
    /// Ran and confirmed.
    Completed(ActionReceipt),
    /// Failed after the funds moved.
    Failed(String),
}

/// What this process knows about a nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonceStatus {
    /// Never settled, or every attempt failed cleanly.
    Unseen,
    /// Settled; the receipt and the action's outcome are stored.
    Settled {
        /// Settlement receipt.
        receipt: SettlementReceipt,
        /// Outcome of the paid action.
        action: ActionOutcome,
    },
    /// An attempt ended without a known outcome.
    Ambiguous(String),
}

#[derive(Debug)]
enum SlotState {
    Vacant,
    Settled {
        receipt: SettlementReceipt,
        action: ActionOutcome,
    },
    Ambiguous(String),
}

#[derive(Debug)]
struct NonceSlot {
    valid_before: UnixTimestamp,
    state: Mutex<SlotState>,
}

/// A successful settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The receipt.
    pub receipt: SettlementReceipt,
    /// `true` when the receipt comes from an earlier settlement of the same
    /// nonce and the facilitator was not called.
    pub replayed: bool,
    /// Outcome of the paid action, stored or fresh.
    pub action: ActionOutcome,
}

/// Settles verified payments at most once per nonce.
#[derive(Debug)]
pub struct SettlementCoordinator<F> {
    facilitator: Arc<F>,
    slots: Arc<DashMap<NonceKey, Arc<NonceSlot>>>,
    default_timeout: Duration,
}

impl<F> Clone for SettlementCoordinator<F> {
    fn clone(&self) -> Self {
        Self {
            facilitator: Arc::clone(&self.facilitator),
            slots: Arc::clone(&self.slots),
            default_timeout: self.default_timeout,
        }
    }
}

impl<F: Facilitator> SettlementCoordinator<F> {
    /// Creates a coordinator with an empty nonce map.
    pub fn new(facilitator: Arc<F>) -> Self {
        Self {
            facilitator,
            slots: Arc::new(DashMap::new()),
            default_timeout: Duration::from_secs(DEFAULT_MAX_TIMEOUT_SECONDS),
        }
    }

    /// Overrides the timeout used for requirements without one.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Number of tracked nonces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no nonce is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reports what is known about `key` without settling.
    ///
    /// Waits for an in-flight settlement of the same nonce, and the action
    /// it pays for, to finish.
    pub async fn lookup(&self, key: &NonceKey) -> NonceStatus {
        let Some(slot) = self.slots.get(key).map(|entry| Arc::clone(entry.value())) else {
            return NonceStatus::Unseen;
        };
        let state = slot.state.lock().await;
        match &*state {
            SlotState::Vacant => NonceStatus::Unseen,
            SlotState::Settled { receipt, action } => NonceStatus::Settled {
                receipt: receipt.clone(),
                action: action.clone(),
            },
            SlotState::Ambiguous(reason) => NonceStatus::Ambiguous(reason.clone()),
        }
    }

    /// Settles `payload` against `requirements` without running an action.
    ///
    /// The nonce is recorded with [`ActionOutcome::Pending`].
    ///
    /// # Errors
    ///
    /// As [`settle_then`](Self::settle_then).
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> GatewayResult<Settlement> {
        self.settle_then(payload, requirements, |_| {
            std::future::ready(ActionOutcome::Pending)
        })
        .await
    }

    /// Settles `payload` against `requirements`, then runs `action` with
    /// the fresh receipt and records its outcome against the nonce. If the
    /// nonce already settled, the stored receipt and outcome are returned
    /// and `action` is dropped unrun.
    ///
    /// Both steps run in a spawned task. Dropping the returned future does
    /// not cancel them.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::SettlementFailed`] when the facilitator reported
    ///   failure or was never reached. The nonce may be retried.
    /// - [`GatewayError::SettlementAmbiguous`] when the outcome is unknown,
    ///   now or from an earlier attempt.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "mintgate.settle",
            skip_all,
            fields(payer = %payload.payer(), nonce = %payload.payload.authorization.nonce),
            err
        )
    )]
    pub async fn settle_then<A, Fut>(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        action: A,
    ) -> GatewayResult<Settlement>
    where
        A: FnOnce(SettlementReceipt) -> Fut + Send + 'static,
        Fut: Future<Output = ActionOutcome> + Send + 'static,
    {
        let key = NonceKey::from_payment(payload, requirements);
        let valid_before = payload.payload.authorization.valid_before;
        let slot = {
            let entry = self.slots.entry(key).or_insert_with(|| {
                Arc::new(NonceSlot {
                    valid_before,
                    state: Mutex::new(SlotState::Vacant),
                })
            });
            Arc::clone(entry.value())
        };

        let task = settle_slot(
            Arc::clone(&self.facilitator),
            slot,
            payload.clone(),
            requirements.clone(),
            effective_timeout(requirements, self.default_timeout),
            action,
        );
        tokio::spawn(task)
            .await
            .map_err(|e| GatewayError::SettlementAmbiguous(format!("settlement task aborted: {e}")))?
    }

    /// Forgets nonces whose authorization expired before `now`.
    ///
    /// An expired authorization can no longer move funds, so its slot is no
    /// longer needed for replay protection. Slots still referenced by an
    /// in-flight call are kept.
    pub fn purge_expired(&self, now: UnixTimestamp) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| slot.valid_before > now || Arc::strong_count(slot) > 1);
        let purged = before.saturating_sub(self.slots.len());
        #[cfg(feature = "telemetry")]
        {
            if purged > 0 {
                tracing::debug!(purged, remaining = self.slots.len(), "purged expired nonces");
            }
        }
        purged
    }
}

async fn settle_slot<F, A, Fut>(
    facilitator: Arc<F>,
    slot: Arc<NonceSlot>,
    payload: PaymentPayload,
    requirements: PaymentRequirements,
    timeout: Duration,
    action: A,
) -> GatewayResult<Settlement>
where
    F: Facilitator,
    A: FnOnce(SettlementReceipt) -> Fut,
    Fut: Future<Output = ActionOutcome>,
{
    let mut state = slot.state.lock().await;
    match &*state {
        SlotState::Settled { receipt, action } => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(
                payer = %payload.payer(),
                transaction = %receipt.transaction,
                "nonce already settled, returning stored receipt"
            );
            return Ok(Settlement {
                receipt: receipt.clone(),
                replayed: true,
                action: action.clone(),
            });
        }
        SlotState::Ambiguous(reason) => {
            return Err(GatewayError::SettlementAmbiguous(reason.clone()));
        }
        SlotState::Vacant => {}
    }

    let outcome =
        tokio::time::timeout(timeout, facilitator.settle(&payload, &requirements)).await;
    let settled = match outcome {
        Err(_) => Err(GatewayError::SettlementAmbiguous(format!(
            "settle timed out after {}s",
            timeout.as_secs()
        ))),
        Ok(Err(err)) if err.not_processed() => Err(GatewayError::SettlementFailed {
            reason: FACILITATOR_UNREACHABLE.to_owned(),
            message: Some(err.to_string()),
        }),
        Ok(Err(err)) => Err(GatewayError::SettlementAmbiguous(err.to_string())),
        Ok(Ok(SettleResponse::Error {
            reason, message, ..
        })) => Err(GatewayError::SettlementFailed { reason, message }),
        Ok(Ok(SettleResponse::Success {
            transaction,
            network,
            ..
        })) => Ok(SettlementReceipt {
            success: true,
            transaction,
            network,
            payer: payload.payer(),
            amount: payload.payload.authorization.value,
        }),
    };

    let receipt = match settled {
        Ok(receipt) => receipt,
        Err(GatewayError::SettlementAmbiguous(reason)) => {
            #[cfg(feature = "telemetry")]
            tracing::error!(
                payer = %payload.payer(),
                asset = %requirements.asset,
                nonce = %payload.payload.authorization.nonce,
                reason = %reason,
                "settlement outcome unknown, nonce needs reconciliation"
            );
            *state = SlotState::Ambiguous(reason.clone());
            return Err(GatewayError::SettlementAmbiguous(reason));
        }
        Err(err) => return Err(err),
    };

    // Stays pending if the action panics.
    *state = SlotState::Settled {
        receipt: receipt.clone(),
        action: ActionOutcome::Pending,
    };
    let action = action(receipt.clone()).await;
    *state = SlotState::Settled {
        receipt: receipt.clone(),
        action: action.clone(),
    };
    Ok(Settlement {
        receipt,
        replayed: false,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFacilitator, SettleMode, payload, requirement};

    fn coordinator(facilitator: &Arc<FakeFacilitator>) -> SettlementCoordinator<FakeFacilitator> {
        SettlementCoordinator::new(Arc::clone(facilitator))
    }

    #[tokio::test]
    async fn second_settlement_of_a_nonce_is_replayed() {
        let facilitator = Arc::new(FakeFacilitator::default());
        let coordinator = coordinator(&facilitator);
        let (p, r) = (payload(100_000, 1), requirement(100_000));

        let first = coordinator.settle(&p, &r).await.unwrap();
        assert!(!first.replayed);
        let second = coordinator.settle(&p, &r).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.receipt, first.receipt);
        assert_eq!(facilitator.settle_calls(), 1);
        assert_eq!(
            coordinator.lookup(&NonceKey::from_payment(&p, &r)).await,
            NonceStatus::Settled {
                receipt: first.receipt,
                action: ActionOutcome::Pending,
            }
        );
    }

    #[tokio::test]
    async fn action_outcome_is_stored_with_the_receipt() {
        let facilitator = Arc::new(FakeFacilitator::default());
        let coordinator = coordinator(&facilitator);
        let (p, r) = (payload(100_000, 10), requirement(100_000));

        let first = coordinator
            .settle_then(&p, &r, |receipt| async move {
                ActionOutcome::Failed(format!("mint for {} reverted", receipt.payer))
            })
            .await
            .unwrap();
        assert!(matches!(first.action, ActionOutcome::Failed(_)));

        let second = coordinator
            .settle_then(&p, &r, |_| -> std::future::Ready<ActionOutcome> {
                panic!("action must not run twice")
            })
            .await
            .unwrap();
        assert!(second.replayed);
        assert_eq!(second.action, first.action);
        assert_eq!(facilitator.settle_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_does_not_cancel_settlement() {
        let facilitator =
            Arc::new(FakeFacilitator::default().with_delay(Duration::from_millis(100)));
        let coordinator = coordinator(&facilitator);
        let (p, r) = (payload(100_000, 11), requirement(100_000));

        let caller = {
            let coordinator = coordinator.clone();
            let (p, r) = (p.clone(), r.clone());
            tokio::spawn(async move { coordinator.settle(&p, &r).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        let status = coordinator.lookup(&NonceKey::from_payment(&p, &r)).await;
        assert!(matches!(status, NonceStatus::Settled { .. }));
        assert_eq!(facilitator.settle_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_settlements_call_the_facilitator_once() {
        let facilitator =
            Arc::new(FakeFacilitator::default().with_delay(Duration::from_millis(50)));
        let coordinator = coordinator(&facilitator);
        let (p, r) = (payload(100_000, 9), requirement(100_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                let (p, r) = (p.clone(), r.clone());
                tokio::spawn(async move { coordinator.settle(&p, &r).await })
            })
            .collect();

        let mut fresh = 0;
        let mut receipts = Vec::new();
        for handle in handles {
            let settlement = handle.await.unwrap().unwrap();
            if !settlement.replayed {
                fresh += 1;
            }
            receipts.push(settlement.receipt);
        }
        assert_eq!(fresh, 1);
        assert_eq!(facilitator.settle_calls(), 1);
        assert!(receipts.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn distinct_nonces_settle_independently() {
        let facilitator = Arc::new(FakeFacilitator::default());
        let coordinator = coordinator(&facilitator);
        let r = requirement(100_000);
        coordinator.settle(&payload(100_000, 1), &r).await.unwrap();
        coordinator.settle(&payload(100_000, 2), &r).await.unwrap();
        assert_eq!(facilitator.settle_calls(), 2);
        assert_eq!(coordinator.len(), 2);
    }

    #[tokio::test]
    async fn reported_failure_leaves_the_nonce_retryable() {
        let facilitator = Arc::new(FakeFacilitator::default());
        facilitator.set_settle_mode(SettleMode::Reject);
        let coordinator = coordinator(&facilitator);
        let (p, r) = (payload(100_000, 3), requirement(100_000));

        let err = coordinator.settle(&p, &r).await.unwrap_err();
        assert!(matches!(err, GatewayError::SettlementFailed { ref reason, .. } if reason == "insufficient_funds"));
        assert_eq!(
            coordinator.lookup(&NonceKey::from_payment(&p, &r)).await,
            NonceStatus::Unseen
        );

        facilitator.set_settle_mode(SettleMode::Succeed);
        let settlement = coordinator.settle(&p, &r).await.unwrap();
        assert!(!settlement.replayed);
        assert_eq!(facilitator.settle_calls(), 2);
    }

    #[tokio::test]
    async fn undelivered_request_is_a_clean_failure() {
        let facilitator = Arc::new(FakeFacilitator::default());
        facilitator.set_settle_mode(SettleMode::Unreachable);
        let coordinator = coordinator(&facilitator);
        let err = coordinator
            .settle(&payload(100_000, 4), &requirement(100_000))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SettlementFailed { ref reason, .. } if reason == FACILITATOR_UNREACHABLE));
    }

    #[tokio::test]
    async fn lost_response_is_sticky_ambiguity() {
        let facilitator = Arc::new(FakeFacilitator::default());
        facilitator.set_settle_mode(SettleMode::LoseResponse);
        let coordinator = coordinator(&facilitator);
        let (p, r) = (payload(100_000, 5), requirement(100_000));

        let err = coordinator.settle(&p, &r).await.unwrap_err();
        assert!(matches!(err, GatewayError::SettlementAmbiguous(_)));

        facilitator.set_settle_mode(SettleMode::Succeed);
        let err = coordinator.settle(&p, &r).await.unwrap_err();
        assert!(matches!(err, GatewayError::SettlementAmbiguous(_)));
        assert_eq!(facilitator.settle_calls(), 1);
        assert!(matches!(
            coordinator.lookup(&NonceKey::from_payment(&p, &r)).await,
            NonceStatus::Ambiguous(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_ambiguous() {
        let facilitator =
            Arc::new(FakeFacilitator::default().with_delay(Duration::from_secs(300)));
        let coordinator = coordinator(&facilitator);
        let mut r = requirement(100_000);
        r.max_timeout_seconds = 2;
        let err = coordinator
            .settle(&payload(100_000, 6), &r)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SettlementAmbiguous(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn expired_nonces_are_purged() {
        let facilitator = Arc::new(FakeFacilitator::default());
        let coordinator = coordinator(&facilitator);
        let r = requirement(100_000);
        let mut expiring = payload(100_000, 7);
        expiring.payload.authorization.valid_before = UnixTimestamp::from_secs(1_000);
        coordinator.settle(&expiring, &r).await.unwrap();
        coordinator.settle(&payload(100_000, 8), &r).await.unwrap();

        assert_eq!(coordinator.purge_expired(UnixTimestamp::from_secs(2_000)), 1);
        assert_eq!(coordinator.len(), 1);
        assert_eq!(
            coordinator
                .lookup(&NonceKey::from_payment(&expiring, &r))
                .await,
            NonceStatus::Unseen
        );
    }
}
