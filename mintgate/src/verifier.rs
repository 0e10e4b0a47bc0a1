//! Timeout-bounded payment verification.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::DEFAULT_MAX_TIMEOUT_SECONDS;
use crate::error::{GatewayError, GatewayResult};
use crate::facilitator::Facilitator;
use crate::proto::{PaymentPayload, PaymentRequirements, VerificationResult};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// How long to wait on the facilitator for `requirements`.
///
/// Uses `maxTimeoutSeconds`, or `default` when the requirement leaves it at 0.
#[must_use]
pub const fn effective_timeout(requirements: &PaymentRequirements, default: Duration) -> Duration {
    if requirements.max_timeout_seconds == 0 {
        default
    } else {
        Duration::from_secs(requirements.max_timeout_seconds)
    }
}

/// Asks the facilitator whether a payload satisfies a requirement.
///
/// Side-effect free: a rejected payment is a [`VerificationResult::Invalid`]
/// value, a facilitator that cannot answer is
/// [`GatewayError::FacilitatorUnavailable`].
#[derive(Debug)]
pub struct PaymentVerifier<F> {
    facilitator: Arc<F>,
    default_timeout: Duration,
}

impl<F> Clone for PaymentVerifier<F> {
    fn clone(&self) -> Self {
        Self {
            facilitator: Arc::clone(&self.facilitator),
            default_timeout: self.default_timeout,
        }
    }
}

impl<F: Facilitator> PaymentVerifier<F> {
    /// Creates a verifier with the default 60 second timeout.
    pub fn new(facilitator: Arc<F>) -> Self {
        Self {
            facilitator,
            default_timeout: Duration::from_secs(DEFAULT_MAX_TIMEOUT_SECONDS),
        }
    }

    /// Overrides the timeout used for requirements without one.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Verifies `payload` against `requirements`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::FacilitatorUnavailable`] on transport errors,
    /// unexpected statuses, undecodable replies and timeouts.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mintgate.verify", skip_all, fields(network = %requirements.network), err)
    )]
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> GatewayResult<VerificationResult> {
        let timeout = effective_timeout(requirements, self.default_timeout);
        match tokio::time::timeout(timeout, self.facilitator.verify(payload, requirements)).await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(GatewayError::FacilitatorUnavailable(err.to_string())),
            Err(_) => Err(GatewayError::FacilitatorUnavailable(format!(
                "verify timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}
