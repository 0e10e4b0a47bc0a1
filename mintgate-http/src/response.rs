//! HTTP rendering of gateway outcomes.
//!
//! | failure | status |
//! |---|---|
//! | missing/malformed payment, no match, rejected payment | 402 + `accepts` |
//! | facilitator unavailable | 503 |
//! | settlement failed | 502 |
//! | settlement ambiguous | 504 |
//! | action failed after settlement | 500 + receipt |
//! | payment replayed | 409 + receipt |
//!
//! Responses carrying a receipt also carry it base64-encoded in
//! `X-PAYMENT-RESPONSE`.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderValue, StatusCode};
use mintgate::codec;
use mintgate::error::{Charged, FailureKind, GatewayError};
use mintgate::proto::{PaymentRequired, PaymentRequirements, SettlementReceipt};
use serde::Serialize;

use crate::constants::X_PAYMENT_RESPONSE_HEADER;

/// HTTP status for a failure kind.
#[must_use]
pub const fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::MissingPayment
        | FailureKind::MalformedPayload
        | FailureKind::NoMatchingRequirement
        | FailureKind::InvalidPayment => StatusCode::PAYMENT_REQUIRED,
        FailureKind::FacilitatorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::SettlementFailed => StatusCode::BAD_GATEWAY,
        FailureKind::SettlementAmbiguous => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::ActionExecutionFailed => StatusCode::INTERNAL_SERVER_ERROR,
        FailureKind::PaymentReplayed => StatusCode::CONFLICT,
    }
}

/// Headers announcing `receipt` in `X-PAYMENT-RESPONSE`.
///
/// Empty if the receipt cannot be encoded.
#[must_use]
pub fn receipt_headers(receipt: &SettlementReceipt) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match codec::encode_receipt(receipt)
        .ok()
        .and_then(|encoded| HeaderValue::from_str(&encoded).ok())
    {
        Some(value) => {
            headers.insert(X_PAYMENT_RESPONSE_HEADER, value);
        }
        None => {
            #[cfg(feature = "telemetry")]
            tracing::error!(transaction = %receipt.transaction, "failed to encode X-PAYMENT-RESPONSE");
        }
    }
    headers
}

/// A 402 challenge.
#[derive(Debug, Clone)]
pub struct Challenge(pub PaymentRequired);

impl IntoResponse for Challenge {
    fn into_response(self) -> Response {
        (StatusCode::PAYMENT_REQUIRED, Json(self.0)).into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureBody<'a> {
    error: FailureKind,
    message: String,
    charged: Charged,
    #[serde(skip_serializing_if = "Option::is_none")]
    settlement: Option<&'a SettlementReceipt>,
}

/// A failed gated call, rendered per the status table above.
#[derive(Debug)]
pub struct Rejection {
    error: GatewayError,
    accepts: Vec<PaymentRequirements>,
}

impl Rejection {
    /// Pairs an error with the requirements a 402 would re-advertise.
    #[must_use]
    pub const fn new(error: GatewayError, accepts: Vec<PaymentRequirements>) -> Self {
        Self { error, accepts }
    }

    /// The underlying error.
    #[must_use]
    pub const fn error(&self) -> &GatewayError {
        &self.error
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        if kind.is_challenge() {
            let error = match &self.error {
                GatewayError::InvalidPayment { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            let payer = self.error.payer().map(str::to_owned);
            return Challenge(PaymentRequired::new(error, self.accepts).with_payer(payer))
                .into_response();
        }

        let receipt = self.error.receipt();
        let headers = receipt.map(receipt_headers).unwrap_or_default();
        let body = FailureBody {
            error: kind,
            message: self.error.to_string(),
            charged: kind.charged(),
            settlement: receipt,
        };
        (status_for(kind), headers, Json(body)).into_response()
    }
}
