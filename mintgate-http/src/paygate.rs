//! Axum handlers for the paid mint endpoint.
//!
//! [`MintGate`] owns the immutable state built at startup: the gateway, the
//! requirement catalog and the offer. `POST /mint` prices the request by
//! quantity, runs it through the gateway and renders the outcome;
//! `GET /x402/scan` returns the challenge for a single mint so x402 scanners
//! can list the offer.

use std::sync::Arc;

use alloy_primitives::Address;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use http::{HeaderMap, HeaderValue, StatusCode};
use mintgate::actuator::{LedgerActuator, MintAction};
use mintgate::amount::Price;
use mintgate::catalog::{CatalogError, RequirementCatalog, ResourceInfo};
use mintgate::facilitator::Facilitator;
use mintgate::gateway::{Completion, Gateway, GatewayOutcome};
use mintgate::proto::{PaymentRequired, PaymentRequirements};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use url::Url;

use crate::constants::{PAYMENT_REQUIRED_ERROR, X_PAYMENT_HEADER};
use crate::response::{Challenge, Rejection, receipt_headers};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Path of the paid mint endpoint.
pub const MINT_PATH: &str = "/mint";

/// Path of the discovery endpoint.
pub const SCAN_PATH: &str = "/x402/scan";

/// Builds the [`ResourceInfo`] of a protected endpoint.
#[derive(Debug, Clone)]
pub struct ResourceInfoBuilder {
    /// Description of the protected resource
    pub description: String,
    /// MIME type of the protected resource
    pub mime_type: String,
    /// Optional explicit URL of the protected resource
    pub url: Option<String>,
}

impl Default for ResourceInfoBuilder {
    fn default() -> Self {
        Self {
            description: String::new(),
            mime_type: "application/json".to_string(),
            url: None,
        }
    }
}

impl ResourceInfoBuilder {
    /// Determines the resource URL.
    ///
    /// An explicit `url` wins. Otherwise `path` is resolved against
    /// `base_url`, falling back to the request's `Host` header.
    #[must_use]
    pub fn as_resource_info(
        &self,
        base_url: Option<&Url>,
        headers: &HeaderMap,
        path: &str,
    ) -> ResourceInfo {
        let url = self.url.clone().unwrap_or_else(|| {
            let host = headers
                .get(http::header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("localhost");
            let origin = base_url
                .cloned()
                .or_else(|| Url::parse(&format!("http://{host}")).ok());
            match origin {
                Some(mut url) => {
                    url.set_path(path);
                    url.set_query(None);
                    url.to_string()
                }
                None => format!("http://localhost{path}"),
            }
        });
        ResourceInfo {
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            url,
        }
    }
}

/// What is being sold.
#[derive(Debug, Clone)]
pub struct MintOffer {
    /// Price of one token.
    pub unit_price: Price,
    /// Largest quantity accepted in one call.
    pub max_quantity: u32,
    /// Description of the mint resource.
    pub resource: ResourceInfoBuilder,
}

/// Shared state of the mint handlers.
#[derive(Debug)]
pub struct MintGate<F, L> {
    gateway: Gateway<F, L>,
    catalog: Arc<RequirementCatalog>,
    offer: Arc<MintOffer>,
    base_url: Option<Url>,
}

impl<F, L> Clone for MintGate<F, L> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            catalog: Arc::clone(&self.catalog),
            offer: Arc::clone(&self.offer),
            base_url: self.base_url.clone(),
        }
    }
}

/// JSON body of `POST /mint`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MintRequest {
    /// Recipient; the payer when absent.
    #[serde(default)]
    pub to: Option<Address>,
    /// Number of tokens; 1 when absent.
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub quantity: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityWire {
    Number(u64),
    Text(String),
}

/// Accepts `3` as well as `"3"`.
fn deserialize_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<QuantityWire>::deserialize(deserializer)? {
        None => Ok(None),
        Some(QuantityWire::Number(n)) => Ok(Some(n)),
        Some(QuantityWire::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid quantity {s:?}"))),
    }
}

/// Success body of `POST /mint`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    /// Always `true`.
    pub success: bool,
    /// Hash of the mint transaction.
    pub tx_hash: String,
    /// Number of tokens minted.
    pub quantity: u32,
    /// Address that received the tokens.
    pub recipient: Address,
}

fn bad_request(error: &str, message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "message": message.into() })),
    )
        .into_response()
}

fn catalog_failure(err: &CatalogError) -> Response {
    #[cfg(feature = "telemetry")]
    tracing::error!(error = %err, "cannot price the mint");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "PricingError", "message": err.to_string() })),
    )
        .into_response()
}

impl<F, L> MintGate<F, L>
where
    F: Facilitator,
    L: LedgerActuator<Action = MintAction>,
{
    /// Creates the handler state.
    pub fn new(
        gateway: Gateway<F, L>,
        catalog: RequirementCatalog,
        offer: MintOffer,
        base_url: Option<Url>,
    ) -> Self {
        Self {
            gateway,
            catalog: Arc::new(catalog),
            offer: Arc::new(offer),
            base_url,
        }
    }

    /// The gateway behind the handlers.
    #[must_use]
    pub const fn gateway(&self) -> &Gateway<F, L> {
        &self.gateway
    }

    /// Requirements for minting `quantity` tokens.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the scaled price cannot be expressed in
    /// an accepted asset.
    pub fn requirements(
        &self,
        headers: &HeaderMap,
        quantity: u32,
    ) -> Result<Vec<PaymentRequirements>, CatalogError> {
        let resource = self
            .offer
            .resource
            .as_resource_info(self.base_url.as_ref(), headers, MINT_PATH);
        let price = self
            .offer
            .unit_price
            .times(quantity)
            .map_err(|source| CatalogError::Price {
                network: String::from("*"),
                source,
            })?;
        self.catalog.build(&resource, &price)
    }

    fn validate(&self, request: MintRequest) -> Result<MintAction, Response> {
        let quantity = request.quantity.unwrap_or(1);
        if !(1..=u64::from(self.offer.max_quantity)).contains(&quantity) {
            return Err(bad_request(
                "InvalidQuantity",
                format!(
                    "quantity must be between 1 and {}",
                    self.offer.max_quantity
                ),
            ));
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| bad_request("InvalidQuantity", "quantity is too large"))?;
        Ok(MintAction {
            recipient: request.to,
            quantity,
        })
    }
}

/// `POST /mint`.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "mintgate.mint", skip_all)
)]
pub async fn post_mint<F, L>(
    State(gate): State<MintGate<F, L>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    F: Facilitator,
    L: LedgerActuator<Action = MintAction>,
{
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        MintRequest::default()
    } else {
        match serde_json::from_slice::<MintRequest>(&body) {
            Ok(request) => request,
            Err(err) => return bad_request("InvalidRequest", err.to_string()),
        }
    };
    let action = match gate.validate(request) {
        Ok(action) => action,
        Err(response) => return response,
    };
    let accepts = match gate.requirements(&headers, action.quantity) {
        Ok(accepts) => accepts,
        Err(err) => return catalog_failure(&err),
    };

    let header = headers.get(X_PAYMENT_HEADER).map(HeaderValue::as_bytes);
    match gate.gateway.process(header, accepts, &action).await {
        GatewayOutcome::Completed(Completion { receipt, action: executed }) => {
            let body = MintResponse {
                success: true,
                tx_hash: executed.transaction,
                quantity: action.quantity,
                recipient: action.recipient_for(&receipt),
            };
            (StatusCode::OK, receipt_headers(&receipt), Json(body)).into_response()
        }
        GatewayOutcome::PaymentRequired { error, accepts } => {
            Rejection::new(error, accepts).into_response()
        }
        GatewayOutcome::Failed(error) => Rejection::new(error, Vec::new()).into_response(),
    }
}

/// `GET /x402/scan`: the challenge for minting one token.
pub async fn scan<F, L>(State(gate): State<MintGate<F, L>>, headers: HeaderMap) -> Response
where
    F: Facilitator,
    L: LedgerActuator<Action = MintAction>,
{
    match gate.requirements(&headers, 1) {
        Ok(accepts) => Challenge(PaymentRequired::new(PAYMENT_REQUIRED_ERROR, accepts)).into_response(),
        Err(err) => catalog_failure(&err),
    }
}

/// Routes `POST /mint` and `GET /x402/scan`.
pub fn router<F, L>(gate: MintGate<F, L>) -> Router
where
    F: Facilitator,
    L: LedgerActuator<Action = MintAction>,
{
    Router::new()
        .route(MINT_PATH, post(post_mint::<F, L>))
        .route(SCAN_PATH, get(scan::<F, L>))
        .with_state(gate)
}
