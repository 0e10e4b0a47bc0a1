//! A [`mintgate::facilitator::Facilitator`] backed by a _remote_ x402 facilitator over HTTP.
//!
//! [`FacilitatorClient`] posts `{ x402Version, paymentPayload, paymentRequirements }`
//! to `./verify` and `./settle` relative to a base URL.
//!
//! ## Error Handling
//!
//! [`FacilitatorClientError`] separates failures that provably never reached
//! the facilitator (URL construction, connection refused, 4xx refusals)
//! from failures after delivery (timeouts, 5xx, undecodable bodies). Only the
//! former are safe to treat as "no funds moved" during settlement.

use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use mintgate::facilitator::{Facilitator, FacilitatorFault};
use mintgate::proto::{
    FacilitatorRequest, PaymentPayload, PaymentRequirements, SettleResponse, VerificationResult,
};
use reqwest::Client;
use std::fmt::Display;
use std::time::Duration;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span};

/// Header used by facilitators that authenticate with a raw API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// A client for a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Full URL to `POST /settle` requests
    settle_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Custom headers sent with each request
    headers: HeaderMap,
    /// Optional per-request timeout
    timeout: Option<Duration>,
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// Invalid credential header value.
    #[error("invalid {name} header value")]
    InvalidHeader {
        /// Header that could not be built.
        name: &'static str,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl FacilitatorFault for FacilitatorClientError {
    fn not_processed(&self) -> bool {
        match self {
            Self::UrlParse { .. } | Self::InvalidHeader { .. } => true,
            Self::Http { source, .. } => source.is_connect() || source.is_builder(),
            Self::HttpStatus { status, .. } => status.is_client_error(),
            Self::JsonDeserialization { .. } | Self::ResponseBodyRead { .. } => false,
        }
    }
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerificationResult, FacilitatorClientError> {
        let request = FacilitatorRequest::new(payload, requirements);
        #[cfg(feature = "telemetry")]
        {
            with_span(
                Self::verify(self, &request),
                tracing::info_span!("mintgate.facilitator_client.verify", timeout = ?self.timeout),
            )
            .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            Self::verify(self, &request).await
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        let request = FacilitatorRequest::new(payload, requirements);
        #[cfg(feature = "telemetry")]
        {
            with_span(
                Self::settle(self, &request),
                tracing::info_span!("mintgate.facilitator_client.settle", timeout = ?self.timeout),
            )
            .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            Self::settle(self, &request).await
        }
    }
}

impl FacilitatorClient {
    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    #[must_use]
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL relative to [`FacilitatorClient::base_url`].
    #[must_use]
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns any custom headers configured on the client.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url =
            base_url
                .join("./verify")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./verify URL",
                    source: e,
                })?;
        let settle_url =
            base_url
                .join("./settle")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./settle URL",
                    source: e,
                })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::InvalidHeader`] if the token is not
    /// a valid header value.
    pub fn with_bearer_token(mut self, token: &str) -> Result<Self, FacilitatorClientError> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| FacilitatorClientError::InvalidHeader { name: "Authorization" })?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Sends `X-API-Key: <key>` with every request.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::InvalidHeader`] if the key is not a
    /// valid header value.
    pub fn with_api_key(mut self, key: &str) -> Result<Self, FacilitatorClientError> {
        let value = HeaderValue::from_str(key)
            .map_err(|_| FacilitatorClientError::InvalidHeader { name: API_KEY_HEADER })?;
        self.headers
            .insert(HeaderName::from_static("x-api-key"), value);
        Ok(self)
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a `POST /verify` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    pub async fn verify(
        &self,
        request: &FacilitatorRequest<'_>,
    ) -> Result<VerificationResult, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends a `POST /settle` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    pub async fn settle(
        &self,
        request: &FacilitatorRequest<'_>,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    /// POSTs `payload` as JSON and decodes a `200 OK` body as `R`.
    ///
    /// `context` is a human-readable identifier used in tracing and error messages (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

/// Parses a base URL string, normalizing it to a single trailing slash so
/// `./verify` resolves beneath it.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

/// Instruments a future with a given tracing span.
#[cfg(feature = "telemetry")]
fn with_span<F: Future>(fut: F, span: Span) -> impl Future<Output = F::Output> {
    fut.instrument(span)
}
