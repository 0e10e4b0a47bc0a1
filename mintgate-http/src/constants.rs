//! Header names and defaults of the x402 v1 HTTP binding.

/// Request header carrying the base64 payment payload.
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the base64 settlement receipt.
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Public x402 facilitator.
pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";

/// Error text of a bare challenge.
pub const PAYMENT_REQUIRED_ERROR: &str = "Payment required";
