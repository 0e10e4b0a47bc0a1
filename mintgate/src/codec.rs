//! `X-PAYMENT` / `X-PAYMENT-RESPONSE` header codec.
//!
//! Both headers carry standard base64 of a JSON document. Decoding never
//! panics: every way a header can be wrong ends in a [`CodecError`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;

use crate::proto::{PaymentPayload, SettlementReceipt};

/// Upper bound on an accepted header value.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Errors decoding or encoding a payment header.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The header value is empty.
    #[error("payment header is empty")]
    Empty,
    /// The header value exceeds [`MAX_HEADER_BYTES`].
    #[error("payment header is {len} bytes, limit is {max}")]
    TooLarge {
        /// Length of the received value.
        len: usize,
        /// Accepted maximum.
        max: usize,
    },
    /// Not standard base64.
    #[error("payment header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Not the expected JSON document.
    #[error("payment header is not a valid payload: {0}")]
    Json(#[from] serde_json::Error),
}

fn decode_json<T: serde::de::DeserializeOwned>(header: &[u8]) -> Result<T, CodecError> {
    let header = header.trim_ascii();
    if header.is_empty() {
        return Err(CodecError::Empty);
    }
    if header.len() > MAX_HEADER_BYTES {
        return Err(CodecError::TooLarge {
            len: header.len(),
            max: MAX_HEADER_BYTES,
        });
    }
    let json = b64.decode(header)?;
    Ok(serde_json::from_slice(&json)?)
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(b64.encode(json))
}

/// Decodes an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns [`CodecError`] for empty, oversized, non-base64, non-JSON,
/// wrong-version, unknown-field and missing-field headers.
pub fn decode_payment(header: &[u8]) -> Result<PaymentPayload, CodecError> {
    decode_json(header)
}

/// Encodes a payload as an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, CodecError> {
    encode_json(payload)
}

/// Encodes a receipt as an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_receipt(receipt: &SettlementReceipt) -> Result<String, CodecError> {
    encode_json(receipt)
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`CodecError`] under the same conditions as [`decode_payment`].
pub fn decode_receipt(header: &[u8]) -> Result<SettlementReceipt, CodecError> {
    decode_json(header)
}
