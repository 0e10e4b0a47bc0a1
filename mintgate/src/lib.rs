#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core of an x402 payment gate in front of a priced on-chain action.
//!
//! A caller must present a signed, off-chain payment authorization in the
//! `X-PAYMENT` header before the gated action runs. This crate owns the
//! negotiation → verification → settlement → execution pipeline and is
//! agnostic of the HTTP framework and of the ledger that executes the action.
//!
//! # Modules
//!
//! - [`catalog`] - Builds the advertised payment requirements for a resource
//! - [`codec`] - Encodes and decodes the payment and receipt headers
//! - [`matcher`] - Selects the requirement a payload is trying to satisfy
//! - [`facilitator`] - Trait for the remote verify/settle service
//! - [`verifier`] - Timeout-bounded payment verification
//! - [`settlement`] - Exactly-once settlement per payment nonce
//! - [`actuator`] - Trait for the action executed after settlement
//! - [`gateway`] - State machine orchestrating a single gated call
//! - [`proto`] - Wire format types
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod actuator;
pub mod amount;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod facilitator;
pub mod gateway;
pub mod matcher;
pub mod proto;
pub mod settlement;
pub mod timestamp;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;
