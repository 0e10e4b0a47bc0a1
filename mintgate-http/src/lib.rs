//! HTTP transport for mintgate.
//!
//! # Modules
//!
//! - [`constants`]: header names and defaults of the x402 v1 binding
//! - [`facilitator_client`]: remote facilitator over `POST /verify` and `POST /settle`
//! - [`response`]: rendering of gateway outcomes as HTTP responses
//! - [`paygate`]: axum handlers for `POST /mint` and `GET /x402/scan`

pub mod constants;
pub mod facilitator_client;
pub mod paygate;
pub mod response;
