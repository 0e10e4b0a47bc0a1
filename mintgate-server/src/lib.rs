//! Pay-per-mint HTTP server.
//!
//! Library half of the `mintgate-server` binary: configuration loading and
//! the unpaid routes merged around the paid mint router.

pub mod config;
pub mod routes;
