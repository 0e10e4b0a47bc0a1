//! Picks the advertised requirement a payload is paying against.

use serde::{Deserialize, Serialize};

use crate::proto::{PaymentPayload, PaymentRequirements};

/// What to do when no requirement matches the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Use the first requirement and let the facilitator decide.
    #[default]
    Fallback,
    /// Reject the payment.
    Strict,
}

/// The chosen requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Index into the `accepts` list.
    pub index: usize,
    /// `false` when the fallback policy picked index 0 without a match.
    pub exact: bool,
}

/// Index of the first requirement whose scheme, network and (if the payload
/// declares one) asset equal the payload's.
#[must_use]
pub fn find_matching(accepts: &[PaymentRequirements], payload: &PaymentPayload) -> Option<usize> {
    accepts.iter().position(|req| {
        req.scheme == payload.scheme
            && req.network == payload.network
            && payload.asset.is_none_or(|asset| asset == req.asset)
    })
}

/// Applies `policy` on top of [`find_matching`].
///
/// Returns `None` when the list is empty, or when nothing matches under
/// [`MatchPolicy::Strict`].
#[must_use]
pub fn select(
    accepts: &[PaymentRequirements],
    payload: &PaymentPayload,
    policy: MatchPolicy,
) -> Option<Selection> {
    if let Some(index) = find_matching(accepts, payload) {
        return Some(Selection { index, exact: true });
    }
    match policy {
        MatchPolicy::Fallback if !accepts.is_empty() => Some(Selection {
            index: 0,
            exact: false,
        }),
        _ => None,
    }
}
