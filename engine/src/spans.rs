//! Pre-built [`tracing::Span`] constructors for engine operations.
//!
//! Consistent span names and field sets make it easy to filter and
//! correlate every event logged while serving one request.

use cpt_types::{ChallengeId, UserId};
use tracing::{info_span, Span};

/// Span covering one user-initiated operation on a challenge.
pub fn operation_span(op: &'static str, challenge: &ChallengeId, user: &UserId) -> Span {
    info_span!("challenge_op", op, challenge = %challenge, user = %user)
}

/// Span covering a settlement-side operation (finalize, claim, distribute).
pub fn settlement_span(op: &'static str, challenge: &ChallengeId) -> Span {
    info_span!("settlement", op, challenge = %challenge)
}

/// Span covering a single voter's payout during distribution.
pub fn payout_span(challenge: &ChallengeId, voter: &UserId) -> Span {
    info_span!("voter_payout", challenge = %challenge, voter = %voter)
}
