use cpt_ledger::LedgerError;
use cpt_store::{SettlementRecord, StoreError};
use cpt_types::{ChallengeId, TxRef, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Phase;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("challenge {challenge} is in the {actual} phase, this action needs {expected}")]
    PhaseClosed {
        challenge: ChallengeId,
        expected: Phase,
        actual: Phase,
    },

    #[error("{user} already joined challenge {challenge}")]
    AlreadyMember { challenge: ChallengeId, user: UserId },

    #[error("challenge {challenge} is full ({limit})")]
    CapacityExceeded { challenge: ChallengeId, limit: u32 },

    #[error("the creator cannot join their own challenge")]
    SelfJoinForbidden,

    #[error("{user} is not a participant of challenge {challenge}")]
    NotAParticipant { challenge: ChallengeId, user: UserId },

    #[error("{user} already submitted to challenge {challenge}")]
    DuplicateSubmission { challenge: ChallengeId, user: UserId },

    #[error("{user} already voted in challenge {challenge}")]
    AlreadyVotedInChallenge { challenge: ChallengeId, user: UserId },

    #[error("payment not confirmed in time{}", fmt_tx(.tx))]
    PaymentTimeout { tx: Option<TxRef> },

    #[error("payment failed: {reason}")]
    PaymentFailed { reason: String, tx: Option<TxRef> },

    #[error("challenge {challenge} is still in the {phase} phase")]
    TooEarly { challenge: ChallengeId, phase: Phase },

    #[error("challenge {} is already finalized", .0.challenge)]
    AlreadyFinalized(Box<SettlementRecord>),

    #[error("creator reward for challenge {0} was already claimed")]
    AlreadyClaimed(ChallengeId),

    #[error("{user} already reported challenge {challenge}")]
    AlreadyReported { challenge: ChallengeId, user: UserId },

    #[error("the creator cannot report their own challenge")]
    SelfReportForbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{user} is not the creator of challenge {challenge}")]
    NotCreator { challenge: ChallengeId, user: UserId },

    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

fn fmt_tx(tx: &Option<TxRef>) -> String {
    tx.as_ref().map(|tx| format!(" (tx {tx})")).unwrap_or_default()
}

/// Serialisable discriminant of [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    PhaseClosed,
    AlreadyMember,
    CapacityExceeded,
    SelfJoinForbidden,
    NotAParticipant,
    DuplicateSubmission,
    AlreadyVotedInChallenge,
    PaymentTimeout,
    PaymentFailed,
    TooEarly,
    AlreadyFinalized,
    AlreadyClaimed,
    AlreadyReported,
    SelfReportForbidden,
    NotFound,
    NotCreator,
    InvalidChallenge,
    InfrastructureError,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PhaseClosed { .. } => ErrorKind::PhaseClosed,
            Self::AlreadyMember { .. } => ErrorKind::AlreadyMember,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::SelfJoinForbidden => ErrorKind::SelfJoinForbidden,
            Self::NotAParticipant { .. } => ErrorKind::NotAParticipant,
            Self::DuplicateSubmission { .. } => ErrorKind::DuplicateSubmission,
            Self::AlreadyVotedInChallenge { .. } => ErrorKind::AlreadyVotedInChallenge,
            Self::PaymentTimeout { .. } => ErrorKind::PaymentTimeout,
            Self::PaymentFailed { .. } => ErrorKind::PaymentFailed,
            Self::TooEarly { .. } => ErrorKind::TooEarly,
            Self::AlreadyFinalized(_) => ErrorKind::AlreadyFinalized,
            Self::AlreadyClaimed(_) => ErrorKind::AlreadyClaimed,
            Self::AlreadyReported { .. } => ErrorKind::AlreadyReported,
            Self::SelfReportForbidden => ErrorKind::SelfReportForbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotCreator { .. } => ErrorKind::NotCreator,
            Self::InvalidChallenge(_) => ErrorKind::InvalidChallenge,
            Self::Infrastructure(_) => ErrorKind::InfrastructureError,
        }
    }

    /// Whether repeating the same request may succeed. Partial state left
    /// behind by these errors is resumed by the retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::PaymentTimeout { .. })
    }

    /// Transaction reference attached to a payment error, if any.
    pub fn tx(&self) -> Option<&TxRef> {
        match self {
            Self::PaymentTimeout { tx } | Self::PaymentFailed { tx, .. } => tx.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn not_found_challenge(id: &ChallengeId) -> Self {
        Self::NotFound(format!("challenge {id}"))
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Infrastructure(format!("record store: {e}"))
    }
}

/// Ledger failures outside the fee path (balances, transfers) are
/// infrastructure problems. Fee rejections are mapped explicitly.
impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Timeout(_) => Self::PaymentTimeout { tx: None },
            other => Self::Infrastructure(format!("value ledger: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_retryable_infrastructure() {
        let err: EngineError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::InfrastructureError);
        assert!(err.is_retryable());
    }

    #[test]
    fn timeout_carries_tx() {
        let err = EngineError::PaymentTimeout {
            tx: Some(TxRef::new("fee-7")),
        };
        assert_eq!(err.tx().map(TxRef::as_str), Some("fee-7"));
        assert!(err.to_string().contains("fee-7"));
    }

    #[test]
    fn business_rule_errors_are_final() {
        let err = EngineError::SelfJoinForbidden;
        assert!(!err.is_retryable());
        assert_eq!(
            serde_json::to_string(&err.kind()).unwrap(),
            "\"SelfJoinForbidden\""
        );
    }
}
