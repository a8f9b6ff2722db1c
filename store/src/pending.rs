//! Pending fee operation storage trait.
//!
//! A pending operation correlates an on-chain fee with the off-chain record
//! it pays for. It is written before the fee is submitted and advances
//! through [`PendingStatus`] until the record exists, so a crash at any
//! point can be resumed without charging the payer twice.

use crate::StoreError;
use async_trait::async_trait;
use cpt_types::{Amount, ChallengeId, FeeKind, IdempotencyKey, Timestamp, TxRef, UserId};
use serde::{Deserialize, Serialize};

/// Identifies the operation a fee pays for.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PendingKey {
    pub challenge: ChallengeId,
    pub user: UserId,
    pub kind: FeeKind,
}

impl PendingKey {
    pub fn new(challenge: ChallengeId, user: UserId, kind: FeeKind) -> Self {
        Self {
            challenge,
            user,
            kind,
        }
    }

    /// Idempotency key for the fee submission of a given attempt.
    pub fn fee_key(&self, attempt: u32) -> IdempotencyKey {
        IdempotencyKey::new(format!(
            "fee/{}/{}/{}/{attempt}",
            self.challenge, self.user, self.kind
        ))
    }

    /// Idempotency key for returning a fee whose record was never written.
    pub fn refund_key(&self, attempt: u32) -> IdempotencyKey {
        IdempotencyKey::new(format!(
            "refund/{}/{}/{}/{attempt}",
            self.challenge, self.user, self.kind
        ))
    }
}

/// Where a two-phase fee operation stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PendingStatus {
    /// Slot reserved; the fee may or may not have reached the ledger.
    Initiated,
    /// The ledger accepted the fee; confirmation outstanding.
    FeeSubmitted { tx: TxRef },
    /// Fee confirmed, record not yet written.
    FeeConfirmed { tx: TxRef },
    /// Fee confirmed and record written. Terminal.
    Recorded { tx: TxRef },
    /// The ledger rejected the fee. A new attempt starts from `Initiated`.
    Rejected { tx: TxRef },
    /// Fee confirmed after its phase closed; returned to the payer by
    /// `refund` instead of recording. Terminal.
    Refunded { tx: TxRef, refund: TxRef },
}

impl PendingStatus {
    pub fn tx(&self) -> Option<&TxRef> {
        match self {
            Self::Initiated => None,
            Self::FeeSubmitted { tx }
            | Self::FeeConfirmed { tx }
            | Self::Recorded { tx }
            | Self::Rejected { tx }
            | Self::Refunded { tx, .. } => Some(tx),
        }
    }

    /// Whether the fee has been confirmed on-chain.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            Self::FeeConfirmed { .. } | Self::Recorded { .. } | Self::Refunded { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub key: PendingKey,
    /// Incremented each time a rejected fee is retried.
    pub attempt: u32,
    pub amount: Amount,
    pub status: PendingStatus,
    pub updated_at: Timestamp,
}

/// Trait for storing pending fee operations.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Insert or replace a pending operation.
    async fn put_pending(&self, op: &PendingOperation) -> Result<(), StoreError>;

    async fn get_pending(&self, key: &PendingKey) -> Result<Option<PendingOperation>, StoreError>;

    async fn list_pending(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<PendingOperation>, StoreError>;

    async fn delete_pending(&self, challenge: &ChallengeId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PendingKey {
        PendingKey::new(ChallengeId::new("c1"), UserId::new("alice"), FeeKind::Entry)
    }

    #[test]
    fn fee_key_changes_per_attempt() {
        assert_eq!(key().fee_key(0).as_str(), "fee/c1/alice/entry/0");
        assert_ne!(key().fee_key(0), key().fee_key(1));
    }

    #[test]
    fn refund_key_differs_from_fee_key() {
        assert_eq!(key().refund_key(0).as_str(), "refund/c1/alice/entry/0");
        assert_ne!(key().refund_key(0), key().fee_key(0));
    }

    #[test]
    fn status_exposes_tx() {
        assert!(PendingStatus::Initiated.tx().is_none());
        let tx = TxRef::new("t");
        assert_eq!(
            PendingStatus::FeeConfirmed { tx: tx.clone() }.tx(),
            Some(&tx)
        );
        assert!(PendingStatus::Recorded { tx: tx.clone() }.is_confirmed());
        assert!(!PendingStatus::FeeSubmitted { tx }.is_confirmed());
    }

    #[test]
    fn status_serializes_as_tagged_enum() {
        let json = serde_json::to_value(PendingStatus::FeeSubmitted {
            tx: TxRef::new("t1"),
        })
        .unwrap();
        assert_eq!(json["state"], "fee_submitted");
        assert_eq!(json["tx"], "t1");
    }
}
