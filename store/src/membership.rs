//! Participant membership storage trait.

use crate::StoreError;
use async_trait::async_trait;
use cpt_types::{Amount, ChallengeId, Timestamp, TxRef, UserId};
use serde::{Deserialize, Serialize};

/// A user's admission into a challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub challenge: ChallengeId,
    pub user: UserId,
    pub joined_at: Timestamp,
    /// Participation fee paid into the reward pool.
    pub fee_paid: Amount,
    /// Confirmed fee transaction; `None` only for free challenges.
    pub fee_tx: Option<TxRef>,
}

/// Trait for storing memberships.
///
/// Keys are `(challenge, user)` pairs.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn put_membership(&self, membership: &MembershipRecord) -> Result<(), StoreError>;

    async fn get_membership(
        &self,
        challenge: &ChallengeId,
        user: &UserId,
    ) -> Result<Option<MembershipRecord>, StoreError>;

    /// All memberships of a challenge.
    async fn list_memberships(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<MembershipRecord>, StoreError>;

    /// All memberships held by a user, across challenges.
    async fn list_memberships_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<MembershipRecord>, StoreError>;

    async fn delete_memberships(&self, challenge: &ChallengeId) -> Result<(), StoreError>;
}
