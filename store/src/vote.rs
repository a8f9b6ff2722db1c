//! Vote storage trait.

use crate::StoreError;
use async_trait::async_trait;
use cpt_types::{ChallengeId, SubmissionId, Timestamp, TxRef, UserId};
use serde::{Deserialize, Serialize};

/// A paid vote. Keys are `(challenge, voter)`: one vote per voter per challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub challenge: ChallengeId,
    pub voter: UserId,
    pub submission: SubmissionId,
    pub fee_tx: Option<TxRef>,
    pub cast_at: Timestamp,
}

/// Trait for storing votes.
#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn put_vote(&self, vote: &VoteRecord) -> Result<(), StoreError>;

    async fn get_vote(
        &self,
        challenge: &ChallengeId,
        voter: &UserId,
    ) -> Result<Option<VoteRecord>, StoreError>;

    async fn list_votes(&self, challenge: &ChallengeId) -> Result<Vec<VoteRecord>, StoreError>;

    async fn delete_votes(&self, challenge: &ChallengeId) -> Result<(), StoreError>;
}
