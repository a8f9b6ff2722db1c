//! Challenge storage trait.

use crate::StoreError;
use async_trait::async_trait;
use cpt_types::{Amount, ChallengeId, Timestamp, TreasuryRefs, TxRef, UserId};
use serde::{Deserialize, Serialize};

/// The three deadlines that drive a challenge's phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub registration_end: Timestamp,
    pub submission_end: Timestamp,
    pub voting_end: Timestamp,
}

impl Deadlines {
    /// `registration_end <= submission_end <= voting_end`.
    pub fn is_ordered(&self) -> bool {
        self.registration_end <= self.submission_end && self.submission_end <= self.voting_end
    }
}

/// Admission and voting limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBounds {
    pub min_participants: u32,
    pub max_participants: u32,
    pub min_voters: u32,
    pub max_voters: u32,
}

/// A stored challenge.
///
/// The phase is never stored; it is derived from [`Deadlines`] and the
/// current time on every read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub id: ChallengeId,
    pub creator: UserId,
    pub title: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub bounds: CapacityBounds,
    /// Reward pool paid out to winners at settlement.
    pub reward: Amount,
    pub participation_fee: Amount,
    pub voting_fee: Amount,
    pub deadlines: Deadlines,
    pub treasury: TreasuryRefs,
    /// Confirmed transaction that funded the reward pool.
    pub funding_tx: Option<TxRef>,
    /// Empty until the challenge is finalized with a winner.
    #[serde(default)]
    pub winners: Vec<UserId>,
    #[serde(default)]
    pub report_count: u32,
    pub created_at: Timestamp,
}

/// Trait for storing challenges.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Insert or replace a challenge.
    async fn put_challenge(&self, challenge: &ChallengeRecord) -> Result<(), StoreError>;

    /// Get a challenge by id.
    async fn get_challenge(&self, id: &ChallengeId) -> Result<Option<ChallengeRecord>, StoreError>;

    /// Delete a challenge record (dependent records are deleted separately).
    async fn delete_challenge(&self, id: &ChallengeId) -> Result<(), StoreError>;

    /// List every challenge.
    async fn list_challenges(&self) -> Result<Vec<ChallengeRecord>, StoreError>;

    /// List the challenges created by a user.
    async fn list_challenges_by_creator(
        &self,
        creator: &UserId,
    ) -> Result<Vec<ChallengeRecord>, StoreError>;
}
