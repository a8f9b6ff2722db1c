//! Video submission storage trait.

use crate::StoreError;
use async_trait::async_trait;
use cpt_types::{ChallengeId, SubmissionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A participant's video entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub challenge: ChallengeId,
    pub participant: UserId,
    /// Opaque media-store reference.
    pub video: String,
    pub description: String,
    pub likes: u32,
    pub dislikes: u32,
    #[serde(default)]
    pub liked_by: BTreeSet<UserId>,
    #[serde(default)]
    pub disliked_by: BTreeSet<UserId>,
    /// Number of paid votes.
    pub tally: u64,
    /// Distinct users who voted for this submission.
    #[serde(default)]
    pub voters: BTreeSet<UserId>,
    pub submitted_at: Timestamp,
}

impl SubmissionRecord {
    pub fn has_voter(&self, user: &UserId) -> bool {
        self.voters.contains(user)
    }
}

/// Trait for storing submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Insert or replace a submission.
    async fn put_submission(&self, submission: &SubmissionRecord) -> Result<(), StoreError>;

    async fn get_submission(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    /// All submissions of a challenge.
    async fn list_submissions(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<SubmissionRecord>, StoreError>;

    async fn delete_submissions(&self, challenge: &ChallengeId) -> Result<(), StoreError>;
}
