//! Moderation report storage trait.

use crate::StoreError;
use async_trait::async_trait;
use cpt_types::{ChallengeId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub challenge: ChallengeId,
    pub reporter: UserId,
    pub reported_at: Timestamp,
}

/// Trait for storing reports. Keys are `(challenge, reporter)`.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn put_report(&self, report: &ReportRecord) -> Result<(), StoreError>;

    async fn list_reports(&self, challenge: &ChallengeId) -> Result<Vec<ReportRecord>, StoreError>;

    async fn delete_reports(&self, challenge: &ChallengeId) -> Result<(), StoreError>;
}
