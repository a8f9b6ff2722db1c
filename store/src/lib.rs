//! Abstract record-store traits for the challenge engine.
//!
//! The off-chain record store is an external collaborator. Every backend
//! (a hosted document database, an in-memory store for testing) implements
//! these traits; the engine depends only on [`RecordStore`].

pub mod challenge;
pub mod error;
pub mod membership;
pub mod pending;
pub mod report;
pub mod settlement;
pub mod submission;
pub mod vote;

pub use challenge::{CapacityBounds, ChallengeRecord, ChallengeStore, Deadlines};
pub use error::StoreError;
pub use membership::{MembershipRecord, MembershipStore};
pub use pending::{PendingKey, PendingOperation, PendingStatus, PendingStore};
pub use report::{ReportRecord, ReportStore};
pub use settlement::{
    ClaimStatus, CreatorClaimRecord, Disbursement, Payout, PayoutRank, SettlementRecord,
    SettlementStatus, SettlementStore, VoterPayoutRecord, VotingDistributionPlan,
};
pub use submission::{SubmissionRecord, SubmissionStore};
pub use vote::{VoteRecord, VoteStore};

/// Everything the engine needs from the record store.
pub trait RecordStore:
    ChallengeStore
    + MembershipStore
    + SubmissionStore
    + VoteStore
    + ReportStore
    + SettlementStore
    + PendingStore
{
}

impl<T> RecordStore for T where
    T: ChallengeStore
        + MembershipStore
        + SubmissionStore
        + VoteStore
        + ReportStore
        + SettlementStore
        + PendingStore
{
}
