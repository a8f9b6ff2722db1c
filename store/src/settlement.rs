//! Settlement, creator-claim and voter-payout storage trait.
//!
//! Every outgoing transfer is persisted as a [`Disbursement`] *before* it is
//! issued. The disbursement's idempotency key lets the ledger deduplicate a
//! retry, and its transaction reference marks it durable once recorded.

use crate::StoreError;
use async_trait::async_trait;
use cpt_types::{Amount, ChallengeId, IdempotencyKey, Payee, SubmissionId, Timestamp, TxRef, UserId};
use serde::{Deserialize, Serialize};

/// One planned transfer out of a treasury.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disbursement {
    pub key: IdempotencyKey,
    pub payee: Payee,
    pub amount: Amount,
    /// Set once the ledger has accepted the transfer.
    pub tx: Option<TxRef>,
}

impl Disbursement {
    pub fn new(key: IdempotencyKey, payee: Payee, amount: Amount) -> Self {
        Self {
            key,
            payee,
            amount,
            tx: None,
        }
    }

    /// Whether the transfer has been issued and its reference recorded.
    /// Zero-amount disbursements never need a transfer.
    pub fn is_settled(&self) -> bool {
        self.tx.is_some() || self.amount.is_zero()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutRank {
    /// Top tally group; shares the winner portion.
    Winner,
    /// Next tally group; shares the runner-up portion.
    RunnerUp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub submission: SubmissionId,
    pub recipient: UserId,
    pub rank: PayoutRank,
    pub disbursement: Disbursement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Plan persisted; some transfers may still be outstanding.
    Disbursing,
    /// Every payout recorded. Terminal.
    Finalized,
}

/// The once-per-challenge result of finalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub challenge: ChallengeId,
    pub status: SettlementStatus,
    pub reward_pool: Amount,
    pub winners: Vec<UserId>,
    pub payouts: Vec<Payout>,
    pub created_at: Timestamp,
    pub finalized_at: Option<Timestamp>,
}

impl SettlementRecord {
    pub fn is_finalized(&self) -> bool {
        self.status == SettlementStatus::Finalized
    }

    /// Total amount planned for winners and runners-up.
    pub fn total_paid(&self) -> Amount {
        self.payouts.iter().map(|p| p.disbursement.amount).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Disbursing,
    Claimed,
}

/// The creator's once-per-challenge claim on entry fees (and the reward,
/// when nobody won).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorClaimRecord {
    pub challenge: ChallengeId,
    pub creator: UserId,
    pub entry_fees: Amount,
    pub protocol_fee: Amount,
    pub refunded_reward: Amount,
    pub creator_payout: Disbursement,
    pub protocol_payout: Disbursement,
    pub status: ClaimStatus,
    pub created_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
}

/// Per-voter share of the voting pool, fixed on the first distribution run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingDistributionPlan {
    pub challenge: ChallengeId,
    pub pool_snapshot: Amount,
    pub total_voters: u32,
    pub per_voter: Amount,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterPayoutRecord {
    pub challenge: ChallengeId,
    pub voter: UserId,
    pub disbursement: Disbursement,
    pub paid_at: Option<Timestamp>,
}

/// Trait for storing settlement-side records.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn put_settlement(&self, record: &SettlementRecord) -> Result<(), StoreError>;

    async fn get_settlement(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Option<SettlementRecord>, StoreError>;

    async fn put_creator_claim(&self, record: &CreatorClaimRecord) -> Result<(), StoreError>;

    async fn get_creator_claim(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Option<CreatorClaimRecord>, StoreError>;

    async fn put_voting_plan(&self, plan: &VotingDistributionPlan) -> Result<(), StoreError>;

    async fn get_voting_plan(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Option<VotingDistributionPlan>, StoreError>;

    async fn put_voter_payout(&self, record: &VoterPayoutRecord) -> Result<(), StoreError>;

    async fn get_voter_payout(
        &self,
        challenge: &ChallengeId,
        voter: &UserId,
    ) -> Result<Option<VoterPayoutRecord>, StoreError>;

    async fn list_voter_payouts(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<VoterPayoutRecord>, StoreError>;
}
