//! Nullable store: thread-safe in-memory record store for testing.
//!
//! Implements every record-store trait over ordered in-memory maps so list
//! queries come back in a stable order. Writes can be made to fail on demand
//! with [`NullStore::fail_next`] to exercise recovery paths.

use async_trait::async_trait;
use cpt_store::{
    ChallengeRecord, ChallengeStore, CreatorClaimRecord, MembershipRecord, MembershipStore,
    PendingKey, PendingOperation, PendingStore, ReportRecord, ReportStore, SettlementRecord,
    SettlementStore, StoreError, SubmissionRecord, SubmissionStore, VoteRecord, VoteStore,
    VoterPayoutRecord, VotingDistributionPlan,
};
use cpt_types::{ChallengeId, SubmissionId, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// A store write that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    PutChallenge,
    PutMembership,
    PutSubmission,
    PutVote,
    PutReport,
    PutSettlement,
    PutCreatorClaim,
    PutVotingPlan,
    PutVoterPayout,
    PutPending,
    Delete,
}

/// An in-memory record store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullStore {
    challenges: Mutex<BTreeMap<ChallengeId, ChallengeRecord>>,
    memberships: Mutex<BTreeMap<(ChallengeId, UserId), MembershipRecord>>,
    submissions: Mutex<BTreeMap<SubmissionId, SubmissionRecord>>,
    votes: Mutex<BTreeMap<(ChallengeId, UserId), VoteRecord>>,
    reports: Mutex<BTreeMap<(ChallengeId, UserId), ReportRecord>>,
    settlements: Mutex<BTreeMap<ChallengeId, SettlementRecord>>,
    claims: Mutex<BTreeMap<ChallengeId, CreatorClaimRecord>>,
    voting_plans: Mutex<BTreeMap<ChallengeId, VotingDistributionPlan>>,
    voter_payouts: Mutex<BTreeMap<(ChallengeId, UserId), VoterPayoutRecord>>,
    pending: Mutex<BTreeMap<PendingKey, PendingOperation>>,
    failures: Mutex<HashMap<StoreOp, u32>>,
}

impl NullStore {
    pub fn new() -> Self {
        Self {
            challenges: Mutex::new(BTreeMap::new()),
            memberships: Mutex::new(BTreeMap::new()),
            submissions: Mutex::new(BTreeMap::new()),
            votes: Mutex::new(BTreeMap::new()),
            reports: Mutex::new(BTreeMap::new()),
            settlements: Mutex::new(BTreeMap::new()),
            claims: Mutex::new(BTreeMap::new()),
            voting_plans: Mutex::new(BTreeMap::new()),
            voter_payouts: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make the next `times` calls of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        *self.failures.lock().unwrap().entry(op).or_insert(0) += times;
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Unavailable(format!("injected failure on {op:?}")))
            }
            _ => Ok(()),
        }
    }

    /// Number of stored challenges.
    pub fn challenge_count(&self) -> usize {
        self.challenges.lock().unwrap().len()
    }

    /// Number of stored votes across all challenges.
    pub fn vote_count(&self) -> usize {
        self.votes.lock().unwrap().len()
    }

    /// Number of stored submissions across all challenges.
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChallengeStore for NullStore {
    async fn put_challenge(&self, challenge: &ChallengeRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutChallenge)?;
        self.challenges
            .lock()
            .unwrap()
            .insert(challenge.id.clone(), challenge.clone());
        Ok(())
    }

    async fn get_challenge(&self, id: &ChallengeId) -> Result<Option<ChallengeRecord>, StoreError> {
        Ok(self.challenges.lock().unwrap().get(id).cloned())
    }

    async fn delete_challenge(&self, id: &ChallengeId) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.challenges.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_challenges(&self) -> Result<Vec<ChallengeRecord>, StoreError> {
        Ok(self.challenges.lock().unwrap().values().cloned().collect())
    }

    async fn list_challenges_by_creator(
        &self,
        creator: &UserId,
    ) -> Result<Vec<ChallengeRecord>, StoreError> {
        Ok(self
            .challenges
            .lock()
            .unwrap()
            .values()
            .filter(|c| &c.creator == creator)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MembershipStore for NullStore {
    async fn put_membership(&self, membership: &MembershipRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutMembership)?;
        self.memberships.lock().unwrap().insert(
            (membership.challenge.clone(), membership.user.clone()),
            membership.clone(),
        );
        Ok(())
    }

    async fn get_membership(
        &self,
        challenge: &ChallengeId,
        user: &UserId,
    ) -> Result<Option<MembershipRecord>, StoreError> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .get(&(challenge.clone(), user.clone()))
            .cloned())
    }

    async fn list_memberships(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<MembershipRecord>, StoreError> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .values()
            .filter(|m| &m.challenge == challenge)
            .cloned()
            .collect())
    }

    async fn list_memberships_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<MembershipRecord>, StoreError> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .values()
            .filter(|m| &m.user == user)
            .cloned()
            .collect())
    }

    async fn delete_memberships(&self, challenge: &ChallengeId) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.memberships
            .lock()
            .unwrap()
            .retain(|(c, _), _| c != challenge);
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for NullStore {
    async fn put_submission(&self, submission: &SubmissionRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutSubmission)?;
        self.submissions
            .lock()
            .unwrap()
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn get_submission(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.submissions.lock().unwrap().get(id).cloned())
    }

    async fn list_submissions(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        Ok(self
            .submissions
            .lock()
            .unwrap()
            .values()
            .filter(|s| &s.challenge == challenge)
            .cloned()
            .collect())
    }

    async fn delete_submissions(&self, challenge: &ChallengeId) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.submissions
            .lock()
            .unwrap()
            .retain(|_, s| &s.challenge != challenge);
        Ok(())
    }
}

#[async_trait]
impl VoteStore for NullStore {
    async fn put_vote(&self, vote: &VoteRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutVote)?;
        self.votes
            .lock()
            .unwrap()
            .insert((vote.challenge.clone(), vote.voter.clone()), vote.clone());
        Ok(())
    }

    async fn get_vote(
        &self,
        challenge: &ChallengeId,
        voter: &UserId,
    ) -> Result<Option<VoteRecord>, StoreError> {
        Ok(self
            .votes
            .lock()
            .unwrap()
            .get(&(challenge.clone(), voter.clone()))
            .cloned())
    }

    async fn list_votes(&self, challenge: &ChallengeId) -> Result<Vec<VoteRecord>, StoreError> {
        Ok(self
            .votes
            .lock()
            .unwrap()
            .values()
            .filter(|v| &v.challenge == challenge)
            .cloned()
            .collect())
    }

    async fn delete_votes(&self, challenge: &ChallengeId) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.votes.lock().unwrap().retain(|(c, _), _| c != challenge);
        Ok(())
    }
}

#[async_trait]
impl ReportStore for NullStore {
    async fn put_report(&self, report: &ReportRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutReport)?;
        self.reports.lock().unwrap().insert(
            (report.challenge.clone(), report.reporter.clone()),
            report.clone(),
        );
        Ok(())
    }

    async fn list_reports(&self, challenge: &ChallengeId) -> Result<Vec<ReportRecord>, StoreError> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .values()
            .filter(|r| &r.challenge == challenge)
            .cloned()
            .collect())
    }

    async fn delete_reports(&self, challenge: &ChallengeId) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.reports.lock().unwrap().retain(|(c, _), _| c != challenge);
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for NullStore {
    async fn put_settlement(&self, record: &SettlementRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutSettlement)?;
        self.settlements
            .lock()
            .unwrap()
            .insert(record.challenge.clone(), record.clone());
        Ok(())
    }

    async fn get_settlement(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Option<SettlementRecord>, StoreError> {
        Ok(self.settlements.lock().unwrap().get(challenge).cloned())
    }

    async fn put_creator_claim(&self, record: &CreatorClaimRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutCreatorClaim)?;
        self.claims
            .lock()
            .unwrap()
            .insert(record.challenge.clone(), record.clone());
        Ok(())
    }

    async fn get_creator_claim(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Option<CreatorClaimRecord>, StoreError> {
        Ok(self.claims.lock().unwrap().get(challenge).cloned())
    }

    async fn put_voting_plan(&self, plan: &VotingDistributionPlan) -> Result<(), StoreError> {
        self.check(StoreOp::PutVotingPlan)?;
        self.voting_plans
            .lock()
            .unwrap()
            .insert(plan.challenge.clone(), plan.clone());
        Ok(())
    }

    async fn get_voting_plan(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Option<VotingDistributionPlan>, StoreError> {
        Ok(self.voting_plans.lock().unwrap().get(challenge).cloned())
    }

    async fn put_voter_payout(&self, record: &VoterPayoutRecord) -> Result<(), StoreError> {
        self.check(StoreOp::PutVoterPayout)?;
        self.voter_payouts.lock().unwrap().insert(
            (record.challenge.clone(), record.voter.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn get_voter_payout(
        &self,
        challenge: &ChallengeId,
        voter: &UserId,
    ) -> Result<Option<VoterPayoutRecord>, StoreError> {
        Ok(self
            .voter_payouts
            .lock()
            .unwrap()
            .get(&(challenge.clone(), voter.clone()))
            .cloned())
    }

    async fn list_voter_payouts(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<VoterPayoutRecord>, StoreError> {
        Ok(self
            .voter_payouts
            .lock()
            .unwrap()
            .values()
            .filter(|p| &p.challenge == challenge)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PendingStore for NullStore {
    async fn put_pending(&self, op: &PendingOperation) -> Result<(), StoreError> {
        self.check(StoreOp::PutPending)?;
        self.pending
            .lock()
            .unwrap()
            .insert(op.key.clone(), op.clone());
        Ok(())
    }

    async fn get_pending(&self, key: &PendingKey) -> Result<Option<PendingOperation>, StoreError> {
        Ok(self.pending.lock().unwrap().get(key).cloned())
    }

    async fn list_pending(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<PendingOperation>, StoreError> {
        Ok(self
            .pending
            .lock()
            .unwrap()
            .values()
            .filter(|p| &p.key.challenge == challenge)
            .cloned()
            .collect())
    }

    async fn delete_pending(&self, challenge: &ChallengeId) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.pending
            .lock()
            .unwrap()
            .retain(|k, _| &k.challenge != challenge);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpt_types::Timestamp;

    fn vote(challenge: &str, voter: &str) -> VoteRecord {
        VoteRecord {
            challenge: ChallengeId::new(challenge),
            voter: UserId::new(voter),
            submission: SubmissionId::new("s1"),
            fee_tx: None,
            cast_at: Timestamp::new(1),
        }
    }

    #[tokio::test]
    async fn injected_failure_is_consumed() {
        let store = NullStore::new();
        store.fail_next(StoreOp::PutVote, 1);

        assert!(matches!(
            store.put_vote(&vote("c1", "a")).await,
            Err(StoreError::Unavailable(_))
        ));
        store.put_vote(&vote("c1", "a")).await.unwrap();
        assert_eq!(store.vote_count(), 1);
    }

    #[tokio::test]
    async fn delete_is_scoped_to_challenge() {
        let store = NullStore::new();
        store.put_vote(&vote("c1", "a")).await.unwrap();
        store.put_vote(&vote("c2", "a")).await.unwrap();

        store.delete_votes(&ChallengeId::new("c1")).await.unwrap();

        assert!(store.list_votes(&ChallengeId::new("c1")).await.unwrap().is_empty());
        assert_eq!(store.list_votes(&ChallengeId::new("c2")).await.unwrap().len(), 1);
    }
}
