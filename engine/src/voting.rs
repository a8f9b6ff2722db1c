//! Vote ledger: one paid vote per voter per challenge.

use cpt_store::{PendingKey, VoteRecord};
use cpt_types::{ChallengeId, FeeKind, SubmissionId, TxRef, UserId};
use std::collections::BTreeSet;
use tracing::Instrument;

use crate::fees::{awaits_record, holds_slot, FeeSpec};
use crate::{spans, ChallengeEngine, EngineError, Phase};

impl ChallengeEngine {
    /// Cast `voter`'s single vote in a challenge for `submission`.
    ///
    /// The voting fee must confirm before the vote is counted.
    pub async fn vote(
        &self,
        challenge: &ChallengeId,
        voter: &UserId,
        submission: &SubmissionId,
        fee_tx: Option<TxRef>,
    ) -> Result<VoteRecord, EngineError> {
        async {
            let _guard = self.locks.lock(challenge).await;
            let record = self.load_challenge(challenge).await?;
            let pending_key = PendingKey::new(challenge.clone(), voter.clone(), FeeKind::Vote);
            let pending = self.store.get_pending(&pending_key).await?;

            if self.phase(&record) != Phase::Voting {
                let stranded = pending.filter(|op| holds_slot(op));
                let Some(op) = stranded else {
                    return Err(self.phase_closed(&record, Phase::Voting));
                };
                // Counted before voting ended: only the bookkeeping is left.
                let submissions = self.store.list_submissions(challenge).await?;
                if let Some(voted) = submissions.iter().find(|s| s.has_voter(voter)) {
                    return self.complete_vote(&pending_key, voted.id.clone()).await;
                }
                let treasury = &record.treasury.voting_pool;
                return Err(self
                    .refund_after_close(&record, op, treasury, Phase::Voting)
                    .await);
            }

            let not_found = || EngineError::NotFound(format!("submission {submission}"));
            let target = self
                .store
                .get_submission(submission)
                .await?
                .ok_or_else(not_found)?;
            if &target.challenge != challenge {
                return Err(not_found());
            }

            let submissions = self.store.list_submissions(challenge).await?;
            if let Some(voted) = submissions.iter().find(|s| s.has_voter(voter)) {
                if pending.as_ref().is_some_and(awaits_record) {
                    return self.complete_vote(&pending_key, voted.id.clone()).await;
                }
                return Err(EngineError::AlreadyVotedInChallenge {
                    challenge: challenge.clone(),
                    user: voter.clone(),
                });
            }

            let distinct: BTreeSet<&UserId> =
                submissions.iter().flat_map(|s| s.voters.iter()).collect();
            let reserved = self
                .store
                .list_pending(challenge)
                .await?
                .iter()
                .filter(|op| op.key.kind == FeeKind::Vote && &op.key.user != voter)
                .filter(|op| holds_slot(op))
                .count();
            if distinct.len() + reserved >= record.bounds.max_voters as usize {
                return Err(EngineError::CapacityExceeded {
                    challenge: challenge.clone(),
                    limit: record.bounds.max_voters,
                });
            }

            let fee_tx = self
                .collect_fee(FeeSpec {
                    key: &pending_key,
                    amount: record.voting_fee,
                    treasury: &record.treasury.voting_pool,
                    supplied: fee_tx.as_ref(),
                })
                .await?;

            let mut target = target;
            target.voters.insert(voter.clone());
            target.tally += 1;
            self.store.put_submission(&target).await?;

            let vote = VoteRecord {
                challenge: challenge.clone(),
                voter: voter.clone(),
                submission: target.id.clone(),
                fee_tx,
                cast_at: self.clock.now(),
            };
            self.store.put_vote(&vote).await?;
            self.mark_recorded(&pending_key, vote.fee_tx.as_ref()).await?;

            self.metrics.votes.inc();
            tracing::info!(submission = %target.id, tally = target.tally, "vote recorded");
            Ok(vote)
        }
        .instrument(spans::operation_span("vote", challenge, voter))
        .await
    }

    /// Finish a vote whose tally was updated but whose bookkeeping was not.
    async fn complete_vote(
        &self,
        key: &PendingKey,
        submission: SubmissionId,
    ) -> Result<VoteRecord, EngineError> {
        let vote = match self.store.get_vote(&key.challenge, &key.user).await? {
            Some(vote) => vote,
            None => {
                let tx = self
                    .store
                    .get_pending(key)
                    .await?
                    .and_then(|op| op.status.tx().cloned());
                let vote = VoteRecord {
                    challenge: key.challenge.clone(),
                    voter: key.user.clone(),
                    submission,
                    fee_tx: tx,
                    cast_at: self.clock.now(),
                };
                self.store.put_vote(&vote).await?;
                vote
            }
        };
        self.mark_recorded(key, vote.fee_tx.as_ref()).await?;
        tracing::debug!("vote already counted, bookkeeping completed");
        Ok(vote)
    }
}
