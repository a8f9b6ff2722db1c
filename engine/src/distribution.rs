//! Voting-reward distribution.
//!
//! Every distinct voter of an ended challenge receives an equal share of the
//! voting pool. The pool is snapshotted into a [`VotingDistributionPlan`] on
//! the first run; later runs only pay voters still outstanding. Voters are
//! paid independently under per-voter guards, so one failure never holds up
//! the rest and no challenge-wide lock is taken.

use cpt_store::{Disbursement, VoterPayoutRecord, VotingDistributionPlan};
use cpt_types::{AccountRef, Amount, ChallengeId, FeeKind, IdempotencyKey, Payee, UserId};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::Instrument;

use crate::fees::holds_slot;
use crate::{spans, ChallengeEngine, EngineError, ErrorKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterFailure {
    pub voter: UserId,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one distribution run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSummary {
    /// Voters paid, in this run or an earlier one.
    pub processed: u32,
    pub total: u32,
    /// Voters paid by this run.
    pub newly_paid: u32,
    pub failures: Vec<VoterFailure>,
}

enum VoterOutcome {
    Paid,
    AlreadyPaid,
}

impl ChallengeEngine {
    pub async fn distribute_voting_rewards(
        &self,
        challenge: &ChallengeId,
    ) -> Result<DistributionSummary, EngineError> {
        async {
            let record = self.load_challenge(challenge).await?;
            self.require_ended(&record)?;

            let voters: BTreeSet<UserId> = self
                .store
                .list_submissions(challenge)
                .await?
                .into_iter()
                .flat_map(|s| s.voters)
                .collect();
            let plan = self.voting_plan(challenge, &voters).await?;

            let results: Vec<(UserId, Result<VoterOutcome, EngineError>)> =
                stream::iter(voters)
                    .map(|voter| {
                        let plan = &plan;
                        let pool = &record.treasury.voting_pool;
                        async move {
                            let span = spans::payout_span(&plan.challenge, &voter);
                            let result = self.pay_voter(plan, pool, &voter).instrument(span).await;
                            (voter, result)
                        }
                    })
                    .buffer_unordered(self.config.distribution_concurrency)
                    .collect()
                    .await;

            let mut summary = DistributionSummary {
                processed: 0,
                total: results.len() as u32,
                newly_paid: 0,
                failures: Vec::new(),
            };
            for (voter, result) in results {
                match result {
                    Ok(VoterOutcome::Paid) => {
                        summary.processed += 1;
                        summary.newly_paid += 1;
                    }
                    Ok(VoterOutcome::AlreadyPaid) => summary.processed += 1,
                    Err(e) => summary.failures.push(VoterFailure {
                        voter,
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                }
            }
            summary.failures.sort_by(|a, b| a.voter.cmp(&b.voter));

            tracing::info!(
                processed = summary.processed,
                total = summary.total,
                failed = summary.failures.len(),
                "voting rewards distributed"
            );
            Ok(summary)
        }
        .instrument(spans::settlement_span("distribute_voting_rewards", challenge))
        .await
    }

    /// Load the distribution plan, snapshotting the voting pool on first use.
    ///
    /// Fees of votes never counted are held back for their refund.
    async fn voting_plan(
        &self,
        challenge: &ChallengeId,
        voters: &BTreeSet<UserId>,
    ) -> Result<VotingDistributionPlan, EngineError> {
        let _guard = self.plan_locks.lock(challenge).await;
        if let Some(plan) = self.store.get_voting_plan(challenge).await? {
            return Ok(plan);
        }
        let record = self.load_challenge(challenge).await?;
        let stranded: Amount = self
            .store
            .list_pending(challenge)
            .await?
            .iter()
            .filter(|op| op.key.kind == FeeKind::Vote && !voters.contains(&op.key.user))
            .filter(|op| holds_slot(op))
            .map(|op| op.amount)
            .sum();
        let balance = self.treasury.balance(&record.treasury.voting_pool).await?;
        let pool_snapshot = balance.saturating_sub(stranded);
        let voters = voters.len();
        let (per_voter, dust) = pool_snapshot.split_even(voters);
        let plan = VotingDistributionPlan {
            challenge: challenge.clone(),
            pool_snapshot,
            total_voters: voters as u32,
            per_voter,
            created_at: self.clock.now(),
        };
        self.store.put_voting_plan(&plan).await?;
        tracing::info!(
            pool = %pool_snapshot,
            voters,
            per_voter = %per_voter,
            dust = %dust,
            held_back = %stranded,
            "voting pool snapshotted"
        );
        Ok(plan)
    }

    async fn pay_voter(
        &self,
        plan: &VotingDistributionPlan,
        pool: &AccountRef,
        voter: &UserId,
    ) -> Result<VoterOutcome, EngineError> {
        let _guard = self
            .payout_locks
            .lock(&(plan.challenge.clone(), voter.clone()))
            .await;

        let mut payout = match self.store.get_voter_payout(&plan.challenge, voter).await? {
            Some(p) if p.disbursement.is_settled() => return Ok(VoterOutcome::AlreadyPaid),
            Some(p) => p,
            None => {
                let payout = VoterPayoutRecord {
                    challenge: plan.challenge.clone(),
                    voter: voter.clone(),
                    disbursement: Disbursement::new(
                        IdempotencyKey::new(format!("voting/{}/{voter}", plan.challenge)),
                        Payee::User(voter.clone()),
                        plan.per_voter,
                    ),
                    paid_at: None,
                };
                self.store.put_voter_payout(&payout).await?;
                payout
            }
        };

        if !payout.disbursement.amount.is_zero() {
            let tx = self.pay_out(pool, &payout.disbursement).await?;
            payout.disbursement.tx = Some(tx);
        }
        payout.paid_at = Some(self.clock.now());
        self.store.put_voter_payout(&payout).await?;
        tracing::debug!(amount = %payout.disbursement.amount, "voter paid");
        Ok(VoterOutcome::Paid)
    }
}
