//! Settlement: winner selection, payout split and exactly-once disbursement.
//!
//! Ranking and the payout split are pure functions. `finalize` persists the
//! computed plan with status `Disbursing` before issuing the first transfer,
//! records each transaction reference as it lands, and marks the record
//! `Finalized` once every payout is settled. A re-run resumes from the stored
//! plan and never recomputes shares.

use cpt_ledger::TransferRequest;
use cpt_store::{
    ChallengeRecord, Disbursement, Payout, PayoutRank, SettlementRecord, SettlementStatus,
    SubmissionRecord,
};
use cpt_types::{AccountRef, Amount, ChallengeId, IdempotencyKey, Payee, TxRef, UserId};
use tracing::Instrument;

use crate::{spans, ChallengeEngine, EngineError, Phase, SettlementState};

/// Order submissions by tally (highest first), then by submission time and
/// id so equal tallies always rank the same way.
pub fn rank_submissions(mut submissions: Vec<SubmissionRecord>) -> Vec<SubmissionRecord> {
    submissions.sort_by(|a, b| {
        b.tally
            .cmp(&a.tally)
            .then(a.submitted_at.cmp(&b.submitted_at))
            .then(a.id.cmp(&b.id))
    });
    submissions
}

/// Group ranked submissions by equal tally. Zero-vote submissions are not
/// eligible and are left out.
fn tally_groups(ranked: &[SubmissionRecord]) -> Vec<&[SubmissionRecord]> {
    let eligible_len = ranked.iter().take_while(|s| s.tally > 0).count();
    ranked[..eligible_len]
        .chunk_by(|a, b| a.tally == b.tally)
        .collect()
}

/// Split `portion` equally across `group`. The integer remainder goes to
/// the first recipient so the shares always sum to `portion`.
fn split_group(
    challenge: &ChallengeId,
    group: &[SubmissionRecord],
    portion: Amount,
    rank: PayoutRank,
) -> Vec<Payout> {
    let (share, remainder) = portion.split_even(group.len());
    group
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let amount = if i == 0 { share + remainder } else { share };
            Payout {
                submission: s.id.clone(),
                recipient: s.participant.clone(),
                rank,
                disbursement: Disbursement::new(
                    IdempotencyKey::new(format!("settle/{challenge}/{}", s.id)),
                    Payee::User(s.participant.clone()),
                    amount,
                ),
            }
        })
        .collect()
}

/// Compute the payouts of a reward pool.
///
/// The top tally group shares `winner_share_bps` of the pool and the next
/// group shares the rest. Without a next group the top group takes the whole
/// pool. No eligible submission means no payout.
pub fn plan_payouts(
    challenge: &ChallengeId,
    pool: Amount,
    submissions: Vec<SubmissionRecord>,
    winner_share_bps: u32,
) -> Vec<Payout> {
    let ranked = rank_submissions(submissions);
    let groups = tally_groups(&ranked);
    match groups.as_slice() {
        [] => Vec::new(),
        [winners] => split_group(challenge, winners, pool, PayoutRank::Winner),
        [winners, runners_up, ..] => {
            let winner_portion = pool.share_bps(winner_share_bps).unwrap_or(pool);
            let runner_up_portion = pool.saturating_sub(winner_portion);
            let mut payouts = split_group(challenge, winners, winner_portion, PayoutRank::Winner);
            payouts.extend(split_group(
                challenge,
                runners_up,
                runner_up_portion,
                PayoutRank::RunnerUp,
            ));
            payouts
        }
    }
}

fn winners_of(payouts: &[Payout]) -> Vec<UserId> {
    payouts
        .iter()
        .filter(|p| p.rank == PayoutRank::Winner)
        .map(|p| p.recipient.clone())
        .collect()
}

impl ChallengeEngine {
    /// Settle a challenge whose voting has ended.
    ///
    /// Fails with `AlreadyFinalized` (carrying the terminal record) on every
    /// call after the first successful one.
    pub async fn finalize(&self, challenge: &ChallengeId) -> Result<SettlementRecord, EngineError> {
        async {
            let _guard = self.locks.lock(challenge).await;
            let mut record = self.load_challenge(challenge).await?;
            self.require_ended(&record)?;

            let mut settlement = match self.store.get_settlement(challenge).await? {
                Some(existing) if existing.is_finalized() => {
                    tracing::debug!("already finalized");
                    return Err(EngineError::AlreadyFinalized(Box::new(existing)));
                }
                Some(existing) => {
                    tracing::info!("resuming interrupted settlement");
                    existing
                }
                None => {
                    let payouts = self.plan_settlement(&record).await?;
                    let settlement = SettlementRecord {
                        challenge: challenge.clone(),
                        status: SettlementStatus::Disbursing,
                        reward_pool: record.reward,
                        winners: winners_of(&payouts),
                        payouts,
                        created_at: self.clock.now(),
                        finalized_at: None,
                    };
                    self.store.put_settlement(&settlement).await?;
                    tracing::info!(
                        payouts = settlement.payouts.len(),
                        pool = %settlement.reward_pool,
                        "settlement planned"
                    );
                    settlement
                }
            };

            for i in 0..settlement.payouts.len() {
                if settlement.payouts[i].disbursement.is_settled() {
                    continue;
                }
                let tx = self
                    .pay_out(&record.treasury.reward_pool, &settlement.payouts[i].disbursement)
                    .await?;
                settlement.payouts[i].disbursement.tx = Some(tx);
                self.store.put_settlement(&settlement).await?;
            }

            settlement.status = SettlementStatus::Finalized;
            settlement.finalized_at = Some(self.clock.now());
            self.store.put_settlement(&settlement).await?;

            if record.winners != settlement.winners {
                record.winners = settlement.winners.clone();
                self.store.put_challenge(&record).await?;
            }

            self.metrics.settlements.inc();
            tracing::info!(
                winners = settlement.winners.len(),
                paid = %settlement.total_paid(),
                "challenge finalized"
            );
            Ok(settlement)
        }
        .instrument(spans::settlement_span("finalize", challenge))
        .await
    }

    pub async fn settlement_state(
        &self,
        challenge: &ChallengeId,
    ) -> Result<SettlementState, EngineError> {
        let record = self.load_challenge(challenge).await?;
        self.settlement_state_of(&record).await
    }

    /// The settlement record of a challenge, if finalization has started.
    pub async fn settlement(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Option<SettlementRecord>, EngineError> {
        self.load_challenge(challenge).await?;
        Ok(self.store.get_settlement(challenge).await?)
    }

    pub(crate) async fn settlement_state_of(
        &self,
        record: &ChallengeRecord,
    ) -> Result<SettlementState, EngineError> {
        if self.phase(record) != Phase::Ended {
            return Ok(SettlementState::Open);
        }
        match self.store.get_settlement(&record.id).await? {
            Some(s) if s.is_finalized() => Ok(SettlementState::Finalized),
            _ => Ok(SettlementState::ReadyToFinalize),
        }
    }

    /// The payouts finalization would make. Empty when nobody is eligible
    /// or registration closed short of the minimum participant count.
    pub(crate) async fn plan_settlement(
        &self,
        record: &ChallengeRecord,
    ) -> Result<Vec<Payout>, EngineError> {
        let members = self.store.list_memberships(&record.id).await?.len();
        if members < record.bounds.min_participants as usize {
            tracing::info!(
                members,
                min = record.bounds.min_participants,
                "too few participants, no winner"
            );
            return Ok(Vec::new());
        }
        let submissions = self.store.list_submissions(&record.id).await?;
        Ok(plan_payouts(
            &record.id,
            record.reward,
            submissions,
            self.config.winner_share_bps,
        ))
    }

    /// Issue one planned transfer out of a treasury pool.
    pub(crate) async fn pay_out(
        &self,
        from: &AccountRef,
        disbursement: &Disbursement,
    ) -> Result<TxRef, EngineError> {
        let request = TransferRequest {
            from: from.clone(),
            to: disbursement.payee.clone(),
            amount: disbursement.amount,
            key: disbursement.key.clone(),
        };
        match self.treasury.disburse(&request).await {
            Ok(tx) => {
                self.metrics.disbursements.inc();
                Ok(tx)
            }
            Err(e) => {
                tracing::warn!(
                    payee = %request.to,
                    key = %request.key,
                    error = %e,
                    "transfer failed"
                );
                self.metrics.payment_failures.inc();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpt_types::{SubmissionId, Timestamp};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn sub(id: &str, tally: u64, at: u64) -> SubmissionRecord {
        SubmissionRecord {
            id: SubmissionId::new(id),
            challenge: ChallengeId::new("c"),
            participant: UserId::new(format!("p-{id}")),
            video: String::new(),
            description: String::new(),
            likes: 0,
            dislikes: 0,
            liked_by: BTreeSet::new(),
            disliked_by: BTreeSet::new(),
            tally,
            voters: BTreeSet::new(),
            submitted_at: Timestamp::new(at),
        }
    }

    fn amounts(payouts: &[Payout]) -> Vec<(String, u128, PayoutRank)> {
        payouts
            .iter()
            .map(|p| {
                (
                    p.submission.to_string(),
                    p.disbursement.amount.raw(),
                    p.rank,
                )
            })
            .collect()
    }

    fn plan(subs: Vec<SubmissionRecord>, pool: u128) -> Vec<Payout> {
        plan_payouts(&ChallengeId::new("c"), Amount::new(pool), subs, 7_500)
    }

    #[test]
    fn unique_winner_and_runner_up() {
        let payouts = plan(vec![sub("a", 3, 1), sub("b", 7, 2), sub("c", 1, 3)], 1000);
        assert_eq!(
            amounts(&payouts),
            vec![
                ("b".into(), 750, PayoutRank::Winner),
                ("a".into(), 250, PayoutRank::RunnerUp),
            ]
        );
    }

    #[test]
    fn lone_winner_takes_everything() {
        let payouts = plan(vec![sub("a", 4, 1), sub("b", 0, 2)], 1000);
        assert_eq!(amounts(&payouts), vec![("a".into(), 1000, PayoutRank::Winner)]);
    }

    #[test]
    fn tied_leaders_split_winner_share() {
        let payouts = plan(vec![sub("a", 5, 1), sub("b", 5, 2), sub("c", 2, 3)], 1000);
        assert_eq!(
            amounts(&payouts),
            vec![
                ("a".into(), 375, PayoutRank::Winner),
                ("b".into(), 375, PayoutRank::Winner),
                ("c".into(), 250, PayoutRank::RunnerUp),
            ]
        );
    }

    #[test]
    fn tied_leaders_without_next_group_share_all() {
        let payouts = plan(vec![sub("a", 2, 1), sub("b", 2, 2), sub("c", 2, 3)], 1000);
        assert_eq!(
            amounts(&payouts),
            vec![
                ("a".into(), 334, PayoutRank::Winner),
                ("b".into(), 333, PayoutRank::Winner),
                ("c".into(), 333, PayoutRank::Winner),
            ]
        );
    }

    #[test]
    fn dust_goes_to_earliest_submission() {
        let payouts = plan(vec![sub("late", 5, 9), sub("early", 5, 1), sub("r", 1, 3)], 101);
        // 75 to winners (38 + 37), 26 to the runner-up.
        assert_eq!(
            amounts(&payouts),
            vec![
                ("early".into(), 38, PayoutRank::Winner),
                ("late".into(), 37, PayoutRank::Winner),
                ("r".into(), 26, PayoutRank::RunnerUp),
            ]
        );
    }

    #[test]
    fn no_votes_means_no_payout() {
        assert!(plan(vec![sub("a", 0, 1), sub("b", 0, 2)], 1000).is_empty());
        assert!(plan(vec![], 1000).is_empty());
    }

    #[test]
    fn payout_keys_are_deterministic() {
        let payouts = plan(vec![sub("a", 1, 1)], 10);
        assert_eq!(payouts[0].disbursement.key.as_str(), "settle/c/a");
        assert_eq!(winners_of(&payouts), vec![UserId::new("p-a")]);
    }

    proptest! {
        #[test]
        fn payouts_conserve_pool(
            tallies in proptest::collection::vec(0u64..6, 0..12),
            pool in 0u128..1_000_000,
            bps in 0u32..=10_000,
        ) {
            let subs: Vec<_> = tallies
                .iter()
                .enumerate()
                .map(|(i, t)| sub(&format!("s{i}"), *t, i as u64))
                .collect();
            let any_votes = tallies.iter().any(|t| *t > 0);
            let payouts = plan_payouts(&ChallengeId::new("c"), Amount::new(pool), subs, bps);
            let total: u128 = payouts.iter().map(|p| p.disbursement.amount.raw()).sum();
            if any_votes {
                prop_assert_eq!(total, pool);
            } else {
                prop_assert!(payouts.is_empty());
            }
        }

        #[test]
        fn winners_never_get_less_than_runners_up_when_share_is_majority(
            tallies in proptest::collection::vec(1u64..4, 2..6),
            pool in 1_000u128..1_000_000,
        ) {
            let subs: Vec<_> = tallies
                .iter()
                .enumerate()
                .map(|(i, t)| sub(&format!("s{i}"), *t, i as u64))
                .collect();
            let payouts = plan_payouts(&ChallengeId::new("c"), Amount::new(pool), subs, 7_500);
            let paid = |rank: PayoutRank| -> u128 {
                payouts
                    .iter()
                    .filter(|p| p.rank == rank)
                    .map(|p| p.disbursement.amount.raw())
                    .sum()
            };
            let winners = paid(PayoutRank::Winner);
            let runners = paid(PayoutRank::RunnerUp);
            prop_assert!(winners >= runners);
        }
    }
}
