//! Admission ledger: participant membership against capacity bounds.

use cpt_store::{MembershipRecord, PendingKey};
use cpt_types::{ChallengeId, FeeKind, TxRef, UserId};
use tracing::Instrument;

use crate::fees::{awaits_record, holds_slot, FeeSpec};
use crate::{spans, ChallengeEngine, EngineError, Phase};

impl ChallengeEngine {
    /// Admit `user` to a challenge after their participation fee confirms.
    ///
    /// `fee_tx` is the transaction reference returned by an earlier attempt
    /// that timed out; it must match the engine's pending fee.
    pub async fn join(
        &self,
        challenge: &ChallengeId,
        user: &UserId,
        fee_tx: Option<TxRef>,
    ) -> Result<MembershipRecord, EngineError> {
        async {
            let _guard = self.locks.lock(challenge).await;
            let record = self.load_challenge(challenge).await?;
            let pending_key = PendingKey::new(challenge.clone(), user.clone(), FeeKind::Entry);
            let pending = self.store.get_pending(&pending_key).await?;
            let existing = self.store.get_membership(challenge, user).await?;

            if let Some(existing) = &existing {
                if pending.as_ref().is_some_and(awaits_record) {
                    self.mark_recorded(&pending_key, existing.fee_tx.as_ref())
                        .await?;
                    tracing::debug!("membership already recorded");
                    return Ok(existing.clone());
                }
            }

            // A fee committed during registration still completes while
            // submissions are open. Later it is paid back instead.
            let stranded = pending.filter(|op| holds_slot(op) && existing.is_none());
            match (self.phase(&record), stranded) {
                (Phase::Registration, _) | (Phase::Submission, Some(_)) => {}
                (Phase::Voting | Phase::Ended, Some(op)) => {
                    let treasury = &record.treasury.reward_pool;
                    return Err(self
                        .refund_after_close(&record, op, treasury, Phase::Registration)
                        .await);
                }
                _ => return Err(self.phase_closed(&record, Phase::Registration)),
            }

            if existing.is_some() {
                return Err(EngineError::AlreadyMember {
                    challenge: challenge.clone(),
                    user: user.clone(),
                });
            }

            let members = self.store.list_memberships(challenge).await?.len();
            let reserved = self
                .store
                .list_pending(challenge)
                .await?
                .iter()
                .filter(|op| op.key.kind == FeeKind::Entry && &op.key.user != user)
                .filter(|op| holds_slot(op))
                .count();
            if members + reserved >= record.bounds.max_participants as usize {
                return Err(EngineError::CapacityExceeded {
                    challenge: challenge.clone(),
                    limit: record.bounds.max_participants,
                });
            }

            if &record.creator == user {
                return Err(EngineError::SelfJoinForbidden);
            }

            let fee_tx = self
                .collect_fee(FeeSpec {
                    key: &pending_key,
                    amount: record.participation_fee,
                    treasury: &record.treasury.reward_pool,
                    supplied: fee_tx.as_ref(),
                })
                .await?;

            let membership = MembershipRecord {
                challenge: challenge.clone(),
                user: user.clone(),
                joined_at: self.clock.now(),
                fee_paid: record.participation_fee,
                fee_tx,
            };
            self.store.put_membership(&membership).await?;
            self.mark_recorded(&pending_key, membership.fee_tx.as_ref())
                .await?;

            self.metrics.joins.inc();
            tracing::info!(members = members + 1, "participant joined");
            Ok(membership)
        }
        .instrument(spans::operation_span("join", challenge, user))
        .await
    }
}
