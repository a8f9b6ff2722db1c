//! Creator reward claim.
//!
//! After voting ends the creator collects the entry fees minus the protocol
//! cut, plus the whole reward when nobody won. Claimed once per challenge.

use cpt_store::{ClaimStatus, CreatorClaimRecord, Disbursement, SettlementRecord};
use cpt_types::{Amount, ChallengeId, IdempotencyKey, Payee, UserId};
use tracing::Instrument;

use crate::{spans, ChallengeEngine, EngineError};

/// How a creator claim divides the collected entry fees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimSplit {
    pub entry_fees: Amount,
    pub protocol_fee: Amount,
    pub refunded_reward: Amount,
    pub creator_amount: Amount,
}

/// Split `entry_fees` between creator and protocol, adding `refund` to the
/// creator's side.
pub fn split_claim(entry_fees: Amount, protocol_fee_bps: u32, refund: Amount) -> ClaimSplit {
    let protocol_fee = entry_fees.share_bps(protocol_fee_bps).unwrap_or(Amount::ZERO);
    ClaimSplit {
        entry_fees,
        protocol_fee,
        refunded_reward: refund,
        creator_amount: entry_fees.saturating_sub(protocol_fee) + refund,
    }
}

impl ChallengeEngine {
    pub async fn claim_creator_reward(
        &self,
        challenge: &ChallengeId,
        caller: &UserId,
    ) -> Result<CreatorClaimRecord, EngineError> {
        async {
            let _guard = self.locks.lock(challenge).await;
            let record = self.load_challenge(challenge).await?;
            self.require_ended(&record)?;
            if &record.creator != caller {
                return Err(EngineError::NotCreator {
                    challenge: challenge.clone(),
                    user: caller.clone(),
                });
            }

            let mut claim = match self.store.get_creator_claim(challenge).await? {
                Some(existing) if existing.status == ClaimStatus::Claimed => {
                    return Err(EngineError::AlreadyClaimed(challenge.clone()));
                }
                Some(existing) => {
                    tracing::info!("resuming interrupted creator claim");
                    existing
                }
                None => {
                    let has_winner = match self.store.get_settlement(challenge).await? {
                        Some(SettlementRecord { payouts, .. }) => !payouts.is_empty(),
                        None => !self.plan_settlement(&record).await?.is_empty(),
                    };
                    let refund = if has_winner { Amount::ZERO } else { record.reward };
                    let entry_fees: Amount = self
                        .store
                        .list_memberships(challenge)
                        .await?
                        .iter()
                        .map(|m| m.fee_paid)
                        .sum();
                    let split = split_claim(entry_fees, self.config.protocol_fee_bps, refund);

                    let claim = CreatorClaimRecord {
                        challenge: challenge.clone(),
                        creator: record.creator.clone(),
                        entry_fees: split.entry_fees,
                        protocol_fee: split.protocol_fee,
                        refunded_reward: split.refunded_reward,
                        creator_payout: Disbursement::new(
                            IdempotencyKey::new(format!("claim/{challenge}/creator")),
                            Payee::User(record.creator.clone()),
                            split.creator_amount,
                        ),
                        protocol_payout: Disbursement::new(
                            IdempotencyKey::new(format!("claim/{challenge}/protocol")),
                            Payee::Account(self.config.protocol_treasury.clone()),
                            split.protocol_fee,
                        ),
                        status: ClaimStatus::Disbursing,
                        created_at: self.clock.now(),
                        claimed_at: None,
                    };
                    self.store.put_creator_claim(&claim).await?;
                    claim
                }
            };

            if !claim.creator_payout.is_settled() {
                let tx = self
                    .pay_out(&record.treasury.reward_pool, &claim.creator_payout)
                    .await?;
                claim.creator_payout.tx = Some(tx);
                self.store.put_creator_claim(&claim).await?;
            }
            if !claim.protocol_payout.is_settled() {
                let tx = self
                    .pay_out(&record.treasury.reward_pool, &claim.protocol_payout)
                    .await?;
                claim.protocol_payout.tx = Some(tx);
                self.store.put_creator_claim(&claim).await?;
            }

            claim.status = ClaimStatus::Claimed;
            claim.claimed_at = Some(self.clock.now());
            self.store.put_creator_claim(&claim).await?;

            self.metrics.creator_claims.inc();
            tracing::info!(
                creator_amount = %claim.creator_payout.amount,
                protocol_fee = %claim.protocol_fee,
                refunded = %claim.refunded_reward,
                "creator reward claimed"
            );
            Ok(claim)
        }
        .instrument(spans::settlement_span("claim_creator_reward", challenge))
        .await
    }
}
