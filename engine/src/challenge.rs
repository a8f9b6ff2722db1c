//! Challenge creation, listings and snapshots.

use cpt_ledger::TreasuryBalance;
use cpt_store::{CapacityBounds, ChallengeRecord, Deadlines, PendingKey, SubmissionRecord};
use cpt_types::{Amount, ChallengeId, FeeKind, TreasuryRefs, TxRef, UserId};
use cpt_utils::format_duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::Instrument;

use crate::fees::{is_committed, FeeSpec};
use crate::settlement::rank_submissions;
use crate::{phase_deadline, spans, ChallengeEngine, EngineError, Phase, SettlementState};

/// Parameters of a new challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChallenge {
    /// Caller-chosen id. Retrying a creation with the same id resumes it
    /// instead of creating a second challenge.
    #[serde(default)]
    pub id: Option<ChallengeId>,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub bounds: CapacityBounds,
    pub reward: Amount,
    pub participation_fee: Amount,
    pub voting_fee: Amount,
    pub deadlines: Deadlines,
    /// Reward-funding transaction received on an earlier attempt.
    #[serde(default)]
    pub funding_tx: Option<TxRef>,
}

/// A challenge together with its derived phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub challenge: ChallengeRecord,
    pub phase: Phase,
}

/// Everything a client shows for one challenge, read fresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSnapshot {
    pub challenge: ChallengeRecord,
    pub phase: Phase,
    /// Seconds until the current phase ends; `None` once ended.
    pub phase_ends_in: Option<u64>,
    pub phase_ends_in_human: Option<String>,
    pub settlement: SettlementState,
    pub participants: u32,
    /// Submissions ranked by tally, highest first.
    pub submissions: Vec<SubmissionRecord>,
    pub distinct_voters: u32,
    pub report_count: u32,
    pub treasury: TreasuryBalance,
}

fn validate(new: &NewChallenge, now: cpt_types::Timestamp) -> Result<(), EngineError> {
    let invalid = |msg: &str| Err(EngineError::InvalidChallenge(msg.to_string()));
    if new.title.trim().is_empty() {
        return invalid("title must not be empty");
    }
    if !new.deadlines.is_ordered() {
        return invalid("deadlines must satisfy registration_end <= submission_end <= voting_end");
    }
    if new.deadlines.registration_end <= now {
        return invalid("registration must end in the future");
    }
    let b = &new.bounds;
    if b.max_participants == 0 {
        return invalid("max_participants must be at least 1");
    }
    if b.min_participants > b.max_participants {
        return invalid("min_participants exceeds max_participants");
    }
    if b.min_voters > b.max_voters {
        return invalid("min_voters exceeds max_voters");
    }
    Ok(())
}

impl ChallengeEngine {
    /// Create a challenge, funding its reward pool from the creator.
    ///
    /// The record is written only once the funding fee is confirmed.
    pub async fn create_challenge(
        &self,
        creator: &UserId,
        new: NewChallenge,
    ) -> Result<ChallengeRecord, EngineError> {
        let id = new.id.clone().unwrap_or_else(ChallengeId::generate);
        async {
            let _guard = self.locks.lock(&id).await;
            let pending_key = PendingKey::new(id.clone(), creator.clone(), FeeKind::RewardFunding);
            let pending = self.store.get_pending(&pending_key).await?;

            if let Some(existing) = self.store.get_challenge(&id).await? {
                if &existing.creator != creator {
                    return Err(EngineError::InvalidChallenge(format!(
                        "challenge id {id} is taken"
                    )));
                }
                tracing::debug!("challenge already created, completing bookkeeping");
                self.mark_recorded(&pending_key, existing.funding_tx.as_ref())
                    .await?;
                return Ok(existing);
            }

            if !is_committed(pending.as_ref()) {
                validate(&new, self.clock.now())?;
            }

            let treasury = TreasuryRefs::for_challenge(&id);
            let funding_tx = self
                .collect_fee(FeeSpec {
                    key: &pending_key,
                    amount: new.reward,
                    treasury: &treasury.reward_pool,
                    supplied: new.funding_tx.as_ref(),
                })
                .await?;

            let record = ChallengeRecord {
                id: id.clone(),
                creator: creator.clone(),
                title: new.title,
                category: new.category,
                description: new.description,
                keywords: new.keywords,
                bounds: new.bounds,
                reward: new.reward,
                participation_fee: new.participation_fee,
                voting_fee: new.voting_fee,
                deadlines: new.deadlines,
                treasury,
                funding_tx,
                winners: Vec::new(),
                report_count: 0,
                created_at: self.clock.now(),
            };
            self.store.put_challenge(&record).await?;
            self.mark_recorded(&pending_key, record.funding_tx.as_ref())
                .await?;

            self.metrics.challenges_created.inc();
            tracing::info!(reward = %record.reward, "challenge created");
            Ok(record)
        }
        .instrument(spans::operation_span("create_challenge", &id, creator))
        .await
    }

    /// The phase a stored challenge is in right now.
    pub async fn phase_of(&self, challenge: &ChallengeId) -> Result<Phase, EngineError> {
        let record = self.load_challenge(challenge).await?;
        Ok(self.phase(&record))
    }

    pub async fn get_challenge(
        &self,
        challenge: &ChallengeId,
    ) -> Result<ChallengeView, EngineError> {
        let record = self.load_challenge(challenge).await?;
        Ok(self.view(record))
    }

    /// Every challenge, newest first.
    pub async fn list_challenges(&self) -> Result<Vec<ChallengeView>, EngineError> {
        let mut records = self.store.list_challenges().await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(records.into_iter().map(|r| self.view(r)).collect())
    }

    /// Challenges a user created or joined, newest first.
    pub async fn challenges_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<ChallengeView>, EngineError> {
        let mut found: BTreeMap<ChallengeId, ChallengeRecord> = self
            .store
            .list_challenges_by_creator(user)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        for membership in self.store.list_memberships_for_user(user).await? {
            if found.contains_key(&membership.challenge) {
                continue;
            }
            if let Some(record) = self.store.get_challenge(&membership.challenge).await? {
                found.insert(record.id.clone(), record);
            }
        }

        let mut records: Vec<_> = found.into_values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(records.into_iter().map(|r| self.view(r)).collect())
    }

    /// Submissions of a challenge ranked by tally.
    pub async fn ranked_submissions(
        &self,
        challenge: &ChallengeId,
    ) -> Result<Vec<SubmissionRecord>, EngineError> {
        self.load_challenge(challenge).await?;
        let submissions = self.store.list_submissions(challenge).await?;
        Ok(rank_submissions(submissions))
    }

    /// Live balances of a challenge's reward and voting pools.
    pub async fn treasury_balance(
        &self,
        challenge: &ChallengeId,
    ) -> Result<TreasuryBalance, EngineError> {
        let record = self.load_challenge(challenge).await?;
        Ok(self.treasury.balances(&record.treasury).await?)
    }

    /// A fresh snapshot of a challenge. Callers poll this at their own pace.
    pub async fn refresh(&self, challenge: &ChallengeId) -> Result<ChallengeSnapshot, EngineError> {
        let record = self.load_challenge(challenge).await?;
        let now = self.clock.now();
        let phase = self.phase(&record);
        let phase_ends_in = phase_deadline(&record.deadlines, phase).map(|d| d.remaining_from(now));

        let participants = self.store.list_memberships(challenge).await?.len();
        let submissions = rank_submissions(self.store.list_submissions(challenge).await?);
        let distinct_voters: BTreeSet<&UserId> =
            submissions.iter().flat_map(|s| s.voters.iter()).collect();
        let settlement = self.settlement_state_of(&record).await?;
        let treasury = self.treasury.balances(&record.treasury).await?;

        Ok(ChallengeSnapshot {
            phase,
            phase_ends_in,
            phase_ends_in_human: phase_ends_in.map(format_duration),
            settlement,
            participants: participants as u32,
            distinct_voters: distinct_voters.len() as u32,
            report_count: record.report_count,
            submissions,
            treasury,
            challenge: record,
        })
    }

    fn view(&self, challenge: ChallengeRecord) -> ChallengeView {
        ChallengeView {
            phase: self.phase(&challenge),
            challenge,
        }
    }
}
