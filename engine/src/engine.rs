//! The engine handle shared by every operation.

use cpt_ledger::{TreasuryAccessor, ValueLedger};
use cpt_store::{ChallengeRecord, RecordStore};
use cpt_types::{ChallengeId, Clock, UserId};
use std::sync::Arc;

use crate::locks::KeyedLocks;
use crate::{resolve_phase, EngineConfig, EngineError, EngineMetrics, Phase};

/// Challenge lifecycle and settlement engine.
///
/// Operations that mutate a challenge run inside a critical section keyed
/// by challenge id, so they are linearizable per challenge while different
/// challenges proceed in parallel. Voting-reward distribution is the
/// exception: it serializes per `(challenge, voter)` only.
pub struct ChallengeEngine {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) treasury: TreasuryAccessor,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
    pub(crate) metrics: Arc<EngineMetrics>,
    pub(crate) locks: KeyedLocks<ChallengeId>,
    pub(crate) plan_locks: KeyedLocks<ChallengeId>,
    pub(crate) payout_locks: KeyedLocks<(ChallengeId, UserId)>,
}

impl ChallengeEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: Arc<dyn ValueLedger>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let treasury =
            TreasuryAccessor::new(ledger, config.confirm_timeout(), config.transfer_timeout());
        Self {
            store,
            treasury,
            clock,
            config,
            metrics: Arc::new(EngineMetrics::new()),
            locks: KeyedLocks::new(),
            plan_locks: KeyedLocks::new(),
            payout_locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    pub(crate) async fn load_challenge(
        &self,
        id: &ChallengeId,
    ) -> Result<ChallengeRecord, EngineError> {
        self.store
            .get_challenge(id)
            .await?
            .ok_or_else(|| EngineError::not_found_challenge(id))
    }

    pub(crate) fn phase(&self, challenge: &ChallengeRecord) -> Phase {
        resolve_phase(&challenge.deadlines, self.clock.now())
    }

    /// `PhaseClosed` unless the challenge is currently in `expected`.
    pub(crate) fn require_phase(
        &self,
        challenge: &ChallengeRecord,
        expected: Phase,
    ) -> Result<(), EngineError> {
        if self.phase(challenge) != expected {
            return Err(self.phase_closed(challenge, expected));
        }
        Ok(())
    }

    pub(crate) fn phase_closed(
        &self,
        challenge: &ChallengeRecord,
        expected: Phase,
    ) -> EngineError {
        EngineError::PhaseClosed {
            challenge: challenge.id.clone(),
            expected,
            actual: self.phase(challenge),
        }
    }

    /// `TooEarly` unless voting has ended.
    pub(crate) fn require_ended(&self, challenge: &ChallengeRecord) -> Result<(), EngineError> {
        match self.phase(challenge) {
            Phase::Ended => Ok(()),
            phase => Err(EngineError::TooEarly {
                challenge: challenge.id.clone(),
                phase,
            }),
        }
    }
}
