#![allow(dead_code)]

use cpt_engine::{ChallengeEngine, EngineConfig, NewChallenge};
use cpt_nullables::{NullClock, NullLedger, NullStore};
use cpt_store::{CapacityBounds, ChallengeRecord, Deadlines, SubmissionRecord};
use cpt_types::{Amount, ChallengeId, Timestamp, UserId};
use std::sync::Arc;

pub const START: u64 = 100;
pub const REGISTRATION_END: u64 = 1_000;
pub const SUBMISSION_END: u64 = 2_000;
pub const VOTING_END: u64 = 3_000;

pub const REWARD: u128 = 1_000;
pub const ENTRY_FEE: u128 = 10;
pub const VOTING_FEE: u128 = 2;

pub fn user(name: &str) -> UserId {
    UserId::new(name)
}

pub fn creator() -> UserId {
    user("creator")
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        confirm_timeout_ms: 100,
        transfer_timeout_ms: 200,
        ..EngineConfig::default()
    }
}

pub fn new_challenge(max_participants: u32, max_voters: u32) -> NewChallenge {
    NewChallenge {
        id: None,
        title: "Longest wheelie".into(),
        category: "bikes".into(),
        description: "One take, no cuts".into(),
        keywords: vec!["bmx".into()],
        bounds: CapacityBounds {
            min_participants: 0,
            max_participants,
            min_voters: 0,
            max_voters,
        },
        reward: Amount::new(REWARD),
        participation_fee: Amount::new(ENTRY_FEE),
        voting_fee: Amount::new(VOTING_FEE),
        deadlines: Deadlines {
            registration_end: Timestamp::new(REGISTRATION_END),
            submission_end: Timestamp::new(SUBMISSION_END),
            voting_end: Timestamp::new(VOTING_END),
        },
        funding_tx: None,
    }
}

pub struct Harness {
    pub engine: Arc<ChallengeEngine>,
    pub store: Arc<NullStore>,
    pub ledger: Arc<NullLedger>,
    pub clock: Arc<NullClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(NullStore::new());
        let ledger = Arc::new(NullLedger::new());
        let clock = Arc::new(NullClock::new(START));
        let engine = Arc::new(ChallengeEngine::new(
            store.clone(),
            ledger.clone(),
            clock.clone(),
            config,
        ));
        Self {
            engine,
            store,
            ledger,
            clock,
        }
    }

    pub async fn create(&self, max_participants: u32, max_voters: u32) -> ChallengeRecord {
        self.engine
            .create_challenge(&creator(), new_challenge(max_participants, max_voters))
            .await
            .expect("challenge should be created")
    }

    pub async fn join_all(&self, challenge: &ChallengeId, names: &[&str]) {
        for name in names {
            self.engine
                .join(challenge, &user(name), None)
                .await
                .expect("join should succeed");
        }
    }

    /// Join and submit one video per participant.
    pub async fn enter_all(
        &self,
        challenge: &ChallengeId,
        names: &[&str],
    ) -> Vec<SubmissionRecord> {
        self.join_all(challenge, names).await;
        self.to_submission();
        let mut submissions = Vec::new();
        for name in names {
            let s = self
                .engine
                .submit(challenge, &user(name), format!("https://media/{name}.mp4"), String::new())
                .await
                .expect("submit should succeed");
            submissions.push(s);
            self.clock.advance(1);
        }
        submissions
    }

    /// Cast `count` votes for `submission` from fresh voters named `{prefix}{i}`.
    pub async fn votes_for(&self, submission: &SubmissionRecord, prefix: &str, count: usize) {
        for i in 0..count {
            self.engine
                .vote(&submission.challenge, &user(&format!("{prefix}{i}")), &submission.id, None)
                .await
                .expect("vote should succeed");
        }
    }

    pub fn to_submission(&self) {
        self.clock.set(REGISTRATION_END);
    }

    pub fn to_voting(&self) {
        self.clock.set(SUBMISSION_END);
    }

    pub fn to_ended(&self) {
        self.clock.set(VOTING_END);
    }
}
