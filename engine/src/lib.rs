//! Challenge lifecycle and settlement engine.
//!
//! A challenge moves through Registration → Submission → Voting → Ended,
//! driven purely by its deadlines. While it does, the engine keeps two
//! independently-owned ledgers consistent: the off-chain record store
//! (memberships, submissions, votes, reports) and the on-chain value ledger
//! (entry fees, voting fees, reward treasury).
//!
//! - Paid actions go through a two-phase fee flow ([`fees`]) so a record is
//!   written only for a confirmed fee and a retry never pays twice.
//! - Mutations of one challenge are linearized by an async mutex keyed by
//!   challenge id.
//! - Settlement persists its plan before moving value and resumes from it,
//!   so rewards are disbursed exactly once.

pub mod admission;
pub mod challenge;
pub mod claim;
pub mod config;
pub mod distribution;
pub mod engagement;
pub mod engine;
pub mod error;
pub mod fees;
mod locks;
pub mod metrics;
pub mod moderation;
pub mod phase;
pub mod settlement;
pub mod spans;
pub mod submission;
pub mod voting;

pub use challenge::{ChallengeSnapshot, ChallengeView, NewChallenge};
pub use claim::{split_claim, ClaimSplit};
pub use config::{ConfigError, EngineConfig};
pub use distribution::{DistributionSummary, VoterFailure};
pub use engagement::{toggle_reaction, Reaction};
pub use engine::ChallengeEngine;
pub use error::{EngineError, ErrorKind};
pub use metrics::EngineMetrics;
pub use moderation::ReportOutcome;
pub use phase::{phase_deadline, resolve_phase, Phase, SettlementState};
pub use settlement::{plan_payouts, rank_submissions};
