//! Fundamental types for the Coinpetitive challenge engine.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: identifiers, token amounts, timestamps, the clock abstraction
//! and the treasury/fee vocabulary used to talk to the value-transfer ledger.

pub mod amount;
pub mod clock;
pub mod ids;
pub mod time;
pub mod treasury;

pub use amount::Amount;
pub use clock::{Clock, SystemClock};
pub use ids::{AccountRef, ChallengeId, IdempotencyKey, SubmissionId, TxRef, UserId};
pub use time::Timestamp;
pub use treasury::{FeeKind, Payee, PoolKind, TreasuryRefs, BPS_DENOMINATOR};
