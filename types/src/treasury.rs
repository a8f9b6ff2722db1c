//! Treasury and fee vocabulary shared by the engine, the record store and
//! the value-transfer ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AccountRef, ChallengeId, UserId};

/// 100% expressed in basis points.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// The two on-chain pools every challenge owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Reward funding plus participation fees.
    Reward,
    /// Voting fees.
    Voting,
}

/// Ledger accounts holding a challenge's pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryRefs {
    pub reward_pool: AccountRef,
    pub voting_pool: AccountRef,
}

impl TreasuryRefs {
    /// Deterministic treasury accounts for a challenge.
    pub fn for_challenge(challenge: &ChallengeId) -> Self {
        Self {
            reward_pool: AccountRef::new(format!("treasury/{challenge}/reward")),
            voting_pool: AccountRef::new(format!("treasury/{challenge}/voting")),
        }
    }

    pub fn account(&self, pool: PoolKind) -> &AccountRef {
        match pool {
            PoolKind::Reward => &self.reward_pool,
            PoolKind::Voting => &self.voting_pool,
        }
    }
}

/// What a fee pays for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// The creator funding the reward pool at creation.
    RewardFunding,
    /// A participant's entry fee.
    Entry,
    /// A voter's voting fee.
    Vote,
}

impl FeeKind {
    /// The pool this kind of fee is paid into.
    pub fn pool(&self) -> PoolKind {
        match self {
            Self::RewardFunding | Self::Entry => PoolKind::Reward,
            Self::Vote => PoolKind::Voting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RewardFunding => "reward_funding",
            Self::Entry => "entry",
            Self::Vote => "vote",
        }
    }
}

impl fmt::Display for FeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The receiving side of a transfer out of a treasury.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum Payee {
    User(UserId),
    Account(AccountRef),
}

impl fmt::Display for Payee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user) => write!(f, "user:{user}"),
            Self::Account(account) => write!(f, "account:{account}"),
        }
    }
}
