//! The value-transfer collaborator.
//!
//! The ledger is owned by someone else. The engine only issues fee and
//! transfer requests and waits for confirmation; signing, fees-for-gas and
//! consensus all live on the other side of this trait.

use crate::LedgerError;
use async_trait::async_trait;
use cpt_types::{AccountRef, Amount, ChallengeId, FeeKind, IdempotencyKey, Payee, TxRef, UserId};
use serde::{Deserialize, Serialize};

/// A fee paid by a user into one of a challenge's treasury pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRequest {
    pub payer: UserId,
    pub amount: Amount,
    pub treasury: AccountRef,
    pub challenge: ChallengeId,
    pub kind: FeeKind,
    /// The ledger executes at most one fee per key and returns the original
    /// transaction for a repeated key.
    pub key: IdempotencyKey,
}

/// A transfer out of a treasury pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: AccountRef,
    pub to: Payee,
    pub amount: Amount,
    pub key: IdempotencyKey,
}

#[async_trait]
pub trait ValueLedger: Send + Sync {
    /// Submit a fee payment. Returns as soon as the ledger has accepted the
    /// transaction; finality is observed through [`ValueLedger::confirm`].
    async fn submit_fee(&self, request: &FeeRequest) -> Result<TxRef, LedgerError>;

    /// Wait for a transaction to reach finality. `true` when it landed,
    /// `false` when it was rejected. May block for a long time.
    async fn confirm(&self, tx: &TxRef) -> Result<bool, LedgerError>;

    /// Move value out of a treasury pool.
    async fn transfer(&self, request: &TransferRequest) -> Result<TxRef, LedgerError>;

    /// Current balance of an account.
    async fn balance(&self, account: &AccountRef) -> Result<Amount, LedgerError>;
}
