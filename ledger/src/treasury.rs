//! Treasury accessor: the engine's only door to the value-transfer ledger.
//!
//! Wraps a [`ValueLedger`] with bounded waits. Every ledger call that
//! outlives its timeout is reported as such instead of hanging the caller.
//! A timed-out confirmation hands the transaction reference back so the
//! caller can resume later.

use crate::{FeeRequest, LedgerError, TransferRequest, ValueLedger};
use cpt_types::{AccountRef, Amount, TreasuryRefs, TxRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of waiting for a fee transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeeConfirmation {
    Confirmed,
    Rejected,
    /// Still unknown when the wait expired.
    TimedOut,
}

/// Live balances of a challenge's two pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryBalance {
    pub reward_pool: Amount,
    pub voting_pool: Amount,
}

pub struct TreasuryAccessor {
    ledger: Arc<dyn ValueLedger>,
    confirm_timeout: Duration,
    transfer_timeout: Duration,
}

impl TreasuryAccessor {
    pub fn new(
        ledger: Arc<dyn ValueLedger>,
        confirm_timeout: Duration,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            confirm_timeout,
            transfer_timeout,
        }
    }

    /// Submit a fee. Does not wait for finality.
    pub async fn pay_fee(&self, request: &FeeRequest) -> Result<TxRef, LedgerError> {
        let tx = tokio::time::timeout(self.transfer_timeout, self.ledger.submit_fee(request))
            .await
            .map_err(|_| LedgerError::Timeout(self.transfer_timeout))??;
        tracing::debug!(
            challenge = %request.challenge,
            payer = %request.payer,
            kind = %request.kind,
            amount = %request.amount,
            tx = %tx,
            "fee submitted"
        );
        Ok(tx)
    }

    /// Wait at most the confirmation timeout for `tx` to settle.
    pub async fn await_confirmation(&self, tx: &TxRef) -> Result<FeeConfirmation, LedgerError> {
        match tokio::time::timeout(self.confirm_timeout, self.ledger.confirm(tx)).await {
            Ok(Ok(true)) => Ok(FeeConfirmation::Confirmed),
            Ok(Ok(false)) => Ok(FeeConfirmation::Rejected),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(
                    tx = %tx,
                    timeout = ?self.confirm_timeout,
                    "fee confirmation timed out"
                );
                Ok(FeeConfirmation::TimedOut)
            }
        }
    }

    /// Issue a transfer out of a treasury pool.
    ///
    /// A timeout surfaces as [`LedgerError::Timeout`]; the request's
    /// idempotency key makes a later retry safe.
    pub async fn disburse(&self, request: &TransferRequest) -> Result<TxRef, LedgerError> {
        let tx = tokio::time::timeout(self.transfer_timeout, self.ledger.transfer(request))
            .await
            .map_err(|_| LedgerError::Timeout(self.transfer_timeout))??;
        tracing::debug!(
            from = %request.from,
            to = %request.to,
            amount = %request.amount,
            key = %request.key,
            tx = %tx,
            "transfer issued"
        );
        Ok(tx)
    }

    pub async fn balances(&self, refs: &TreasuryRefs) -> Result<TreasuryBalance, LedgerError> {
        let reward_pool = self.balance(&refs.reward_pool).await?;
        let voting_pool = self.balance(&refs.voting_pool).await?;
        Ok(TreasuryBalance {
            reward_pool,
            voting_pool,
        })
    }

    /// Read one account, bounded like a transfer.
    pub async fn balance(&self, account: &AccountRef) -> Result<Amount, LedgerError> {
        tokio::time::timeout(self.transfer_timeout, self.ledger.balance(account))
            .await
            .map_err(|_| {
                tracing::warn!(
                    account = %account,
                    timeout = ?self.transfer_timeout,
                    "balance query timed out"
                );
                LedgerError::Timeout(self.transfer_timeout)
            })?
    }
}
