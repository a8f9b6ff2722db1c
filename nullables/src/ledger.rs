//! Nullable value ledger: an in-memory stand-in for the on-chain ledger.
//!
//! Deduplicates fees and transfers by idempotency key, credits a treasury
//! only once its fee is confirmed, and refuses transfers the source account
//! cannot cover. Behaviour on confirmation, transfer and balance queries
//! can be steered per test.

use async_trait::async_trait;
use cpt_ledger::{FeeRequest, LedgerError, TransferRequest, ValueLedger};
use cpt_types::{AccountRef, Amount, IdempotencyKey, Payee, TxRef, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// How [`NullLedger`] answers a confirmation request for a pending fee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmMode {
    Confirm,
    Reject,
    /// Never answer; the caller's timeout fires.
    Hang,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FeeState {
    Pending,
    Confirmed,
    Rejected,
}

struct FeeEntry {
    request: FeeRequest,
    state: FeeState,
}

pub struct NullLedger {
    accounts: Mutex<HashMap<AccountRef, Amount>>,
    received: Mutex<HashMap<Payee, Amount>>,
    fees: Mutex<HashMap<TxRef, FeeEntry>>,
    by_key: Mutex<HashMap<IdempotencyKey, TxRef>>,
    confirm_mode: Mutex<ConfirmMode>,
    failing_payees: Mutex<HashSet<Payee>>,
    hang_balances: AtomicBool,
    fail_fee_submits: AtomicU32,
    lost_transfer_responses: AtomicU32,
    fee_calls: AtomicU64,
    transfer_calls: AtomicU64,
    transfers_executed: AtomicU64,
    next_tx: AtomicU64,
}

impl NullLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            received: Mutex::new(HashMap::new()),
            fees: Mutex::new(HashMap::new()),
            by_key: Mutex::new(HashMap::new()),
            confirm_mode: Mutex::new(ConfirmMode::Confirm),
            failing_payees: Mutex::new(HashSet::new()),
            hang_balances: AtomicBool::new(false),
            fail_fee_submits: AtomicU32::new(0),
            lost_transfer_responses: AtomicU32::new(0),
            fee_calls: AtomicU64::new(0),
            transfer_calls: AtomicU64::new(0),
            transfers_executed: AtomicU64::new(0),
            next_tx: AtomicU64::new(1),
        }
    }

    pub fn set_confirm_mode(&self, mode: ConfirmMode) {
        *self.confirm_mode.lock().unwrap() = mode;
    }

    /// Make every transfer to `payee` fail until cleared.
    pub fn fail_transfers_to(&self, payee: Payee) {
        self.failing_payees.lock().unwrap().insert(payee);
    }

    pub fn clear_transfer_failures(&self) {
        self.failing_payees.lock().unwrap().clear();
    }

    /// Make balance queries never answer until switched back.
    pub fn set_balances_hang(&self, hang: bool) {
        self.hang_balances.store(hang, Ordering::SeqCst);
    }

    /// Make the next `times` fee submissions fail before reaching the ledger.
    pub fn fail_next_fee_submits(&self, times: u32) {
        self.fail_fee_submits.fetch_add(times, Ordering::SeqCst);
    }

    /// Execute the next `times` transfers but drop their responses.
    pub fn lose_next_transfer_responses(&self, times: u32) {
        self.lost_transfer_responses.fetch_add(times, Ordering::SeqCst);
    }

    /// Seed an account with funds.
    pub fn credit(&self, account: &AccountRef, amount: Amount) {
        let mut accounts = self.accounts.lock().unwrap();
        let entry = accounts.entry(account.clone()).or_default();
        *entry = *entry + amount;
    }

    /// Total received by a payee through transfers.
    pub fn received_by(&self, payee: &Payee) -> Amount {
        self.received
            .lock()
            .unwrap()
            .get(payee)
            .copied()
            .unwrap_or_default()
    }

    pub fn received_by_user(&self, user: &UserId) -> Amount {
        self.received_by(&Payee::User(user.clone()))
    }

    /// Number of `submit_fee` calls, duplicates included.
    pub fn fee_calls(&self) -> u64 {
        self.fee_calls.load(Ordering::SeqCst)
    }

    /// Number of `transfer` calls, duplicates included.
    pub fn transfer_calls(&self) -> u64 {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    /// Number of transfers that actually moved value.
    pub fn transfers_executed(&self) -> u64 {
        self.transfers_executed.load(Ordering::SeqCst)
    }

    fn new_tx(&self, prefix: &str) -> TxRef {
        TxRef::new(format!(
            "{prefix}-{}",
            self.next_tx.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for NullLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValueLedger for NullLedger {
    async fn submit_fee(&self, request: &FeeRequest) -> Result<TxRef, LedgerError> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.fail_fee_submits) {
            return Err(LedgerError::Rpc("injected fee submission failure".into()));
        }

        let mut by_key = self.by_key.lock().unwrap();
        if let Some(tx) = by_key.get(&request.key) {
            return Ok(tx.clone());
        }
        let tx = self.new_tx("fee");
        by_key.insert(request.key.clone(), tx.clone());
        self.fees.lock().unwrap().insert(
            tx.clone(),
            FeeEntry {
                request: request.clone(),
                state: FeeState::Pending,
            },
        );
        Ok(tx)
    }

    async fn confirm(&self, tx: &TxRef) -> Result<bool, LedgerError> {
        let mode = *self.confirm_mode.lock().unwrap();
        let credit = {
            let mut fees = self.fees.lock().unwrap();
            let entry = fees
                .get_mut(tx)
                .ok_or_else(|| LedgerError::UnknownTransaction(tx.clone()))?;
            match (entry.state, mode) {
                (FeeState::Confirmed, _) => return Ok(true),
                (FeeState::Rejected, _) => return Ok(false),
                (FeeState::Pending, ConfirmMode::Hang) => None,
                (FeeState::Pending, ConfirmMode::Reject) => {
                    entry.state = FeeState::Rejected;
                    return Ok(false);
                }
                (FeeState::Pending, ConfirmMode::Confirm) => {
                    entry.state = FeeState::Confirmed;
                    Some((entry.request.treasury.clone(), entry.request.amount))
                }
            }
        };

        match credit {
            Some((treasury, amount)) => {
                self.credit(&treasury, amount);
                Ok(true)
            }
            None => std::future::pending().await,
        }
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TxRef, LedgerError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_payees.lock().unwrap().contains(&request.to) {
            return Err(LedgerError::Rpc(format!(
                "injected transfer failure to {}",
                request.to
            )));
        }

        let tx = {
            let mut by_key = self.by_key.lock().unwrap();
            if let Some(tx) = by_key.get(&request.key) {
                return Ok(tx.clone());
            }

            let mut accounts = self.accounts.lock().unwrap();
            let available = accounts.get(&request.from).copied().unwrap_or_default();
            let remaining = available.checked_sub(request.amount).ok_or_else(|| {
                LedgerError::InsufficientFunds {
                    account: request.from.clone(),
                    needed: request.amount,
                    available,
                }
            })?;
            accounts.insert(request.from.clone(), remaining);
            if let Payee::Account(account) = &request.to {
                let entry = accounts.entry(account.clone()).or_default();
                *entry = *entry + request.amount;
            }
            drop(accounts);

            let mut received = self.received.lock().unwrap();
            let entry = received.entry(request.to.clone()).or_default();
            *entry = *entry + request.amount;

            let tx = self.new_tx("xfer");
            by_key.insert(request.key.clone(), tx.clone());
            self.transfers_executed.fetch_add(1, Ordering::SeqCst);
            tx
        };

        if Self::take_one(&self.lost_transfer_responses) {
            return Err(LedgerError::Rpc("transfer response lost".into()));
        }
        Ok(tx)
    }

    async fn balance(&self, account: &AccountRef) -> Result<Amount, LedgerError> {
        if self.hang_balances.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpt_types::{ChallengeId, FeeKind};

    fn fee(key: &str, amount: u128) -> FeeRequest {
        FeeRequest {
            payer: UserId::new("alice"),
            amount: Amount::new(amount),
            treasury: AccountRef::new("treasury/c1/reward"),
            challenge: ChallengeId::new("c1"),
            kind: FeeKind::Entry,
            key: IdempotencyKey::new(key),
        }
    }

    #[tokio::test]
    async fn fee_is_credited_once_on_confirm() {
        let ledger = NullLedger::new();
        let tx = ledger.submit_fee(&fee("k1", 10)).await.unwrap();
        let again = ledger.submit_fee(&fee("k1", 10)).await.unwrap();
        assert_eq!(tx, again);

        let treasury = AccountRef::new("treasury/c1/reward");
        assert_eq!(ledger.balance(&treasury).await.unwrap(), Amount::ZERO);
        assert!(ledger.confirm(&tx).await.unwrap());
        assert!(ledger.confirm(&tx).await.unwrap());
        assert_eq!(ledger.balance(&treasury).await.unwrap(), Amount::new(10));
    }

    #[tokio::test]
    async fn rejected_fee_is_not_credited() {
        let ledger = NullLedger::new();
        ledger.set_confirm_mode(ConfirmMode::Reject);
        let tx = ledger.submit_fee(&fee("k1", 10)).await.unwrap();
        assert!(!ledger.confirm(&tx).await.unwrap());
        let treasury = AccountRef::new("treasury/c1/reward");
        assert_eq!(ledger.balance(&treasury).await.unwrap(), Amount::ZERO);
    }

    #[tokio::test]
    async fn transfer_is_deduplicated_and_bounded_by_balance() {
        let ledger = NullLedger::new();
        let pool = AccountRef::new("pool");
        ledger.credit(&pool, Amount::new(100));
        let request = TransferRequest {
            from: pool.clone(),
            to: Payee::User(UserId::new("bob")),
            amount: Amount::new(60),
            key: IdempotencyKey::new("t1"),
        };

        ledger.transfer(&request).await.unwrap();
        ledger.transfer(&request).await.unwrap();
        assert_eq!(ledger.transfers_executed(), 1);
        assert_eq!(ledger.received_by_user(&UserId::new("bob")), Amount::new(60));

        let overdraw = TransferRequest {
            key: IdempotencyKey::new("t2"),
            ..request
        };
        assert!(matches!(
            ledger.transfer(&overdraw).await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }
}
