//! Two-phase fee correlation.
//!
//! Every paid action (reward funding, entry, vote) pays before its record is
//! written. The [`PendingOperation`] for `(challenge, user, kind)` tracks the
//! fee across the two ledgers:
//!
//! ```text
//! Initiated ─submit─▶ FeeSubmitted{tx} ─confirm─▶ FeeConfirmed{tx} ─write─▶ Recorded{tx}
//!                            │
//!                            └─reject─▶ Rejected{tx} ─retry─▶ Initiated (attempt + 1)
//! ```
//!
//! Fee submissions carry `fee/{challenge}/{user}/{kind}/{attempt}` as their
//! idempotency key, so a retry after a lost response gets the original
//! transaction back instead of paying twice.
//!
//! A fee still unrecorded when its action's window closes never completes.
//! The next retry confirms it and pays it back under
//! `refund/{challenge}/{user}/{kind}/{attempt}`, ending in `Refunded`.

use cpt_ledger::{FeeConfirmation, FeeRequest, LedgerError};
use cpt_store::{ChallengeRecord, Disbursement, PendingKey, PendingOperation, PendingStatus};
use cpt_types::{AccountRef, Amount, Payee, TxRef};

use crate::{ChallengeEngine, EngineError, Phase};

/// Whether another user's in-flight fee reserves a capacity slot.
///
/// A fee that reached the ledger will be recorded on retry, so its slot
/// cannot be handed to someone else in the meantime.
pub(crate) fn holds_slot(op: &PendingOperation) -> bool {
    matches!(
        op.status,
        PendingStatus::FeeSubmitted { .. } | PendingStatus::FeeConfirmed { .. }
    )
}

/// Whether the fee was committed to the ledger (and the action's checks
/// passed) on an earlier attempt.
pub(crate) fn is_committed(op: Option<&PendingOperation>) -> bool {
    op.is_some_and(holds_slot)
}

/// Fee confirmed but the record it pays for not yet acknowledged.
pub(crate) fn awaits_record(op: &PendingOperation) -> bool {
    matches!(op.status, PendingStatus::FeeConfirmed { .. })
}

fn fee_submit_error(e: LedgerError) -> EngineError {
    match e {
        LedgerError::Rejected { tx, reason } => EngineError::PaymentFailed {
            reason,
            tx: Some(tx),
        },
        e @ LedgerError::InsufficientFunds { .. } => EngineError::PaymentFailed {
            reason: e.to_string(),
            tx: None,
        },
        other => other.into(),
    }
}

/// What a fee pays for and where it goes.
pub(crate) struct FeeSpec<'a> {
    pub key: &'a PendingKey,
    pub amount: Amount,
    pub treasury: &'a AccountRef,
    /// Transaction reference the caller received on an earlier attempt.
    pub supplied: Option<&'a TxRef>,
}

impl ChallengeEngine {
    /// Drive the fee for `spec` to confirmation.
    ///
    /// Returns the confirmed transaction, or `None` for a zero fee. Resumes
    /// from whatever state an earlier attempt left behind.
    pub(crate) async fn collect_fee(
        &self,
        spec: FeeSpec<'_>,
    ) -> Result<Option<TxRef>, EngineError> {
        if spec.amount.is_zero() {
            return Ok(None);
        }

        let mut op = match self.store.get_pending(spec.key).await? {
            Some(op) => op,
            None => {
                let op = PendingOperation {
                    key: spec.key.clone(),
                    attempt: 0,
                    amount: spec.amount,
                    status: PendingStatus::Initiated,
                    updated_at: self.clock.now(),
                };
                self.store.put_pending(&op).await?;
                op
            }
        };

        let mut supplied = spec.supplied;
        loop {
            match op.status.clone() {
                PendingStatus::FeeConfirmed { tx } | PendingStatus::Recorded { tx } => {
                    check_supplied(supplied, &tx)?;
                    return Ok(Some(tx));
                }
                PendingStatus::Rejected { tx } | PendingStatus::Refunded { tx, .. } => {
                    tracing::info!(
                        previous = %tx,
                        attempt = op.attempt + 1,
                        "starting a new fee attempt"
                    );
                    op.attempt += 1;
                    supplied = None;
                    self.advance(&mut op, PendingStatus::Initiated).await?;
                }
                PendingStatus::Initiated => {
                    let request = FeeRequest {
                        payer: op.key.user.clone(),
                        amount: op.amount,
                        treasury: spec.treasury.clone(),
                        challenge: op.key.challenge.clone(),
                        kind: op.key.kind,
                        key: op.key.fee_key(op.attempt),
                    };
                    let tx = match self.treasury.pay_fee(&request).await {
                        Ok(tx) => tx,
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                kind = %op.key.kind,
                                "fee submission failed"
                            );
                            self.metrics.payment_failures.inc();
                            return Err(fee_submit_error(e));
                        }
                    };
                    self.advance(&mut op, PendingStatus::FeeSubmitted { tx })
                        .await?;
                }
                PendingStatus::FeeSubmitted { tx } => {
                    check_supplied(supplied, &tx)?;
                    match self.treasury.await_confirmation(&tx).await? {
                        FeeConfirmation::Confirmed => {
                            tracing::debug!(tx = %tx, kind = %op.key.kind, "fee confirmed");
                            self.advance(&mut op, PendingStatus::FeeConfirmed { tx })
                                .await?;
                        }
                        FeeConfirmation::Rejected => {
                            tracing::warn!(tx = %tx, kind = %op.key.kind, "fee rejected by ledger");
                            self.metrics.payment_failures.inc();
                            self.advance(&mut op, PendingStatus::Rejected { tx: tx.clone() })
                                .await?;
                            return Err(EngineError::PaymentFailed {
                                reason: "fee transaction rejected".into(),
                                tx: Some(tx),
                            });
                        }
                        FeeConfirmation::TimedOut => {
                            self.metrics.payment_timeouts.inc();
                            return Err(EngineError::PaymentTimeout { tx: Some(tx) });
                        }
                    }
                }
            }
        }
    }

    /// Return a committed fee whose action can no longer complete.
    ///
    /// A fee still awaiting confirmation is confirmed first. Returns the
    /// refund transaction, or `None` when nothing reached the treasury.
    pub(crate) async fn refund_stranded_fee(
        &self,
        mut op: PendingOperation,
        treasury: &AccountRef,
    ) -> Result<Option<TxRef>, EngineError> {
        loop {
            match op.status.clone() {
                PendingStatus::FeeSubmitted { tx } => {
                    match self.treasury.await_confirmation(&tx).await? {
                        FeeConfirmation::Confirmed => {
                            self.advance(&mut op, PendingStatus::FeeConfirmed { tx })
                                .await?;
                        }
                        FeeConfirmation::Rejected => {
                            self.advance(&mut op, PendingStatus::Rejected { tx }).await?;
                            return Ok(None);
                        }
                        FeeConfirmation::TimedOut => {
                            self.metrics.payment_timeouts.inc();
                            return Err(EngineError::PaymentTimeout { tx: Some(tx) });
                        }
                    }
                }
                PendingStatus::FeeConfirmed { tx } => {
                    let refund = Disbursement::new(
                        op.key.refund_key(op.attempt),
                        Payee::User(op.key.user.clone()),
                        op.amount,
                    );
                    let refund_tx = self.pay_out(treasury, &refund).await?;
                    self.advance(
                        &mut op,
                        PendingStatus::Refunded {
                            tx: tx.clone(),
                            refund: refund_tx.clone(),
                        },
                    )
                    .await?;
                    self.metrics.fee_refunds.inc();
                    tracing::info!(
                        fee = %tx,
                        refund = %refund_tx,
                        kind = %op.key.kind,
                        "stranded fee refunded"
                    );
                    return Ok(Some(refund_tx));
                }
                PendingStatus::Refunded { refund, .. } => return Ok(Some(refund)),
                PendingStatus::Initiated
                | PendingStatus::Rejected { .. }
                | PendingStatus::Recorded { .. } => return Ok(None),
            }
        }
    }

    /// Refund `op` and report that `expected` has closed.
    pub(crate) async fn refund_after_close(
        &self,
        record: &ChallengeRecord,
        op: PendingOperation,
        treasury: &AccountRef,
        expected: Phase,
    ) -> EngineError {
        match self.refund_stranded_fee(op, treasury).await {
            Ok(_) => self.phase_closed(record, expected),
            Err(e) => e,
        }
    }

    /// Close the pending operation once the off-chain record exists.
    pub(crate) async fn mark_recorded(
        &self,
        key: &PendingKey,
        tx: Option<&TxRef>,
    ) -> Result<(), EngineError> {
        let Some(tx) = tx else {
            return Ok(());
        };
        if let Some(mut op) = self.store.get_pending(key).await? {
            if !matches!(op.status, PendingStatus::Recorded { .. }) {
                self.advance(&mut op, PendingStatus::Recorded { tx: tx.clone() })
                    .await?;
            }
        }
        Ok(())
    }

    async fn advance(
        &self,
        op: &mut PendingOperation,
        status: PendingStatus,
    ) -> Result<(), EngineError> {
        op.status = status;
        op.updated_at = self.clock.now();
        self.store.put_pending(op).await?;
        Ok(())
    }
}

/// A transaction reference supplied by the caller must be the one the
/// pending operation tracks.
fn check_supplied(supplied: Option<&TxRef>, pending: &TxRef) -> Result<(), EngineError> {
    match supplied {
        Some(supplied) if supplied != pending => Err(EngineError::PaymentFailed {
            reason: format!("transaction {supplied} does not match pending fee {pending}"),
            tx: Some(pending.clone()),
        }),
        _ => Ok(()),
    }
}
