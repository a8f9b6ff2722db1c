use cpt_types::{AccountRef, Amount, TxRef};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger rpc error: {0}")]
    Rpc(String),

    #[error("transaction {tx} rejected: {reason}")]
    Rejected { tx: TxRef, reason: String },

    #[error("insufficient funds in {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: AccountRef,
        needed: Amount,
        available: Amount,
    },

    #[error("unknown transaction: {0}")]
    UnknownTransaction(TxRef),

    #[error("ledger did not answer within {0:?}")]
    Timeout(std::time::Duration),
}
