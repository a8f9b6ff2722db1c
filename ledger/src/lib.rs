//! Value-transfer ledger interface.
//!
//! Entry fees, voting fees and the reward treasury live on a distributed
//! ledger the engine does not own. This crate defines the [`ValueLedger`]
//! collaborator trait and the [`TreasuryAccessor`] that bounds every call
//! made through it.

pub mod error;
pub mod ledger;
pub mod treasury;

pub use error::LedgerError;
pub use ledger::{FeeRequest, TransferRequest, ValueLedger};
pub use treasury::{FeeConfirmation, TreasuryAccessor, TreasuryBalance};
