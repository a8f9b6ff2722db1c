//! Nullable infrastructure for deterministic testing.
//!
//! All external collaborators of the engine (clock, record store, value
//! ledger) are abstracted behind traits. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically, including injected failures
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests. The daemon also
//! runs on them when no external backends are configured.

pub mod clock;
pub mod ledger;
pub mod store;

pub use clock::NullClock;
pub use ledger::{ConfirmMode, NullLedger};
pub use store::{NullStore, StoreOp};
