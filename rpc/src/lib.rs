//! HTTP/JSON API for the challenge engine.
//!
//! Provides endpoints for:
//! - Challenge creation, listings, phase, treasury and live snapshots
//! - Joining, submitting, voting, reporting and reactions
//! - Finalization, creator claims and voting-reward distribution
//! - Health and Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{Caller, IdentityProvider, StaticTokens};
pub use error::{ErrorBody, RpcError};
pub use server::{AppState, RpcServer};
