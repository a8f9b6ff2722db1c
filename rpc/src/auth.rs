//! Bearer-token identity.
//!
//! The engine never authenticates anyone; handlers receive a [`Caller`]
//! that an [`IdentityProvider`] already resolved from the request's
//! `Authorization: Bearer <token>` header.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use cpt_types::UserId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RpcError;
use crate::server::AppState;

/// Resolves a session token to the user it belongs to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Fixed token-to-user table, loaded from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, UserId>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, UserId>) -> Self {
        Self { tokens }
    }

    pub fn with(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).cloned()
    }
}

/// The authenticated user making a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller(pub UserId);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = RpcError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(RpcError::Unauthenticated)?;
        let user = state
            .identity
            .resolve(token)
            .await
            .ok_or(RpcError::Unauthenticated)?;
        Ok(Caller(user))
    }
}
