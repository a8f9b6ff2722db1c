//! Axum-based RPC server.

use axum::routing::{get, post};
use axum::Router;
use cpt_engine::ChallengeEngine;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::auth::IdentityProvider;
use crate::error::RpcError;
use crate::handlers;

/// Shared state behind every handler.
pub struct AppState {
    pub engine: Arc<ChallengeEngine>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub struct RpcServer {
    state: Arc<AppState>,
}

impl RpcServer {
    pub fn new(engine: Arc<ChallengeEngine>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            state: Arc::new(AppState { engine, identity }),
        }
    }

    /// The full route table.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .route(
                "/challenges",
                get(handlers::list_challenges).post(handlers::create_challenge),
            )
            .route("/challenges/:id", get(handlers::get_challenge))
            .route("/challenges/:id/phase", get(handlers::get_phase))
            .route("/challenges/:id/treasury", get(handlers::get_treasury))
            .route("/challenges/:id/snapshot", get(handlers::get_snapshot))
            .route(
                "/challenges/:id/submissions",
                get(handlers::list_submissions).post(handlers::submit),
            )
            .route("/challenges/:id/join", post(handlers::join))
            .route("/challenges/:id/votes", post(handlers::vote))
            .route("/challenges/:id/reports", post(handlers::report))
            .route("/challenges/:id/finalize", post(handlers::finalize))
            .route(
                "/challenges/:id/creator-claim",
                post(handlers::claim_creator_reward),
            )
            .route(
                "/challenges/:id/voting-rewards",
                post(handlers::distribute_voting_rewards),
            )
            .route("/submissions/:id/like", post(handlers::like))
            .route("/submissions/:id/dislike", post(handlers::dislike))
            .route("/users/me/challenges", get(handlers::my_challenges))
            .with_state(self.state.clone())
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), RpcError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map_err(|e| RpcError::Server(e.to_string()))?;
        tracing::info!(%addr, "RPC server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))?;
        tracing::info!("RPC server stopped");
        Ok(())
    }
}
