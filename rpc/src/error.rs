//! RPC error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cpt_engine::{EngineError, ErrorKind};
use cpt_store::SettlementRecord;
use cpt_types::TxRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("missing or unknown bearer token")]
    Unauthenticated,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<TxRef>,
    /// The terminal record, when finalization already happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementRecord>,
}

/// HTTP status for an engine failure.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PaymentFailed => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::PaymentTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::InfrastructureError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::NotCreator
        | ErrorKind::NotAParticipant
        | ErrorKind::SelfJoinForbidden
        | ErrorKind::SelfReportForbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidChallenge => StatusCode::BAD_REQUEST,
        ErrorKind::PhaseClosed
        | ErrorKind::TooEarly
        | ErrorKind::AlreadyMember
        | ErrorKind::CapacityExceeded
        | ErrorKind::DuplicateSubmission
        | ErrorKind::AlreadyVotedInChallenge
        | ErrorKind::AlreadyFinalized
        | ErrorKind::AlreadyClaimed
        | ErrorKind::AlreadyReported => StatusCode::CONFLICT,
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            RpcError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    kind: "Unauthenticated".into(),
                    message,
                    tx: None,
                    settlement: None,
                },
            ),
            RpcError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    kind: "InvalidRequest".into(),
                    message,
                    tx: None,
                    settlement: None,
                },
            ),
            RpcError::Server(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    kind: "ServerError".into(),
                    message,
                    tx: None,
                    settlement: None,
                },
            ),
            RpcError::Engine(e) => {
                let kind = e.kind();
                if kind == ErrorKind::InfrastructureError {
                    tracing::warn!(error = %e, "request failed on infrastructure");
                }
                let tx = e.tx().cloned();
                let settlement = match e {
                    EngineError::AlreadyFinalized(record) => Some(*record),
                    _ => None,
                };
                (
                    status_for(kind),
                    ErrorBody {
                        kind: format!("{kind:?}"),
                        message,
                        tx,
                        settlement,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
