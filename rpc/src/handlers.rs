//! Request handlers and their payloads.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cpt_engine::{
    ChallengeSnapshot, ChallengeView, DistributionSummary, NewChallenge, Phase, ReportOutcome,
    SettlementState,
};
use cpt_ledger::TreasuryBalance;
use cpt_store::{
    ChallengeRecord, CreatorClaimRecord, MembershipRecord, SettlementRecord, SubmissionRecord,
    VoteRecord,
};
use cpt_types::{ChallengeId, SubmissionId, TxRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Caller;
use crate::error::RpcError;
use crate::server::AppState;

type ApiResult<T> = Result<Json<T>, RpcError>;

// ── Payloads ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct JoinRequest {
    /// Fee transaction returned by an attempt that timed out.
    #[serde(default)]
    pub fee_tx: Option<TxRef>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitRequest {
    pub video: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VoteRequest {
    pub submission: SubmissionId,
    #[serde(default)]
    pub fee_tx: Option<TxRef>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PhaseResponse {
    pub phase: Phase,
    pub settlement: SettlementState,
}

// ── Service ──────────────────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "OK"
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.engine.metrics().gather()
}

// ── Challenges ───────────────────────────────────────────────────────────

pub async fn create_challenge(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Json(new): Json<NewChallenge>,
) -> Result<(StatusCode, Json<ChallengeRecord>), RpcError> {
    let record = state.engine.create_challenge(&user, new).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_challenges(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ChallengeView>> {
    Ok(Json(state.engine.list_challenges().await?))
}

pub async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ChallengeId>,
) -> ApiResult<ChallengeView> {
    Ok(Json(state.engine.get_challenge(&id).await?))
}

pub async fn get_phase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ChallengeId>,
) -> ApiResult<PhaseResponse> {
    let phase = state.engine.phase_of(&id).await?;
    let settlement = state.engine.settlement_state(&id).await?;
    Ok(Json(PhaseResponse { phase, settlement }))
}

pub async fn get_treasury(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ChallengeId>,
) -> ApiResult<TreasuryBalance> {
    Ok(Json(state.engine.treasury_balance(&id).await?))
}

pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ChallengeId>,
) -> ApiResult<ChallengeSnapshot> {
    Ok(Json(state.engine.refresh(&id).await?))
}

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ChallengeId>,
) -> ApiResult<Vec<SubmissionRecord>> {
    Ok(Json(state.engine.ranked_submissions(&id).await?))
}

pub async fn my_challenges(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
) -> ApiResult<Vec<ChallengeView>> {
    Ok(Json(state.engine.challenges_for_user(&user).await?))
}

// ── Participation ────────────────────────────────────────────────────────

pub async fn join(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<ChallengeId>,
    body: Option<Json<JoinRequest>>,
) -> ApiResult<MembershipRecord> {
    let fee_tx = body.and_then(|Json(req)| req.fee_tx);
    Ok(Json(state.engine.join(&id, &user, fee_tx).await?))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<ChallengeId>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmissionRecord>), RpcError> {
    if req.video.trim().is_empty() {
        return Err(RpcError::InvalidRequest("video must not be empty".into()));
    }
    let submission = state
        .engine
        .submit(&id, &user, req.video, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn vote(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<ChallengeId>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<VoteRecord> {
    Ok(Json(
        state
            .engine
            .vote(&id, &user, &req.submission, req.fee_tx)
            .await?,
    ))
}

pub async fn report(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<ChallengeId>,
) -> ApiResult<ReportOutcome> {
    Ok(Json(state.engine.report(&id, &user).await?))
}

pub async fn like(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<SubmissionId>,
) -> ApiResult<SubmissionRecord> {
    Ok(Json(state.engine.like(&id, &user).await?))
}

pub async fn dislike(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<SubmissionId>,
) -> ApiResult<SubmissionRecord> {
    Ok(Json(state.engine.dislike(&id, &user).await?))
}

// ── Settlement ───────────────────────────────────────────────────────────

pub async fn finalize(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(id): Path<ChallengeId>,
) -> ApiResult<SettlementRecord> {
    Ok(Json(state.engine.finalize(&id).await?))
}

pub async fn claim_creator_reward(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<ChallengeId>,
) -> ApiResult<CreatorClaimRecord> {
    Ok(Json(state.engine.claim_creator_reward(&id, &user).await?))
}

pub async fn distribute_voting_rewards(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(id): Path<ChallengeId>,
) -> ApiResult<DistributionSummary> {
    Ok(Json(state.engine.distribute_voting_rewards(&id).await?))
}
