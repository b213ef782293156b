//! HTTP surface of the backend.
//!
//! Reads are served from the [`ProjectionStore`]; the three write-intent
//! endpoints (`POST /profile`, `POST /proposal`, `POST /proposal/:id/vote`)
//! only build an unsigned sponsored transaction. Chain-derived projections
//! change only when the indexer sees the chain event. The one off-chain
//! write is `POST /community/:id/channel`, which links the creator's chat
//! channel to an indexed community.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, warn};

use commity_common::api::{
    BuildResponse, CommunityListResponse, CommunityResponse, CreateProfileRequest, CreateProposalRequest,
    ErrorBody, ExecuteRequest, MembersResponse, NftListResponse, NotificationListResponse, OkResponse,
    ProfileResponse, ProposalListResponse, SetChannelRequest, SponsorRequest, StatsQuery, StatsResponse,
    VoteRequest, VotesResponse,
};
use commity_common::types::validate_nickname;
use commity_common::{AbortReason, Address, MoveCall, ObjectId};

use crate::hub::PushHub;
use crate::sponsor::{ExecutorError, Sponsor, SponsorError};
use crate::store::ProjectionStore;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProjectionStore>,
    pub hub: PushHub,
    pub sponsor: Arc<Sponsor>,
}

impl AppState {
    pub fn new(store: Arc<ProjectionStore>, hub: PushHub, sponsor: Arc<Sponsor>) -> Self {
        Self { store, hub, sponsor }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profile", post(create_profile))
        .route("/profile/:address", get(get_profile))
        .route("/profile/:address/stats", get(profile_stats))
        .route("/community", get(list_communities))
        .route("/community/:id", get(get_community))
        .route("/community/:id/members", get(community_members))
        .route("/community/:id/channel", post(set_channel))
        .route("/community/member/:address", get(member_communities))
        .route("/proposal", post(create_proposal))
        .route("/proposal/community/:id", get(community_proposals))
        .route("/proposal/:id/vote", post(build_vote))
        .route("/proposal/:id/votes", get(proposal_votes))
        .route("/notification/:address", get(notifications))
        .route("/notification/:address/:id/read", post(mark_read))
        .route("/nft/:address", get(nfts))
        .route("/transaction/sponsor", post(sponsor_transaction))
        .route("/transaction/execute", post(execute_transaction))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<SponsorError> for ApiFailure {
    fn from(e: SponsorError) -> Self {
        let status = match &e {
            SponsorError::Executor(ExecutorError::Rejected(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            SponsorError::Executor(ExecutorError::Transport(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        };
        if status != StatusCode::BAD_REQUEST {
            warn!(error = %e, "sponsor failure");
        }
        Self::new(status, e.to_string())
    }
}

type ApiResult<T> = Result<Json<T>, ApiFailure>;

fn address(raw: &str) -> Result<Address, ApiFailure> {
    Address::parse(raw).map_err(|e| ApiFailure::bad_request(format!("invalid address: {}", e)))
}

fn object_id(raw: &str) -> Result<ObjectId, ApiFailure> {
    ObjectId::parse(raw).map_err(|e| ApiFailure::bad_request(format!("invalid object id: {}", e)))
}

// ════════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ════════════════════════════════════════════════════════════════════════════════

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "sponsor": state.sponsor.address(),
            "subscribers": state.hub.subscriber_count(),
        })),
    )
}

// ── profile ──────────────────────────────────────────────────────────────────

async fn get_profile(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<ProfileResponse> {
    let owner = address(&raw)?;
    let profile = state.store.profile(&owner).ok_or_else(|| ApiFailure::not_found("profile"))?;
    Ok(Json(ProfileResponse { profile: Some(profile) }))
}

async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<CreateProfileRequest>,
) -> ApiResult<BuildResponse> {
    let nickname = validate_nickname(&req.nickname).map_err(|e| ApiFailure::bad_request(e.to_string()))?;
    if state.store.profile(&req.address).is_some() {
        let reason = AbortReason::ProfileAlreadyExists;
        return Err(ApiFailure::new(
            StatusCode::CONFLICT,
            format!("{}: {}", reason, reason.user_message()),
        ));
    }
    let sponsor = &state.sponsor;
    let call = MoveCall::create_profile(sponsor.package(), sponsor.module(), &nickname);
    let transaction = sponsor.build(&req.address, call)?;
    Ok(Json(BuildResponse { transaction }))
}

async fn profile_stats(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<StatsResponse> {
    let owner = address(&raw)?;
    let stats = state.store.stats(&owner, query.commity_id.as_ref());
    Ok(Json(StatsResponse { stats }))
}

// ── community ────────────────────────────────────────────────────────────────

async fn list_communities(State(state): State<AppState>) -> Json<CommunityListResponse> {
    Json(CommunityListResponse {
        communities: state.store.communities(),
    })
}

async fn get_community(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<CommunityResponse> {
    let id = object_id(&raw)?;
    let community = state.store.community(&id).ok_or_else(|| ApiFailure::not_found("community"))?;
    Ok(Json(CommunityResponse { community }))
}

async fn community_members(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<MembersResponse> {
    let id = object_id(&raw)?;
    let members = state.store.members(&id).ok_or_else(|| ApiFailure::not_found("community"))?;
    Ok(Json(MembersResponse {
        community_id: id,
        members,
    }))
}

async fn set_channel(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(req): Json<SetChannelRequest>,
) -> ApiResult<CommunityResponse> {
    let id = object_id(&raw)?;
    let channel_id = req.channel_id.trim();
    if channel_id.is_empty() {
        return Err(ApiFailure::bad_request("channel id is empty"));
    }
    let community = state.store.community(&id).ok_or_else(|| ApiFailure::not_found("community"))?;
    if community.creator.as_ref() != Some(&req.requester) {
        return Err(ApiFailure::forbidden("only the community creator can set its channel"));
    }
    if !state.store.set_channel(&id, channel_id.to_string()) {
        return Err(ApiFailure::not_found("community"));
    }
    let community = state.store.community(&id).ok_or_else(|| ApiFailure::not_found("community"))?;
    info!(community = %id.short(), channel = %channel_id, "channel linked");
    Ok(Json(CommunityResponse { community }))
}

async fn member_communities(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<CommunityListResponse> {
    let member = address(&raw)?;
    Ok(Json(CommunityListResponse {
        communities: state.store.communities_of(&member),
    }))
}

// ── proposal ─────────────────────────────────────────────────────────────────

async fn community_proposals(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<ProposalListResponse> {
    let id = object_id(&raw)?;
    Ok(Json(ProposalListResponse {
        proposals: state.store.proposals_of(&id),
    }))
}

async fn create_proposal(
    State(state): State<AppState>,
    Json(req): Json<CreateProposalRequest>,
) -> ApiResult<BuildResponse> {
    let sponsor = &state.sponsor;
    let call = MoveCall::create_proposal(sponsor.package(), sponsor.module(), &req.args);
    let transaction = sponsor.build(&req.sender, call)?;
    Ok(Json(BuildResponse { transaction }))
}

async fn build_vote(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<BuildResponse> {
    let proposal = object_id(&raw)?;
    let sponsor = &state.sponsor;
    let call = MoveCall::cast_vote(
        sponsor.package(),
        sponsor.module(),
        &req.profile_id,
        &proposal,
        &req.community_id,
        req.vote_type,
    );
    let transaction = sponsor.build(&req.voter, call)?;
    Ok(Json(BuildResponse { transaction }))
}

async fn proposal_votes(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<VotesResponse> {
    let id = object_id(&raw)?;
    let votes = state.store.votes(&id).ok_or_else(|| ApiFailure::not_found("proposal"))?;
    Ok(Json(VotesResponse { proposal_id: id, votes }))
}

// ── notification / nft ───────────────────────────────────────────────────────

async fn notifications(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<NotificationListResponse> {
    let owner = address(&raw)?;
    Ok(Json(NotificationListResponse {
        notifications: state.store.notifications(&owner),
    }))
}

async fn mark_read(State(state): State<AppState>, Path((raw, id)): Path<(String, String)>) -> ApiResult<OkResponse> {
    let owner = address(&raw)?;
    Ok(Json(OkResponse {
        ok: state.store.mark_read(&owner, &id),
    }))
}

async fn nfts(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<NftListResponse> {
    let owner = address(&raw)?;
    Ok(Json(NftListResponse {
        nfts: state.store.nfts_of(&owner),
    }))
}

// ── transactions ─────────────────────────────────────────────────────────────

async fn sponsor_transaction(
    State(state): State<AppState>,
    Json(req): Json<SponsorRequest>,
) -> ApiResult<BuildResponse> {
    let transaction = state.sponsor.build_target(&req.sender, &req.target, req.arguments)?;
    Ok(Json(BuildResponse { transaction }))
}

async fn execute_transaction(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<commity_common::ExecutionResult>, ApiFailure> {
    let result = state.sponsor.execute(&req.bytes, &req.signature).await?;
    Ok(Json(result))
}
