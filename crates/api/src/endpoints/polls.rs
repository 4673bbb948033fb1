//! Poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tally_common::AppResult;
use tally_core::{
    AdminToken as IssuedToken, CreatedPoll, ScheduleChange, VoteReceipt,
    ledger::{NewPoll, OpinionInput, OpinionView, PollAdminResults, PollDetail, PollResults, VoterInfo},
};
use validator::Validate;

use crate::{
    extractors::{AdminToken, MaybeAdminToken, Participant},
    middleware::AppState,
    response::{self, ApiResponse},
};

/// Create poll request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePollRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub tags: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub author_name: String,
    /// Leave empty for an agree/disagree poll.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple_choice: bool,
    #[serde(default)]
    pub show_results_before_end: bool,
    #[serde(default)]
    pub allow_anonymous: bool,
    #[serde(default)]
    pub allow_opinion: bool,
    #[validate(range(min = 1, max = 100))]
    pub max_votes_per_ip: Option<u32>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[validate(length(min = 4, max = 128))]
    pub admin_password: String,
}

/// Create a poll.
async fn create(
    Participant(author): Participant,
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> AppResult<ApiResponse<CreatedPoll>> {
    req.validate()?;

    let input = NewPoll {
        title: req.title,
        description: req.description,
        category: req.category,
        tags: req.tags,
        author_name: req.author_name,
        options: req.options,
        allow_multiple_choice: req.allow_multiple_choice,
        show_results_before_end: req.show_results_before_end,
        allow_anonymous: req.allow_anonymous,
        allow_opinion: req.allow_opinion,
        max_votes_per_ip: req.max_votes_per_ip,
        start_at: req.start_at,
        end_at: req.end_at,
    };
    let created = state
        .poll_service
        .create(input, &req.admin_password, author)
        .await?;

    Ok(ApiResponse::created(created))
}

/// Show a poll.
async fn show(
    Participant(viewer): Participant,
    token: MaybeAdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PollDetail>> {
    let poll = state
        .poll_service
        .view(&id, &viewer, token.as_deref())
        .await?;
    Ok(ApiResponse::ok(poll))
}

/// Vote request.
#[derive(Debug, Deserialize, Validate)]
pub struct VoteRequest {
    #[validate(length(max = 20))]
    pub option_ids: Vec<String>,
    #[validate(length(max = 64))]
    pub user_id: Option<String>,
    #[validate(length(max = 50))]
    pub nickname: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Cast a ballot.
async fn vote(
    Participant(participant): Participant,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteReceipt>> {
    req.validate()?;

    let voter = VoterInfo {
        user_id: req.user_id,
        nickname: req.nickname,
        is_anonymous: req.is_anonymous,
    };
    let receipt = state
        .poll_service
        .cast_vote(&id, &req.option_ids, &participant, voter)
        .await?;

    Ok(ApiResponse::created(receipt))
}

/// Opinion request.
#[derive(Debug, Deserialize, Validate)]
pub struct OpinionRequest {
    #[serde(default)]
    #[validate(length(max = 50))]
    pub author_name: String,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    pub selected_option_id: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Post an opinion.
async fn add_opinion(
    Participant(participant): Participant,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<OpinionRequest>,
) -> AppResult<ApiResponse<OpinionView>> {
    req.validate()?;

    let input = OpinionInput {
        author_name: req.author_name,
        content: req.content,
        selected_option_id: req.selected_option_id,
        is_anonymous: req.is_anonymous,
    };
    let opinion = state
        .poll_service
        .add_opinion(&id, &participant, input)
        .await?;

    Ok(ApiResponse::created(opinion))
}

/// Get results. `data` is null while they are hidden.
async fn results(
    token: MaybeAdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Option<PollResults>>> {
    let results = state.poll_service.results(&id, token.as_deref()).await?;
    Ok(ApiResponse::ok(results))
}

/// Admin login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Exchange the admin password for a token.
async fn login(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LoginRequest>,
) -> AppResult<ApiResponse<IssuedToken>> {
    req.validate()?;
    let token = state.poll_service.login(&id, &req.password).await?;
    Ok(ApiResponse::ok(token))
}

/// Schedule request.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_now: bool,
}

async fn reschedule(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ScheduleRequest>,
) -> AppResult<ApiResponse<PollDetail>> {
    let change = ScheduleChange {
        start_at: req.start_at,
        end_at: req.end_at,
        close_now: req.close_now,
    };
    let poll = state.poll_service.reschedule(&id, &token, change).await?;
    Ok(ApiResponse::ok(poll))
}

/// Visibility request.
#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub hidden: bool,
}

async fn set_visibility(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VisibilityRequest>,
) -> AppResult<ApiResponse<PollDetail>> {
    let poll = state
        .poll_service
        .set_hidden(&id, &token, req.hidden)
        .await?;
    Ok(ApiResponse::ok(poll))
}

async fn set_admin_results(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PollAdminResults>,
) -> AppResult<ApiResponse<PollResults>> {
    let results = state
        .poll_service
        .set_admin_results(&id, &token, req)
        .await?;
    Ok(ApiResponse::ok(results))
}

async fn clear_admin_results(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PollResults>> {
    let results = state.poll_service.clear_admin_results(&id, &token).await?;
    Ok(ApiResponse::ok(results))
}

async fn delete_opinion(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path((id, opinion_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    state
        .poll_service
        .delete_opinion(&id, &token, &opinion_id)
        .await?;
    Ok(response::ok())
}

async fn recompute(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PollDetail>> {
    let poll = state.poll_service.recompute(&id, &token).await?;
    Ok(ApiResponse::ok(poll))
}

async fn delete_poll(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.poll_service.delete(&id, &token).await?;
    Ok(response::ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(show))
        .route("/{id}/votes", post(vote))
        .route("/{id}/opinions", post(add_opinion))
        .route("/{id}/results", get(results))
        .route("/{id}/admin", delete(delete_poll))
        .route("/{id}/admin/login", post(login))
        .route("/{id}/admin/schedule", patch(reschedule))
        .route("/{id}/admin/visibility", patch(set_visibility))
        .route(
            "/{id}/admin/results",
            put(set_admin_results).delete(clear_admin_results),
        )
        .route("/{id}/admin/opinions/{opinion_id}", delete(delete_opinion))
        .route("/{id}/admin/recompute", post(recompute))
}
