//! Survey endpoints.

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
    AdminToken as IssuedToken, CreatedSurvey, ResponseReceipt, SubmitResponse,
    ledger::{
        Answer, NewSurvey, Question, ScreenConfig, SurveyAggregate, SurveyDetail, SurveyResults,
        SurveySettings,
    },
};
use tally_db::entities::survey::SurveyStatus;
use validator::Validate;

use crate::{
    extractors::{AdminToken, MaybeAdminToken, Participant},
    middleware::AppState,
    response::{self, ApiResponse},
};

/// Create survey request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSurveyRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub tags: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub author_name: String,
    #[validate(length(min = 1, max = 50))]
    pub questions: Vec<Question>,
    pub welcome_screen: Option<ScreenConfig>,
    pub thank_you_screen: Option<ScreenConfig>,
    #[serde(default)]
    pub settings: SurveySettings,
    /// Open immediately instead of starting as a draft.
    #[serde(default)]
    pub open: bool,
    #[validate(length(min = 4, max = 128))]
    pub admin_password: String,
}

/// Create a survey.
async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateSurveyRequest>,
) -> AppResult<ApiResponse<CreatedSurvey>> {
    req.validate()?;

    let input = NewSurvey {
        title: req.title,
        description: req.description,
        tags: req.tags,
        author_name: req.author_name,
        questions: req.questions,
        welcome_screen: req.welcome_screen,
        thank_you_screen: req.thank_you_screen,
        settings: req.settings,
        open: req.open,
    };
    let created = state
        .survey_service
        .create(input, &req.admin_password)
        .await?;

    Ok(ApiResponse::created(created))
}

/// Show a survey.
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<SurveyDetail>> {
    let survey = state.survey_service.view(&id).await?;
    Ok(ApiResponse::ok(survey))
}

/// Submit response request.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitResponseRequest {
    #[validate(length(max = 50))]
    pub answers: Vec<Answer>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Submit a response. An admin token lifts the one-response rule.
async fn submit(
    Participant(participant): Participant,
    token: MaybeAdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitResponseRequest>,
) -> AppResult<ApiResponse<ResponseReceipt>> {
    req.validate()?;

    let input = SubmitResponse {
        answers: req.answers,
        started_at: req.started_at,
    };
    let receipt = state
        .survey_service
        .submit_response(&id, &participant, input, token.as_deref())
        .await?;

    Ok(ApiResponse::created(receipt))
}

/// Get results. `data` is null unless they are public or the caller is admin.
async fn results(
    token: MaybeAdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Option<SurveyResults>>> {
    let results = state.survey_service.results(&id, token.as_deref()).await?;
    Ok(ApiResponse::ok(results))
}

/// Admin login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LoginRequest>,
) -> AppResult<ApiResponse<IssuedToken>> {
    req.validate()?;
    let token = state.survey_service.login(&id, &req.password).await?;
    Ok(ApiResponse::ok(token))
}

/// Status change request: `draft`, `open` or `closed`.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SurveyStatus,
}

async fn set_status(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> AppResult<ApiResponse<SurveyDetail>> {
    let survey = state
        .survey_service
        .set_status(&id, &token, req.status)
        .await?;
    Ok(ApiResponse::ok(survey))
}

/// Replace questions request.
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionsRequest {
    #[validate(length(min = 1, max = 50))]
    pub questions: Vec<Question>,
}

async fn replace_questions(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QuestionsRequest>,
) -> AppResult<ApiResponse<SurveyDetail>> {
    req.validate()?;
    let survey = state
        .survey_service
        .replace_questions(&id, &token, req.questions)
        .await?;
    Ok(ApiResponse::ok(survey))
}

async fn set_admin_results(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SurveyAggregate>,
) -> AppResult<ApiResponse<Option<SurveyResults>>> {
    let results = state
        .survey_service
        .set_admin_results(&id, &token, req)
        .await?;
    Ok(ApiResponse::ok(results))
}

async fn clear_admin_results(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.survey_service.clear_admin_results(&id, &token).await?;
    Ok(response::ok())
}

async fn delete_response(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path((id, response_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    state
        .survey_service
        .delete_response(&id, &token, &response_id)
        .await?;
    Ok(response::ok())
}

async fn recompute(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<SurveyDetail>> {
    let survey = state.survey_service.recompute(&id, &token).await?;
    Ok(ApiResponse::ok(survey))
}

async fn delete_survey(
    AdminToken(token): AdminToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.survey_service.delete(&id, &token).await?;
    Ok(response::ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(show))
        .route("/{id}/responses", post(submit))
        .route("/{id}/results", get(results))
        .route("/{id}/admin", delete(delete_survey))
        .route("/{id}/admin/login", post(login))
        .route("/{id}/admin/status", patch(set_status))
        .route("/{id}/admin/questions", put(replace_questions))
        .route(
            "/{id}/admin/results",
            put(set_admin_results).delete(clear_admin_results),
        )
        .route("/{id}/admin/responses/{response_id}", delete(delete_response))
        .route("/{id}/admin/recompute", post(recompute))
}
