//! Survey service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, Set};
use serde::Serialize;
use tally_common::{AppError, AppResult, Clock, IdGenerator, ParticipantHash};
use tally_db::{
    entities::{
        survey::{self, SurveyStatus},
        survey_response,
    },
    repositories::{SurveyRepository, SurveyResponseRepository},
};

use super::auth::{self, AdminAuthService, AdminToken, TargetKind};
use crate::ledger::{
    Answer, NewSurvey, QualityFlag, Question, SurveyAggregate, SurveyDetail, SurveyDocument,
    SurveyResults, aggregate, eligibility, from_json, projector, response, to_json,
};

/// Maximum survey title length in characters.
pub const MAX_TITLE_LEN: usize = 200;
/// Dedupe key prefix for admin submissions, which bypass the participant index.
pub const ADMIN_DEDUPE_PREFIX: &str = "admin:";

/// A freshly created survey and the token of its creator.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSurvey {
    pub survey: SurveyDetail,
    pub admin_token: AdminToken,
}

/// A submitted set of answers.
#[derive(Debug, Clone, Default)]
pub struct SubmitResponse {
    pub answers: Vec<Answer>,
    /// When the participant opened the survey. Defaults to the submit time.
    pub started_at: Option<DateTime<Utc>>,
}

/// What the participant gets back for an accepted response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseReceipt {
    pub id: String,
    pub response_code: String,
    pub completion_time: i32,
    pub is_complete: bool,
    pub quality_score: u8,
    pub quality_flags: Vec<QualityFlag>,
}

/// Survey service for business logic.
#[derive(Clone)]
pub struct SurveyService {
    survey_repo: SurveyRepository,
    response_repo: SurveyResponseRepository,
    auth: AdminAuthService,
    clock: Arc<dyn Clock>,
    id_gen: IdGenerator,
}

impl SurveyService {
    /// Create a new survey service.
    #[must_use]
    pub fn new(
        survey_repo: SurveyRepository,
        response_repo: SurveyResponseRepository,
        auth: AdminAuthService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            survey_repo,
            response_repo,
            auth,
            clock,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a survey.
    pub async fn create(&self, input: NewSurvey, admin_password: &str) -> AppResult<CreatedSurvey> {
        let title_len = input.title.trim().chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "Title must be 1 to {MAX_TITLE_LEN} characters"
            )));
        }
        auth::validate_password(admin_password)?;
        let password_hash = auth::hash_password(admin_password)?;

        let now = self.clock.now();
        let survey = SurveyDocument::create(input, &self.id_gen, password_hash, now)?;
        let model = self
            .survey_repo
            .create(survey::ActiveModel::from(survey.into_model()?).reset_all())
            .await?;
        let survey = SurveyDocument::try_from(model)?;
        tracing::info!(
            survey_id = %survey.public_id,
            questions = survey.questions.len(),
            "Survey created"
        );

        Ok(CreatedSurvey {
            admin_token: self.auth.issue(TargetKind::Survey, &survey.public_id)?,
            survey: SurveyDetail::build(&survey, now),
        })
    }

    /// Get a survey for display and count the view.
    pub async fn view(&self, public_id: &str) -> AppResult<SurveyDetail> {
        let survey = SurveyDocument::try_from(self.survey_repo.get_by_public_id(public_id).await?)?;

        if let Err(e) = self.survey_repo.increment_view_count(&survey.id).await {
            tracing::warn!(error = %e, survey_id = %public_id, "Failed to count survey view");
        }

        Ok(SurveyDetail::build(&survey, self.clock.now()))
    }

    /// Record a response.
    ///
    /// Runs under a lock on the survey row. The storage index still rejects
    /// a duplicate that slips past the pre-check.
    pub async fn submit_response(
        &self,
        public_id: &str,
        participant: &ParticipantHash,
        input: SubmitResponse,
        token: Option<&str>,
    ) -> AppResult<ResponseReceipt> {
        let is_admin = self.auth.is_admin(token, TargetKind::Survey, public_id)?;

        let result = self
            .record_response(public_id, participant, input, is_admin)
            .await;
        match &result {
            Ok(receipt) => tracing::info!(
                survey_id = %public_id,
                participant = %participant,
                response_code = %receipt.response_code,
                quality_score = receipt.quality_score,
                admin = is_admin,
                "Response accepted"
            ),
            Err(e) => tracing::info!(
                survey_id = %public_id,
                participant = %participant,
                reason = e.error_code(),
                "Response rejected"
            ),
        }
        result
    }

    async fn record_response(
        &self,
        public_id: &str,
        participant: &ParticipantHash,
        input: SubmitResponse,
        is_admin: bool,
    ) -> AppResult<ResponseReceipt> {
        let txn = self.survey_repo.begin().await?;
        let mut survey =
            SurveyDocument::try_from(self.survey_repo.lock_by_public_id(&txn, public_id).await?)?;
        let now = self.clock.now();

        let has_responded = !is_admin
            && self
                .response_repo
                .exists_for_participant(&txn, &survey.id, participant.as_str())
                .await?;
        eligibility::check_survey_response(&survey, has_responded, is_admin, now)?;

        let check = response::validate_answers(&survey.questions, &input.answers)?;
        let started_at = input.started_at.unwrap_or(now);
        let completion_time = response::completion_seconds(started_at, now);
        let quality = response::score_quality(&survey.questions, &input.answers, completion_time);

        let id = self.id_gen.generate();
        let dedupe_key = if is_admin {
            format!("{ADMIN_DEDUPE_PREFIX}{id}")
        } else {
            participant.to_string()
        };
        let stored = self
            .response_repo
            .insert(
                &txn,
                survey_response::ActiveModel {
                    id: Set(id),
                    response_code: Set(self.id_gen.generate_response_code()),
                    survey_id: Set(survey.id.clone()),
                    participant_hash: Set(participant.to_string()),
                    dedupe_key: Set(dedupe_key),
                    answers: Set(to_json("answers", &input.answers)?),
                    started_at: Set(started_at.into()),
                    submitted_at: Set(now.into()),
                    completion_time: Set(completion_time),
                    is_complete: Set(check.is_complete),
                    is_deleted: Set(false),
                    quality_score: Set(i32::from(quality.score)),
                    quality_flags: Set(to_json("quality_flags", &quality.flags)?),
                },
            )
            .await?;

        let tally = self.response_repo.tally(&txn, &survey.id).await?;
        survey.record_response(&tally, now);
        self.save(&txn, survey, now).await?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(ResponseReceipt {
            id: stored.id,
            response_code: stored.response_code,
            completion_time,
            is_complete: check.is_complete,
            quality_score: quality.score,
            quality_flags: quality.flags,
        })
    }

    /// Results as the caller may see them. `None` while they are private.
    pub async fn results(&self, public_id: &str, token: Option<&str>) -> AppResult<Option<SurveyResults>> {
        let is_admin = self.auth.is_admin(token, TargetKind::Survey, public_id)?;
        let survey = SurveyDocument::try_from(self.survey_repo.get_by_public_id(public_id).await?)?;
        if !survey.settings.public_results && !is_admin {
            return Ok(None);
        }

        let answers = if aggregate::survey_override(&survey).is_some() {
            Vec::new()
        } else {
            self.live_answers(&survey.id).await?
        };
        let resolved = aggregate::resolve_survey(&survey, &answers);
        Ok(projector::project_survey(&survey, resolved, is_admin, self.clock.now()))
    }

    /// Exchange the admin password for a token.
    pub async fn login(&self, public_id: &str, password: &str) -> AppResult<AdminToken> {
        let survey = self.survey_repo.get_by_public_id(public_id).await?;
        self.auth
            .login(TargetKind::Survey, public_id, password, &survey.admin_password_hash)
    }

    /// Open, close or return a survey to draft.
    pub async fn set_status(
        &self,
        public_id: &str,
        token: &str,
        status: SurveyStatus,
    ) -> AppResult<SurveyDetail> {
        self.auth.verify(token, TargetKind::Survey, public_id)?;
        let survey = self
            .mutate(public_id, |survey, now| {
                survey.set_status(status, now);
                Ok(())
            })
            .await?;
        tracing::info!(survey_id = %public_id, status = ?survey.status, "Survey status changed");
        Ok(SurveyDetail::build(&survey, self.clock.now()))
    }

    /// Replace the questions while the survey is still editable.
    pub async fn replace_questions(
        &self,
        public_id: &str,
        token: &str,
        questions: Vec<Question>,
    ) -> AppResult<SurveyDetail> {
        self.auth.verify(token, TargetKind::Survey, public_id)?;
        let survey = self
            .mutate(public_id, |survey, _| survey.replace_questions(questions))
            .await?;
        tracing::info!(survey_id = %public_id, questions = survey.questions.len(), "Survey questions replaced");
        Ok(SurveyDetail::build(&survey, self.clock.now()))
    }

    /// Replace the displayed results with admin-entered ones.
    pub async fn set_admin_results(
        &self,
        public_id: &str,
        token: &str,
        results: SurveyAggregate,
    ) -> AppResult<Option<SurveyResults>> {
        self.auth.verify(token, TargetKind::Survey, public_id)?;
        let survey = self
            .mutate(public_id, |survey, _| {
                if let Some(unknown) = results.keys().find(|id| survey.question(id).is_none()) {
                    return Err(AppError::Validation(format!(
                        "Unknown question in results: {unknown}"
                    )));
                }
                survey.admin_results = Some(results);
                Ok(())
            })
            .await?;
        tracing::info!(survey_id = %public_id, "Survey admin results set");
        Ok(projector::project_survey(
            &survey,
            aggregate::resolve_survey(&survey, &[]),
            true,
            self.clock.now(),
        ))
    }

    /// Go back to computed results.
    pub async fn clear_admin_results(&self, public_id: &str, token: &str) -> AppResult<()> {
        self.auth.verify(token, TargetKind::Survey, public_id)?;
        self.mutate(public_id, |survey, _| {
            survey.admin_results = None;
            Ok(())
        })
        .await?;
        tracing::info!(survey_id = %public_id, "Survey admin results cleared");
        Ok(())
    }

    /// Soft-delete a response and refresh the counters.
    ///
    /// The participant may respond again afterwards.
    pub async fn delete_response(&self, public_id: &str, token: &str, response_id: &str) -> AppResult<()> {
        self.auth.verify(token, TargetKind::Survey, public_id)?;

        let txn = self.survey_repo.begin().await?;
        let mut survey =
            SurveyDocument::try_from(self.survey_repo.lock_by_public_id(&txn, public_id).await?)?;
        self.response_repo
            .find_live_by_id(&txn, &survey.id, response_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Response not found: {response_id}")))?;

        self.response_repo.soft_delete(&txn, response_id).await?;
        let tally = self.response_repo.tally(&txn, &survey.id).await?;
        survey.apply_tally(&tally);
        self.save(&txn, survey, self.clock.now()).await?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(survey_id = %public_id, response_id, "Response deleted");
        Ok(())
    }

    /// Rebuild the cached counters from the response table.
    pub async fn recompute(&self, public_id: &str, token: &str) -> AppResult<SurveyDetail> {
        self.auth.verify(token, TargetKind::Survey, public_id)?;

        let txn = self.survey_repo.begin().await?;
        let mut survey =
            SurveyDocument::try_from(self.survey_repo.lock_by_public_id(&txn, public_id).await?)?;
        let tally = self.response_repo.tally(&txn, &survey.id).await?;
        survey.apply_tally(&tally);
        let now = self.clock.now();
        let survey = self.save(&txn, survey, now).await?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            survey_id = %public_id,
            response_count = survey.stats.response_count,
            "Survey stats recomputed"
        );
        Ok(SurveyDetail::build(&survey, now))
    }

    /// Soft-delete a survey. Cannot be undone.
    pub async fn delete(&self, public_id: &str, token: &str) -> AppResult<()> {
        self.auth.verify(token, TargetKind::Survey, public_id)?;
        self.mutate(public_id, |survey, now| {
            survey.mark_deleted(now);
            Ok(())
        })
        .await?;
        tracing::info!(survey_id = %public_id, "Survey deleted");
        Ok(())
    }

    async fn live_answers(&self, survey_id: &str) -> AppResult<Vec<Vec<Answer>>> {
        self.response_repo
            .find_live_by_survey(survey_id)
            .await?
            .into_iter()
            .map(|r| from_json("answers", r.answers))
            .collect()
    }

    async fn save(
        &self,
        txn: &DatabaseTransaction,
        mut survey: SurveyDocument,
        now: DateTime<Utc>,
    ) -> AppResult<SurveyDocument> {
        survey.refresh_status(now);
        survey.updated_at = Some(now);
        self.survey_repo.save(txn, survey.clone().into_model()?).await?;
        Ok(survey)
    }

    /// Lock the survey row, apply `apply` and write the document back in one
    /// transaction.
    async fn mutate<F>(&self, public_id: &str, apply: F) -> AppResult<SurveyDocument>
    where
        F: FnOnce(&mut SurveyDocument, DateTime<Utc>) -> AppResult<()>,
    {
        let txn = self.survey_repo.begin().await?;
        let mut survey =
            SurveyDocument::try_from(self.survey_repo.lock_by_public_id(&txn, public_id).await?)?;

        let now = self.clock.now();
        apply(&mut survey, now)?;
        let survey = self.save(&txn, survey, now).await?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(survey)
    }
}
