//! Survey response repository.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    sea_query::Expr,
};
use tally_common::{AppError, AppResult};

use crate::entities::{SurveyResponse, survey_response};

/// Name of the partial unique index on `(survey_id, dedupe_key)`.
pub const DEDUPE_INDEX: &str = "idx_survey_response_dedupe";

/// Aggregate over the live responses of one survey.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromQueryResult)]
pub struct ResponseTally {
    /// Live responses.
    pub count: i64,
    /// Live responses marked complete.
    pub complete: i64,
    /// Sum of completion times in seconds.
    pub total_completion_time: i64,
}

impl ResponseTally {
    /// Percent of responses that are complete, rounded.
    #[must_use]
    pub fn completion_rate(&self) -> i32 {
        if self.count == 0 {
            return 0;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let rate = (self.complete as f64 / self.count as f64 * 100.0).round() as i32;
        rate
    }

    /// Mean completion time in seconds.
    #[must_use]
    pub fn average_completion_time(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self.total_completion_time as f64 / self.count as f64;
        avg
    }
}

/// Survey response repository for database operations.
#[derive(Clone)]
pub struct SurveyResponseRepository {
    db: Arc<DatabaseConnection>,
}

impl SurveyResponseRepository {
    /// Create a new survey response repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a response.
    ///
    /// A second live response with the same dedupe key is rejected by the
    /// storage index and surfaces as [`AppError::AlreadyResponded`].
    pub async fn insert<C>(
        &self,
        conn: &C,
        model: survey_response::ActiveModel,
    ) -> AppResult<survey_response::Model>
    where
        C: ConnectionTrait,
    {
        model.insert(conn).await.map_err(map_insert_error)
    }

    /// Check whether the participant already has a live response.
    pub async fn exists_for_participant<C>(
        &self,
        conn: &C,
        survey_id: &str,
        participant_hash: &str,
    ) -> AppResult<bool>
    where
        C: ConnectionTrait,
    {
        let count = SurveyResponse::find()
            .filter(survey_response::Column::SurveyId.eq(survey_id))
            .filter(survey_response::Column::DedupeKey.eq(participant_hash))
            .filter(survey_response::Column::IsDeleted.eq(false))
            .count(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Count, completion and timing totals over live responses.
    pub async fn tally<C>(&self, conn: &C, survey_id: &str) -> AppResult<ResponseTally>
    where
        C: ConnectionTrait,
    {
        let result = SurveyResponse::find()
            .filter(survey_response::Column::SurveyId.eq(survey_id))
            .filter(survey_response::Column::IsDeleted.eq(false))
            .select_only()
            .column_as(Expr::cust("COUNT(*)"), "count")
            .column_as(
                Expr::cust("COALESCE(SUM(CASE WHEN is_complete THEN 1 ELSE 0 END), 0)::BIGINT"),
                "complete",
            )
            .column_as(
                Expr::cust("COALESCE(SUM(completion_time), 0)::BIGINT"),
                "total_completion_time",
            )
            .into_model::<ResponseTally>()
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.unwrap_or_default())
    }

    /// All live responses of a survey, oldest first.
    pub async fn find_live_by_survey(
        &self,
        survey_id: &str,
    ) -> AppResult<Vec<survey_response::Model>> {
        SurveyResponse::find()
            .filter(survey_response::Column::SurveyId.eq(survey_id))
            .filter(survey_response::Column::IsDeleted.eq(false))
            .order_by_asc(survey_response::Column::SubmittedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a live response of the given survey.
    pub async fn find_live_by_id<C>(
        &self,
        conn: &C,
        survey_id: &str,
        id: &str,
    ) -> AppResult<Option<survey_response::Model>>
    where
        C: ConnectionTrait,
    {
        SurveyResponse::find_by_id(id)
            .filter(survey_response::Column::SurveyId.eq(survey_id))
            .filter(survey_response::Column::IsDeleted.eq(false))
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a response deleted. The participant may respond again afterwards.
    pub async fn soft_delete<C>(&self, conn: &C, id: &str) -> AppResult<()>
    where
        C: ConnectionTrait,
    {
        SurveyResponse::update_many()
            .col_expr(survey_response::Column::IsDeleted, Expr::value(true))
            .filter(survey_response::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Translate a failed insert, recognizing the dedupe index.
fn map_insert_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains(DEDUPE_INDEX) => {
            AppError::AlreadyResponded
        }
        _ => AppError::Database(err.to_string()),
    }
}
