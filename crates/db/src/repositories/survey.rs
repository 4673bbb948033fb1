//! Survey repository.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use tally_common::{AppError, AppResult};

use crate::entities::{Survey, survey};

/// Survey repository for database operations.
#[derive(Clone)]
pub struct SurveyRepository {
    db: Arc<DatabaseConnection>,
}

impl SurveyRepository {
    /// Create a new survey repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Start a transaction for a read-modify-write cycle on one survey.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a live survey by its public id.
    pub async fn find_by_public_id(&self, public_id: &str) -> AppResult<Option<survey::Model>> {
        Survey::find()
            .filter(survey::Column::PublicId.eq(public_id))
            .filter(survey::Column::IsDeleted.eq(false))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a live survey by its public id, returning error if not found.
    pub async fn get_by_public_id(&self, public_id: &str) -> AppResult<survey::Model> {
        self.find_by_public_id(public_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Survey not found: {public_id}")))
    }

    /// Load a live survey and hold a row lock on it until `conn` commits.
    pub async fn lock_by_public_id<C>(
        &self,
        conn: &C,
        public_id: &str,
    ) -> AppResult<survey::Model>
    where
        C: ConnectionTrait,
    {
        Survey::find()
            .filter(survey::Column::PublicId.eq(public_id))
            .filter(survey::Column::IsDeleted.eq(false))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Survey not found: {public_id}")))
    }

    /// Create a new survey.
    pub async fn create(&self, model: survey::ActiveModel) -> AppResult<survey::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write every column of `model` back to its row.
    pub async fn save<C>(&self, conn: &C, model: survey::Model) -> AppResult<survey::Model>
    where
        C: ConnectionTrait,
    {
        survey::ActiveModel::from(model)
            .reset_all()
            .update(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Increment the view counter atomically.
    pub async fn increment_view_count(&self, id: &str) -> AppResult<()> {
        use sea_orm::sea_query::Expr;

        Survey::update_many()
            .col_expr(
                survey::Column::ViewCount,
                Expr::col(survey::Column::ViewCount).add(1),
            )
            .filter(survey::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
