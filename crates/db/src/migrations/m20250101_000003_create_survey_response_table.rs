//! Create survey response table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SurveyResponse::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SurveyResponse::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::ResponseCode)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::SurveyId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::ParticipantHash)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::DedupeKey)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::Answers)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::SubmittedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::CompletionTime)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::IsComplete)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::QualityScore)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(
                        ColumnDef::new(SurveyResponse::QualityFlags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_survey_response_survey")
                            .from(SurveyResponse::Table, SurveyResponse::SurveyId)
                            .to(Survey::Table, Survey::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: response_code
        manager
            .create_index(
                Index::create()
                    .name("idx_survey_response_code")
                    .table(SurveyResponse::Table)
                    .col(SurveyResponse::ResponseCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: survey_id (for aggregation)
        manager
            .create_index(
                Index::create()
                    .name("idx_survey_response_survey_id")
                    .table(SurveyResponse::Table)
                    .col(SurveyResponse::SurveyId)
                    .to_owned(),
            )
            .await?;

        // Partial unique index: one live response per (survey, participant).
        // Soft-deleted rows drop out of the index so the participant may answer again.
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_survey_response_dedupe
                ON survey_response (survey_id, dedupe_key)
                WHERE is_deleted = false;
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SurveyResponse::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SurveyResponse {
    Table,
    Id,
    ResponseCode,
    SurveyId,
    ParticipantHash,
    DedupeKey,
    Answers,
    StartedAt,
    SubmittedAt,
    CompletionTime,
    IsComplete,
    IsDeleted,
    QualityScore,
    QualityFlags,
}

#[derive(Iden)]
enum Survey {
    Table,
    Id,
}
