//! Create survey table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Survey::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Survey::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Survey::PublicId).string_len(32).not_null())
                    .col(ColumnDef::new(Survey::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Survey::Description).text())
                    .col(
                        ColumnDef::new(Survey::Tags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Survey::AuthorName).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Survey::AdminPasswordHash)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Survey::Questions).json_binary().not_null())
                    .col(ColumnDef::new(Survey::WelcomeScreen).json_binary())
                    .col(ColumnDef::new(Survey::ThankYouScreen).json_binary())
                    .col(ColumnDef::new(Survey::Settings).json_binary().not_null())
                    .col(ColumnDef::new(Survey::AdminResults).json_binary())
                    .col(
                        ColumnDef::new(Survey::Status)
                            .string_len(16)
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Survey::IsEditable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Survey::FirstResponseAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Survey::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Survey::ResponseCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Survey::CompletionRate)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Survey::AvgCompletionTime)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Survey::LastResponseAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Survey::ViewCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Survey::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Survey::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Unique index: public_id (link lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_survey_public_id")
                    .table(Survey::Table)
                    .col(Survey::PublicId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Survey::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Survey {
    Table,
    Id,
    PublicId,
    Title,
    Description,
    Tags,
    AuthorName,
    AdminPasswordHash,
    Questions,
    WelcomeScreen,
    ThankYouScreen,
    Settings,
    AdminResults,
    Status,
    IsEditable,
    FirstResponseAt,
    IsDeleted,
    ResponseCount,
    CompletionRate,
    AvgCompletionTime,
    LastResponseAt,
    ViewCount,
    CreatedAt,
    UpdatedAt,
}
