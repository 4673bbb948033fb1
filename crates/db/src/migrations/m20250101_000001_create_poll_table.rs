//! Create poll table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Poll::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Poll::PublicId).string_len(32).not_null())
                    .col(ColumnDef::new(Poll::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Poll::Description).text())
                    .col(ColumnDef::new(Poll::Category).string_len(64))
                    .col(
                        ColumnDef::new(Poll::Tags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Poll::AuthorName).string_len(64).not_null())
                    .col(ColumnDef::new(Poll::AuthorHash).string_len(64).not_null())
                    .col(ColumnDef::new(Poll::AdminPasswordHash).string_len(256).not_null())
                    .col(ColumnDef::new(Poll::Settings).json_binary().not_null())
                    .col(ColumnDef::new(Poll::Options).json_binary().not_null())
                    .col(
                        ColumnDef::new(Poll::Participants)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Poll::Opinions)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Poll::AdminResults).json_binary())
                    .col(
                        ColumnDef::new(Poll::TotalVotes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Poll::UniqueVoters)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Poll::OpinionCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Poll::ViewCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Poll::LastVoteAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Poll::StartAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Poll::EndAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Poll::Status)
                            .string_len(16)
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(
                        ColumnDef::new(Poll::IsHidden)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Poll::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Poll::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Poll::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Unique index: public_id (link lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_public_id")
                    .table(Poll::Table)
                    .col(Poll::PublicId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: category (for listing)
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_category")
                    .table(Poll::Table)
                    .col(Poll::Category)
                    .to_owned(),
            )
            .await?;

        // Index: created_at (for pagination)
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_created_at")
                    .table(Poll::Table)
                    .col(Poll::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
    PublicId,
    Title,
    Description,
    Category,
    Tags,
    AuthorName,
    AuthorHash,
    AdminPasswordHash,
    Settings,
    Options,
    Participants,
    Opinions,
    AdminResults,
    TotalVotes,
    UniqueVoters,
    OpinionCount,
    ViewCount,
    LastVoteAt,
    StartAt,
    EndAt,
    Status,
    IsHidden,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}
