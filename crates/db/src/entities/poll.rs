//! Poll (debate) entity.
//!
//! A poll row is a document: the vote options with their cast votes, the
//! per-participant records and the opinions are embedded JSON arrays owned
//! by the row. The stats columns are a cache derived from those arrays.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Poll lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    /// Voting has not started yet.
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    /// Voting window is open.
    #[sea_orm(string_value = "active")]
    Active,
    /// Voting window has passed.
    #[sea_orm(string_value = "ended")]
    Ended,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Opaque id used in links.
    #[sea_orm(unique)]
    pub public_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(nullable)]
    pub category: Option<String>,

    /// Tags (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: JsonValue,

    pub author_name: String,

    /// Participant hash of the creator
    pub author_hash: String,

    /// Argon2 hash of the admin password
    pub admin_password_hash: String,

    /// Poll settings (JSON object)
    #[sea_orm(column_type = "JsonBinary")]
    pub settings: JsonValue,

    /// Vote options with their cast votes (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub options: JsonValue,

    /// Per-participant vote records (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub participants: JsonValue,

    /// Opinions (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub opinions: JsonValue,

    /// Manually entered results that replace the computed ones on read
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub admin_results: Option<JsonValue>,

    pub total_votes: i64,

    pub unique_voters: i64,

    pub opinion_count: i64,

    /// Best-effort view counter
    pub view_count: i64,

    #[sea_orm(nullable)]
    pub last_vote_at: Option<DateTimeWithTimeZone>,

    pub start_at: DateTimeWithTimeZone,

    pub end_at: DateTimeWithTimeZone,

    /// Last stored status; authoritative only while hidden or deleted
    pub status: PollStatus,

    pub is_hidden: bool,

    pub is_deleted: bool,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
