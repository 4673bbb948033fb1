//! Survey entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Survey lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    /// Being edited, not accepting responses.
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Accepting responses.
    #[sea_orm(string_value = "open")]
    Open,
    /// No longer accepting responses.
    #[sea_orm(string_value = "closed")]
    Closed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "survey")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub public_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Tags (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: JsonValue,

    pub author_name: String,

    pub admin_password_hash: String,

    /// Ordered questions (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub questions: JsonValue,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub welcome_screen: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub thank_you_screen: Option<JsonValue>,

    /// Survey settings (JSON object)
    #[sea_orm(column_type = "JsonBinary")]
    pub settings: JsonValue,

    /// Manually entered per-question results (JSON object keyed by question id)
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub admin_results: Option<JsonValue>,

    pub status: SurveyStatus,

    /// Cleared for good once the first response arrives
    pub is_editable: bool,

    #[sea_orm(nullable)]
    pub first_response_at: Option<DateTimeWithTimeZone>,

    pub is_deleted: bool,

    pub response_count: i64,

    /// Percent of responses marked complete
    pub completion_rate: i32,

    /// Mean completion time in seconds
    pub avg_completion_time: f64,

    #[sea_orm(nullable)]
    pub last_response_at: Option<DateTimeWithTimeZone>,

    /// Best-effort view counter
    pub view_count: i64,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::survey_response::Entity")]
    Responses,
}

impl Related<super::survey_response::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Responses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
