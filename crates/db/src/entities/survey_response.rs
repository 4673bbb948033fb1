//! Survey response entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "survey_response")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Human-readable code shown to the respondent
    #[sea_orm(unique)]
    pub response_code: String,

    #[sea_orm(indexed)]
    pub survey_id: String,

    pub participant_hash: String,

    /// Uniqueness key: the participant hash, or `admin:<id>` for admin submissions
    pub dedupe_key: String,

    /// Answers (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub answers: JsonValue,

    pub started_at: DateTimeWithTimeZone,

    pub submitted_at: DateTimeWithTimeZone,

    /// Seconds between start and submit
    pub completion_time: i32,

    pub is_complete: bool,

    pub is_deleted: bool,

    pub quality_score: i32,

    /// Quality flags (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub quality_flags: JsonValue,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::survey::Entity",
        from = "Column::SurveyId",
        to = "super::survey::Column::Id",
        on_delete = "Cascade"
    )]
    Survey,
}

impl Related<super::survey::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Survey.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
