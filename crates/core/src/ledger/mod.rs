//! Submission ledger.
//!
//! Pure, storage-free rules for polls and surveys: who may submit, how a
//! submission mutates the owning document, how aggregates are derived and
//! how they are shown. Services load a document, call into this module and
//! persist the result in one transaction.

pub mod aggregate;
pub mod eligibility;
pub mod projector;
pub mod response;
pub mod vote;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use tally_common::{AppError, AppResult};

pub use aggregate::{
    OpinionView, OptionTally, PollAdminResults, PollTally, QuestionTally, Resolved,
    SurveyAggregate,
};
pub use projector::{PollDetail, PollResults, QuestionSummary, SurveyDetail, SurveyResults};
pub use response::{
    Answer, AnswerValue, Choice, NewSurvey, Quality, QualityFlag, Question, QuestionKind,
    ScreenConfig, SkipCondition, SurveyDocument, SurveySettings,
};
pub use vote::{NewPoll, Opinion, OpinionInput, PollDocument, PollSettings, VoterInfo};

/// Decode a JSON column into its typed form.
pub(crate) fn from_json<T: DeserializeOwned>(field: &str, value: JsonValue) -> AppResult<T> {
    serde_json::from_value(value).map_err(|e| AppError::Internal(format!("Invalid {field}: {e}")))
}

/// Encode a typed value for a JSON column.
pub(crate) fn to_json<T: Serialize>(field: &str, value: &T) -> AppResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode {field}: {e}")))
}
