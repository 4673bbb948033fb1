//! Database entities.

pub mod poll;
pub mod survey;
pub mod survey_response;

pub use poll::Entity as Poll;
pub use survey::Entity as Survey;
pub use survey_response::Entity as SurveyResponse;
