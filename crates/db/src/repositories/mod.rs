//! Database repositories.

mod poll;
mod survey;
mod survey_response;

pub use poll::PollRepository;
pub use survey::SurveyRepository;
pub use survey_response::{ResponseTally, SurveyResponseRepository};
