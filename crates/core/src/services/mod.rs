//! Business logic services.
//!
//! Each service loads a document, runs it through the ledger and persists the
//! result inside one transaction.

pub mod auth;
pub mod poll;
pub mod survey;

pub use auth::{AdminAuthService, AdminToken, TargetKind};
pub use poll::{CreatedPoll, PollService, ScheduleChange, VoteReceipt};
pub use survey::{CreatedSurvey, ResponseReceipt, SubmitResponse, SurveyService};
