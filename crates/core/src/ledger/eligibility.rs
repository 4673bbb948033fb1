//! Eligibility gate.
//!
//! Status is always derived from the clock and the stored window; the stored
//! status is only trusted while a target is hidden or deleted.

use chrono::{DateTime, Utc};
use tally_common::{AppError, AppResult, ParticipantHash};
use tally_db::entities::{poll::PollStatus, survey::SurveyStatus};

use super::response::SurveyDocument;
use super::vote::PollDocument;

/// Status for a voting window. Both ends are inclusive.
#[must_use]
pub fn window_status(
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> PollStatus {
    if now < start_at {
        PollStatus::Scheduled
    } else if now > end_at {
        PollStatus::Ended
    } else {
        PollStatus::Active
    }
}

/// Current status of a poll.
#[must_use]
pub fn poll_status(poll: &PollDocument, now: DateTime<Utc>) -> PollStatus {
    if poll.is_hidden || poll.is_deleted {
        return poll.status;
    }
    window_status(poll.start_at, poll.end_at, now)
}

/// Current status of a survey. An open survey past its close time is closed.
#[must_use]
pub fn survey_status(survey: &SurveyDocument, now: DateTime<Utc>) -> SurveyStatus {
    if survey.is_deleted {
        return survey.status;
    }
    match (survey.status, survey.settings.close_at) {
        (SurveyStatus::Open, Some(close_at)) if now > close_at => SurveyStatus::Closed,
        (status, _) => status,
    }
}

/// Check whether `participant` may vote on `poll` right now.
pub fn check_poll_vote(
    poll: &PollDocument,
    participant: &ParticipantHash,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if poll.is_deleted {
        return Err(AppError::NotEligible("Poll has been deleted".to_string()));
    }
    if poll.is_hidden {
        return Err(AppError::NotEligible("Poll is hidden".to_string()));
    }
    match poll_status(poll, now) {
        PollStatus::Active => {}
        PollStatus::Scheduled => {
            return Err(AppError::NotEligible("Poll has not started yet".to_string()));
        }
        PollStatus::Ended => {
            return Err(AppError::NotEligible("Poll has ended".to_string()));
        }
    }
    if poll.votes_cast_by(participant) >= poll.settings.max_votes_per_ip {
        return Err(AppError::AlreadyVoted);
    }
    Ok(())
}

/// Boolean form of [`check_poll_vote`].
#[must_use]
pub fn can_vote(poll: &PollDocument, participant: &ParticipantHash, now: DateTime<Utc>) -> bool {
    check_poll_vote(poll, participant, now).is_ok()
}

/// Check whether a response may be added to `survey` right now.
///
/// `has_responded` is whether the participant already holds a live response.
/// Admins skip that check but nothing else.
pub fn check_survey_response(
    survey: &SurveyDocument,
    has_responded: bool,
    is_admin: bool,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if survey.is_deleted || survey_status(survey, now) != SurveyStatus::Open {
        return Err(AppError::SurveyClosed);
    }
    if has_responded && !is_admin {
        return Err(AppError::AlreadyResponded);
    }
    if let Some(limit) = survey.settings.response_limit
        && survey.stats.response_count >= limit
    {
        return Err(AppError::NotEligible(
            "Survey has reached its response limit".to_string(),
        ));
    }
    Ok(())
}

/// Boolean form of [`check_survey_response`].
#[must_use]
pub fn can_respond(
    survey: &SurveyDocument,
    has_responded: bool,
    is_admin: bool,
    now: DateTime<Utc>,
) -> bool {
    check_survey_response(survey, has_responded, is_admin, now).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::response::{NewSurvey, SurveySettings};
    use crate::ledger::vote::{NewPoll, VoterInfo};
    use chrono::{Duration, TimeZone};
    use tally_common::{Clock, FixedClock, IdGenerator};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn poll_between(start: DateTime<Utc>, end: DateTime<Utc>) -> PollDocument {
        PollDocument::create(
            NewPoll {
                title: "Window".to_string(),
                start_at: Some(start),
                end_at: Some(end),
                ..NewPoll::default()
            },
            &IdGenerator::new(),
            ParticipantHash::from_stored("author"),
            String::new(),
            t0(),
        )
        .unwrap()
    }

    fn open_survey(settings: SurveySettings) -> SurveyDocument {
        let mut survey = crate::ledger::response::tests::survey_with(
            NewSurvey {
                settings,
                ..crate::ledger::response::tests::basic_survey()
            },
            t0(),
        );
        survey.status = SurveyStatus::Open;
        survey
    }

    #[test]
    fn test_status_follows_clock_without_writes() {
        let clock = FixedClock::new(t0());
        let poll = poll_between(t0() + Duration::hours(1), t0() + Duration::hours(2));

        assert_eq!(poll_status(&poll, clock.now()), PollStatus::Scheduled);
        assert_eq!(poll_status(&poll, clock.now()), PollStatus::Scheduled);

        clock.advance(Duration::minutes(61));
        assert_eq!(poll_status(&poll, clock.now()), PollStatus::Active);

        clock.advance(Duration::hours(2));
        assert_eq!(poll_status(&poll, clock.now()), PollStatus::Ended);

        clock.set(t0());
        assert_eq!(poll_status(&poll, clock.now()), PollStatus::Scheduled);
    }

    #[test]
    fn test_zero_width_window_is_inclusive() {
        let instant = t0() + Duration::hours(1);
        let poll = poll_between(instant, instant);

        assert_eq!(poll_status(&poll, instant), PollStatus::Active);
        assert!(can_vote(&poll, &ParticipantHash::from_stored("p"), instant));
        assert_eq!(
            poll_status(&poll, instant + Duration::milliseconds(1)),
            PollStatus::Ended
        );
        assert_eq!(
            poll_status(&poll, instant - Duration::milliseconds(1)),
            PollStatus::Scheduled
        );
    }

    #[test]
    fn test_hidden_and_deleted_freeze_status() {
        let mut poll = poll_between(t0(), t0() + Duration::hours(1));
        poll.status = PollStatus::Active;
        poll.is_deleted = true;

        let much_later = t0() + Duration::days(30);
        assert_eq!(poll_status(&poll, much_later), PollStatus::Active);
        assert!(matches!(
            check_poll_vote(&poll, &ParticipantHash::from_stored("p"), t0()),
            Err(AppError::NotEligible(_))
        ));
    }

    #[test]
    fn test_vote_cap_reached() {
        let mut poll = poll_between(t0(), t0() + Duration::hours(1));
        let option = poll.options[0].id.clone();
        let voter = ParticipantHash::from_stored("p");

        assert!(can_vote(&poll, &voter, t0()));
        poll.cast_vote(&[option], &voter, &VoterInfo::default(), t0())
            .unwrap();
        assert!(matches!(
            check_poll_vote(&poll, &voter, t0()),
            Err(AppError::AlreadyVoted)
        ));
        assert!(can_vote(&poll, &ParticipantHash::from_stored("q"), t0()));
    }

    #[test]
    fn test_survey_gate_order() {
        let survey = open_survey(SurveySettings::default());
        assert!(can_respond(&survey, false, false, t0()));
        assert!(matches!(
            check_survey_response(&survey, true, false, t0()),
            Err(AppError::AlreadyResponded)
        ));
        assert!(can_respond(&survey, true, true, t0()));

        let mut closed = survey.clone();
        closed.status = SurveyStatus::Closed;
        assert!(matches!(
            check_survey_response(&closed, false, true, t0()),
            Err(AppError::SurveyClosed)
        ));

        let mut draft = survey;
        draft.status = SurveyStatus::Draft;
        assert!(!can_respond(&draft, false, false, t0()));
    }

    #[test]
    fn test_survey_close_at_and_limit() {
        let survey = open_survey(SurveySettings {
            close_at: Some(t0() + Duration::hours(1)),
            response_limit: Some(2),
            ..SurveySettings::default()
        });
        assert_eq!(survey_status(&survey, t0()), SurveyStatus::Open);
        assert_eq!(
            survey_status(&survey, t0() + Duration::hours(2)),
            SurveyStatus::Closed
        );

        let mut full = survey;
        full.stats.response_count = 2;
        assert!(matches!(
            check_survey_response(&full, false, false, t0()),
            Err(AppError::NotEligible(_))
        ));
        assert!(matches!(
            check_survey_response(&full, false, true, t0()),
            Err(AppError::NotEligible(_))
        ));
    }
}
