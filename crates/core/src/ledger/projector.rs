//! Read-side views.
//!
//! Nothing here mutates a document. Participant hashes, admin credentials and
//! individual vote lists never leave this module.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_common::ParticipantHash;
use tally_db::entities::{poll::PollStatus, survey::SurveyStatus};

use super::aggregate::{self, OpinionView, PollTally, QuestionTally, Resolved, SurveyAggregate};
use super::eligibility;
use super::response::{Question, QuestionKind, ScreenConfig, SurveyDocument, SurveySettings};
use super::vote::{PollDocument, PollSettings};

/// Poll results as shown to a viewer.
#[derive(Debug, Clone, Serialize)]
pub struct PollResults {
    pub poll_id: String,
    pub status: PollStatus,
    pub results: Resolved<PollTally>,
}

/// Project poll results.
///
/// Returns `None` while results are hidden before the end and the viewer has
/// no right to force them.
#[must_use]
pub fn project_poll(poll: &PollDocument, now: DateTime<Utc>, force_show: bool) -> Option<PollResults> {
    let status = eligibility::poll_status(poll, now);
    if !results_visible(poll, status, force_show) {
        return None;
    }
    Some(PollResults {
        poll_id: poll.public_id.clone(),
        status,
        results: aggregate::resolve_poll(poll),
    })
}

fn results_visible(poll: &PollDocument, status: PollStatus, force_show: bool) -> bool {
    poll.settings.show_results_before_end || status == PollStatus::Ended || force_show
}

/// Count for one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceCount {
    pub choice_id: String,
    pub label: String,
    pub count: u64,
}

/// Summary of one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionSummary {
    pub question_id: String,
    pub title: String,
    pub question_type: &'static str,
    pub total_responses: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceCount>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ratings: BTreeMap<u8, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample_responses: Vec<String>,
}

/// Survey results as shown to a viewer.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyResults {
    pub survey_id: String,
    pub status: SurveyStatus,
    pub response_count: u64,
    pub completion_rate: u8,
    pub results: Resolved<Vec<QuestionSummary>>,
}

/// Project survey results from a resolved aggregate.
///
/// Returns `None` when results are private and the viewer is not the admin.
/// Text questions only expose their count; sample answers go to the admin.
#[must_use]
pub fn project_survey(
    survey: &SurveyDocument,
    aggregate: Resolved<SurveyAggregate>,
    viewer_is_admin: bool,
    now: DateTime<Utc>,
) -> Option<SurveyResults> {
    if !survey.settings.public_results && !viewer_is_admin {
        return None;
    }
    Some(SurveyResults {
        survey_id: survey.public_id.clone(),
        status: eligibility::survey_status(survey, now),
        response_count: survey.stats.response_count,
        completion_rate: survey.stats.completion_rate,
        results: aggregate.map(|agg| {
            survey
                .questions
                .iter()
                .map(|q| summarize(q, agg.get(&q.id), viewer_is_admin))
                .collect()
        }),
    })
}

fn summarize(question: &Question, tally: Option<&QuestionTally>, with_samples: bool) -> QuestionSummary {
    let empty = QuestionTally::default();
    let tally = tally.unwrap_or(&empty);

    let mut summary = QuestionSummary {
        question_id: question.id.clone(),
        title: question.title.clone(),
        question_type: question.kind.name(),
        total_responses: tally.total_responses,
        choices: Vec::new(),
        ratings: BTreeMap::new(),
        average_rating: None,
        sample_responses: Vec::new(),
    };

    match &question.kind {
        QuestionKind::SingleChoice { choices } | QuestionKind::MultipleChoice { choices } => {
            summary.choices = choices
                .iter()
                .map(|c| ChoiceCount {
                    choice_id: c.id.clone(),
                    label: c.label.clone(),
                    count: tally.choices.get(&c.id).copied().unwrap_or(0),
                })
                .collect();
        }
        QuestionKind::Rating { scale } => {
            summary.ratings = (1..=*scale)
                .map(|r| (r, tally.ratings.get(&r).copied().unwrap_or(0)))
                .collect();
            summary.average_rating = average(&summary.ratings);
        }
        QuestionKind::ShortText { .. } | QuestionKind::LongText { .. } => {
            if with_samples {
                summary.sample_responses = tally.sample_responses.clone();
            }
        }
    }
    summary
}

fn average(ratings: &BTreeMap<u8, u64>) -> Option<f64> {
    if ratings.values().all(|n| *n == 0) {
        return None;
    }
    let count: f64 = ratings.values().map(|n| *n as f64).sum();
    let sum: f64 = ratings.iter().map(|(r, n)| f64::from(*r) * *n as f64).sum();
    let mean = sum / count;
    Some((mean * 100.0).round() / 100.0)
}

/// Option as shown in a poll detail.
#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub id: String,
    pub label: String,
    pub order: u32,
}

/// Public poll view.
#[derive(Debug, Clone, Serialize)]
pub struct PollDetail {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    pub options: Vec<OptionView>,
    pub settings: PollSettings,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: PollStatus,
    pub is_hidden: bool,
    /// `None` while results are hidden from this viewer.
    pub total_votes: Option<u64>,
    pub unique_voters: Option<u64>,
    pub opinion_count: u64,
    pub view_count: u64,
    pub opinions: Vec<OpinionView>,
    /// Votes the viewer has already cast.
    pub votes_cast: u32,
    pub can_vote: bool,
    pub created_at: DateTime<Utc>,
}

impl PollDetail {
    /// Build the view for `viewer`.
    ///
    /// Counts and the option each opinion backs follow the same visibility
    /// rule as [`project_poll`].
    #[must_use]
    pub fn build(
        poll: &PollDocument,
        viewer: &ParticipantHash,
        now: DateTime<Utc>,
        force_show: bool,
    ) -> Self {
        let status = eligibility::poll_status(poll, now);
        let visible = results_visible(poll, status, force_show);
        let mut counts = aggregate::resolve_poll(poll).into_inner();
        if !visible {
            for opinion in &mut counts.opinions {
                opinion.selected_option_id = None;
            }
        }
        Self {
            id: poll.public_id.clone(),
            title: poll.title.clone(),
            description: poll.description.clone(),
            category: poll.category.clone(),
            tags: poll.tags.clone(),
            author_name: poll.author_name.clone(),
            options: poll
                .options
                .iter()
                .map(|o| OptionView {
                    id: o.id.clone(),
                    label: o.label.clone(),
                    order: o.order,
                })
                .collect(),
            settings: poll.settings.clone(),
            start_at: poll.start_at,
            end_at: poll.end_at,
            status,
            is_hidden: poll.is_hidden,
            total_votes: visible.then_some(counts.total_votes),
            unique_voters: visible.then_some(counts.unique_voters),
            opinion_count: poll.stats.opinion_count,
            view_count: poll.stats.view_count,
            opinions: counts.opinions,
            votes_cast: poll.votes_cast_by(viewer),
            can_vote: eligibility::can_vote(poll, viewer, now),
            created_at: poll.created_at,
        }
    }
}

/// Public survey view.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyDetail {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    pub questions: Vec<Question>,
    pub welcome_screen: Option<ScreenConfig>,
    pub thank_you_screen: Option<ScreenConfig>,
    pub settings: SurveySettings,
    pub status: SurveyStatus,
    pub is_editable: bool,
    pub response_count: u64,
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
}

impl SurveyDetail {
    #[must_use]
    pub fn build(survey: &SurveyDocument, now: DateTime<Utc>) -> Self {
        Self {
            id: survey.public_id.clone(),
            title: survey.title.clone(),
            description: survey.description.clone(),
            tags: survey.tags.clone(),
            author_name: survey.author_name.clone(),
            questions: survey.questions.clone(),
            welcome_screen: survey.welcome_screen.clone(),
            thank_you_screen: survey.thank_you_screen.clone(),
            settings: survey.settings.clone(),
            status: eligibility::survey_status(survey, now),
            is_editable: survey.is_editable,
            response_count: survey.stats.response_count,
            view_count: survey.stats.view_count,
            created_at: survey.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::response::tests::{basic_survey, survey_with};
    use crate::ledger::response::{Answer, AnswerValue, NewSurvey};
    use crate::ledger::vote::{NewPoll, OpinionInput, VoterInfo};
    use chrono::{Duration, TimeZone};
    use tally_common::IdGenerator;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn poll(show_results_before_end: bool) -> PollDocument {
        PollDocument::create(
            NewPoll {
                title: "Lunch".to_string(),
                show_results_before_end,
                start_at: Some(t0() - Duration::hours(1)),
                end_at: Some(t0() + Duration::hours(1)),
                ..NewPoll::default()
            },
            &IdGenerator::new(),
            ParticipantHash::from_stored("author"),
            "secret-hash".to_string(),
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn test_poll_results_hidden_until_end() {
        let poll = poll(false);
        assert!(project_poll(&poll, t0(), false).is_none());
        assert!(project_poll(&poll, t0(), true).is_some());

        let after = project_poll(&poll, t0() + Duration::hours(2), false).unwrap();
        assert_eq!(after.status, PollStatus::Ended);
    }

    #[test]
    fn test_poll_results_visible_when_allowed() {
        let mut poll = poll(true);
        let a = poll.options[0].id.clone();
        poll.cast_vote(
            &[a],
            &ParticipantHash::from_stored("p1"),
            &VoterInfo::default(),
            t0(),
        )
        .unwrap();

        let results = project_poll(&poll, t0(), false).unwrap();
        assert_eq!(results.status, PollStatus::Active);
        let tally = results.results.inner();
        assert_eq!(tally.total_votes, 1);
        assert_eq!(tally.unique_voters, 1);
        assert_eq!(tally.options[0].percentage, 100);
    }

    #[test]
    fn test_poll_detail_leaks_no_hashes() {
        let mut poll = poll(true);
        let a = poll.options[0].id.clone();
        let voter = ParticipantHash::from_stored("voter-hash-value");
        poll.cast_vote(&[a], &voter, &VoterInfo::default(), t0())
            .unwrap();

        let detail = PollDetail::build(&poll, &voter, t0(), false);
        assert_eq!(detail.votes_cast, 1);
        assert!(!detail.can_vote);

        let body = serde_json::to_string(&detail).unwrap();
        assert!(!body.contains("voter-hash-value"));
        assert!(!body.contains("secret-hash"));
        assert!(!body.contains("\"author\""));
    }

    #[test]
    fn test_poll_detail_hides_counts_before_end() {
        let mut poll = poll(false);
        poll.settings.allow_opinion = true;
        let a = poll.options[0].id.clone();
        let voter = ParticipantHash::from_stored("p1");
        poll.cast_vote(&[a.clone()], &voter, &VoterInfo::default(), t0())
            .unwrap();
        poll.add_opinion(
            "op-1".to_string(),
            &voter,
            OpinionInput {
                author_name: "Rae".to_string(),
                content: "Soup".to_string(),
                selected_option_id: Some(a.clone()),
                is_anonymous: false,
            },
            t0(),
        )
        .unwrap();

        let public = PollDetail::build(&poll, &voter, t0(), false);
        assert_eq!(public.total_votes, None);
        assert_eq!(public.unique_voters, None);
        assert_eq!(public.opinions.len(), 1);
        assert_eq!(public.opinions[0].selected_option_id, None);
        assert_eq!(public.votes_cast, 1);

        let admin = PollDetail::build(&poll, &voter, t0(), true);
        assert_eq!(admin.total_votes, Some(1));
        assert_eq!(admin.opinions[0].selected_option_id, Some(a.clone()));

        let ended = PollDetail::build(&poll, &voter, t0() + Duration::hours(2), false);
        assert_eq!(ended.unique_voters, Some(1));
        assert_eq!(ended.opinions[0].selected_option_id, Some(a));
    }

    #[test]
    fn test_rating_average_survives_huge_counts() {
        let ratings = BTreeMap::from([(5, u64::MAX), (1, u64::MAX)]);
        let mean = average(&ratings).unwrap();
        assert!((1.0..=5.0).contains(&mean));
        assert_eq!(average(&BTreeMap::new()), None);
    }

    #[test]
    fn test_survey_results_private_by_default() {
        let survey = survey_with(basic_survey(), t0());
        let agg = aggregate::resolve_survey(&survey, &[]);
        assert!(project_survey(&survey, agg.clone(), false, t0()).is_none());
        assert!(project_survey(&survey, agg, true, t0()).is_some());
    }

    #[test]
    fn test_survey_summary_per_type() {
        let mut input = basic_survey();
        input.settings.public_results = true;
        let survey = survey_with(input, t0());
        let responses = vec![
            vec![
                Answer {
                    question_id: "q2".to_string(),
                    value: AnswerValue::LongText {
                        text: "Private thoughts".to_string(),
                    },
                },
                Answer {
                    question_id: "q3".to_string(),
                    value: AnswerValue::Rating { rating: 4 },
                },
            ],
            vec![Answer {
                question_id: "q3".to_string(),
                value: AnswerValue::Rating { rating: 5 },
            }],
        ];
        let agg = aggregate::resolve_survey(&survey, &responses);

        let public = project_survey(&survey, agg.clone(), false, t0()).unwrap();
        let summaries = public.results.inner();
        assert_eq!(summaries.len(), 3);

        assert_eq!(summaries[0].question_type, "single_choice");
        assert_eq!(summaries[0].choices.len(), 2);
        assert_eq!(summaries[0].total_responses, 0);

        assert_eq!(summaries[1].total_responses, 1);
        assert!(summaries[1].sample_responses.is_empty());

        assert_eq!(summaries[2].ratings.len(), 5);
        assert_eq!(summaries[2].average_rating, Some(4.5));

        let admin = project_survey(&survey, agg, true, t0()).unwrap();
        assert_eq!(admin.results.inner()[1].sample_responses, ["Private thoughts"]);
    }

    #[test]
    fn test_overridden_survey_projects_same_shape() {
        let input = NewSurvey {
            settings: SurveySettings {
                public_results: true,
                ..SurveySettings::default()
            },
            ..basic_survey()
        };
        let mut survey = survey_with(input, t0());
        survey.admin_results = Some(maplit::btreemap! {
            "q1".to_string() => QuestionTally {
                total_responses: 10,
                choices: maplit::btreemap! { "c1".to_string() => 7, "c2".to_string() => 3 },
                ..QuestionTally::default()
            },
        });

        let projected = project_survey(&survey, aggregate::resolve_survey(&survey, &[]), false, t0()).unwrap();
        assert!(projected.results.is_overridden());
        let q1 = &projected.results.inner()[0];
        assert_eq!(q1.total_responses, 10);
        assert_eq!(q1.choices[0].count, 7);
        assert_eq!(q1.choices[1].count, 3);
        assert_eq!(projected.results.inner()[2].total_responses, 0);
    }
}
