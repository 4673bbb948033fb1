//! Aggregates and admin overrides.
//!
//! A read resolves to either the live aggregate or the admin-entered one.
//! Both variants carry the same type, so consumers never need to know which
//! source produced the numbers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::response::{Answer, AnswerValue, Question, QuestionKind, SurveyDocument};
use super::vote::{PollDocument, percentage};

/// Text answers kept per question in a computed survey aggregate.
pub const SAMPLE_RESPONSES: usize = 5;

/// Where an aggregate came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "snake_case")]
pub enum Resolved<T> {
    /// Derived from the ledger.
    Computed(T),
    /// Entered by an admin; replaces the ledger for reads only.
    Overridden(T),
}

impl<T> Resolved<T> {
    /// Borrow the aggregate.
    pub const fn inner(&self) -> &T {
        match self {
            Self::Computed(t) | Self::Overridden(t) => t,
        }
    }

    /// Take the aggregate.
    pub fn into_inner(self) -> T {
        match self {
            Self::Computed(t) | Self::Overridden(t) => t,
        }
    }

    /// Whether an admin override was used.
    pub const fn is_overridden(&self) -> bool {
        matches!(self, Self::Overridden(_))
    }

    /// Transform the aggregate, keeping its source.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Self::Computed(t) => Resolved::Computed(f(t)),
            Self::Overridden(t) => Resolved::Overridden(f(t)),
        }
    }
}

/// Count and share for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub id: String,
    pub label: String,
    pub vote_count: u64,
    pub percentage: u8,
}

/// Opinion as shown to readers. Never carries the author hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpinionView {
    #[serde(default)]
    pub id: Option<String>,
    pub author_name: String,
    pub content: String,
    #[serde(default)]
    pub selected_option_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Poll aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTally {
    pub options: Vec<OptionTally>,
    pub total_votes: u64,
    pub unique_voters: u64,
    pub opinions: Vec<OpinionView>,
}

/// Admin-entered poll results for a binary poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollAdminResults {
    #[serde(default)]
    pub agree_count: u64,
    #[serde(default)]
    pub disagree_count: u64,
    #[serde(default)]
    pub opinions: Vec<OpinionView>,
}

impl PollAdminResults {
    /// No counts and no opinions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agree_count == 0 && self.disagree_count == 0 && self.opinions.is_empty()
    }
}

/// Per-question survey aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionTally {
    pub total_responses: u64,
    #[serde(default)]
    pub choices: BTreeMap<String, u64>,
    #[serde(default)]
    pub ratings: BTreeMap<u8, u64>,
    #[serde(default)]
    pub sample_responses: Vec<String>,
}

/// Survey aggregate keyed by question id.
pub type SurveyAggregate = BTreeMap<String, QuestionTally>;

/// Live poll aggregate.
#[must_use]
pub fn poll_tally(poll: &PollDocument) -> PollTally {
    let total: u64 = poll.options.iter().map(|o| o.votes.len() as u64).sum();
    PollTally {
        options: poll
            .options
            .iter()
            .map(|o| {
                let count = o.votes.len() as u64;
                OptionTally {
                    id: o.id.clone(),
                    label: o.label.clone(),
                    vote_count: count,
                    percentage: percentage(count, total),
                }
            })
            .collect(),
        total_votes: total,
        unique_voters: poll.participants.len() as u64,
        opinions: poll
            .opinions
            .iter()
            .filter(|o| !o.is_deleted)
            .map(|o| OpinionView {
                id: Some(o.id.clone()),
                author_name: o.author_name.clone(),
                content: o.content.clone(),
                selected_option_id: o.selected_option_id.clone(),
                created_at: Some(o.created_at),
            })
            .collect(),
    }
}

/// Poll aggregate built from admin results.
///
/// The agree count lands on the first option and the disagree count on the
/// second; any further options read zero.
#[must_use]
pub fn override_tally(poll: &PollDocument, results: &PollAdminResults) -> PollTally {
    let total = results.agree_count.saturating_add(results.disagree_count);
    PollTally {
        options: poll
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| {
                let count = match i {
                    0 => results.agree_count,
                    1 => results.disagree_count,
                    _ => 0,
                };
                OptionTally {
                    id: o.id.clone(),
                    label: o.label.clone(),
                    vote_count: count,
                    percentage: percentage(count, total),
                }
            })
            .collect(),
        total_votes: total,
        unique_voters: total,
        opinions: results.opinions.clone(),
    }
}

/// Resolve the aggregate shown for a poll.
#[must_use]
pub fn resolve_poll(poll: &PollDocument) -> Resolved<PollTally> {
    match &poll.admin_results {
        Some(results) if !results.is_empty() => Resolved::Overridden(override_tally(poll, results)),
        _ => Resolved::Computed(poll_tally(poll)),
    }
}

/// The admin aggregate of a survey, if one is set and non-empty.
#[must_use]
pub fn survey_override(survey: &SurveyDocument) -> Option<&SurveyAggregate> {
    survey.admin_results.as_ref().filter(|r| !r.is_empty())
}

/// Live survey aggregate over the answers of every live response.
#[must_use]
pub fn tally_responses(questions: &[Question], responses: &[Vec<Answer>]) -> SurveyAggregate {
    let mut aggregate: SurveyAggregate = questions
        .iter()
        .map(|q| (q.id.clone(), empty_tally(q)))
        .collect();

    for answers in responses {
        for answer in answers {
            let Some(tally) = aggregate.get_mut(&answer.question_id) else {
                continue;
            };
            tally.total_responses += 1;
            match &answer.value {
                AnswerValue::SingleChoice { choice_id } => {
                    *tally.choices.entry(choice_id.clone()).or_default() += 1;
                }
                AnswerValue::MultipleChoice { choice_ids } => {
                    for id in choice_ids {
                        *tally.choices.entry(id.clone()).or_default() += 1;
                    }
                }
                AnswerValue::Rating { rating } => {
                    *tally.ratings.entry(*rating).or_default() += 1;
                }
                AnswerValue::ShortText { text } | AnswerValue::LongText { text } => {
                    if tally.sample_responses.len() < SAMPLE_RESPONSES {
                        tally.sample_responses.push(text.clone());
                    }
                }
            }
        }
    }
    aggregate
}

fn empty_tally(question: &Question) -> QuestionTally {
    let mut tally = QuestionTally::default();
    if let Some(choices) = question.kind.choices() {
        tally.choices = choices.iter().map(|c| (c.id.clone(), 0)).collect();
    }
    if let QuestionKind::Rating { scale } = question.kind {
        tally.ratings = (1..=scale).map(|r| (r, 0)).collect();
    }
    tally
}

/// Resolve the aggregate shown for a survey.
///
/// `responses` is ignored when an override is present.
#[must_use]
pub fn resolve_survey(survey: &SurveyDocument, responses: &[Vec<Answer>]) -> Resolved<SurveyAggregate> {
    match survey_override(survey) {
        Some(results) => Resolved::Overridden(results.clone()),
        None => Resolved::Computed(tally_responses(&survey.questions, responses)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::response::tests::{basic_survey, survey_with};
    use crate::ledger::vote::{NewPoll, OpinionInput, VoterInfo};
    use chrono::{Duration, TimeZone};
    use maplit::btreemap;
    use serde_json::json;
    use tally_common::{IdGenerator, ParticipantHash};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap()
    }

    fn voted_poll() -> PollDocument {
        let mut poll = PollDocument::create(
            NewPoll {
                title: "Binary".to_string(),
                start_at: Some(t0() - Duration::hours(1)),
                end_at: Some(t0() + Duration::hours(1)),
                ..NewPoll::default()
            },
            &IdGenerator::new(),
            ParticipantHash::from_stored("author"),
            String::new(),
            t0(),
        )
        .unwrap();
        let agree = poll.options[0].id.clone();
        for voter in ["p1", "p2", "p3"] {
            poll.cast_vote(
                &[agree.clone()],
                &ParticipantHash::from_stored(voter),
                &VoterInfo::default(),
                t0(),
            )
            .unwrap();
        }
        poll
    }

    fn shape(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), shape(v)))
                .collect::<serde_json::Map<_, _>>()
                .into(),
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().take(1).map(shape).collect())
            }
            _ => json!("scalar"),
        }
    }

    #[test]
    fn test_poll_computed_when_no_override() {
        let poll = voted_poll();
        let resolved = resolve_poll(&poll);
        assert!(!resolved.is_overridden());
        let tally = resolved.into_inner();
        assert_eq!(tally.total_votes, 3);
        assert_eq!(tally.options[0].percentage, 100);
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let mut poll = voted_poll();
        poll.admin_results = Some(PollAdminResults::default());
        assert!(!resolve_poll(&poll).is_overridden());
    }

    #[test]
    fn test_poll_override_shape_parity() {
        let mut poll = voted_poll();
        poll.settings.allow_opinion = true;
        let agree = poll.options[0].id.clone();
        poll.add_opinion(
            "op-1".to_string(),
            &ParticipantHash::from_stored("p1"),
            OpinionInput {
                author_name: "Mina".to_string(),
                content: "Agreed".to_string(),
                selected_option_id: Some(agree),
                is_anonymous: false,
            },
            t0(),
        )
        .unwrap();
        let computed = resolve_poll(&poll).into_inner();

        poll.admin_results = Some(PollAdminResults {
            agree_count: 40,
            disagree_count: 60,
            opinions: vec![OpinionView {
                id: None,
                author_name: "Editor".to_string(),
                content: "Curated".to_string(),
                selected_option_id: None,
                created_at: None,
            }],
        });
        let resolved = resolve_poll(&poll);
        assert!(resolved.is_overridden());
        let overridden = resolved.into_inner();

        assert_eq!(overridden.options[0].vote_count, 40);
        assert_eq!(overridden.options[1].percentage, 60);
        assert_eq!(overridden.total_votes, 100);

        let computed = serde_json::to_value(&computed).unwrap();
        let overridden = serde_json::to_value(&overridden).unwrap();
        assert_eq!(shape(&computed), shape(&overridden));
        assert!(overridden["opinions"][0]["id"].is_null());
        assert!(overridden["opinions"][0]["created_at"].is_null());
        // The ledger underneath is untouched.
        assert_eq!(poll.stats.total_votes, 3);
    }

    #[test]
    fn test_override_with_huge_counts_stays_in_bounds() {
        let mut poll = voted_poll();
        poll.admin_results = Some(PollAdminResults {
            agree_count: u64::MAX,
            disagree_count: 2,
            opinions: Vec::new(),
        });

        let tally = resolve_poll(&poll).into_inner();
        assert_eq!(tally.total_votes, u64::MAX);
        assert_eq!(tally.unique_voters, u64::MAX);
        assert!(tally.options.iter().all(|o| o.percentage <= 100));
        assert_eq!(tally.options[0].percentage, 100);
        assert_eq!(tally.options[1].percentage, 0);
        assert_eq!(percentage(u64::MAX, 1), 100);
    }

    #[test]
    fn test_survey_override_returned_verbatim() {
        let mut survey = survey_with(basic_survey(), t0());
        survey.stats.response_count = 4;
        let results = btreemap! {
            "q1".to_string() => QuestionTally {
                total_responses: 10,
                choices: btreemap! { "c1".to_string() => 7, "c2".to_string() => 3 },
                ..QuestionTally::default()
            },
        };
        survey.admin_results = Some(results.clone());

        let live = vec![vec![Answer {
            question_id: "q1".to_string(),
            value: AnswerValue::SingleChoice {
                choice_id: "c2".to_string(),
            },
        }]];
        let resolved = resolve_survey(&survey, &live);

        assert_eq!(resolved, Resolved::Overridden(results));
        assert_eq!(survey.stats.response_count, 4);
    }

    #[test]
    fn test_survey_tally_counts_answers() {
        let survey = survey_with(basic_survey(), t0());
        let responses = vec![
            vec![
                Answer {
                    question_id: "q1".to_string(),
                    value: AnswerValue::SingleChoice {
                        choice_id: "c1".to_string(),
                    },
                },
                Answer {
                    question_id: "q3".to_string(),
                    value: AnswerValue::Rating { rating: 4 },
                },
            ],
            vec![
                Answer {
                    question_id: "q1".to_string(),
                    value: AnswerValue::SingleChoice {
                        choice_id: "c1".to_string(),
                    },
                },
                Answer {
                    question_id: "q2".to_string(),
                    value: AnswerValue::LongText {
                        text: "More pairing".to_string(),
                    },
                },
            ],
        ];

        let resolved = resolve_survey(&survey, &responses);
        assert!(!resolved.is_overridden());
        let aggregate = resolved.into_inner();

        assert_eq!(aggregate["q1"].total_responses, 2);
        assert_eq!(aggregate["q1"].choices["c1"], 2);
        assert_eq!(aggregate["q1"].choices["c2"], 0);
        assert_eq!(aggregate["q3"].ratings.len(), 5);
        assert_eq!(aggregate["q3"].ratings[&4], 1);
        assert_eq!(aggregate["q2"].sample_responses, ["More pairing"]);
    }

    #[test]
    fn test_survey_override_parses_admin_json() {
        let parsed: SurveyAggregate = serde_json::from_value(json!({
            "q1": { "total_responses": 10, "choices": { "c1": 7, "c2": 3 } },
            "q3": { "total_responses": 2, "ratings": { "5": 2 } },
        }))
        .unwrap();
        assert_eq!(parsed["q1"].choices["c1"], 7);
        assert_eq!(parsed["q3"].ratings[&5], 2);
    }
}
