//! Response ledger for surveys.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_common::{AppError, AppResult, IdGenerator};
use tally_db::ResponseTally;
use tally_db::entities::survey::{self, SurveyStatus};

use super::aggregate::SurveyAggregate;
use super::{eligibility, from_json, to_json};

/// Maximum number of questions in a survey.
pub const MAX_QUESTIONS: usize = 50;
/// Minimum number of choices on a choice question.
pub const MIN_CHOICES: usize = 2;
/// Maximum number of choices on a choice question.
pub const MAX_CHOICES: usize = 20;
/// Default cap for short text answers, in characters.
pub const SHORT_TEXT_MAX_LEN: usize = 500;
/// Default cap for long text answers, in characters.
pub const LONG_TEXT_MAX_LEN: usize = 5000;

const QUALITY_MAX: u8 = 100;
const TOO_FAST_PENALTY: u8 = 30;
const SAME_ANSWER_PENALTY: u8 = 20;
/// Minimum seconds per answer before a response counts as rushed.
const SECONDS_PER_ANSWER: i64 = 2;
/// Choice answers needed before straight-lining is considered.
const SAME_ANSWER_MIN: usize = 3;

const fn default_true() -> bool {
    true
}

/// A selectable choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

/// Question type and its type-specific properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice {
        choices: Vec<Choice>,
    },
    MultipleChoice {
        choices: Vec<Choice>,
    },
    ShortText {
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
    },
    LongText {
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
    },
    Rating {
        scale: u8,
    },
}

impl QuestionKind {
    /// Wire name of the type.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SingleChoice { .. } => "single_choice",
            Self::MultipleChoice { .. } => "multiple_choice",
            Self::ShortText { .. } => "short_text",
            Self::LongText { .. } => "long_text",
            Self::Rating { .. } => "rating",
        }
    }

    /// Choices of a choice question.
    #[must_use]
    pub fn choices(&self) -> Option<&[Choice]> {
        match self {
            Self::SingleChoice { choices } | Self::MultipleChoice { choices } => Some(choices),
            _ => None,
        }
    }

    fn text_bounds(&self) -> Option<(usize, usize)> {
        match self {
            Self::ShortText {
                min_length,
                max_length,
            } => Some((
                min_length.unwrap_or(0),
                max_length.unwrap_or(SHORT_TEXT_MAX_LEN),
            )),
            Self::LongText {
                min_length,
                max_length,
            } => Some((
                min_length.unwrap_or(0),
                max_length.unwrap_or(LONG_TEXT_MAX_LEN),
            )),
            _ => None,
        }
    }
}

/// Show a question only when an earlier choice question has this answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCondition {
    pub question_id: String,
    pub equals_choice_id: String,
}

/// A survey question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_logic: Option<SkipCondition>,
}

/// The value of an answer, tagged with the question type it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum AnswerValue {
    SingleChoice { choice_id: String },
    MultipleChoice { choice_ids: Vec<String> },
    ShortText { text: String },
    LongText { text: String },
    Rating { rating: u8 },
}

impl AnswerValue {
    /// Wire name of the question type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::SingleChoice { .. } => "single_choice",
            Self::MultipleChoice { .. } => "multiple_choice",
            Self::ShortText { .. } => "short_text",
            Self::LongText { .. } => "long_text",
            Self::Rating { .. } => "rating",
        }
    }

    /// First selected choice of a choice answer.
    #[must_use]
    pub fn first_choice(&self) -> Option<&str> {
        match self {
            Self::SingleChoice { choice_id } => Some(choice_id),
            Self::MultipleChoice { choice_ids } => choice_ids.first().map(String::as_str),
            _ => None,
        }
    }

    fn selects(&self, choice: &str) -> bool {
        match self {
            Self::SingleChoice { choice_id } => choice_id == choice,
            Self::MultipleChoice { choice_ids } => choice_ids.iter().any(|c| c == choice),
            _ => false,
        }
    }
}

/// One answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    #[serde(flatten)]
    pub value: AnswerValue,
}

/// Quality flags attached to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    TooFast,
    DuplicatePattern,
    AllSameAnswers,
    SuspiciousIp,
}

/// Quality score and the flags that lowered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quality {
    pub score: u8,
    pub flags: Vec<QualityFlag>,
}

/// Intro or outro screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub button_text: Option<String>,
}

/// Survey presentation and admission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveySettings {
    #[serde(default = "default_true")]
    pub show_progress_bar: bool,
    #[serde(default = "default_true")]
    pub show_question_numbers: bool,
    #[serde(default = "default_true")]
    pub allow_back_navigation: bool,
    #[serde(default)]
    pub autosave: bool,
    #[serde(default)]
    pub response_limit: Option<u64>,
    #[serde(default)]
    pub close_at: Option<DateTime<Utc>>,
    /// Whether anyone may read the results.
    #[serde(default)]
    pub public_results: bool,
}

impl Default for SurveySettings {
    fn default() -> Self {
        Self {
            show_progress_bar: true,
            show_question_numbers: true,
            allow_back_navigation: true,
            autosave: false,
            response_limit: None,
            close_at: None,
            public_results: false,
        }
    }
}

/// Cached survey counters, refreshed from the response table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyStats {
    pub response_count: u64,
    pub completion_rate: u8,
    pub avg_completion_time: f64,
    pub last_response_at: Option<DateTime<Utc>>,
    pub view_count: u64,
}

/// Input for creating a survey.
#[derive(Debug, Clone, Default)]
pub struct NewSurvey {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    pub questions: Vec<Question>,
    pub welcome_screen: Option<ScreenConfig>,
    pub thank_you_screen: Option<ScreenConfig>,
    pub settings: SurveySettings,
    /// Open immediately instead of starting as a draft.
    pub open: bool,
}

/// Result of checking a set of answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerCheck {
    /// Every visible required question has an answer.
    pub is_complete: bool,
}

/// A survey and its questions.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyDocument {
    pub id: String,
    pub public_id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    pub admin_password_hash: String,
    pub questions: Vec<Question>,
    pub welcome_screen: Option<ScreenConfig>,
    pub thank_you_screen: Option<ScreenConfig>,
    pub settings: SurveySettings,
    pub admin_results: Option<SurveyAggregate>,
    pub status: SurveyStatus,
    pub is_editable: bool,
    pub first_response_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub stats: SurveyStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SurveyDocument {
    /// Build a new survey from input.
    pub fn create(
        input: NewSurvey,
        id_gen: &IdGenerator,
        admin_password_hash: String,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let questions = normalize_questions(input.questions)?;

        Ok(Self {
            id: id_gen.generate(),
            public_id: id_gen.generate_public_id(),
            title: input.title.trim().to_string(),
            description: input.description,
            tags: input.tags,
            author_name: input.author_name,
            admin_password_hash,
            questions,
            welcome_screen: input.welcome_screen,
            thank_you_screen: input.thank_you_screen,
            settings: input.settings,
            admin_results: None,
            status: if input.open {
                SurveyStatus::Open
            } else {
                SurveyStatus::Draft
            },
            is_editable: true,
            first_response_at: None,
            is_deleted: false,
            stats: SurveyStats::default(),
            created_at: now,
            updated_at: None,
        })
    }

    /// Replace the questions. Only allowed before the first response.
    pub fn replace_questions(&mut self, questions: Vec<Question>) -> AppResult<()> {
        if !self.is_editable {
            return Err(AppError::Conflict(
                "Questions cannot change after the first response".to_string(),
            ));
        }
        self.questions = normalize_questions(questions)?;
        Ok(())
    }

    /// Set the lifecycle status.
    ///
    /// Opening a survey whose close time has passed clears that close time.
    pub fn set_status(&mut self, status: SurveyStatus, now: DateTime<Utc>) {
        if status == SurveyStatus::Open
            && self.settings.close_at.is_some_and(|close_at| now > close_at)
        {
            self.settings.close_at = None;
        }
        self.status = status;
    }

    /// Store the derived status.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) {
        self.status = eligibility::survey_status(self, now);
    }

    /// Soft-delete. Terminal.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.refresh_status(now);
        self.is_deleted = true;
    }

    /// Account for a newly stored response.
    ///
    /// The first response freezes the question structure for good.
    pub fn record_response(&mut self, tally: &ResponseTally, now: DateTime<Utc>) {
        if self.first_response_at.is_none() {
            self.first_response_at = Some(now);
            self.is_editable = false;
        }
        self.apply_tally(tally);
        self.stats.last_response_at = Some(now);
    }

    /// Replace cached counters with a fresh tally.
    pub fn apply_tally(&mut self, tally: &ResponseTally) {
        self.stats.response_count = tally.count.max(0) as u64;
        self.stats.completion_rate = tally.completion_rate().clamp(0, 100) as u8;
        self.stats.avg_completion_time = tally.average_completion_time();
    }

    /// Find a question by id.
    #[must_use]
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

/// Validate questions and number them in the given order.
pub fn normalize_questions(mut questions: Vec<Question>) -> AppResult<Vec<Question>> {
    validate_questions(&questions)?;
    for (i, question) in questions.iter_mut().enumerate() {
        question.order = i as u32;
    }
    Ok(questions)
}

/// Check the structural rules for a question list.
pub fn validate_questions(questions: &[Question]) -> AppResult<()> {
    if questions.is_empty() || questions.len() > MAX_QUESTIONS {
        return Err(AppError::Validation(format!(
            "A survey needs between 1 and {MAX_QUESTIONS} questions"
        )));
    }

    let mut earlier: HashMap<&str, &Question> = HashMap::new();
    for question in questions {
        if question.id.trim().is_empty() || question.title.trim().is_empty() {
            return Err(AppError::Validation(
                "Questions need an id and a title".to_string(),
            ));
        }
        if earlier.contains_key(question.id.as_str()) {
            return Err(AppError::Validation(format!(
                "Duplicate question id: {}",
                question.id
            )));
        }

        if let Some(choices) = question.kind.choices() {
            if choices.len() < MIN_CHOICES || choices.len() > MAX_CHOICES {
                return Err(AppError::Validation(format!(
                    "Question {} needs between {MIN_CHOICES} and {MAX_CHOICES} choices",
                    question.id
                )));
            }
            let mut ids = HashSet::new();
            for choice in choices {
                if choice.id.trim().is_empty()
                    || choice.label.trim().is_empty()
                    || !ids.insert(choice.id.as_str())
                {
                    return Err(AppError::Validation(format!(
                        "Question {} has an empty or duplicate choice",
                        question.id
                    )));
                }
            }
        }
        if let Some((min, max)) = question.kind.text_bounds()
            && (max == 0 || min > max)
        {
            return Err(AppError::Validation(format!(
                "Question {} has inconsistent length bounds",
                question.id
            )));
        }
        if let QuestionKind::Rating { scale } = question.kind
            && scale != 5
            && scale != 10
        {
            return Err(AppError::Validation(format!(
                "Question {} must use a 5 or 10 point scale",
                question.id
            )));
        }

        if let Some(condition) = &question.skip_logic {
            let valid = earlier
                .get(condition.question_id.as_str())
                .and_then(|target| target.kind.choices())
                .is_some_and(|choices| choices.iter().any(|c| c.id == condition.equals_choice_id));
            if !valid {
                return Err(AppError::Validation(format!(
                    "Question {} has skip logic that does not match an earlier choice",
                    question.id
                )));
            }
        }

        earlier.insert(&question.id, question);
    }
    Ok(())
}

fn is_visible(question: &Question, answers: &HashMap<&str, &AnswerValue>) -> bool {
    question.skip_logic.as_ref().is_none_or(|condition| {
        answers
            .get(condition.question_id.as_str())
            .is_some_and(|value| value.selects(&condition.equals_choice_id))
    })
}

fn invalid(question: &Question, reason: &str) -> AppError {
    AppError::InvalidAnswers(format!("Question {}: {reason}", question.id))
}

fn check_answer(question: &Question, value: &AnswerValue) -> AppResult<()> {
    match (&question.kind, value) {
        (QuestionKind::SingleChoice { choices }, AnswerValue::SingleChoice { choice_id }) => {
            if !choices.iter().any(|c| &c.id == choice_id) {
                return Err(invalid(question, "unknown choice"));
            }
        }
        (QuestionKind::MultipleChoice { choices }, AnswerValue::MultipleChoice { choice_ids }) => {
            if choice_ids.is_empty() {
                return Err(invalid(question, "no choice selected"));
            }
            let mut seen = HashSet::new();
            for id in choice_ids {
                if !seen.insert(id.as_str()) || !choices.iter().any(|c| &c.id == id) {
                    return Err(invalid(question, "unknown or repeated choice"));
                }
            }
        }
        (
            QuestionKind::ShortText { .. } | QuestionKind::LongText { .. },
            AnswerValue::ShortText { text } | AnswerValue::LongText { text },
        ) if question.kind.name() == value.type_name() => {
            let (min, max) = question.kind.text_bounds().unwrap_or((0, LONG_TEXT_MAX_LEN));
            let len = text.trim().chars().count();
            if len == 0 || len < min || len > max {
                return Err(invalid(question, "text length out of bounds"));
            }
        }
        (QuestionKind::Rating { scale }, AnswerValue::Rating { rating }) => {
            if *rating == 0 || rating > scale {
                return Err(invalid(question, "rating out of range"));
            }
        }
        _ => return Err(invalid(question, "answer type does not match question")),
    }
    Ok(())
}

/// Check a submission against the questions.
///
/// Rejects unknown or repeated questions, malformed values and answers to
/// questions hidden by skip logic.
pub fn validate_answers(questions: &[Question], answers: &[Answer]) -> AppResult<AnswerCheck> {
    if answers.is_empty() {
        return Err(AppError::InvalidAnswers("No answers submitted".to_string()));
    }

    let mut by_question: HashMap<&str, &AnswerValue> = HashMap::new();
    for answer in answers {
        if !questions.iter().any(|q| q.id == answer.question_id) {
            return Err(AppError::InvalidAnswers(format!(
                "Unknown question: {}",
                answer.question_id
            )));
        }
        if by_question
            .insert(answer.question_id.as_str(), &answer.value)
            .is_some()
        {
            return Err(AppError::InvalidAnswers(format!(
                "Question answered twice: {}",
                answer.question_id
            )));
        }
    }

    let mut is_complete = true;
    for question in questions {
        let answer = by_question.get(question.id.as_str());
        if !is_visible(question, &by_question) {
            if answer.is_some() {
                return Err(invalid(question, "question is hidden by skip logic"));
            }
            continue;
        }
        match answer {
            Some(value) => check_answer(question, value)?,
            None if question.required => is_complete = false,
            None => {}
        }
    }

    Ok(AnswerCheck { is_complete })
}

/// Whole seconds between start and submit, never negative.
#[must_use]
pub fn completion_seconds(started_at: DateTime<Utc>, submitted_at: DateTime<Utc>) -> i32 {
    let millis = (submitted_at - started_at).num_milliseconds();
    ((millis as f64 / 1000.0).round() as i64).clamp(0, i64::from(i32::MAX)) as i32
}

/// Score a response.
///
/// Pure: the same inputs always produce the same score, and each rule
/// contributes at most one penalty.
#[must_use]
pub fn score_quality(questions: &[Question], answers: &[Answer], completion_time: i32) -> Quality {
    let mut score = QUALITY_MAX;
    let mut flags = Vec::new();

    if i64::from(completion_time) < SECONDS_PER_ANSWER * answers.len() as i64 {
        score = score.saturating_sub(TOO_FAST_PENALTY);
        flags.push(QualityFlag::TooFast);
    }

    let picks: Vec<&str> = answers
        .iter()
        .filter(|answer| {
            questions
                .iter()
                .any(|q| q.id == answer.question_id && q.kind.choices().is_some())
        })
        .filter_map(|answer| answer.value.first_choice())
        .collect();
    if picks.len() > SAME_ANSWER_MIN && picks.windows(2).all(|w| w[0] == w[1]) {
        score = score.saturating_sub(SAME_ANSWER_PENALTY);
        flags.push(QualityFlag::AllSameAnswers);
    }

    Quality { score, flags }
}

impl TryFrom<survey::Model> for SurveyDocument {
    type Error = AppError;

    fn try_from(model: survey::Model) -> AppResult<Self> {
        Ok(Self {
            id: model.id,
            public_id: model.public_id,
            title: model.title,
            description: model.description,
            tags: from_json("tags", model.tags)?,
            author_name: model.author_name,
            admin_password_hash: model.admin_password_hash,
            questions: from_json("questions", model.questions)?,
            welcome_screen: model
                .welcome_screen
                .map(|v| from_json("welcome_screen", v))
                .transpose()?,
            thank_you_screen: model
                .thank_you_screen
                .map(|v| from_json("thank_you_screen", v))
                .transpose()?,
            settings: from_json("settings", model.settings)?,
            admin_results: model
                .admin_results
                .map(|v| from_json("admin_results", v))
                .transpose()?,
            status: model.status,
            is_editable: model.is_editable,
            first_response_at: model.first_response_at.map(|t| t.with_timezone(&Utc)),
            is_deleted: model.is_deleted,
            stats: SurveyStats {
                response_count: model.response_count.max(0) as u64,
                completion_rate: model.completion_rate.clamp(0, 100) as u8,
                avg_completion_time: model.avg_completion_time,
                last_response_at: model.last_response_at.map(|t| t.with_timezone(&Utc)),
                view_count: model.view_count.max(0) as u64,
            },
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.map(|t| t.with_timezone(&Utc)),
        })
    }
}

impl SurveyDocument {
    /// Encode into a storage row.
    pub fn into_model(self) -> AppResult<survey::Model> {
        Ok(survey::Model {
            tags: to_json("tags", &self.tags)?,
            questions: to_json("questions", &self.questions)?,
            welcome_screen: self
                .welcome_screen
                .as_ref()
                .map(|s| to_json("welcome_screen", s))
                .transpose()?,
            thank_you_screen: self
                .thank_you_screen
                .as_ref()
                .map(|s| to_json("thank_you_screen", s))
                .transpose()?,
            settings: to_json("settings", &self.settings)?,
            admin_results: self
                .admin_results
                .as_ref()
                .map(|r| to_json("admin_results", r))
                .transpose()?,
            id: self.id,
            public_id: self.public_id,
            title: self.title,
            description: self.description,
            author_name: self.author_name,
            admin_password_hash: self.admin_password_hash,
            status: self.status,
            is_editable: self.is_editable,
            first_response_at: self.first_response_at.map(Into::into),
            is_deleted: self.is_deleted,
            response_count: self.stats.response_count as i64,
            completion_rate: i32::from(self.stats.completion_rate),
            avg_completion_time: self.stats.avg_completion_time,
            last_response_at: self.stats.last_response_at.map(Into::into),
            view_count: self.stats.view_count as i64,
            created_at: self.created_at.into(),
            updated_at: self.updated_at.map(Into::into),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    pub(crate) fn choice_question(id: &str, kind: &str, choices: &[&str]) -> Question {
        serde_json::from_value(json!({
            "id": id,
            "title": format!("Question {id}"),
            "type": kind,
            "required": true,
            "choices": choices
                .iter()
                .map(|c| json!({ "id": c, "label": c.to_uppercase() }))
                .collect::<Vec<_>>(),
        }))
        .unwrap()
    }

    pub(crate) fn basic_survey() -> NewSurvey {
        NewSurvey {
            title: "Team retro".to_string(),
            author_name: "host".to_string(),
            questions: vec![
                choice_question("q1", "single_choice", &["c1", "c2"]),
                Question {
                    id: "q2".to_string(),
                    title: "Anything else?".to_string(),
                    description: None,
                    required: false,
                    kind: QuestionKind::LongText {
                        min_length: None,
                        max_length: None,
                    },
                    order: 0,
                    skip_logic: None,
                },
                Question {
                    id: "q3".to_string(),
                    title: "Rate the sprint".to_string(),
                    description: None,
                    required: true,
                    kind: QuestionKind::Rating { scale: 5 },
                    order: 0,
                    skip_logic: None,
                },
            ],
            ..NewSurvey::default()
        }
    }

    pub(crate) fn survey_with(input: NewSurvey, now: DateTime<Utc>) -> SurveyDocument {
        SurveyDocument::create(input, &IdGenerator::new(), String::new(), now).unwrap()
    }

    fn answer(question_id: &str, value: AnswerValue) -> Answer {
        Answer {
            question_id: question_id.to_string(),
            value,
        }
    }

    fn single(choice: &str) -> AnswerValue {
        AnswerValue::SingleChoice {
            choice_id: choice.to_string(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_answer_wire_shape() {
        let parsed: Answer = serde_json::from_value(json!({
            "question_id": "q1",
            "question_type": "multiple_choice",
            "choice_ids": ["c1", "c2"],
        }))
        .unwrap();
        assert_eq!(
            parsed.value,
            AnswerValue::MultipleChoice {
                choice_ids: vec!["c1".to_string(), "c2".to_string()]
            }
        );

        let rating = serde_json::to_value(answer("q3", AnswerValue::Rating { rating: 4 })).unwrap();
        assert_eq!(
            rating,
            json!({ "question_id": "q3", "question_type": "rating", "rating": 4 })
        );
    }

    #[test]
    fn test_create_starts_editable_draft() {
        let survey = survey_with(basic_survey(), t0());
        assert_eq!(survey.status, SurveyStatus::Draft);
        assert!(survey.is_editable);
        let orders: Vec<u32> = survey.questions.iter().map(|q| q.order).collect();
        assert_eq!(orders, [0, 1, 2]);
    }

    #[test]
    fn test_question_rules() {
        let mut bad_scale = basic_survey().questions;
        bad_scale[2].kind = QuestionKind::Rating { scale: 7 };
        assert!(validate_questions(&bad_scale).is_err());

        let mut duplicate = basic_survey().questions;
        duplicate[1].id = "q1".to_string();
        assert!(validate_questions(&duplicate).is_err());

        let lonely = vec![choice_question("q1", "single_choice", &["only"])];
        assert!(validate_questions(&lonely).is_err());

        let mut forward_ref = basic_survey().questions;
        forward_ref[0].skip_logic = Some(SkipCondition {
            question_id: "q3".to_string(),
            equals_choice_id: "c1".to_string(),
        });
        assert!(validate_questions(&forward_ref).is_err());

        assert!(validate_questions(&[]).is_err());
    }

    #[test]
    fn test_validate_answers_completion() {
        let questions = basic_survey().questions;

        let full = validate_answers(
            &questions,
            &[
                answer("q1", single("c1")),
                answer("q3", AnswerValue::Rating { rating: 5 }),
            ],
        )
        .unwrap();
        assert!(full.is_complete);

        let partial = validate_answers(&questions, &[answer("q1", single("c2"))]).unwrap();
        assert!(!partial.is_complete);
    }

    #[test]
    fn test_validate_answers_rejects_malformed() {
        let questions = basic_survey().questions;

        for bad in [
            vec![],
            vec![answer("nope", single("c1"))],
            vec![answer("q1", single("c9"))],
            vec![answer("q1", AnswerValue::Rating { rating: 3 })],
            vec![answer("q3", AnswerValue::Rating { rating: 6 })],
            vec![answer("q3", AnswerValue::Rating { rating: 0 })],
            vec![answer(
                "q2",
                AnswerValue::ShortText {
                    text: "wrong kind".to_string(),
                },
            )],
            vec![answer("q1", single("c1")), answer("q1", single("c2"))],
        ] {
            assert!(
                matches!(
                    validate_answers(&questions, &bad),
                    Err(AppError::InvalidAnswers(_))
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_skip_logic_hides_questions() {
        let mut questions = vec![
            choice_question("q1", "single_choice", &["yes", "no"]),
            choice_question("q2", "single_choice", &["a", "b"]),
        ];
        questions[1].skip_logic = Some(SkipCondition {
            question_id: "q1".to_string(),
            equals_choice_id: "yes".to_string(),
        });
        validate_questions(&questions).unwrap();

        let skipped = validate_answers(&questions, &[answer("q1", single("no"))]).unwrap();
        assert!(skipped.is_complete);

        let shown = validate_answers(&questions, &[answer("q1", single("yes"))]).unwrap();
        assert!(!shown.is_complete);

        let err =
            validate_answers(&questions, &[answer("q1", single("no")), answer("q2", single("a"))])
                .unwrap_err();
        assert!(matches!(err, AppError::InvalidAnswers(_)));
    }

    #[test]
    fn test_rushed_response_is_flagged() {
        let questions: Vec<Question> = (1..=5)
            .map(|i| choice_question(&format!("q{i}"), "single_choice", &["x", "y"]))
            .collect();
        let answers: Vec<Answer> = (1..=5)
            .map(|i| answer(&format!("q{i}"), single(if i % 2 == 0 { "x" } else { "y" })))
            .collect();

        let started = t0();
        let time = completion_seconds(started, started + Duration::seconds(1));
        assert_eq!(time, 1);

        let quality = score_quality(&questions, &answers, time);
        assert_eq!(quality.score, 70);
        assert_eq!(quality.flags, [QualityFlag::TooFast]);
    }

    #[test]
    fn test_straight_lining_is_flagged_once() {
        let questions: Vec<Question> = (1..=4)
            .map(|i| choice_question(&format!("q{i}"), "single_choice", &["yes", "no"]))
            .collect();
        let answers: Vec<Answer> = (1..=4)
            .map(|i| answer(&format!("q{i}"), single("yes")))
            .collect();

        let rushed = score_quality(&questions, &answers, 0);
        assert_eq!(rushed.score, 50);
        assert_eq!(
            rushed.flags,
            [QualityFlag::TooFast, QualityFlag::AllSameAnswers]
        );
        assert_eq!(score_quality(&questions, &answers, 0), rushed);

        let three = score_quality(&questions, &answers[..3], 600);
        assert_eq!(three.score, 100);
    }

    #[test]
    fn test_straight_lining_follows_choice_ids_not_order() {
        let questions: Vec<Question> = (1..=4)
            .map(|i| {
                let order: &[&str] = if i % 2 == 0 { &["no", "yes"] } else { &["yes", "no"] };
                choice_question(&format!("q{i}"), "single_choice", order)
            })
            .collect();
        let same: Vec<Answer> = (1..=4)
            .map(|i| answer(&format!("q{i}"), single("yes")))
            .collect();

        let quality = score_quality(&questions, &same, 600);
        assert_eq!(quality.score, 80);
        assert_eq!(quality.flags, [QualityFlag::AllSameAnswers]);

        let mixed: Vec<Answer> = (1..=4)
            .map(|i| answer(&format!("q{i}"), single(if i == 4 { "no" } else { "yes" })))
            .collect();
        let quality = score_quality(&questions, &mixed, 600);
        assert_eq!(quality.score, 100);
        assert!(quality.flags.is_empty());
    }

    #[test]
    fn test_completion_time_never_negative() {
        assert_eq!(completion_seconds(t0(), t0() - Duration::seconds(30)), 0);
        assert_eq!(completion_seconds(t0(), t0() + Duration::milliseconds(2500)), 3);
    }

    #[test]
    fn test_first_response_freezes_questions() {
        let mut survey = survey_with(basic_survey(), t0());
        survey.set_status(SurveyStatus::Open, t0());

        survey.record_response(
            &ResponseTally {
                count: 1,
                complete: 1,
                total_completion_time: 40,
            },
            t0(),
        );
        assert!(!survey.is_editable);
        assert_eq!(survey.first_response_at, Some(t0()));
        assert_eq!(survey.stats.response_count, 1);
        assert_eq!(survey.stats.completion_rate, 100);

        let later = t0() + Duration::minutes(5);
        survey.record_response(
            &ResponseTally {
                count: 2,
                complete: 1,
                total_completion_time: 100,
            },
            later,
        );
        assert_eq!(survey.first_response_at, Some(t0()));
        assert_eq!(survey.stats.completion_rate, 50);
        assert!((survey.stats.avg_completion_time - 50.0).abs() < f64::EPSILON);

        let err = survey.replace_questions(basic_survey().questions).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_reopen_clears_past_close_time() {
        let mut survey = survey_with(
            NewSurvey {
                settings: SurveySettings {
                    close_at: Some(t0()),
                    ..SurveySettings::default()
                },
                ..basic_survey()
            },
            t0(),
        );
        let later = t0() + Duration::days(1);
        survey.set_status(SurveyStatus::Open, later);
        assert!(survey.settings.close_at.is_none());
        assert_eq!(eligibility::survey_status(&survey, later), SurveyStatus::Open);
    }

    #[test]
    fn test_model_round_trip_preserves_document() {
        let survey = survey_with(basic_survey(), t0());
        let model = survey.clone().into_model().unwrap();
        assert_eq!(SurveyDocument::try_from(model).unwrap(), survey);
    }
}
