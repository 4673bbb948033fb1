//! Vote ledger for polls.
//!
//! A poll owns its options, the votes cast on each option, one record per
//! participant and the opinions. The vote lists and participant records are
//! authoritative; counters and percentages are recomputed from them after
//! every mutation.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tally_common::{AppError, AppResult, IdGenerator, ParticipantHash};
use tally_db::entities::poll::{self, PollStatus};

use super::aggregate::PollAdminResults;
use super::{eligibility, from_json, to_json};

/// Labels used when a poll is created without options.
pub const DEFAULT_OPTIONS: [&str; 2] = ["Agree", "Disagree"];
/// Minimum number of options.
pub const MIN_OPTIONS: usize = 2;
/// Maximum number of options.
pub const MAX_OPTIONS: usize = 10;
/// Maximum option label length in characters.
pub const MAX_OPTION_LABEL_LEN: usize = 100;
/// Maximum opinion length in characters.
pub const MAX_OPINION_LEN: usize = 1000;
/// Display name stored for anonymous opinions.
pub const ANONYMOUS_NAME: &str = "Anonymous";

const DEFAULT_DURATION_DAYS: i64 = 7;

const fn default_true() -> bool {
    true
}

const fn default_max_votes() -> u32 {
    1
}

/// Per-poll voting rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default)]
    pub allow_multiple_choice: bool,
    #[serde(default = "default_true")]
    pub show_results_before_end: bool,
    #[serde(default)]
    pub allow_anonymous: bool,
    #[serde(default = "default_true")]
    pub allow_opinion: bool,
    /// Cap on the votes one participant may cast on this poll.
    #[serde(default = "default_max_votes")]
    pub max_votes_per_ip: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            allow_multiple_choice: false,
            show_results_before_end: true,
            allow_anonymous: false,
            allow_opinion: true,
            max_votes_per_ip: default_max_votes(),
        }
    }
}

/// A single vote for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastVote {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    pub participant_hash: ParticipantHash,
    #[serde(default)]
    pub is_anonymous: bool,
    pub voted_at: DateTime<Utc>,
}

/// A votable option and the votes cast on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    pub id: String,
    pub label: String,
    pub order: u32,
    #[serde(default)]
    pub votes: Vec<CastVote>,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub percentage: u8,
}

/// How many votes a participant has cast on a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub participant_hash: ParticipantHash,
    pub vote_count: u32,
    pub last_vote_at: DateTime<Utc>,
}

/// Free-text comment on a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    pub id: String,
    pub author_name: String,
    pub author_hash: ParticipantHash,
    #[serde(default)]
    pub selected_option_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Cached counters. Always re-derivable from the vote lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub total_votes: u64,
    pub unique_voters: u64,
    pub opinion_count: u64,
    pub view_count: u64,
    pub last_vote_at: Option<DateTime<Utc>>,
}

/// Who is casting a vote.
#[derive(Debug, Clone, Default)]
pub struct VoterInfo {
    pub user_id: Option<String>,
    pub nickname: Option<String>,
    pub is_anonymous: bool,
}

/// Opinion submitted by a participant.
#[derive(Debug, Clone)]
pub struct OpinionInput {
    pub author_name: String,
    pub content: String,
    pub selected_option_id: Option<String>,
    pub is_anonymous: bool,
}

/// Input for creating a poll.
#[derive(Debug, Clone, Default)]
pub struct NewPoll {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    /// Option labels; empty means the agree/disagree pair.
    pub options: Vec<String>,
    pub allow_multiple_choice: bool,
    pub show_results_before_end: bool,
    pub allow_anonymous: bool,
    pub allow_opinion: bool,
    /// Defaults to 1, or to the option count for multiple-choice polls.
    pub max_votes_per_ip: Option<u32>,
    /// Defaults to now.
    pub start_at: Option<DateTime<Utc>>,
    /// Defaults to a week after the start.
    pub end_at: Option<DateTime<Utc>>,
}

/// A poll and everything it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct PollDocument {
    pub id: String,
    pub public_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    pub author_hash: ParticipantHash,
    pub admin_password_hash: String,
    pub settings: PollSettings,
    pub options: Vec<VoteOption>,
    pub participants: Vec<ParticipantRecord>,
    pub opinions: Vec<Opinion>,
    pub admin_results: Option<PollAdminResults>,
    pub stats: PollStats,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Stored status; only authoritative while hidden or deleted.
    pub status: PollStatus,
    pub is_hidden: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PollDocument {
    /// Build a new poll from validated input.
    pub fn create(
        input: NewPoll,
        id_gen: &IdGenerator,
        author_hash: ParticipantHash,
        admin_password_hash: String,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let labels: Vec<String> = if input.options.is_empty() {
            DEFAULT_OPTIONS.iter().map(ToString::to_string).collect()
        } else {
            input.options.iter().map(|l| l.trim().to_string()).collect()
        };

        if labels.len() < MIN_OPTIONS || labels.len() > MAX_OPTIONS {
            return Err(AppError::Validation(format!(
                "A poll needs between {MIN_OPTIONS} and {MAX_OPTIONS} options"
            )));
        }
        for label in &labels {
            let len = label.chars().count();
            if len == 0 || len > MAX_OPTION_LABEL_LEN {
                return Err(AppError::Validation(format!(
                    "Option labels must be 1 to {MAX_OPTION_LABEL_LEN} characters"
                )));
            }
        }

        let start_at = input.start_at.unwrap_or(now);
        let end_at = input
            .end_at
            .unwrap_or_else(|| start_at + Duration::days(DEFAULT_DURATION_DAYS));
        if end_at < start_at {
            return Err(AppError::Validation(
                "end_at must not be before start_at".to_string(),
            ));
        }

        let max_votes_per_ip = match input.max_votes_per_ip {
            Some(0) => {
                return Err(AppError::Validation(
                    "max_votes_per_ip must be at least 1".to_string(),
                ));
            }
            Some(n) => n,
            None if input.allow_multiple_choice => labels.len() as u32,
            None => default_max_votes(),
        };

        let options = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| VoteOption {
                id: id_gen.generate(),
                label,
                order: i as u32,
                votes: Vec::new(),
                vote_count: 0,
                percentage: 0,
            })
            .collect();

        Ok(Self {
            id: id_gen.generate(),
            public_id: id_gen.generate_public_id(),
            title: input.title.trim().to_string(),
            description: input.description,
            category: input.category,
            tags: input.tags,
            author_name: input.author_name,
            author_hash,
            admin_password_hash,
            settings: PollSettings {
                allow_multiple_choice: input.allow_multiple_choice,
                show_results_before_end: input.show_results_before_end,
                allow_anonymous: input.allow_anonymous,
                allow_opinion: input.allow_opinion,
                max_votes_per_ip,
            },
            options,
            participants: Vec::new(),
            opinions: Vec::new(),
            admin_results: None,
            stats: PollStats::default(),
            start_at,
            end_at,
            status: PollStatus::Scheduled,
            is_hidden: false,
            is_deleted: false,
            created_at: now,
            updated_at: None,
        })
    }

    /// Votes already cast by a participant.
    #[must_use]
    pub fn votes_cast_by(&self, participant: &ParticipantHash) -> u32 {
        self.participants
            .iter()
            .find(|p| &p.participant_hash == participant)
            .map_or(0, |p| p.vote_count)
    }

    /// Find an option by id.
    #[must_use]
    pub fn option(&self, option_id: &str) -> Option<&VoteOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Record one ballot.
    ///
    /// Every check runs before the first mutation, so a rejected ballot
    /// leaves the document untouched.
    pub fn cast_vote(
        &mut self,
        option_ids: &[String],
        participant: &ParticipantHash,
        voter: &VoterInfo,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        eligibility::check_poll_vote(self, participant, now)?;

        let allowed = if self.settings.allow_multiple_choice {
            self.options.len()
        } else {
            1
        };
        if option_ids.is_empty() || option_ids.len() > allowed {
            return Err(AppError::InvalidChoiceCount {
                given: option_ids.len(),
                allowed,
            });
        }

        let remaining = self
            .settings
            .max_votes_per_ip
            .saturating_sub(self.votes_cast_by(participant)) as usize;
        if option_ids.len() > remaining {
            return Err(AppError::InvalidChoiceCount {
                given: option_ids.len(),
                allowed: remaining,
            });
        }

        let mut seen = HashSet::new();
        for option_id in option_ids {
            if !seen.insert(option_id.as_str()) {
                return Err(AppError::InvalidOption(format!(
                    "Option selected twice: {option_id}"
                )));
            }
            if self.option(option_id).is_none() {
                return Err(AppError::InvalidOption(format!(
                    "Unknown option: {option_id}"
                )));
            }
        }

        if voter.is_anonymous && !self.settings.allow_anonymous {
            return Err(AppError::BadRequest(
                "Anonymous voting is not allowed on this poll".to_string(),
            ));
        }

        for option in &mut self.options {
            if seen.contains(option.id.as_str()) {
                option.votes.push(CastVote {
                    user_id: voter.user_id.clone(),
                    nickname: voter.nickname.clone(),
                    participant_hash: participant.clone(),
                    is_anonymous: voter.is_anonymous,
                    voted_at: now,
                });
            }
        }

        let added = option_ids.len() as u32;
        match self
            .participants
            .iter_mut()
            .find(|p| &p.participant_hash == participant)
        {
            Some(record) => {
                record.vote_count += added;
                record.last_vote_at = now;
            }
            None => self.participants.push(ParticipantRecord {
                participant_hash: participant.clone(),
                vote_count: added,
                last_vote_at: now,
            }),
        }

        self.stats.last_vote_at = Some(now);
        self.recompute();
        Ok(())
    }

    /// Add an opinion and return it.
    pub fn add_opinion(
        &mut self,
        id: String,
        participant: &ParticipantHash,
        input: OpinionInput,
        now: DateTime<Utc>,
    ) -> AppResult<Opinion> {
        if !self.settings.allow_opinion {
            return Err(AppError::NotEligible(
                "Opinions are disabled for this poll".to_string(),
            ));
        }
        if self.is_hidden || eligibility::poll_status(self, now) != PollStatus::Active {
            return Err(AppError::NotEligible("Poll is not active".to_string()));
        }

        let content = input.content.trim().to_string();
        let len = content.chars().count();
        if len == 0 || len > MAX_OPINION_LEN {
            return Err(AppError::Validation(format!(
                "Opinion must be 1 to {MAX_OPINION_LEN} characters"
            )));
        }
        if let Some(option_id) = &input.selected_option_id
            && self.option(option_id).is_none()
        {
            return Err(AppError::InvalidOption(format!(
                "Unknown option: {option_id}"
            )));
        }
        if input.is_anonymous && !self.settings.allow_anonymous {
            return Err(AppError::BadRequest(
                "Anonymous opinions are not allowed on this poll".to_string(),
            ));
        }

        let author_name = if input.is_anonymous {
            ANONYMOUS_NAME.to_string()
        } else {
            input.author_name.trim().to_string()
        };

        let opinion = Opinion {
            id,
            author_name,
            author_hash: participant.clone(),
            selected_option_id: input.selected_option_id,
            content,
            is_anonymous: input.is_anonymous,
            is_deleted: false,
            created_at: now,
        };
        self.opinions.push(opinion.clone());
        self.recompute();
        Ok(opinion)
    }

    /// Soft-delete an opinion.
    pub fn delete_opinion(&mut self, opinion_id: &str) -> AppResult<()> {
        let opinion = self
            .opinions
            .iter_mut()
            .find(|o| o.id == opinion_id && !o.is_deleted)
            .ok_or_else(|| AppError::NotFound(format!("Opinion not found: {opinion_id}")))?;
        opinion.is_deleted = true;
        self.recompute();
        Ok(())
    }

    /// Re-derive every cached counter from the vote lists.
    ///
    /// Idempotent; also the repair path after an interrupted write.
    pub fn recompute(&mut self) {
        let mut total = 0;
        for option in &mut self.options {
            option.vote_count = option.votes.len() as u64;
            total += option.vote_count;
        }
        for option in &mut self.options {
            option.percentage = percentage(option.vote_count, total);
        }

        self.stats.total_votes = total;
        self.stats.unique_voters = self.participants.len() as u64;
        self.stats.opinion_count = self.opinions.iter().filter(|o| !o.is_deleted).count() as u64;
        if self.stats.last_vote_at.is_none() {
            self.stats.last_vote_at = self
                .options
                .iter()
                .flat_map(|o| o.votes.iter().map(|v| v.voted_at))
                .max();
        }
    }

    /// Change the voting window. Re-opening an ended poll is allowed.
    pub fn reschedule(
        &mut self,
        start_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
        close_now: bool,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut start = start_at.unwrap_or(self.start_at);
        let mut end = end_at.unwrap_or(self.end_at);
        if close_now {
            end = now;
            start = start.min(now);
        }
        if end < start {
            return Err(AppError::Validation(
                "end_at must not be before start_at".to_string(),
            ));
        }
        self.start_at = start;
        self.end_at = end;
        self.refresh_status(now);
        Ok(())
    }

    /// Hide or unhide. Hiding freezes the status it had at that moment.
    pub fn set_hidden(&mut self, hidden: bool, now: DateTime<Utc>) {
        if hidden == self.is_hidden {
            return;
        }
        if hidden {
            self.status = eligibility::poll_status(self, now);
            self.is_hidden = true;
        } else {
            self.is_hidden = false;
            self.refresh_status(now);
        }
    }

    /// Soft-delete. Terminal.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.status = eligibility::poll_status(self, now);
        self.is_deleted = true;
    }

    /// Store the derived status unless it is frozen.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) {
        self.status = eligibility::poll_status(self, now);
    }
}

/// Independently rounded share of `total`, never above 100.
#[must_use]
pub fn percentage(count: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round().clamp(0.0, 100.0) as u8
}

impl TryFrom<poll::Model> for PollDocument {
    type Error = AppError;

    fn try_from(model: poll::Model) -> AppResult<Self> {
        Ok(Self {
            id: model.id,
            public_id: model.public_id,
            title: model.title,
            description: model.description,
            category: model.category,
            tags: from_json("tags", model.tags)?,
            author_name: model.author_name,
            author_hash: ParticipantHash::from_stored(model.author_hash),
            admin_password_hash: model.admin_password_hash,
            settings: from_json("settings", model.settings)?,
            options: from_json("options", model.options)?,
            participants: from_json("participants", model.participants)?,
            opinions: from_json("opinions", model.opinions)?,
            admin_results: model
                .admin_results
                .map(|v| from_json("admin_results", v))
                .transpose()?,
            stats: PollStats {
                total_votes: model.total_votes.max(0) as u64,
                unique_voters: model.unique_voters.max(0) as u64,
                opinion_count: model.opinion_count.max(0) as u64,
                view_count: model.view_count.max(0) as u64,
                last_vote_at: model.last_vote_at.map(|t| t.with_timezone(&Utc)),
            },
            start_at: model.start_at.with_timezone(&Utc),
            end_at: model.end_at.with_timezone(&Utc),
            status: model.status,
            is_hidden: model.is_hidden,
            is_deleted: model.is_deleted,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.map(|t| t.with_timezone(&Utc)),
        })
    }
}

impl PollDocument {
    /// Encode into a storage row.
    pub fn into_model(self) -> AppResult<poll::Model> {
        Ok(poll::Model {
            tags: to_json("tags", &self.tags)?,
            settings: to_json("settings", &self.settings)?,
            options: to_json("options", &self.options)?,
            participants: to_json("participants", &self.participants)?,
            opinions: to_json("opinions", &self.opinions)?,
            admin_results: self
                .admin_results
                .as_ref()
                .map(|r| to_json("admin_results", r))
                .transpose()?,
            id: self.id,
            public_id: self.public_id,
            title: self.title,
            description: self.description,
            category: self.category,
            author_name: self.author_name,
            author_hash: self.author_hash.into_inner(),
            admin_password_hash: self.admin_password_hash,
            total_votes: self.stats.total_votes as i64,
            unique_voters: self.stats.unique_voters as i64,
            opinion_count: self.stats.opinion_count as i64,
            view_count: self.stats.view_count as i64,
            last_vote_at: self.stats.last_vote_at.map(Into::into),
            start_at: self.start_at.into(),
            end_at: self.end_at.into(),
            status: self.status,
            is_hidden: self.is_hidden,
            is_deleted: self.is_deleted,
            created_at: self.created_at.into(),
            updated_at: self.updated_at.map(Into::into),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn hash(s: &str) -> ParticipantHash {
        ParticipantHash::from_stored(s)
    }

    fn open_poll(options: &[&str], settings: NewPoll) -> PollDocument {
        let input = NewPoll {
            title: "Should we ship on Fridays?".to_string(),
            author_name: "host".to_string(),
            options: options.iter().map(ToString::to_string).collect(),
            start_at: Some(now() - Duration::hours(1)),
            end_at: Some(now() + Duration::hours(1)),
            ..settings
        };
        PollDocument::create(
            input,
            &IdGenerator::new(),
            hash("author"),
            "hash".to_string(),
            now(),
        )
        .unwrap()
    }

    fn option_id(poll: &PollDocument, label: &str) -> String {
        poll.options
            .iter()
            .find(|o| o.label == label)
            .unwrap()
            .id
            .clone()
    }

    fn cast_entries(poll: &PollDocument) -> u64 {
        poll.options.iter().map(|o| o.votes.len() as u64).sum()
    }

    fn assert_consistent(poll: &PollDocument) {
        let sum: u64 = poll.options.iter().map(|o| o.vote_count).sum();
        assert_eq!(sum, cast_entries(poll));
        assert_eq!(poll.stats.total_votes, sum);
        for option in &poll.options {
            assert!(option.percentage <= 100);
            assert_eq!(option.percentage, percentage(option.vote_count, sum));
        }
    }

    #[test]
    fn test_default_options_are_agree_disagree() {
        let poll = open_poll(&[], NewPoll::default());
        let labels: Vec<_> = poll.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, ["Agree", "Disagree"]);
        assert_eq!(poll.status, PollStatus::Scheduled);
        assert_eq!(poll.settings.max_votes_per_ip, 1);
        assert_eq!(poll.public_id.len(), 32);
    }

    #[test]
    fn test_create_rejects_bad_windows_and_counts() {
        let one = NewPoll {
            options: vec!["only".to_string()],
            ..NewPoll::default()
        };
        assert!(PollDocument::create(one, &IdGenerator::new(), hash("a"), String::new(), now()).is_err());

        let backwards = NewPoll {
            start_at: Some(now()),
            end_at: Some(now() - Duration::seconds(1)),
            ..NewPoll::default()
        };
        assert!(
            PollDocument::create(backwards, &IdGenerator::new(), hash("a"), String::new(), now())
                .is_err()
        );
    }

    #[test]
    fn test_single_vote_then_repeat_is_rejected() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let a = option_id(&poll, "A");
        let b = option_id(&poll, "B");
        let voter = hash("p1");

        poll.cast_vote(&[a.clone()], &voter, &VoterInfo::default(), now())
            .unwrap();
        assert_eq!(poll.option(&a).unwrap().vote_count, 1);
        assert_eq!(poll.option(&a).unwrap().percentage, 100);
        assert_eq!(poll.option(&b).unwrap().percentage, 0);

        let before = poll.clone();
        let err = poll
            .cast_vote(&[b], &voter, &VoterInfo::default(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyVoted));
        assert_eq!(poll, before);
    }

    #[test]
    fn test_multiple_options_rejected_on_single_choice_poll() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let ids = vec![option_id(&poll, "A"), option_id(&poll, "B")];

        let err = poll
            .cast_vote(&ids, &hash("p1"), &VoterInfo::default(), now())
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidChoiceCount {
                given: 2,
                allowed: 1
            }
        ));
        assert_eq!(cast_entries(&poll), 0);
        assert!(poll.participants.is_empty());
    }

    #[test]
    fn test_unknown_and_duplicate_options() {
        let mut poll = open_poll(
            &["A", "B", "C"],
            NewPoll {
                allow_multiple_choice: true,
                ..NewPoll::default()
            },
        );
        let a = option_id(&poll, "A");

        let err = poll
            .cast_vote(&["nope".to_string()], &hash("p1"), &VoterInfo::default(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOption(_)));

        let err = poll
            .cast_vote(&[a.clone(), a], &hash("p1"), &VoterInfo::default(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOption(_)));

        let err = poll
            .cast_vote(&[], &hash("p1"), &VoterInfo::default(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidChoiceCount { given: 0, .. }));
        assert_eq!(cast_entries(&poll), 0);
    }

    #[test]
    fn test_cap_counts_cast_entries() {
        let mut poll = open_poll(
            &["A", "B", "C"],
            NewPoll {
                allow_multiple_choice: true,
                max_votes_per_ip: Some(2),
                ..NewPoll::default()
            },
        );
        let ids: Vec<String> = poll.options.iter().map(|o| o.id.clone()).collect();
        let voter = hash("p1");

        let err = poll
            .cast_vote(&ids, &voter, &VoterInfo::default(), now())
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidChoiceCount {
                given: 3,
                allowed: 2
            }
        ));

        poll.cast_vote(&ids[..2], &voter, &VoterInfo::default(), now())
            .unwrap();
        assert_eq!(poll.votes_cast_by(&voter), 2);

        let err = poll
            .cast_vote(&ids[2..], &voter, &VoterInfo::default(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyVoted));

        let attributable = poll
            .options
            .iter()
            .flat_map(|o| &o.votes)
            .filter(|v| v.participant_hash == voter)
            .count();
        assert!(attributable <= poll.settings.max_votes_per_ip as usize);
    }

    #[test]
    fn test_counters_stay_consistent_across_many_voters() {
        let mut poll = open_poll(&["A", "B", "C"], NewPoll::default());
        let ids: Vec<String> = poll.options.iter().map(|o| o.id.clone()).collect();

        for (i, pick) in [0, 1, 2, 0, 0, 1].iter().enumerate() {
            poll.cast_vote(
                &[ids[*pick].clone()],
                &hash(&format!("p{i}")),
                &VoterInfo::default(),
                now(),
            )
            .unwrap();
            assert_consistent(&poll);
        }

        assert_eq!(poll.stats.total_votes, 6);
        assert_eq!(poll.stats.unique_voters, 6);
        let shares: Vec<u8> = poll.options.iter().map(|o| o.percentage).collect();
        assert_eq!(shares, [50, 33, 17]);
    }

    #[test]
    fn test_independent_rounding_can_miss_100() {
        let mut poll = open_poll(&["A", "B", "C"], NewPoll::default());
        let ids: Vec<String> = poll.options.iter().map(|o| o.id.clone()).collect();
        for (i, id) in ids.iter().enumerate() {
            poll.cast_vote(&[id.clone()], &hash(&format!("p{i}")), &VoterInfo::default(), now())
                .unwrap();
        }
        let sum: u32 = poll.options.iter().map(|o| u32::from(o.percentage)).sum();
        assert_eq!(sum, 99);
    }

    #[test]
    fn test_recompute_repairs_stale_counters() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let a = option_id(&poll, "A");
        poll.cast_vote(&[a], &hash("p1"), &VoterInfo::default(), now())
            .unwrap();

        poll.options[0].vote_count = 99;
        poll.options[0].percentage = 7;
        poll.stats.total_votes = 0;

        poll.recompute();
        assert_consistent(&poll);
        let once = poll.clone();
        poll.recompute();
        assert_eq!(poll, once);
    }

    #[test]
    fn test_closed_poll_rejects_votes() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let a = option_id(&poll, "A");
        let later = now() + Duration::hours(2);

        let err = poll
            .cast_vote(&[a], &hash("p1"), &VoterInfo::default(), later)
            .unwrap_err();
        assert!(matches!(err, AppError::NotEligible(_)));
    }

    #[test]
    fn test_anonymous_vote_requires_setting() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let a = option_id(&poll, "A");
        let voter = VoterInfo {
            is_anonymous: true,
            ..VoterInfo::default()
        };
        let err = poll.cast_vote(&[a], &hash("p1"), &voter, now()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_opinions() {
        let mut poll = open_poll(
            &["A", "B"],
            NewPoll {
                allow_opinion: true,
                allow_anonymous: true,
                ..NewPoll::default()
            },
        );
        let a = option_id(&poll, "A");

        let opinion = poll
            .add_opinion(
                "op1".to_string(),
                &hash("p1"),
                OpinionInput {
                    author_name: "kim".to_string(),
                    content: "  Strongly agree  ".to_string(),
                    selected_option_id: Some(a),
                    is_anonymous: true,
                },
                now(),
            )
            .unwrap();
        assert_eq!(opinion.content, "Strongly agree");
        assert_eq!(opinion.author_name, ANONYMOUS_NAME);
        assert_eq!(poll.stats.opinion_count, 1);

        let err = poll
            .add_opinion(
                "op2".to_string(),
                &hash("p2"),
                OpinionInput {
                    author_name: "lee".to_string(),
                    content: "x".repeat(MAX_OPINION_LEN + 1),
                    selected_option_id: None,
                    is_anonymous: false,
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        poll.delete_opinion("op1").unwrap();
        assert_eq!(poll.stats.opinion_count, 0);
        assert!(matches!(
            poll.delete_opinion("op1"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_opinions_disabled() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let err = poll
            .add_opinion(
                "op1".to_string(),
                &hash("p1"),
                OpinionInput {
                    author_name: "kim".to_string(),
                    content: "hi".to_string(),
                    selected_option_id: None,
                    is_anonymous: false,
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::NotEligible(_)));
    }

    #[test]
    fn test_hide_freezes_status() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        poll.set_hidden(true, now());
        assert_eq!(poll.status, PollStatus::Active);

        let later = now() + Duration::hours(3);
        assert_eq!(eligibility::poll_status(&poll, later), PollStatus::Active);

        poll.set_hidden(false, later);
        assert_eq!(poll.status, PollStatus::Ended);
    }

    #[test]
    fn test_reschedule_reopens_and_closes() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let later = now() + Duration::hours(3);
        assert_eq!(eligibility::poll_status(&poll, later), PollStatus::Ended);

        poll.reschedule(None, Some(later + Duration::hours(1)), false, later)
            .unwrap();
        assert_eq!(poll.status, PollStatus::Active);

        poll.reschedule(None, None, true, later).unwrap();
        assert_eq!(poll.end_at, later);
        assert!(poll.reschedule(Some(later + Duration::days(1)), None, false, later).is_err());
    }

    #[test]
    fn test_model_round_trip_preserves_document() {
        let mut poll = open_poll(&["A", "B"], NewPoll::default());
        let a = option_id(&poll, "A");
        poll.cast_vote(&[a], &hash("p1"), &VoterInfo::default(), now())
            .unwrap();

        let model = poll.clone().into_model().unwrap();
        assert_eq!(model.total_votes, 1);
        assert_eq!(PollDocument::try_from(model).unwrap(), poll);
    }
}
