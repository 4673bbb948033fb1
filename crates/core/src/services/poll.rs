//! Poll service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::ActiveModelTrait;
use serde::Serialize;
use tally_common::{AppError, AppResult, Clock, IdGenerator, ParticipantHash};
use tally_db::{entities::poll, repositories::PollRepository};

use super::auth::{self, AdminAuthService, AdminToken, TargetKind};
use crate::ledger::{
    NewPoll, OpinionInput, OpinionView, PollAdminResults, PollDetail, PollDocument, PollResults,
    VoterInfo, projector,
};

/// Maximum poll title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// A freshly created poll and the token of its creator.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPoll {
    pub poll: PollDetail,
    pub admin_token: AdminToken,
}

/// Outcome of an accepted ballot.
#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
    pub poll_id: String,
    pub votes_cast: u32,
    /// Present when the voter may see results.
    pub results: Option<PollResults>,
}

/// Schedule change requested by an admin.
#[derive(Debug, Clone, Default)]
pub struct ScheduleChange {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub close_now: bool,
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    auth: AdminAuthService,
    clock: Arc<dyn Clock>,
    id_gen: IdGenerator,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub fn new(poll_repo: PollRepository, auth: AdminAuthService, clock: Arc<dyn Clock>) -> Self {
        Self {
            poll_repo,
            auth,
            clock,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a poll.
    pub async fn create(
        &self,
        input: NewPoll,
        admin_password: &str,
        author: ParticipantHash,
    ) -> AppResult<CreatedPoll> {
        let title_len = input.title.trim().chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "Title must be 1 to {MAX_TITLE_LEN} characters"
            )));
        }
        auth::validate_password(admin_password)?;
        let password_hash = auth::hash_password(admin_password)?;

        let now = self.clock.now();
        let viewer = author.clone();
        let mut poll = PollDocument::create(input, &self.id_gen, author, password_hash, now)?;
        poll.refresh_status(now);

        let model = self
            .poll_repo
            .create(poll::ActiveModel::from(poll.clone().into_model()?).reset_all())
            .await?;
        let poll = PollDocument::try_from(model)?;
        tracing::info!(poll_id = %poll.public_id, options = poll.options.len(), "Poll created");

        Ok(CreatedPoll {
            admin_token: self.auth.issue(TargetKind::Poll, &poll.public_id)?,
            poll: PollDetail::build(&poll, &viewer, now, true),
        })
    }

    /// Get a poll for display and count the view.
    ///
    /// Hidden polls are only visible to their admin.
    pub async fn view(
        &self,
        public_id: &str,
        viewer: &ParticipantHash,
        token: Option<&str>,
    ) -> AppResult<PollDetail> {
        let is_admin = self.auth.is_admin(token, TargetKind::Poll, public_id)?;
        let poll = PollDocument::try_from(self.poll_repo.get_by_public_id(public_id).await?)?;
        if poll.is_hidden && !is_admin {
            return Err(AppError::NotFound(format!("Poll not found: {public_id}")));
        }

        if let Err(e) = self.poll_repo.increment_view_count(&poll.id).await {
            tracing::warn!(error = %e, poll_id = %public_id, "Failed to count poll view");
        }

        Ok(PollDetail::build(&poll, viewer, self.clock.now(), is_admin))
    }

    /// Cast a ballot for one or more options.
    pub async fn cast_vote(
        &self,
        public_id: &str,
        option_ids: &[String],
        participant: &ParticipantHash,
        voter: VoterInfo,
    ) -> AppResult<VoteReceipt> {
        let result = self
            .mutate(public_id, |poll, now| {
                poll.cast_vote(option_ids, participant, &voter, now)
            })
            .await;

        match result {
            Ok((poll, ())) => {
                tracing::info!(
                    poll_id = %public_id,
                    participant = %participant,
                    options = option_ids.len(),
                    "Vote accepted"
                );
                Ok(VoteReceipt {
                    poll_id: poll.public_id.clone(),
                    votes_cast: poll.votes_cast_by(participant),
                    results: projector::project_poll(&poll, self.clock.now(), false),
                })
            }
            Err(e) => {
                tracing::info!(
                    poll_id = %public_id,
                    participant = %participant,
                    reason = e.error_code(),
                    "Vote rejected"
                );
                Err(e)
            }
        }
    }

    /// Post an opinion.
    pub async fn add_opinion(
        &self,
        public_id: &str,
        participant: &ParticipantHash,
        input: OpinionInput,
    ) -> AppResult<OpinionView> {
        let opinion_id = self.id_gen.generate();
        let (_, opinion) = self
            .mutate(public_id, |poll, now| {
                poll.add_opinion(opinion_id, participant, input, now)
            })
            .await?;

        tracing::info!(poll_id = %public_id, participant = %participant, "Opinion added");
        Ok(OpinionView {
            id: Some(opinion.id),
            author_name: opinion.author_name,
            content: opinion.content,
            selected_option_id: opinion.selected_option_id,
            created_at: Some(opinion.created_at),
        })
    }

    /// Results as the caller may see them. `None` while they are hidden.
    pub async fn results(&self, public_id: &str, token: Option<&str>) -> AppResult<Option<PollResults>> {
        let is_admin = self.auth.is_admin(token, TargetKind::Poll, public_id)?;
        let poll = PollDocument::try_from(self.poll_repo.get_by_public_id(public_id).await?)?;
        if poll.is_hidden && !is_admin {
            return Err(AppError::NotFound(format!("Poll not found: {public_id}")));
        }
        Ok(projector::project_poll(&poll, self.clock.now(), is_admin))
    }

    /// Exchange the admin password for a token.
    pub async fn login(&self, public_id: &str, password: &str) -> AppResult<AdminToken> {
        let poll = self.poll_repo.get_by_public_id(public_id).await?;
        self.auth
            .login(TargetKind::Poll, public_id, password, &poll.admin_password_hash)
    }

    /// Change the voting window or close the poll now.
    pub async fn reschedule(
        &self,
        public_id: &str,
        token: &str,
        change: ScheduleChange,
    ) -> AppResult<PollDetail> {
        self.auth.verify(token, TargetKind::Poll, public_id)?;
        let (poll, ()) = self
            .mutate(public_id, |poll, now| {
                poll.reschedule(change.start_at, change.end_at, change.close_now, now)
            })
            .await?;
        tracing::info!(poll_id = %public_id, start_at = %poll.start_at, end_at = %poll.end_at, "Poll rescheduled");
        Ok(self.admin_view(&poll))
    }

    /// Hide or unhide a poll.
    pub async fn set_hidden(&self, public_id: &str, token: &str, hidden: bool) -> AppResult<PollDetail> {
        self.auth.verify(token, TargetKind::Poll, public_id)?;
        let (poll, ()) = self
            .mutate(public_id, |poll, now| {
                poll.set_hidden(hidden, now);
                Ok(())
            })
            .await?;
        tracing::info!(poll_id = %public_id, hidden, "Poll visibility changed");
        Ok(self.admin_view(&poll))
    }

    /// Replace the displayed results with admin-entered ones.
    pub async fn set_admin_results(
        &self,
        public_id: &str,
        token: &str,
        results: PollAdminResults,
    ) -> AppResult<PollResults> {
        self.auth.verify(token, TargetKind::Poll, public_id)?;
        let (poll, ()) = self
            .mutate(public_id, |poll, _| {
                poll.admin_results = Some(results);
                Ok(())
            })
            .await?;
        tracing::info!(poll_id = %public_id, "Poll admin results set");
        self.forced_results(&poll)
    }

    /// Go back to computed results.
    pub async fn clear_admin_results(&self, public_id: &str, token: &str) -> AppResult<PollResults> {
        self.auth.verify(token, TargetKind::Poll, public_id)?;
        let (poll, ()) = self
            .mutate(public_id, |poll, _| {
                poll.admin_results = None;
                Ok(())
            })
            .await?;
        tracing::info!(poll_id = %public_id, "Poll admin results cleared");
        self.forced_results(&poll)
    }

    /// Soft-delete an opinion.
    pub async fn delete_opinion(&self, public_id: &str, token: &str, opinion_id: &str) -> AppResult<()> {
        self.auth.verify(token, TargetKind::Poll, public_id)?;
        self.mutate(public_id, |poll, _| poll.delete_opinion(opinion_id))
            .await?;
        tracing::info!(poll_id = %public_id, opinion_id, "Opinion deleted");
        Ok(())
    }

    /// Rebuild every cached counter from the vote lists.
    pub async fn recompute(&self, public_id: &str, token: &str) -> AppResult<PollDetail> {
        self.auth.verify(token, TargetKind::Poll, public_id)?;
        let (poll, ()) = self
            .mutate(public_id, |poll, _| {
                poll.stats.last_vote_at = None;
                poll.recompute();
                Ok(())
            })
            .await?;
        tracing::info!(poll_id = %public_id, total_votes = poll.stats.total_votes, "Poll stats recomputed");
        Ok(self.admin_view(&poll))
    }

    /// Soft-delete a poll. Cannot be undone.
    pub async fn delete(&self, public_id: &str, token: &str) -> AppResult<()> {
        self.auth.verify(token, TargetKind::Poll, public_id)?;
        self.mutate(public_id, |poll, now| {
            poll.mark_deleted(now);
            Ok(())
        })
        .await?;
        tracing::info!(poll_id = %public_id, "Poll deleted");
        Ok(())
    }

    fn admin_view(&self, poll: &PollDocument) -> PollDetail {
        PollDetail::build(poll, &poll.author_hash, self.clock.now(), true)
    }

    fn forced_results(&self, poll: &PollDocument) -> AppResult<PollResults> {
        projector::project_poll(poll, self.clock.now(), true)
            .ok_or_else(|| AppError::Internal("Forced results were hidden".to_string()))
    }

    /// Lock the poll row, apply `apply` and write the document back in one
    /// transaction. Nothing is written when `apply` fails.
    async fn mutate<T, F>(&self, public_id: &str, apply: F) -> AppResult<(PollDocument, T)>
    where
        F: FnOnce(&mut PollDocument, DateTime<Utc>) -> AppResult<T>,
    {
        let txn = self.poll_repo.begin().await?;
        let model = self.poll_repo.lock_by_public_id(&txn, public_id).await?;
        let mut poll = PollDocument::try_from(model)?;

        let now = self.clock.now();
        let out = apply(&mut poll, now)?;
        poll.refresh_status(now);
        poll.updated_at = Some(now);

        self.poll_repo.save(&txn, poll.clone().into_model()?).await?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok((poll, out))
    }
}
