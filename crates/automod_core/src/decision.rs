//! Revert decision engine.
//!
//! Compares the revert probability with the policy threshold and either
//! saves a revert through the host or records that the edit passed. Exactly
//! one terminal tag is written for each revision that reaches a verdict;
//! revisions that cannot be reverted (no prior revision, merge conflict,
//! edit conflict) get `NotActioned` and no tag.

use automod_protocol::defaults::{TAG_PASSED, TAG_REVERTED};
use automod_protocol::{
    Decision, NotActionedReason, Policy, RevisionContext, Score, ScoreParseError, TagSet,
    UserIdentity, Verdict,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::host::{
    HostError, PageStore, RevertRequest, RevisionRecord, SaveError, TagStore, UndoError,
};

#[derive(Debug, Error)]
pub enum DecisionError {
    /// The score has no usable revert probability.
    #[error("Malformed score for revision {rev_id}: {source}")]
    MalformedScore {
        rev_id: u64,
        #[source]
        source: ScoreParseError,
    },

    #[error("Host lookup failed: {0}")]
    Host(#[from] HostError),

    /// Saving the revert failed for a reason other than an edit conflict.
    #[error("Saving revert of revision {rev_id} failed: {source}")]
    Save {
        rev_id: u64,
        #[source]
        source: HostError,
    },
}

impl DecisionError {
    pub fn is_transient(&self) -> bool {
        match self {
            DecisionError::MalformedScore { .. } => false,
            DecisionError::Host(e) | DecisionError::Save { source: e, .. } => e.is_transient(),
        }
    }
}

pub struct DecisionEngine {
    actor: UserIdentity,
    pages: Arc<dyn PageStore>,
    tags: Arc<dyn TagStore>,
}

impl DecisionEngine {
    pub fn new(actor: UserIdentity, pages: Arc<dyn PageStore>, tags: Arc<dyn TagStore>) -> Self {
        Self { actor, pages, tags }
    }

    pub async fn maybe_revert(
        &self,
        ctx: &RevisionContext,
        score: &Score,
        policy: &Policy,
    ) -> Result<Decision, DecisionError> {
        let probability = score
            .revert_probability()
            .map_err(|source| DecisionError::MalformedScore {
                rev_id: ctx.rev_id,
                source,
            })?;

        let (verdict, tag) = if probability > policy.threshold {
            match self.revert(ctx, probability, policy).await? {
                Ok(verdict) => (verdict, TAG_REVERTED),
                Err(reason) => {
                    warn!(
                        rev_id = ctx.rev_id,
                        probability,
                        %reason,
                        "revert not actioned"
                    );
                    return Ok(Decision {
                        rev_id: ctx.rev_id,
                        probability,
                        verdict: Verdict::NotActioned { reason },
                        tags: TagSet::new(),
                    });
                }
            }
        } else {
            (Verdict::Passed, TAG_PASSED)
        };

        let tags = TagSet::single(tag);
        self.tags.add_tags(ctx.rev_id, &tags).await?;

        info!(
            rev_id = ctx.rev_id,
            probability,
            threshold = policy.threshold,
            tag,
            "revision evaluated"
        );

        Ok(Decision {
            rev_id: ctx.rev_id,
            probability,
            verdict,
            tags,
        })
    }

    /// Restore the revision before `ctx.rev_id`.
    ///
    /// Inner `Err` is a revert that could not happen; outer `Err` is a host
    /// failure the job runner should see.
    async fn revert(
        &self,
        ctx: &RevisionContext,
        probability: f64,
        policy: &Policy,
    ) -> Result<Result<Verdict, NotActionedReason>, DecisionError> {
        let Some(candidate) = self.pages.revision(ctx.rev_id).await? else {
            return Ok(Err(NotActionedReason::ContentUnavailable));
        };
        let Some(target) = self.pages.previous_revision(&candidate).await? else {
            return Ok(Err(NotActionedReason::NoPriorRevision));
        };
        let Some(current) = self.pages.current_revision(ctx.page_id).await? else {
            return Ok(Err(NotActionedReason::ContentUnavailable));
        };
        if [&target, &candidate, &current]
            .iter()
            .any(|r| r.content.is_none())
        {
            return Ok(Err(NotActionedReason::ContentUnavailable));
        }

        let content = match self.pages.undo_content(&target, &candidate, &current).await {
            Ok(content) => content,
            Err(UndoError::Conflict { .. }) => return Ok(Err(NotActionedReason::UndoConflict)),
            Err(UndoError::Host(e)) => return Err(e.into()),
        };

        let request = RevertRequest {
            page_id: ctx.page_id,
            content,
            base_rev_id: current.id,
            reverted_rev_id: candidate.id,
            restored_rev_id: target.id,
            reverted_user: ctx.user.clone(),
            summary: revert_summary(&ctx.user, &target, probability),
            actor: self.actor.clone(),
            minor: policy.minor_edit,
            bot: policy.bot_edit,
        };

        match self.pages.save_revert(request).await {
            Ok(revert_rev_id) => {
                info!(
                    rev_id = ctx.rev_id,
                    revert_rev_id,
                    restored_rev_id = target.id,
                    "reverted revision"
                );
                Ok(Ok(Verdict::Reverted {
                    revert_rev_id,
                    restored_rev_id: target.id,
                }))
            }
            Err(SaveError::EditConflict { .. }) => Ok(Err(NotActionedReason::EditConflict)),
            Err(SaveError::Host(source)) => Err(DecisionError::Save {
                rev_id: ctx.rev_id,
                source,
            }),
        }
    }
}

pub fn revert_summary(user: &UserIdentity, target: &RevisionRecord, probability: f64) -> String {
    format!(
        "AutoModerator reverted edit by [[Special:Contributions/{user}|{user}]] to last revision by {previous} (probability: {probability:.3})",
        user = user.name,
        previous = target.user.name,
        probability = probability,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_summary_embeds_probability() {
        let target = RevisionRecord {
            id: 1,
            page_id: 1,
            page_title: "Example".into(),
            parent_id: None,
            user: UserIdentity::new(2, "Previous"),
            timestamp: Utc::now(),
            content: Some("text".into()),
        };
        let summary = revert_summary(&UserIdentity::new(3, "Vandal"), &target, 0.806738942861557);
        assert_eq!(
            summary,
            "AutoModerator reverted edit by [[Special:Contributions/Vandal|Vandal]] to last revision by Previous (probability: 0.807)"
        );
    }

    #[test]
    fn test_error_classification() {
        let malformed = DecisionError::MalformedScore {
            rev_id: 1,
            source: ScoreParseError::Malformed("x".into()),
        };
        assert!(!malformed.is_transient());
        assert!(DecisionError::Host(HostError::Unavailable("down".into())).is_transient());
        assert!(!DecisionError::Host(HostError::NotFound("rev".into())).is_transient());
        assert!(DecisionError::Save {
            rev_id: 1,
            source: HostError::Unavailable("down".into())
        }
        .is_transient());
    }
}
