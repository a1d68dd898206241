//! Runs one job end to end: redelivery guard, pre-check, score, decision,
//! notification. Everything happens in sequence inside the caller's task.

use automod_protocol::defaults::{TAG_PASSED, TAG_REVERTED};
use automod_protocol::{
    AutoModeratorJob, Decision, Policy, RevisionContext, RevisionId, Score, ScoreParseError,
    TagSet, UserIdentity,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::decision::{DecisionEngine, DecisionError};
use crate::hook::EditHook;
use crate::host::{Collaborators, HostError, RevertHistory, TagStore};
use crate::notifier::{NotifyOutcome, TalkPageNotifier};
use crate::precheck::{Eligibility, PreCheck, SkipReason};
use crate::score_client::{ScoreError, ScoreRequest, ScoreSource};

/// Identity and locale of the wiki the service runs for.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub wiki_id: String,
    pub lang: String,
    pub actor: UserIdentity,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    /// Score shipped in the job is unreadable, or is for another revision.
    #[error("Unusable score for revision {rev_id}: {source}")]
    UnusableScore {
        rev_id: RevisionId,
        #[source]
        source: ScoreParseError,
    },
}

impl ServiceError {
    /// Whether redelivering the job may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Host(e) => e.is_transient(),
            ServiceError::Score(e) => e.allow_retries(),
            ServiceError::Decision(e) => e.is_transient(),
            ServiceError::UnusableScore { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobReport {
    /// A terminal tag was already present, or the actor had already saved a
    /// revert of this revision and only its tag was missing.
    AlreadyEvaluated { rev_id: RevisionId, tags: TagSet },
    Skipped { rev_id: RevisionId, reason: SkipReason },
    Decided {
        decision: Decision,
        notification: Option<NotifyOutcome>,
    },
}

impl JobReport {
    pub fn rev_id(&self) -> RevisionId {
        match self {
            JobReport::AlreadyEvaluated { rev_id, .. } | JobReport::Skipped { rev_id, .. } => {
                *rev_id
            }
            JobReport::Decided { decision, .. } => decision.rev_id,
        }
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            JobReport::Decided { decision, .. } => Some(decision),
            _ => None,
        }
    }
}

pub struct RevertDecisionService {
    config: ServiceConfig,
    precheck: Arc<PreCheck>,
    scores: Arc<dyn ScoreSource>,
    engine: DecisionEngine,
    notifier: TalkPageNotifier,
    tags: Arc<dyn TagStore>,
    history: Arc<dyn RevertHistory>,
}

impl RevertDecisionService {
    pub fn new(
        config: ServiceConfig,
        host: Collaborators,
        scores: Arc<dyn ScoreSource>,
    ) -> Self {
        let actor = config.actor.clone();
        Self {
            precheck: Arc::new(PreCheck::new(
                actor.clone(),
                host.users.clone(),
                host.history.clone(),
            )),
            engine: DecisionEngine::new(actor.clone(), host.pages.clone(), host.tags.clone()),
            notifier: TalkPageNotifier::new(actor, host.pages.clone(), host.talk_pages.clone()),
            tags: host.tags,
            history: host.history,
            scores,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Hook sharing this service's pre-check.
    pub fn edit_hook(&self) -> EditHook {
        EditHook::new(self.precheck.clone())
    }

    pub async fn run_job(
        &self,
        job: &AutoModeratorJob,
        policy: &Policy,
    ) -> Result<JobReport, ServiceError> {
        let span = info_span!("automod_job", wiki = %self.config.wiki_id, rev_id = job.rev_id);
        self.run(job, policy).instrument(span).await
    }

    async fn run(
        &self,
        job: &AutoModeratorJob,
        policy: &Policy,
    ) -> Result<JobReport, ServiceError> {
        let ctx = job.context();

        let existing = self.tags.tags(ctx.rev_id).await?;
        if existing.contains(TAG_REVERTED) || existing.contains(TAG_PASSED) {
            info!("revision already evaluated, skipping redelivered job");
            return Ok(JobReport::AlreadyEvaluated {
                rev_id: ctx.rev_id,
                tags: existing,
            });
        }

        // A revert saved on an earlier delivery whose tag write failed.
        if let Some(revert_rev_id) = self
            .history
            .find_revert(&self.config.actor, ctx.rev_id)
            .await?
        {
            let tags = TagSet::single(TAG_REVERTED);
            self.tags.add_tags(ctx.rev_id, &tags).await?;
            info!(revert_rev_id, "revert already saved, tagging revision");
            return Ok(JobReport::AlreadyEvaluated {
                rev_id: ctx.rev_id,
                tags: existing.union(&tags),
            });
        }

        if let Eligibility::Skip(reason) = self.precheck.evaluate(&ctx, policy).await? {
            info!(%reason, "revision not eligible");
            return Ok(JobReport::Skipped {
                rev_id: ctx.rev_id,
                reason,
            });
        }

        let score = self.score(job, &ctx, policy).await?;
        let decision = self.engine.maybe_revert(&ctx, &score, policy).await?;

        let notification = if decision.reverted() {
            Some(self.notifier.notify(&ctx, &decision, policy).await)
        } else {
            None
        };

        Ok(JobReport::Decided {
            decision,
            notification,
        })
    }

    async fn score(
        &self,
        job: &AutoModeratorJob,
        ctx: &RevisionContext,
        policy: &Policy,
    ) -> Result<Score, ServiceError> {
        let score = match &job.scores {
            Some(value) => Score::from_value(value.clone()).map_err(|source| {
                ServiceError::UnusableScore {
                    rev_id: ctx.rev_id,
                    source,
                }
            })?,
            None => {
                let request = ScoreRequest::new(ctx.rev_id, self.config.lang.clone())
                    .with_model(policy.model_for(&self.config.lang));
                self.scores.fetch_score(&request).await?
            }
        };

        if score.rev_id != ctx.rev_id {
            return Err(ServiceError::UnusableScore {
                rev_id: ctx.rev_id,
                source: ScoreParseError::Malformed(format!(
                    "score is for revision {}",
                    score.rev_id
                )),
            });
        }
        Ok(score)
    }
}
