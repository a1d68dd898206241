//! Entry point for saved edits: decides whether a job is queued at all.

use automod_protocol::{AutoModeratorJob, Policy, RevisionContext};
use std::sync::Arc;
use tracing::debug;

use crate::host::HostError;
use crate::precheck::{Eligibility, PreCheck};

pub struct EditHook {
    precheck: Arc<PreCheck>,
}

impl EditHook {
    pub fn new(precheck: Arc<PreCheck>) -> Self {
        Self { precheck }
    }

    /// Called once the edit's own transaction has committed.
    pub async fn on_revision_saved(
        &self,
        ctx: &RevisionContext,
        policy: &Policy,
    ) -> Result<Option<AutoModeratorJob>, HostError> {
        if !policy.enabled {
            debug!(rev_id = ctx.rev_id, "revision check disabled");
            return Ok(None);
        }
        match self.precheck.evaluate(ctx, policy).await? {
            Eligibility::Eligible => Ok(Some(AutoModeratorJob::from_context(ctx))),
            Eligibility::Skip(_) => Ok(None),
        }
    }
}
