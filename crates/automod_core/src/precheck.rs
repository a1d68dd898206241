//! Eligibility gate run before any scoring.
//!
//! The static checks (null edit, skip tags, self edit) need nothing but the
//! context and run first. Rights, groups and the revert limit are looked up
//! through the host only when those pass.

use automod_protocol::{Policy, RevisionContext, RevisionId, UserIdentity};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::host::{HostError, RevertHistory, UserDirectory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NullEdit { original_rev_id: RevisionId },
    SkippedTag,
    OwnEdit,
    ExemptRight(String),
    ExemptGroup(String),
    RevertLimitReached { count: u32, limit: u32 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NullEdit { original_rev_id } => {
                write!(f, "null edit restoring revision {}", original_rev_id)
            }
            SkipReason::SkippedTag => write!(f, "carries a revert tag"),
            SkipReason::OwnEdit => write!(f, "edit by the automated actor"),
            SkipReason::ExemptRight(right) => write!(f, "user holds exempt right '{}'", right),
            SkipReason::ExemptGroup(group) => write!(f, "user is in exempt group '{}'", group),
            SkipReason::RevertLimitReached { count, limit } => {
                write!(f, "revert limit reached ({}/{})", count, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(SkipReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Checks that need only the context and the policy.
pub fn static_check(
    ctx: &RevisionContext,
    policy: &Policy,
    actor: &UserIdentity,
) -> Result<(), SkipReason> {
    if let Some(original_rev_id) = ctx.original_rev_id {
        return Err(SkipReason::NullEdit { original_rev_id });
    }
    if ctx.tags.matches_any(&policy.skip_tags) {
        return Err(SkipReason::SkippedTag);
    }
    if ctx.user.same_account(actor) {
        return Err(SkipReason::OwnEdit);
    }
    Ok(())
}

pub struct PreCheck {
    actor: UserIdentity,
    users: Arc<dyn UserDirectory>,
    history: Arc<dyn RevertHistory>,
}

impl PreCheck {
    pub fn new(
        actor: UserIdentity,
        users: Arc<dyn UserDirectory>,
        history: Arc<dyn RevertHistory>,
    ) -> Self {
        Self {
            actor,
            users,
            history,
        }
    }

    pub fn actor(&self) -> &UserIdentity {
        &self.actor
    }

    pub async fn passes(&self, ctx: &RevisionContext, policy: &Policy) -> Result<bool, HostError> {
        Ok(self.evaluate(ctx, policy).await?.is_eligible())
    }

    pub async fn evaluate(
        &self,
        ctx: &RevisionContext,
        policy: &Policy,
    ) -> Result<Eligibility, HostError> {
        self.evaluate_at(ctx, policy, Utc::now()).await
    }

    /// Evaluate with an explicit clock for the revert window.
    pub async fn evaluate_at(
        &self,
        ctx: &RevisionContext,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> Result<Eligibility, HostError> {
        if let Err(reason) = static_check(ctx, policy, &self.actor) {
            debug!(rev_id = ctx.rev_id, %reason, "pre-check skip");
            return Ok(Eligibility::Skip(reason));
        }

        let rights = self.users.rights(&ctx.user).await?;
        if let Some(right) = rights.iter().find(|r| policy.skip_user_rights.contains(r)) {
            return Ok(skip(ctx, SkipReason::ExemptRight(right.clone())));
        }

        let groups = self.users.groups(&ctx.user).await?;
        if let Some(group) = groups.iter().find(|g| policy.skip_user_groups.contains(g)) {
            return Ok(skip(ctx, SkipReason::ExemptGroup(group.clone())));
        }

        let since = now
            .checked_sub_signed(policy.revert_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let count = self
            .history
            .count_reverts(&self.actor, &ctx.user, ctx.page_id, since)
            .await?;
        if count >= policy.max_reverts_per_user_per_page {
            return Ok(skip(
                ctx,
                SkipReason::RevertLimitReached {
                    count,
                    limit: policy.max_reverts_per_user_per_page,
                },
            ));
        }

        Ok(Eligibility::Eligible)
    }
}

fn skip(ctx: &RevisionContext, reason: SkipReason) -> Eligibility {
    debug!(rev_id = ctx.rev_id, %reason, "pre-check skip");
    Eligibility::Skip(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use automod_protocol::{PageId, TagSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedUsers {
        rights: Vec<String>,
        groups: Vec<String>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl UserDirectory for FixedUsers {
        async fn rights(&self, _user: &UserIdentity) -> Result<Vec<String>, HostError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.rights.clone())
        }

        async fn groups(&self, _user: &UserIdentity) -> Result<Vec<String>, HostError> {
            Ok(self.groups.clone())
        }
    }

    struct FixedHistory(Result<u32, HostError>);

    #[async_trait]
    impl RevertHistory for FixedHistory {
        async fn count_reverts(
            &self,
            _actor: &UserIdentity,
            _user: &UserIdentity,
            _page_id: PageId,
            _since: DateTime<Utc>,
        ) -> Result<u32, HostError> {
            self.0.clone()
        }

        async fn find_revert(
            &self,
            _actor: &UserIdentity,
            _rev_id: RevisionId,
        ) -> Result<Option<RevisionId>, HostError> {
            Ok(None)
        }
    }

    fn actor() -> UserIdentity {
        UserIdentity::new(99, "AutoModerator")
    }

    fn ctx() -> RevisionContext {
        RevisionContext {
            rev_id: 10,
            parent_rev_id: Some(9),
            page_id: 1,
            user: UserIdentity::new(5, "Editor"),
            original_rev_id: None,
            tags: TagSet::new(),
        }
    }

    fn gate(
        rights: &[&str],
        groups: &[&str],
        reverts: Result<u32, HostError>,
    ) -> (PreCheck, Arc<FixedUsers>) {
        let users = Arc::new(FixedUsers {
            rights: rights.iter().map(|s| s.to_string()).collect(),
            groups: groups.iter().map(|s| s.to_string()).collect(),
            lookups: AtomicUsize::new(0),
        });
        let gate = PreCheck::new(actor(), users.clone(), Arc::new(FixedHistory(reverts)));
        (gate, users)
    }

    #[tokio::test]
    async fn test_plain_edit_is_eligible() {
        let (gate, _) = gate(&["edit"], &["user"], Ok(0));
        assert!(gate.passes(&ctx(), &Policy::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_null_edit_skipped_without_lookups() {
        let (gate, users) = gate(&[], &[], Ok(0));
        let mut c = ctx();
        c.original_rev_id = Some(8);
        let result = gate.evaluate(&c, &Policy::default()).await.unwrap();
        assert_eq!(result, Eligibility::Skip(SkipReason::NullEdit { original_rev_id: 8 }));
        assert_eq!(users.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_revert_tags_skipped() {
        let (gate, _) = gate(&[], &[], Ok(0));
        for tag in ["mw-manual-revert", "mw-rollback", "mw-undo", "undo"] {
            let mut c = ctx();
            c.tags = TagSet::single(tag);
            assert!(!gate.passes(&c, &Policy::default()).await.unwrap(), "{tag}");
        }
    }

    #[tokio::test]
    async fn test_own_edit_skipped() {
        let (gate, _) = gate(&[], &[], Ok(0));
        let mut c = ctx();
        c.user = actor();
        assert_eq!(
            gate.evaluate(&c, &Policy::default()).await.unwrap(),
            Eligibility::Skip(SkipReason::OwnEdit)
        );
    }

    #[tokio::test]
    async fn test_own_edit_matched_by_account_name() {
        let (gate, users) = gate(&[], &[], Ok(0));
        let mut c = ctx();
        c.user = UserIdentity::new(12, "AutoModerator");
        assert_eq!(
            gate.evaluate(&c, &Policy::default()).await.unwrap(),
            Eligibility::Skip(SkipReason::OwnEdit)
        );
        assert_eq!(users.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exempt_right_and_group() {
        let (by_right, _) = gate(&["edit", "autopatrol"], &[], Ok(0));
        assert_eq!(
            by_right.evaluate(&ctx(), &Policy::default()).await.unwrap(),
            Eligibility::Skip(SkipReason::ExemptRight("autopatrol".into()))
        );

        let (by_group, _) = gate(&[], &["user", "sysop"], Ok(0));
        assert_eq!(
            by_group.evaluate(&ctx(), &Policy::default()).await.unwrap(),
            Eligibility::Skip(SkipReason::ExemptGroup("sysop".into()))
        );
    }

    #[tokio::test]
    async fn test_revert_limit() {
        let (under, _) = gate(&[], &[], Ok(0));
        assert!(under.passes(&ctx(), &Policy::default()).await.unwrap());

        let (at_limit, _) = gate(&[], &[], Ok(1));
        assert_eq!(
            at_limit.evaluate(&ctx(), &Policy::default()).await.unwrap(),
            Eligibility::Skip(SkipReason::RevertLimitReached { count: 1, limit: 1 })
        );

        let relaxed = Policy::from_json_str(r#"{"max_reverts_per_user_per_page": 3}"#).unwrap();
        let (two, _) = gate(&[], &[], Ok(2));
        assert!(two.passes(&ctx(), &relaxed).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_clamped_at_earliest_time() {
        let (gate, _) = gate(&[], &[], Ok(0));
        let policy = Policy::default();
        let early = DateTime::<Utc>::MIN_UTC + chrono::Duration::hours(1);
        assert!(gate.evaluate_at(&ctx(), &policy, early).await.unwrap().is_eligible());
    }

    #[tokio::test]
    async fn test_history_failure_is_an_error() {
        let (gate, _) = gate(&[], &[], Err(HostError::Unavailable("replica lag".into())));
        assert!(gate.evaluate(&ctx(), &Policy::default()).await.is_err());
    }
}
