//! Talk-page notice sent to an editor after their edit was reverted.
//!
//! Best effort: every failure is logged and swallowed so it never affects
//! the outcome of the revert itself.

use automod_protocol::defaults::WIKITEXT_CONTENT_MODEL;
use automod_protocol::{Decision, Policy, RevisionContext, UserIdentity};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::host::{PageStore, TalkPage, TalkPageMessage, TalkPageStore};

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    Delivered { talk_rev_id: u64 },
    Disabled,
    Skipped(&'static str),
    Failed(String),
}

pub struct TalkPageNotifier {
    actor: UserIdentity,
    pages: Arc<dyn PageStore>,
    talk_pages: Arc<dyn TalkPageStore>,
}

impl TalkPageNotifier {
    pub fn new(
        actor: UserIdentity,
        pages: Arc<dyn PageStore>,
        talk_pages: Arc<dyn TalkPageStore>,
    ) -> Self {
        Self {
            actor,
            pages,
            talk_pages,
        }
    }

    pub async fn notify(
        &self,
        ctx: &RevisionContext,
        decision: &Decision,
        policy: &Policy,
    ) -> NotifyOutcome {
        self.notify_at(ctx, decision, policy, Utc::now()).await
    }

    pub async fn notify_at(
        &self,
        ctx: &RevisionContext,
        decision: &Decision,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> NotifyOutcome {
        if !policy.talk_page_message_enabled {
            return NotifyOutcome::Disabled;
        }
        let Some(restored_rev_id) = decision.restored_rev_id() else {
            return NotifyOutcome::Skipped("no revert");
        };

        let outcome = self.deliver(ctx, restored_rev_id, policy, now).await;
        match &outcome {
            NotifyOutcome::Delivered { talk_rev_id } => {
                info!(
                    rev_id = ctx.rev_id,
                    user = %ctx.user,
                    talk_rev_id,
                    "talk page notice delivered"
                )
            }
            NotifyOutcome::Failed(error) => {
                warn!(rev_id = ctx.rev_id, user = %ctx.user, %error, "talk page notice failed")
            }
            NotifyOutcome::Skipped(reason) => {
                info!(rev_id = ctx.rev_id, user = %ctx.user, reason, "talk page notice skipped")
            }
            NotifyOutcome::Disabled => {}
        }
        outcome
    }

    async fn deliver(
        &self,
        ctx: &RevisionContext,
        restored_rev_id: u64,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> NotifyOutcome {
        match self.pages.revision(restored_rev_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return NotifyOutcome::Skipped("parent revision not found"),
            Err(e) => return NotifyOutcome::Failed(e.to_string()),
        }
        let page_title = match self.pages.revision(ctx.rev_id).await {
            Ok(Some(revision)) => revision.page_title,
            Ok(None) => return NotifyOutcome::Skipped("reverted revision not found"),
            Err(e) => return NotifyOutcome::Failed(e.to_string()),
        };

        if !self.talk_pages.discussion_tools_available() {
            return NotifyOutcome::Skipped("discussion tools unavailable");
        }

        let talk_page = match self.talk_pages.talk_page(&ctx.user).await {
            Ok(page) => page,
            Err(e) => return NotifyOutcome::Failed(e.to_string()),
        };
        if let Some(page) = &talk_page {
            if page.content_model != WIKITEXT_CONTENT_MODEL {
                return NotifyOutcome::Skipped("talk page is not wikitext");
            }
        }

        let message = compose_message(
            &self.actor,
            ctx,
            &page_title,
            talk_page.as_ref(),
            policy,
            now,
        );
        match self.talk_pages.append_message(&ctx.user, message).await {
            Ok(talk_rev_id) => NotifyOutcome::Delivered { talk_rev_id },
            Err(e) => NotifyOutcome::Failed(e.to_string()),
        }
    }
}

/// Section heading for notices sent in the month of `now`.
pub fn month_heading(now: DateTime<Utc>) -> String {
    format!("AutoModerator reverted your edit ({})", now.format("%B %Y"))
}

/// Text of the last level-2 heading on a wikitext page, if any.
fn last_level2_heading(text: &str) -> Option<&str> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| {
            line.len() > 4
                && line.starts_with("==")
                && !line.starts_with("===")
                && line.ends_with("==")
                && !line.ends_with("===")
        })
        .map(|line| line.trim_matches('=').trim())
}

pub fn compose_message(
    actor: &UserIdentity,
    ctx: &RevisionContext,
    page_title: &str,
    talk_page: Option<&TalkPage>,
    policy: &Policy,
    now: DateTime<Utc>,
) -> TalkPageMessage {
    let heading = month_heading(now);
    let continues_section = talk_page
        .and_then(|page| last_level2_heading(&page.text))
        .map_or(false, |last| last == heading);

    let mut body = format!(
        "Hello {user}! I am [[User:{actor}|{actor}]], an automated system which uses a machine learning model to identify and revert potentially bad edits. \
I reverted your edit to [[{page}]] ([[Special:Diff/{rev}|diff]]). \
If you believe this was a mistake, please [[{report}|report it here]].",
        user = ctx.user.name,
        actor = actor.name,
        page = page_title,
        rev = ctx.rev_id,
        report = policy.false_positive_page,
    );
    if let Some(help) = &policy.help_page_link {
        body.push_str(&format!(" You can learn more about {} at [[{}]].", actor.name, help));
    }
    body.push_str(" ~~~~");

    TalkPageMessage {
        heading: if continues_section { None } else { Some(heading) },
        body,
        summary: format!("Notifying about revert of [[Special:Diff/{}]]", ctx.rev_id),
        actor: actor.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automod_protocol::TagSet;
    use chrono::TimeZone;

    fn ctx() -> RevisionContext {
        RevisionContext {
            rev_id: 42,
            parent_rev_id: Some(41),
            page_id: 1,
            user: UserIdentity::new(5, "Editor"),
            original_rev_id: None,
            tags: TagSet::new(),
        }
    }

    fn may_2024() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap()
    }

    fn talk(text: &str) -> TalkPage {
        TalkPage {
            title: "User talk:Editor".into(),
            content_model: "wikitext".into(),
            text: text.into(),
            latest_rev_id: Some(7),
        }
    }

    #[test]
    fn test_heading_is_dated() {
        assert_eq!(month_heading(may_2024()), "AutoModerator reverted your edit (May 2024)");
    }

    #[test]
    fn test_new_section_on_empty_talk_page() {
        let actor = UserIdentity::new(99, "AutoModerator");
        let message =
            compose_message(&actor, &ctx(), "Example", None, &Policy::default(), may_2024());
        assert_eq!(
            message.heading.as_deref(),
            Some("AutoModerator reverted your edit (May 2024)")
        );
        assert!(message.body.contains("[[Example]]"));
        assert!(message.body.contains("[[Special:Diff/42|diff]]"));
        assert!(message
            .body
            .contains("[[Project:AutoModerator/False positives|report it here]]"));
        assert!(message.body.ends_with("~~~~"));
        assert!(!message.body.contains("learn more"));
    }

    #[test]
    fn test_appends_under_same_month_heading() {
        let actor = UserIdentity::new(99, "AutoModerator");
        let page = talk(
            "== Welcome ==\nHi\n== AutoModerator reverted your edit (May 2024) ==\nEarlier notice ~~~~\n",
        );
        let message =
            compose_message(&actor, &ctx(), "Example", Some(&page), &Policy::default(), may_2024());
        assert_eq!(message.heading, None);
    }

    #[test]
    fn test_new_heading_when_last_section_differs() {
        let actor = UserIdentity::new(99, "AutoModerator");
        let page = talk(
            "== AutoModerator reverted your edit (April 2024) ==\nOld\n=== Reply ===\nok\n",
        );
        let message =
            compose_message(&actor, &ctx(), "Example", Some(&page), &Policy::default(), may_2024());
        assert!(message.heading.is_some());
    }

    #[test]
    fn test_help_link_included_when_configured() {
        let actor = UserIdentity::new(99, "AutoModerator");
        let policy =
            Policy::from_json_str(r#"{"help_page_link": "Project:AutoModerator"}"#).unwrap();
        let message = compose_message(&actor, &ctx(), "Example", None, &policy, may_2024());
        assert!(message
            .body
            .contains("You can learn more about AutoModerator at [[Project:AutoModerator]]."));
    }

    #[test]
    fn test_last_level2_heading_ignores_subsections() {
        assert_eq!(last_level2_heading("== A ==\n=== B ===\n"), Some("A"));
        assert_eq!(last_level2_heading("no headings"), None);
    }
}
