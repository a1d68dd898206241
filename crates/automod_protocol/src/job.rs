//! Task descriptor handed from the edit hook to the job runner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{PageId, RevisionContext, RevisionId, TagSet, UserIdentity};

/// One revision evaluation. Safe to deliver more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoModeratorJob {
    pub wiki_page_id: PageId,
    pub rev_id: RevisionId,
    #[serde(default)]
    pub parent_rev_id: Option<RevisionId>,
    #[serde(default)]
    pub original_rev_id: Option<RevisionId>,
    pub user_id: u64,
    pub user_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pre-computed endpoint body. When present no score is fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Value>,
}

impl AutoModeratorJob {
    pub fn from_context(ctx: &RevisionContext) -> Self {
        Self {
            wiki_page_id: ctx.page_id,
            rev_id: ctx.rev_id,
            parent_rev_id: ctx.parent_rev_id,
            original_rev_id: ctx.original_rev_id,
            user_id: ctx.user.id,
            user_name: ctx.user.name.clone(),
            tags: ctx.tags.iter().map(str::to_string).collect(),
            scores: None,
        }
    }

    pub fn with_scores(mut self, scores: Value) -> Self {
        self.scores = Some(scores);
        self
    }

    pub fn context(&self) -> RevisionContext {
        RevisionContext {
            rev_id: self.rev_id,
            parent_rev_id: self.parent_rev_id,
            page_id: self.wiki_page_id,
            user: UserIdentity::new(self.user_id, self.user_name.clone()),
            original_rev_id: self.original_rev_id,
            tags: self.tags.iter().cloned().collect::<TagSet>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_wire_format_is_camel_case() {
        let job: AutoModeratorJob = serde_json::from_value(json!({
            "wikiPageId": 7,
            "revId": 42,
            "originalRevId": null,
            "userId": 3,
            "userName": "Example",
            "tags": ["mw-rollback"]
        }))
        .unwrap();

        let ctx = job.context();
        assert_eq!(ctx.page_id, 7);
        assert_eq!(ctx.rev_id, 42);
        assert_eq!(ctx.parent_rev_id, None);
        assert!(!ctx.is_null_edit());
        assert!(ctx.tags.contains("mw-rollback"));
        assert_eq!(ctx.user, UserIdentity::new(3, "Example"));
    }

    #[test]
    fn test_context_survives_job_conversion() {
        let ctx = RevisionContext {
            rev_id: 10,
            parent_rev_id: Some(9),
            page_id: 1,
            user: UserIdentity::new(0, "192.0.2.1"),
            original_rev_id: Some(8),
            tags: TagSet::single("mw-undo"),
        };
        assert_eq!(AutoModeratorJob::from_context(&ctx).context(), ctx);
    }
}
