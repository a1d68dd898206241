//! JSON snapshot format the in-memory wiki can be loaded from.

use automod_protocol::defaults::WIKITEXT_CONTENT_MODEL;
use automod_protocol::{PageId, RevisionId, UserIdentity};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WikiFixture {
    #[serde(default = "default_true")]
    pub discussion_tools: bool,
    pub pages: Vec<PageFixture>,
    #[serde(default)]
    pub users: Vec<UserFixture>,
    #[serde(default)]
    pub talk_pages: Vec<TalkPageFixture>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageFixture {
    pub id: PageId,
    pub title: String,
    /// Oldest first.
    pub revisions: Vec<RevisionFixture>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevisionFixture {
    pub id: RevisionId,
    pub user: UserIdentity,
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub original_rev_id: Option<RevisionId>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserFixture {
    pub name: String,
    #[serde(default)]
    pub rights: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TalkPageFixture {
    pub user: String,
    #[serde(default = "default_content_model")]
    pub content_model: String,
    pub text: String,
}

fn default_true() -> bool {
    true
}

fn default_content_model() -> String {
    WIKITEXT_CONTENT_MODEL.to_string()
}
