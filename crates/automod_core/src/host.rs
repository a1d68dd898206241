//! Collaborator interfaces to the wiki host.
//!
//! The service never touches storage directly. Revision lookup, undo
//! merging, saving, tagging, revert history, user rights and talk pages are
//! all reached through these traits, injected at construction time.

use async_trait::async_trait;
use automod_protocol::{PageId, RevisionId, TagSet, UserIdentity};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    /// Backing store could not be reached. Worth retrying.
    #[error("Host unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl HostError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HostError::Unavailable(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UndoError {
    /// The undo does not apply cleanly on top of the current content.
    #[error("Undo of revision {candidate} conflicts with current revision {current}")]
    Conflict {
        candidate: RevisionId,
        current: RevisionId,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SaveError {
    /// The page is no longer at the revision the edit was based on.
    #[error("Edit conflict on page {page_id}: expected base {expected}, page is at {actual}")]
    EditConflict {
        page_id: PageId,
        expected: RevisionId,
        actual: RevisionId,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRecord {
    pub id: RevisionId,
    pub page_id: PageId,
    pub page_title: String,
    pub parent_id: Option<RevisionId>,
    pub user: UserIdentity,
    pub timestamp: DateTime<Utc>,
    /// `None` when the content was deleted or suppressed.
    pub content: Option<String>,
}

/// A revert the engine asks the host to save.
#[derive(Debug, Clone, PartialEq)]
pub struct RevertRequest {
    pub page_id: PageId,
    pub content: String,
    /// Revision the merge was computed against. The host must refuse the
    /// save when the page has moved past it.
    pub base_rev_id: RevisionId,
    pub reverted_rev_id: RevisionId,
    pub restored_rev_id: RevisionId,
    /// Author of the reverted revision.
    pub reverted_user: UserIdentity,
    pub summary: String,
    pub actor: UserIdentity,
    pub minor: bool,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TalkPage {
    pub title: String,
    pub content_model: String,
    pub text: String,
    pub latest_rev_id: Option<RevisionId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TalkPageMessage {
    /// New level-2 section heading, or `None` to append under the last one.
    pub heading: Option<String>,
    pub body: String,
    pub summary: String,
    pub actor: UserIdentity,
}

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait PageStore: Send + Sync {
    async fn revision(&self, rev_id: RevisionId) -> Result<Option<RevisionRecord>, HostError>;

    /// The revision immediately before `revision` on its page.
    async fn previous_revision(
        &self,
        revision: &RevisionRecord,
    ) -> Result<Option<RevisionRecord>, HostError>;

    async fn current_revision(&self, page_id: PageId) -> Result<Option<RevisionRecord>, HostError>;

    /// Three-way merge that removes `candidate`'s change from `current`,
    /// restoring `target`'s content where they overlap.
    async fn undo_content(
        &self,
        target: &RevisionRecord,
        candidate: &RevisionRecord,
        current: &RevisionRecord,
    ) -> Result<String, UndoError>;

    async fn save_revert(&self, request: RevertRequest) -> Result<RevisionId, SaveError>;
}

#[async_trait]
pub trait TagStore: Send + Sync {
    /// Union `tags` into the revision's tags.
    async fn add_tags(&self, rev_id: RevisionId, tags: &TagSet) -> Result<(), HostError>;

    async fn tags(&self, rev_id: RevisionId) -> Result<TagSet, HostError>;
}

#[async_trait]
pub trait RevertHistory: Send + Sync {
    /// Reverts saved by `actor` on `page_id` undoing edits by `user` since `since`.
    async fn count_reverts(
        &self,
        actor: &UserIdentity,
        user: &UserIdentity,
        page_id: PageId,
        since: DateTime<Utc>,
    ) -> Result<u32, HostError>;

    /// Revert saved by `actor` that undid `rev_id`, if any.
    async fn find_revert(
        &self,
        actor: &UserIdentity,
        rev_id: RevisionId,
    ) -> Result<Option<RevisionId>, HostError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn rights(&self, user: &UserIdentity) -> Result<Vec<String>, HostError>;

    async fn groups(&self, user: &UserIdentity) -> Result<Vec<String>, HostError>;
}

#[async_trait]
pub trait TalkPageStore: Send + Sync {
    /// `None` when the user has no talk page yet.
    async fn talk_page(&self, user: &UserIdentity) -> Result<Option<TalkPage>, HostError>;

    /// Whether the host's discussion tooling is installed.
    fn discussion_tools_available(&self) -> bool;

    async fn append_message(
        &self,
        user: &UserIdentity,
        message: TalkPageMessage,
    ) -> Result<RevisionId, SaveError>;
}

/// Every collaborator the service needs, shared between tasks.
#[derive(Clone)]
pub struct Collaborators {
    pub pages: Arc<dyn PageStore>,
    pub tags: Arc<dyn TagStore>,
    pub history: Arc<dyn RevertHistory>,
    pub users: Arc<dyn UserDirectory>,
    pub talk_pages: Arc<dyn TalkPageStore>,
}

impl Collaborators {
    /// Use one host object for every role.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: PageStore + TagStore + RevertHistory + UserDirectory + TalkPageStore + 'static,
    {
        Self {
            pages: host.clone(),
            tags: host.clone(),
            history: host.clone(),
            users: host.clone(),
            talk_pages: host,
        }
    }
}
