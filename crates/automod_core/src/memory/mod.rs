//! In-memory wiki implementing every host collaborator.
//!
//! Backs the test suites and the CLI `replay` command. Failure injection
//! (`set_unavailable`, `conflict_next_save`, `fail_next_saves`) lets callers
//! exercise the error paths the real host can produce.

mod fixture;
mod merge;

pub use fixture::{PageFixture, RevisionFixture, TalkPageFixture, UserFixture, WikiFixture};

use async_trait::async_trait;
use automod_protocol::defaults::WIKITEXT_CONTENT_MODEL;
use automod_protocol::{PageId, RevisionContext, RevisionId, TagSet, UserIdentity};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::host::{
    HostError, PageStore, RevertHistory, RevertRequest, RevisionRecord, SaveError, TagStore,
    TalkPage, TalkPageMessage, TalkPageStore, UndoError, UserDirectory,
};

/// Tag the host puts on undo-style reverts.
const UNDO_TAG: &str = "mw-undo";

#[derive(Debug, Clone)]
struct StoredRevision {
    record: RevisionRecord,
    tags: TagSet,
    original_rev_id: Option<RevisionId>,
    /// Edit this revision reverted, for actor-saved reverts.
    reverted: Option<RevertedEdit>,
}

#[derive(Debug, Clone)]
struct RevertedEdit {
    rev_id: RevisionId,
    user: UserIdentity,
}

#[derive(Debug, Clone)]
struct PageEntry {
    title: String,
    revisions: Vec<RevisionId>,
}

#[derive(Debug, Clone, Default)]
struct UserEntry {
    rights: Vec<String>,
    groups: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    pages: BTreeMap<PageId, PageEntry>,
    revisions: BTreeMap<RevisionId, StoredRevision>,
    users: HashMap<String, UserEntry>,
    talk_pages: HashMap<String, TalkPage>,
    saved_reverts: Vec<RevertRequest>,
    next_page_id: PageId,
    next_rev_id: RevisionId,
    discussion_tools: bool,
    unavailable: bool,
    conflict_next_save: bool,
    failing_saves: u32,
}

impl State {
    fn check_available(&self) -> Result<(), HostError> {
        if self.unavailable {
            Err(HostError::Unavailable("in-memory wiki set unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn allocate_rev_id(&mut self) -> RevisionId {
        let id = self.next_rev_id;
        self.next_rev_id += 1;
        id
    }

    fn latest_on(&self, page_id: PageId) -> Option<RevisionId> {
        self.pages
            .get(&page_id)
            .and_then(|page| page.revisions.last().copied())
    }

    fn insert(&mut self, page_id: PageId, revision: StoredRevision) {
        let id = revision.record.id;
        if let Some(page) = self.pages.get_mut(&page_id) {
            page.revisions.push(id);
        }
        self.next_rev_id = self.next_rev_id.max(id + 1);
        self.revisions.insert(id, revision);
    }
}

/// A new revision to record with [`MemoryWiki::record_edit`].
#[derive(Debug, Clone)]
pub struct NewEdit {
    pub page_id: PageId,
    pub user: UserIdentity,
    pub content: Option<String>,
    pub tags: TagSet,
    pub original_rev_id: Option<RevisionId>,
    pub timestamp: DateTime<Utc>,
}

impl NewEdit {
    pub fn new(page_id: PageId, user: UserIdentity, content: impl Into<String>) -> Self {
        Self {
            page_id,
            user,
            content: Some(content.into()),
            tags: TagSet::new(),
            original_rev_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().copied().collect();
        self
    }

    pub fn restoring(mut self, original_rev_id: RevisionId) -> Self {
        self.original_rev_id = Some(original_rev_id);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

pub struct MemoryWiki {
    state: Mutex<State>,
}

impl Default for MemoryWiki {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWiki {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_page_id: 1,
                next_rev_id: 1,
                discussion_tools: true,
                ..State::default()
            }),
        }
    }

    pub fn from_fixture(fixture: WikiFixture) -> Self {
        let wiki = Self::new();
        {
            let mut state = wiki.lock();
            state.discussion_tools = fixture.discussion_tools;

            for page in fixture.pages {
                state.pages.insert(
                    page.id,
                    PageEntry {
                        title: page.title.clone(),
                        revisions: Vec::new(),
                    },
                );
                state.next_page_id = state.next_page_id.max(page.id + 1);

                let mut parent = None;
                for rev in page.revisions {
                    let stored = StoredRevision {
                        record: RevisionRecord {
                            id: rev.id,
                            page_id: page.id,
                            page_title: page.title.clone(),
                            parent_id: parent,
                            user: rev.user,
                            timestamp: rev.timestamp.unwrap_or_else(Utc::now),
                            content: rev.content,
                        },
                        tags: rev.tags.into_iter().collect(),
                        original_rev_id: rev.original_rev_id,
                        reverted: None,
                    };
                    parent = Some(rev.id);
                    state.insert(page.id, stored);
                }
            }

            for user in fixture.users {
                state.users.insert(
                    user.name,
                    UserEntry {
                        rights: user.rights,
                        groups: user.groups,
                    },
                );
            }

            for talk in fixture.talk_pages {
                let title = format!("User talk:{}", talk.user);
                state.talk_pages.insert(
                    talk.user,
                    TalkPage {
                        title,
                        content_model: talk.content_model,
                        text: talk.text,
                        latest_rev_id: None,
                    },
                );
            }
        }
        wiki
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_page(&self, title: impl Into<String>) -> PageId {
        let mut state = self.lock();
        let id = state.next_page_id;
        state.next_page_id += 1;
        state.pages.insert(
            id,
            PageEntry {
                title: title.into(),
                revisions: Vec::new(),
            },
        );
        id
    }

    pub fn record_edit(&self, edit: NewEdit) -> Result<RevisionId, HostError> {
        let mut state = self.lock();
        let page = state
            .pages
            .get(&edit.page_id)
            .ok_or_else(|| HostError::NotFound(format!("page {}", edit.page_id)))?;
        let title = page.title.clone();
        let parent_id = page.revisions.last().copied();
        let id = state.allocate_rev_id();
        state.insert(
            edit.page_id,
            StoredRevision {
                record: RevisionRecord {
                    id,
                    page_id: edit.page_id,
                    page_title: title,
                    parent_id,
                    user: edit.user,
                    timestamp: edit.timestamp,
                    content: edit.content,
                },
                tags: edit.tags,
                original_rev_id: edit.original_rev_id,
                reverted: None,
            },
        );
        Ok(id)
    }

    pub fn edit(
        &self,
        page_id: PageId,
        user: &UserIdentity,
        content: &str,
    ) -> Result<RevisionId, HostError> {
        self.record_edit(NewEdit::new(page_id, user.clone(), content))
    }

    pub fn set_user(&self, name: &str, rights: &[&str], groups: &[&str]) {
        self.lock().users.insert(
            name.to_string(),
            UserEntry {
                rights: rights.iter().map(|s| s.to_string()).collect(),
                groups: groups.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    pub fn set_talk_page(&self, user: &str, content_model: &str, text: &str) {
        self.lock().talk_pages.insert(
            user.to_string(),
            TalkPage {
                title: format!("User talk:{}", user),
                content_model: content_model.to_string(),
                text: text.to_string(),
                latest_rev_id: None,
            },
        );
    }

    pub fn set_discussion_tools(&self, available: bool) {
        self.lock().discussion_tools = available;
    }

    /// Every call fails with `HostError::Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// The next revert save reports an edit conflict.
    pub fn conflict_next_save(&self) {
        self.lock().conflict_next_save = true;
    }

    /// The next `count` revert saves fail with `HostError::Unavailable`.
    pub fn fail_next_saves(&self, count: u32) {
        self.lock().failing_saves = count;
    }

    /// Context the host would hand over for a stored revision.
    pub fn context_for(&self, rev_id: RevisionId) -> Option<RevisionContext> {
        let state = self.lock();
        let stored = state.revisions.get(&rev_id)?;
        Some(RevisionContext {
            rev_id,
            parent_rev_id: stored.record.parent_id,
            page_id: stored.record.page_id,
            user: stored.record.user.clone(),
            original_rev_id: stored.original_rev_id,
            tags: stored.tags.clone(),
        })
    }

    pub fn page_revisions(&self, page_id: PageId) -> Vec<RevisionId> {
        self.lock()
            .pages
            .get(&page_id)
            .map(|page| page.revisions.clone())
            .unwrap_or_default()
    }

    pub fn latest_content(&self, page_id: PageId) -> Option<String> {
        let state = self.lock();
        let latest = state.latest_on(page_id)?;
        state.revisions.get(&latest)?.record.content.clone()
    }

    pub fn tags_of(&self, rev_id: RevisionId) -> TagSet {
        self.lock()
            .revisions
            .get(&rev_id)
            .map(|r| r.tags.clone())
            .unwrap_or_default()
    }

    pub fn saved_reverts(&self) -> Vec<RevertRequest> {
        self.lock().saved_reverts.clone()
    }

    pub fn talk_page_text(&self, user: &str) -> Option<String> {
        self.lock().talk_pages.get(user).map(|page| page.text.clone())
    }
}

#[async_trait]
impl PageStore for MemoryWiki {
    async fn revision(&self, rev_id: RevisionId) -> Result<Option<RevisionRecord>, HostError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.revisions.get(&rev_id).map(|r| r.record.clone()))
    }

    async fn previous_revision(
        &self,
        revision: &RevisionRecord,
    ) -> Result<Option<RevisionRecord>, HostError> {
        let state = self.lock();
        state.check_available()?;
        let Some(page) = state.pages.get(&revision.page_id) else {
            return Ok(None);
        };
        let previous = page
            .revisions
            .iter()
            .position(|&id| id == revision.id)
            .and_then(|pos| pos.checked_sub(1))
            .map(|pos| page.revisions[pos]);
        Ok(previous.and_then(|id| state.revisions.get(&id).map(|r| r.record.clone())))
    }

    async fn current_revision(&self, page_id: PageId) -> Result<Option<RevisionRecord>, HostError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .latest_on(page_id)
            .and_then(|id| state.revisions.get(&id))
            .map(|r| r.record.clone()))
    }

    async fn undo_content(
        &self,
        target: &RevisionRecord,
        candidate: &RevisionRecord,
        current: &RevisionRecord,
    ) -> Result<String, UndoError> {
        self.lock().check_available()?;
        let conflict = || UndoError::Conflict {
            candidate: candidate.id,
            current: current.id,
        };
        match (&target.content, &candidate.content, &current.content) {
            (Some(t), Some(c), Some(cur)) => merge::undo(t, c, cur).ok_or_else(conflict),
            _ => Err(conflict()),
        }
    }

    async fn save_revert(&self, request: RevertRequest) -> Result<RevisionId, SaveError> {
        let mut state = self.lock();
        state.check_available()?;
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            return Err(HostError::Unavailable("save failed".to_string()).into());
        }

        let page = state
            .pages
            .get(&request.page_id)
            .ok_or_else(|| HostError::NotFound(format!("page {}", request.page_id)))?;
        let title = page.title.clone();
        let latest = page.revisions.last().copied().unwrap_or_default();
        if std::mem::take(&mut state.conflict_next_save) || latest != request.base_rev_id {
            return Err(SaveError::EditConflict {
                page_id: request.page_id,
                expected: request.base_rev_id,
                actual: latest,
            });
        }

        let id = state.allocate_rev_id();
        state.insert(
            request.page_id,
            StoredRevision {
                record: RevisionRecord {
                    id,
                    page_id: request.page_id,
                    page_title: title,
                    parent_id: Some(latest),
                    user: request.actor.clone(),
                    timestamp: Utc::now(),
                    content: Some(request.content.clone()),
                },
                tags: TagSet::single(UNDO_TAG),
                original_rev_id: None,
                reverted: Some(RevertedEdit {
                    rev_id: request.reverted_rev_id,
                    user: request.reverted_user.clone(),
                }),
            },
        );
        state.saved_reverts.push(request);
        Ok(id)
    }
}

#[async_trait]
impl TagStore for MemoryWiki {
    async fn add_tags(&self, rev_id: RevisionId, tags: &TagSet) -> Result<(), HostError> {
        let mut state = self.lock();
        state.check_available()?;
        let stored = state
            .revisions
            .get_mut(&rev_id)
            .ok_or_else(|| HostError::NotFound(format!("revision {}", rev_id)))?;
        stored.tags.extend(tags);
        Ok(())
    }

    async fn tags(&self, rev_id: RevisionId) -> Result<TagSet, HostError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .revisions
            .get(&rev_id)
            .map(|r| r.tags.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RevertHistory for MemoryWiki {
    async fn count_reverts(
        &self,
        actor: &UserIdentity,
        user: &UserIdentity,
        page_id: PageId,
        since: DateTime<Utc>,
    ) -> Result<u32, HostError> {
        let state = self.lock();
        state.check_available()?;
        let count = state
            .revisions
            .values()
            .filter(|r| {
                r.record.page_id == page_id
                    && r.record.user.same_account(actor)
                    && r.record.timestamp >= since
                    && r.reverted.as_ref().is_some_and(|e| e.user.same_account(user))
            })
            .count();
        Ok(count as u32)
    }

    async fn find_revert(
        &self,
        actor: &UserIdentity,
        rev_id: RevisionId,
    ) -> Result<Option<RevisionId>, HostError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .revisions
            .values()
            .find(|r| {
                r.record.user.same_account(actor)
                    && r.reverted.as_ref().is_some_and(|e| e.rev_id == rev_id)
            })
            .map(|r| r.record.id))
    }
}

#[async_trait]
impl UserDirectory for MemoryWiki {
    async fn rights(&self, user: &UserIdentity) -> Result<Vec<String>, HostError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .users
            .get(&user.name)
            .map(|u| u.rights.clone())
            .unwrap_or_default())
    }

    async fn groups(&self, user: &UserIdentity) -> Result<Vec<String>, HostError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .users
            .get(&user.name)
            .map(|u| u.groups.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TalkPageStore for MemoryWiki {
    async fn talk_page(&self, user: &UserIdentity) -> Result<Option<TalkPage>, HostError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.talk_pages.get(&user.name).cloned())
    }

    fn discussion_tools_available(&self) -> bool {
        self.lock().discussion_tools
    }

    async fn append_message(
        &self,
        user: &UserIdentity,
        message: TalkPageMessage,
    ) -> Result<RevisionId, SaveError> {
        let mut state = self.lock();
        state.check_available()?;
        let id = state.allocate_rev_id();
        let page = state
            .talk_pages
            .entry(user.name.clone())
            .or_insert_with(|| TalkPage {
                title: format!("User talk:{}", user.name),
                content_model: WIKITEXT_CONTENT_MODEL.to_string(),
                text: String::new(),
                latest_rev_id: None,
            });

        if !page.text.is_empty() && !page.text.ends_with('\n') {
            page.text.push('\n');
        }
        if !page.text.is_empty() {
            page.text.push('\n');
        }
        if let Some(heading) = &message.heading {
            page.text.push_str(&format!("== {} ==\n", heading));
        }
        page.text.push_str(&message.body);
        page.text.push('\n');
        page.latest_rev_id = Some(id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserIdentity {
        UserIdentity::new(2, "Alice")
    }

    #[tokio::test]
    async fn test_edits_chain_parents() {
        let wiki = MemoryWiki::new();
        let page = wiki.create_page("Example");
        let first = wiki.edit(page, &alice(), "one\n").unwrap();
        let second = wiki.edit(page, &alice(), "two\n").unwrap();

        let record = wiki.revision(second).await.unwrap().unwrap();
        assert_eq!(record.parent_id, Some(first));
        let previous = wiki.previous_revision(&record).await.unwrap().unwrap();
        assert_eq!(previous.id, first);
        assert_eq!(wiki.current_revision(page).await.unwrap().unwrap().id, second);
    }

    #[tokio::test]
    async fn test_save_refuses_stale_base() {
        let wiki = MemoryWiki::new();
        let page = wiki.create_page("Example");
        let first = wiki.edit(page, &alice(), "one\n").unwrap();
        let second = wiki.edit(page, &alice(), "two\n").unwrap();

        let request = RevertRequest {
            page_id: page,
            content: "one\n".into(),
            base_rev_id: first,
            reverted_rev_id: second,
            restored_rev_id: first,
            reverted_user: alice(),
            summary: "revert".into(),
            actor: UserIdentity::new(99, "AutoModerator"),
            minor: false,
            bot: false,
        };
        let err = wiki.save_revert(request).await.unwrap_err();
        assert_eq!(
            err,
            SaveError::EditConflict {
                page_id: page,
                expected: first,
                actual: second
            }
        );
    }

    #[tokio::test]
    async fn test_revert_history_keyed_by_account_name() {
        let wiki = MemoryWiki::new();
        let page = wiki.create_page("Example");
        let vandal = UserIdentity::new(0, "192.0.2.7");
        let first = wiki.edit(page, &alice(), "one\n").unwrap();
        let bad = wiki.edit(page, &vandal, "two\n").unwrap();

        let saved = wiki
            .save_revert(RevertRequest {
                page_id: page,
                content: "one\n".into(),
                base_rev_id: bad,
                reverted_rev_id: bad,
                restored_rev_id: first,
                reverted_user: vandal.clone(),
                summary: "revert".into(),
                actor: UserIdentity::new(12, "AutoModerator"),
                minor: false,
                bot: false,
            })
            .await
            .unwrap();

        let configured = UserIdentity::new(0, "AutoModerator");
        let since = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(wiki.count_reverts(&configured, &vandal, page, since).await.unwrap(), 1);
        assert_eq!(wiki.find_revert(&configured, bad).await.unwrap(), Some(saved));
        assert_eq!(wiki.find_revert(&configured, first).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tags_union() {
        let wiki = MemoryWiki::new();
        let page = wiki.create_page("Example");
        let rev = wiki
            .record_edit(NewEdit::new(page, alice(), "x").tagged(&["visualeditor"]))
            .unwrap();
        let tags = TagSet::single("automod-passed");
        wiki.add_tags(rev, &tags).await.unwrap();
        wiki.add_tags(rev, &tags).await.unwrap();
        assert_eq!(wiki.tags_of(rev).len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_wiki_errors() {
        let wiki = MemoryWiki::new();
        wiki.set_unavailable(true);
        assert!(matches!(wiki.tags(1).await, Err(HostError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_append_message_creates_sections() {
        let wiki = MemoryWiki::new();
        let message = |heading: Option<&str>| TalkPageMessage {
            heading: heading.map(str::to_string),
            body: "Notice ~~~~".into(),
            summary: "notice".into(),
            actor: UserIdentity::new(99, "AutoModerator"),
        };
        wiki.append_message(&alice(), message(Some("May 2024"))).await.unwrap();
        wiki.append_message(&alice(), message(None)).await.unwrap();
        assert_eq!(
            wiki.talk_page_text("Alice").unwrap(),
            "== May 2024 ==\nNotice ~~~~\n\nNotice ~~~~\n"
        );
    }

    #[test]
    fn test_fixture_loading() {
        let fixture: WikiFixture = serde_json::from_str(
            r#"{
                "pages": [{
                    "id": 7,
                    "title": "Example",
                    "revisions": [
                        {"id": 100, "user": {"id": 2, "name": "Alice"}, "content": "good\n"},
                        {"id": 101, "user": {"id": 3, "name": "Bob"}, "content": "bad\n", "tags": ["mw-rollback"]}
                    ]
                }],
                "users": [{"name": "Alice", "groups": ["sysop"]}]
            }"#,
        )
        .unwrap();
        let wiki = MemoryWiki::from_fixture(fixture);
        assert_eq!(wiki.page_revisions(7), vec![100, 101]);
        let ctx = wiki.context_for(101).unwrap();
        assert_eq!(ctx.parent_rev_id, Some(100));
        assert!(ctx.tags.contains("mw-rollback"));
        assert_eq!(wiki.create_page("Next"), 8);
        assert_eq!(wiki.edit(8, &alice(), "new").unwrap(), 102);
    }
}
