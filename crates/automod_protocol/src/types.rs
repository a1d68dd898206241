//! Core value types: users, revisions, tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::defaults::HOST_TAG_PREFIX;

pub type RevisionId = u64;
pub type PageId = u64;

/// An editor as the host identifies them. Anonymous editors carry id 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: u64,
    pub name: String,
}

impl UserIdentity {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }

    /// Same account on the host. The name is the host's canonical key.
    pub fn same_account(&self, other: &UserIdentity) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Ordered set of change tags.
///
/// Union is the only way two sets are combined, so applying the same tags
/// twice converges on the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(tag: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.insert(tag);
        set
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn union(&self, other: &TagSet) -> TagSet {
        TagSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn extend(&mut self, other: &TagSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether any tag in this set names one of `skip_tags`.
    ///
    /// Host built-in tags are prefixed (`mw-rollback`), while skip lists are
    /// written without the prefix (`rollback`); both spellings match.
    pub fn matches_any(&self, skip_tags: &[String]) -> bool {
        self.iter().any(|tag| {
            let bare = tag.strip_prefix(HOST_TAG_PREFIX).unwrap_or(tag);
            skip_tags.iter().any(|skip| skip == tag || skip == bare)
        })
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        TagSet(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", joined.join(", "))
    }
}

// ============================================================================
// Revision context
// ============================================================================

/// Identifies one candidate edit. Built per edit event and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionContext {
    pub rev_id: RevisionId,
    pub parent_rev_id: Option<RevisionId>,
    pub page_id: PageId,
    pub user: UserIdentity,
    /// Set when the edit restored an earlier revision verbatim.
    pub original_rev_id: Option<RevisionId>,
    pub tags: TagSet,
}

impl RevisionContext {
    pub fn is_null_edit(&self) -> bool {
        self.original_rev_id.is_some()
    }
}
