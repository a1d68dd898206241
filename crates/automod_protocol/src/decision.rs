//! Outcome of evaluating one scored revision.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{RevisionId, TagSet};

/// Why a revision that scored above threshold was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotActionedReason {
    /// The candidate has no earlier revision to restore.
    NoPriorRevision,
    /// One of target, candidate or current revision has no content.
    ContentUnavailable,
    /// The undo could not be merged onto the current page.
    UndoConflict,
    /// The page moved on between merge and save.
    EditConflict,
}

impl NotActionedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotActionedReason::NoPriorRevision => "no_prior_revision",
            NotActionedReason::ContentUnavailable => "content_unavailable",
            NotActionedReason::UndoConflict => "undo_conflict",
            NotActionedReason::EditConflict => "edit_conflict",
        }
    }
}

impl fmt::Display for NotActionedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Reverted {
        revert_rev_id: RevisionId,
        restored_rev_id: RevisionId,
    },
    Passed,
    NotActioned {
        reason: NotActionedReason,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub rev_id: RevisionId,
    pub probability: f64,
    pub verdict: Verdict,
    /// Tags written to the tag store. Empty for `NotActioned`.
    pub tags: TagSet,
}

impl Decision {
    pub fn reverted(&self) -> bool {
        matches!(self.verdict, Verdict::Reverted { .. })
    }

    pub fn revert_rev_id(&self) -> Option<RevisionId> {
        match self.verdict {
            Verdict::Reverted { revert_rev_id, .. } => Some(revert_rev_id),
            _ => None,
        }
    }

    pub fn restored_rev_id(&self) -> Option<RevisionId> {
        match self.verdict {
            Verdict::Reverted {
                restored_rev_id, ..
            } => Some(restored_rev_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serialization() {
        let decision = Decision {
            rev_id: 5,
            probability: 0.9,
            verdict: Verdict::NotActioned {
                reason: NotActionedReason::EditConflict,
            },
            tags: TagSet::new(),
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["verdict"]["verdict"], "not_actioned");
        assert_eq!(json["verdict"]["reason"], "edit_conflict");
        assert!(!decision.reverted());
        assert_eq!(decision.revert_rev_id(), None);
    }

    #[test]
    fn test_reverted_accessors() {
        let decision = Decision {
            rev_id: 5,
            probability: 0.9,
            verdict: Verdict::Reverted {
                revert_rev_id: 6,
                restored_rev_id: 4,
            },
            tags: TagSet::single("automod-failed"),
        };
        assert!(decision.reverted());
        assert_eq!(decision.revert_rev_id(), Some(6));
        assert_eq!(decision.restored_rev_id(), Some(4));
    }
}
