//! Shared types for the AutoModerator revert decision service.
//!
//! Everything that crosses a crate boundary lives here: revision contexts,
//! scores, the policy snapshot, job descriptors and decisions.

pub mod decision;
pub mod defaults;
pub mod job;
pub mod paths;
pub mod policy;
pub mod score;
pub mod types;

pub use decision::{Decision, NotActionedReason, Verdict};
pub use job::AutoModeratorJob;
pub use policy::{CautionLevel, Policy, PolicyConfig, PolicyError, ScoringModel};
pub use score::{Score, ScoreOutput, ScoreParseError};
pub use types::{PageId, RevisionContext, RevisionId, TagSet, UserIdentity};
