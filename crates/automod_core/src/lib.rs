//! Revert decision service for AutoModerator.
//!
//! A saved revision passes through the [`hook::EditHook`] which queues an
//! [`automod_protocol::AutoModeratorJob`]. The job is later handed to
//! [`service::RevertDecisionService::run_job`], which scores the revision,
//! decides whether to revert it, tags it and notifies the editor.
//!
//! The wiki itself is reached only through the traits in [`host`].
//! [`memory::MemoryWiki`] implements all of them in memory.

pub mod decision;
pub mod hook;
pub mod host;
pub mod memory;
pub mod notifier;
pub mod precheck;
pub mod score_client;
pub mod service;

pub use decision::{revert_summary, DecisionEngine, DecisionError};
pub use hook::EditHook;
pub use host::{
    Collaborators, HostError, PageStore, RevertHistory, RevertRequest, RevisionRecord, SaveError,
    TagStore, TalkPage, TalkPageMessage, TalkPageStore, UndoError, UserDirectory,
};
pub use memory::{MemoryWiki, NewEdit, WikiFixture};
pub use notifier::{NotifyOutcome, TalkPageNotifier};
pub use precheck::{Eligibility, PreCheck, SkipReason};
pub use score_client::{ScoreClient, ScoreClientConfig, ScoreError, ScoreRequest, ScoreSource};
pub use service::{JobReport, RevertDecisionService, ServiceConfig, ServiceError};
