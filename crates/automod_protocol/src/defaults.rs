//! Canonical default values shared by the hook, service and worker.

/// Tag applied to a revision that was scored and reverted.
pub const TAG_REVERTED: &str = "automod-failed";
/// Tag applied to a revision that was scored and left in place.
pub const TAG_PASSED: &str = "automod-passed";

/// Prefix the host puts in front of its built-in change tags (`mw-rollback`).
pub const HOST_TAG_PREFIX: &str = "mw-";

pub const DEFAULT_SKIP_TAGS: &[&str] = &["manual-revert", "rollback", "undo"];
pub const DEFAULT_SKIP_USER_RIGHTS: &[&str] = &["bot", "autopatrol"];
pub const DEFAULT_SKIP_USER_GROUPS: &[&str] = &["sysop"];

pub const DEFAULT_REVERT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_REVERTS_PER_USER_PER_PAGE: u32 = 1;
pub const DEFAULT_REVERT_WINDOW_HOURS: i64 = 24;
/// Longest revert window a policy may ask for (one leap year).
pub const MAX_REVERT_WINDOW_HOURS: i64 = 24 * 366;

pub const DEFAULT_ACTOR_NAME: &str = "AutoModerator";
pub const DEFAULT_FALSE_POSITIVE_PAGE: &str = "Project:AutoModerator/False positives";

pub const DEFAULT_SCORING_BASE_URL: &str =
    "https://api.wikimedia.org/service/lw/inference/v1/models/";
pub const MODEL_LANGUAGE_AGNOSTIC: &str = "revertrisk-language-agnostic";
pub const MODEL_MULTILINGUAL: &str = "revertrisk-multilingual";
pub const USER_AGENT_PREFIX: &str = "mediawiki.ext.AutoModerator";
pub const DEFAULT_SCORE_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 500;
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Content model the talk-page notifier is willing to write into.
pub const WIKITEXT_CONTENT_MODEL: &str = "wikitext";
