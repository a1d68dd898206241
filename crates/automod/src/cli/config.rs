//! Service settings shared by subcommands.
//!
//! Every flag falls back to an `AUTOMOD_*` environment variable, then to the
//! defaults in `automod_protocol::defaults`.

use automod_core::{ScoreClientConfig, ServiceConfig};
use automod_protocol::defaults::{
    DEFAULT_ACTOR_NAME, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_JOBS,
    DEFAULT_SCORE_TIMEOUT_SECS, DEFAULT_SCORING_BASE_URL,
};
use automod_protocol::UserIdentity;
use automod_worker::RunnerConfig;
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct ScoringArgs {
    /// Prediction service prefix; the model name and `:predict` are appended
    #[arg(long, env = "AUTOMOD_SCORING_URL", default_value = DEFAULT_SCORING_BASE_URL)]
    pub scoring_url: String,

    /// Override the Host header sent to the prediction service
    #[arg(long, env = "AUTOMOD_SCORING_HOST")]
    pub scoring_host: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "AUTOMOD_SCORE_TIMEOUT_SECS", default_value_t = DEFAULT_SCORE_TIMEOUT_SECS)]
    pub score_timeout_secs: u64,
}

impl ScoringArgs {
    pub fn client_config(&self) -> ScoreClientConfig {
        ScoreClientConfig {
            base_url: self.scoring_url.clone(),
            host_header: self.scoring_host.clone(),
            timeout: Duration::from_secs(self.score_timeout_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(long, env = "AUTOMOD_WIKI_ID", default_value = "enwiki")]
    pub wiki_id: String,

    /// Content language, sent to the model and used for model selection
    #[arg(long, env = "AUTOMOD_LANG", default_value = "en")]
    pub lang: String,

    /// Account the reverts are saved as
    #[arg(long, env = "AUTOMOD_ACTOR_NAME", default_value = DEFAULT_ACTOR_NAME)]
    pub actor_name: String,

    #[arg(long, env = "AUTOMOD_ACTOR_ID", default_value_t = 0)]
    pub actor_id: u64,
}

impl ServiceArgs {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            wiki_id: self.wiki_id.clone(),
            lang: self.lang.clone(),
            actor: UserIdentity::new(self.actor_id, self.actor_name.clone()),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunnerArgs {
    #[arg(long, env = "AUTOMOD_MAX_CONCURRENT_JOBS", default_value_t = DEFAULT_MAX_CONCURRENT_JOBS)]
    pub max_concurrent_jobs: usize,

    /// Deliveries per job before it is dead-lettered
    #[arg(long, env = "AUTOMOD_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

impl RunnerArgs {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_concurrent_jobs: self.max_concurrent_jobs,
            max_attempts: self.max_attempts,
            ..RunnerConfig::default()
        }
    }
}
