//! `automod replay`: run recorded jobs against a wiki fixture.
//!
//! Prints one JSON line per finished job and a summary line at the end.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use automod_core::{
    Collaborators, JobReport, MemoryWiki, NotifyOutcome, RevertDecisionService, ScoreClient,
    ScoreError, ScoreRequest, ScoreSource, WikiFixture,
};
use automod_protocol::{AutoModeratorJob, Policy, Score};
use automod_worker::{JobOutcome, JobRunner, JobStatus};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::config::{RunnerArgs, ScoringArgs, ServiceArgs};

pub struct ReplayArgs {
    pub wiki: PathBuf,
    pub jobs: PathBuf,
    pub policy: PathBuf,
    pub offline: bool,
    pub service: ServiceArgs,
    pub runner: RunnerArgs,
    pub scoring: ScoringArgs,
}

/// Score source for `--offline`: every job must carry its own score.
struct NoScores;

#[async_trait]
impl ScoreSource for NoScores {
    async fn fetch_score(&self, request: &ScoreRequest) -> Result<Score, ScoreError> {
        Err(ScoreError::Config(format!(
            "offline replay has no score for revision {}",
            request.rev_id
        )))
    }
}

pub async fn run(args: ReplayArgs) -> Result<()> {
    let policy = Policy::from_path(&args.policy)
        .with_context(|| format!("Policy file {} is not valid", args.policy.display()))?;
    let fixture = load_fixture(&args.wiki)?;
    let jobs = load_jobs(&args.jobs)?;

    let scores: Arc<dyn ScoreSource> = if args.offline {
        let missing: Vec<u64> = jobs
            .iter()
            .filter(|job| job.scores.is_none())
            .map(|job| job.rev_id)
            .collect();
        if !missing.is_empty() {
            bail!(
                "--offline requires every job to carry scores; missing for revisions {:?}",
                missing
            );
        }
        Arc::new(NoScores)
    } else {
        Arc::new(
            ScoreClient::new(args.scoring.client_config())
                .context("Invalid scoring settings")?,
        )
    };

    let wiki = Arc::new(MemoryWiki::from_fixture(fixture));
    let service = Arc::new(RevertDecisionService::new(
        args.service.service_config(),
        Collaborators::from_host(wiki.clone()),
        scores,
    ));

    info!(jobs = jobs.len(), offline = args.offline, "replaying jobs");
    let (handle, mut outcomes) =
        JobRunner::spawn(args.runner.runner_config(), service, Arc::new(policy));

    let printer = tokio::spawn(async move {
        while let Some(outcome) = outcomes.recv().await {
            println!("{}", outcome_json(&outcome));
        }
    });

    for job in jobs {
        handle
            .submit(job)
            .await
            .context("Job runner stopped before all jobs were submitted")?;
    }
    let summary = handle.finish().await?;
    printer.await?;

    println!("{}", json!({ "summary": summary }));
    Ok(())
}

fn load_fixture(path: &Path) -> Result<WikiFixture> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read wiki fixture {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Wiki fixture {} is not valid", path.display()))
}

fn load_jobs(path: &Path) -> Result<Vec<AutoModeratorJob>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read jobs file {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid job", path.display(), index + 1))
        })
        .collect()
}

fn outcome_json(outcome: &JobOutcome) -> Value {
    let (status, detail) = match &outcome.status {
        JobStatus::Completed(report) => ("completed", report_json(report)),
        JobStatus::DeadLettered { error, transient } => (
            "dead_lettered",
            json!({ "error": error, "transient": transient }),
        ),
        JobStatus::Abandoned => ("abandoned", Value::Null),
    };
    json!({
        "rev_id": outcome.job.rev_id,
        "attempts": outcome.attempts,
        "status": status,
        "detail": detail,
    })
}

fn report_json(report: &JobReport) -> Value {
    match report {
        JobReport::AlreadyEvaluated { tags, .. } => {
            json!({ "kind": "already_evaluated", "tags": tags })
        }
        JobReport::Skipped { reason, .. } => {
            json!({ "kind": "skipped", "reason": reason.to_string() })
        }
        JobReport::Decided {
            decision,
            notification,
        } => json!({
            "kind": "decided",
            "decision": decision,
            "notification": notification.as_ref().map(notification_label),
        }),
    }
}

fn notification_label(outcome: &NotifyOutcome) -> String {
    match outcome {
        NotifyOutcome::Delivered { talk_rev_id } => {
            format!("delivered as revision {}", talk_rev_id)
        }
        NotifyOutcome::Disabled => "disabled".to_string(),
        NotifyOutcome::Skipped(reason) => format!("skipped: {}", reason),
        NotifyOutcome::Failed(error) => format!("failed: {}", error),
    }
}
