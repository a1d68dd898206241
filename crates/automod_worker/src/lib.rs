//! Job runner for AutoModerator jobs.
//!
//! - Jobs arrive on a bounded mpsc channel and run one task each
//! - Tasks tracked with JoinHandles for bounded concurrency
//! - Transient failures redelivered with exponential backoff, permanent ones dead-lettered
//! - Every finished job reported on the outcome channel
//! - Graceful shutdown via shutdown channel

use automod_core::{JobReport, RevertDecisionService};
use automod_protocol::defaults::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_JOBS, MAX_BACKOFF_MS,
};
use automod_protocol::{AutoModeratorJob, Policy};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The runner has stopped and no longer accepts jobs.
    #[error("Job runner is no longer accepting jobs")]
    Closed,

    #[error("Job runner task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ============================================================================
// Configuration and outcomes
// ============================================================================

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrent_jobs: usize,
    /// Total deliveries per job, first one included.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RunnerConfig {
    /// Delay before redelivering a job whose `attempt`-th delivery failed.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Completed(JobReport),
    /// Permanent failure, or transient failure on the last attempt.
    DeadLettered { error: String, transient: bool },
    /// Not run to completion because the runner shut down.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job: AutoModeratorJob,
    pub attempts: u32,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub dead_lettered: usize,
    pub abandoned: usize,
    pub retries: usize,
}

// ============================================================================
// Handle
// ============================================================================

/// Handle for feeding and stopping a running job runner.
pub struct RunnerHandle {
    jobs_tx: mpsc::Sender<AutoModeratorJob>,
    shutdown_tx: mpsc::Sender<()>,
    join_handle: JoinHandle<RunSummary>,
}

impl RunnerHandle {
    pub async fn submit(&self, job: AutoModeratorJob) -> Result<(), RunnerError> {
        self.jobs_tx.send(job).await.map_err(|_| RunnerError::Closed)
    }

    /// Sender for producers that outlive this handle.
    pub fn sender(&self) -> mpsc::Sender<AutoModeratorJob> {
        self.jobs_tx.clone()
    }

    /// Close intake and wait until every job, retries included, is done.
    pub async fn finish(self) -> Result<RunSummary, RunnerError> {
        let RunnerHandle {
            jobs_tx,
            shutdown_tx,
            join_handle,
        } = self;
        drop(jobs_tx);
        let summary = join_handle.await?;
        drop(shutdown_tx);
        Ok(summary)
    }

    /// Graceful shutdown: in-flight jobs finish, queued and delayed ones are abandoned.
    pub async fn shutdown(self) -> Result<RunSummary, RunnerError> {
        let _ = self.shutdown_tx.send(()).await;
        Ok(self.join_handle.await?)
    }
}

// ============================================================================
// Runner
// ============================================================================

struct Delivery {
    key: u64,
    job: AutoModeratorJob,
    attempt: u32,
}

/// Reports the task's key when dropped, panics included.
struct DoneGuard {
    key: u64,
    tx: mpsc::UnboundedSender<u64>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.key);
    }
}

type JobResult = Result<JobReport, automod_core::ServiceError>;

pub struct JobRunner {
    config: RunnerConfig,
    service: Arc<RevertDecisionService>,
    policy: Arc<Policy>,
    intake_rx: mpsc::Receiver<AutoModeratorJob>,
    intake_closed: bool,
    outcome_tx: mpsc::UnboundedSender<JobOutcome>,
    shutdown_rx: mpsc::Receiver<()>,
    done_tx: mpsc::UnboundedSender<u64>,
    done_rx: mpsc::UnboundedReceiver<u64>,
    active_jobs: HashMap<u64, (Delivery, JoinHandle<JobResult>)>,
    pending: VecDeque<Delivery>,
    delayed: Vec<(Instant, Delivery)>,
    next_key: u64,
    summary: RunSummary,
}

impl JobRunner {
    /// Create a runner. Call [`JobRunner::spawn`] to start it.
    pub fn new(
        config: RunnerConfig,
        service: Arc<RevertDecisionService>,
        policy: Arc<Policy>,
    ) -> (Self, RunnerChannels) {
        let capacity = config.max_concurrent_jobs.max(1);
        let (jobs_tx, intake_rx) = mpsc::channel(capacity * 2);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let runner = Self {
            config: RunnerConfig {
                max_concurrent_jobs: capacity,
                max_attempts: config.max_attempts.max(1),
                ..config
            },
            service,
            policy,
            intake_rx,
            intake_closed: false,
            outcome_tx,
            shutdown_rx,
            done_tx,
            done_rx,
            active_jobs: HashMap::new(),
            pending: VecDeque::new(),
            delayed: Vec::new(),
            next_key: 0,
            summary: RunSummary::default(),
        };
        (
            runner,
            RunnerChannels {
                jobs_tx,
                shutdown_tx,
                outcomes: outcome_rx,
            },
        )
    }

    /// Start the runner on the current tokio runtime.
    pub fn spawn(
        config: RunnerConfig,
        service: Arc<RevertDecisionService>,
        policy: Arc<Policy>,
    ) -> (RunnerHandle, mpsc::UnboundedReceiver<JobOutcome>) {
        let (runner, channels) = Self::new(config, service, policy);
        let join_handle = tokio::spawn(runner.run());
        (
            RunnerHandle {
                jobs_tx: channels.jobs_tx,
                shutdown_tx: channels.shutdown_tx,
                join_handle,
            },
            channels.outcomes,
        )
    }

    /// Main event loop. Returns once intake is closed and all work is done,
    /// or after a shutdown request.
    pub async fn run(mut self) -> RunSummary {
        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            max_attempts = self.config.max_attempts,
            "job runner started"
        );

        loop {
            self.promote_due(Instant::now());
            self.start_pending();

            if self.intake_closed && self.is_idle() {
                break;
            }

            let next_due = self.delayed.iter().map(|(due, _)| *due).min();
            let accepting =
                !self.intake_closed && self.pending.len() < self.config.max_concurrent_jobs;

            tokio::select! {
                biased;

                Some(()) = self.shutdown_rx.recv() => {
                    info!(
                        active = self.active_jobs.len(),
                        "shutdown requested, draining active jobs"
                    );
                    self.drain().await;
                    break;
                }

                Some(key) = self.done_rx.recv() => {
                    self.finish_delivery(key, false).await;
                }

                _ = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)),
                    if next_due.is_some() => {}

                job = self.intake_rx.recv(), if accepting => match job {
                    Some(job) => self.enqueue(job),
                    None => {
                        debug!("job intake closed");
                        self.intake_closed = true;
                    }
                },
            }
        }

        info!(
            completed = self.summary.completed,
            dead_lettered = self.summary.dead_lettered,
            abandoned = self.summary.abandoned,
            retries = self.summary.retries,
            "job runner stopped"
        );
        self.summary
    }

    fn is_idle(&self) -> bool {
        self.active_jobs.is_empty() && self.pending.is_empty() && self.delayed.is_empty()
    }

    fn enqueue(&mut self, job: AutoModeratorJob) {
        let key = self.next_key;
        self.next_key += 1;
        debug!(rev_id = job.rev_id, "job queued");
        self.pending.push_back(Delivery {
            key,
            job,
            attempt: 1,
        });
    }

    fn promote_due(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                let (_, delivery) = self.delayed.swap_remove(i);
                self.pending.push_back(delivery);
            } else {
                i += 1;
            }
        }
    }

    fn start_pending(&mut self) {
        while self.active_jobs.len() < self.config.max_concurrent_jobs {
            let Some(delivery) = self.pending.pop_front() else {
                break;
            };
            self.start(delivery);
        }
    }

    fn start(&mut self, delivery: Delivery) {
        let service = self.service.clone();
        let policy = self.policy.clone();
        let job = delivery.job.clone();
        let guard = DoneGuard {
            key: delivery.key,
            tx: self.done_tx.clone(),
        };
        debug!(rev_id = job.rev_id, attempt = delivery.attempt, "job started");

        let handle = tokio::spawn(async move {
            let _guard = guard;
            service.run_job(&job, &policy).await
        });
        self.active_jobs.insert(delivery.key, (delivery, handle));
    }

    async fn finish_delivery(&mut self, key: u64, shutting_down: bool) {
        let Some((delivery, handle)) = self.active_jobs.remove(&key) else {
            return;
        };

        let (error, transient) = match handle.await {
            Ok(Ok(report)) => {
                self.summary.completed += 1;
                self.emit(delivery, JobStatus::Completed(report));
                return;
            }
            Ok(Err(e)) => (e.to_string(), e.is_transient()),
            Err(e) => (format!("job task failed: {}", e), false),
        };

        let rev_id = delivery.job.rev_id;
        if transient && shutting_down {
            warn!(
                rev_id,
                attempt = delivery.attempt,
                %error,
                "transient failure during shutdown, abandoning"
            );
            self.summary.abandoned += 1;
            self.emit(delivery, JobStatus::Abandoned);
        } else if transient && delivery.attempt < self.config.max_attempts {
            let delay = self.config.backoff_for(delivery.attempt);
            warn!(
                rev_id,
                attempt = delivery.attempt,
                delay_ms = delay.as_millis() as u64,
                %error,
                "transient failure, redelivering"
            );
            self.summary.retries += 1;
            self.delayed.push((
                Instant::now() + delay,
                Delivery {
                    attempt: delivery.attempt + 1,
                    ..delivery
                },
            ));
        } else {
            error!(rev_id, attempt = delivery.attempt, transient, %error, "job dead-lettered");
            self.summary.dead_lettered += 1;
            self.emit(delivery, JobStatus::DeadLettered { error, transient });
        }
    }

    /// Wait for in-flight jobs, then abandon everything not yet started.
    async fn drain(&mut self) {
        while !self.active_jobs.is_empty() {
            match self.done_rx.recv().await {
                Some(key) => self.finish_delivery(key, true).await,
                None => break,
            }
        }

        let mut leftover: Vec<Delivery> = self.pending.drain(..).collect();
        leftover.extend(self.delayed.drain(..).map(|(_, delivery)| delivery));
        while let Ok(job) = self.intake_rx.try_recv() {
            leftover.push(Delivery {
                key: 0,
                job,
                attempt: 0,
            });
        }
        for delivery in leftover {
            self.summary.abandoned += 1;
            self.emit(delivery, JobStatus::Abandoned);
        }
    }

    fn emit(&self, delivery: Delivery, status: JobStatus) {
        let outcome = JobOutcome {
            job: delivery.job,
            attempts: delivery.attempt,
            status,
        };
        if self.outcome_tx.send(outcome).is_err() {
            debug!("outcome receiver dropped");
        }
    }
}

/// Channels of a runner created with [`JobRunner::new`].
pub struct RunnerChannels {
    pub jobs_tx: mpsc::Sender<AutoModeratorJob>,
    pub shutdown_tx: mpsc::Sender<()>,
    pub outcomes: mpsc::UnboundedReceiver<JobOutcome>,
}
