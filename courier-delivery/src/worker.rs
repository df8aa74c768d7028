//! Queue-driven worker runtime
//!
//! A worker leases due jobs from the shared queue, runs them through the
//! campaign dispatcher or the sequence engine and puts them back according
//! to the outcome. Several workers may share one queue.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use courier_common::{Signal, internal, tracing};
use serde::Deserialize;

use crate::{
    dispatch::{CampaignDispatcher, DispatchSettings, Services, wait_as_delta},
    error::DispatchError,
    queue::{Job, QueuedJob, retry::RetryPolicy},
    sequence::SequenceEngine,
};

const fn default_batch_size() -> usize {
    100
}

const fn default_poll_interval() -> u64 {
    1
}

const fn default_workers() -> usize {
    1
}

const fn default_max_consecutive_failures() -> u32 {
    3
}

const fn default_max_job_attempts() -> u32 {
    5
}

const fn default_shutdown_timeout() -> u64 {
    30
}

const fn default_scheduler_tick() -> u64 {
    60
}

const fn default_max_inline_wait() -> u64 {
    2000
}

const fn default_max_recipient_attempts() -> u32 {
    3
}

const fn default_max_jobs_per_poll() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Contacts examined per campaign job
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How often to look for due jobs (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Number of workers sharing the queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Consecutive failed campaign jobs before the campaign is marked failed
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Failed attempts at a sequence step before the enrollment is paused
    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: u32,

    /// Backoff between failed attempts of a job
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Grace period for an in-flight job on shutdown (in seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// How often to promote due scheduled campaigns and warmup stages (in
    /// seconds)
    #[serde(default = "default_scheduler_tick")]
    pub scheduler_tick_secs: u64,

    /// Longest a send waits in place for a rate-limit permit (in
    /// milliseconds)
    #[serde(default = "default_max_inline_wait")]
    pub max_inline_wait_ms: u64,

    /// Transient send failures of one campaign recipient before it is
    /// counted failed
    #[serde(default = "default_max_recipient_attempts")]
    pub max_recipient_attempts: u32,

    /// Jobs run per poll before the worker yields to the next tick
    #[serde(default = "default_max_jobs_per_poll")]
    pub max_jobs_per_poll: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            workers: default_workers(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_job_attempts: default_max_job_attempts(),
            retry: RetryPolicy::default(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            scheduler_tick_secs: default_scheduler_tick(),
            max_inline_wait_ms: default_max_inline_wait(),
            max_recipient_attempts: default_max_recipient_attempts(),
            max_jobs_per_poll: default_max_jobs_per_poll(),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub const fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            batch_size: self.batch_size,
            max_inline_wait: Duration::from_millis(self.max_inline_wait_ms),
            retry: self.retry,
            max_recipient_attempts: self.max_recipient_attempts,
        }
    }

    const fn attempt_limit(&self, job: &Job) -> u32 {
        match job {
            Job::CampaignBatch { .. } => self.max_consecutive_failures,
            Job::SequenceStep { .. } => self.max_job_attempts,
        }
    }
}

/// What happened to a job after it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Put back to run again at `at`
    Rescheduled { at: DateTime<Utc> },
    Completed,
    /// Failed and put back with backoff
    Retrying { attempt: u32, at: DateTime<Utc> },
    /// Failed for good
    DeadLettered { error: String },
}

#[derive(Debug, Clone)]
pub struct Worker {
    config: WorkerConfig,
    services: Services,
    campaigns: CampaignDispatcher,
    sequences: SequenceEngine,
}

impl Worker {
    #[must_use]
    pub fn new(config: WorkerConfig, services: Services) -> Self {
        let settings = config.dispatch_settings();

        Self {
            campaigns: CampaignDispatcher::new(services.clone(), settings),
            sequences: SequenceEngine::new(services.clone(), settings),
            config,
            services,
        }
    }

    #[must_use]
    pub const fn campaigns(&self) -> &CampaignDispatcher {
        &self.campaigns
    }

    #[must_use]
    pub const fn sequences(&self) -> &SequenceEngine {
        &self.sequences
    }

    /// Lease and run one due job. Returns `None` when nothing is due.
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, DispatchError> {
        let queue = &self.services.queue;
        let Some(queued) = queue.reserve(self.services.clock.now()).await? else {
            return Ok(None);
        };

        internal!(job_id = %queued.id, job = %queued.job, attempts = queued.attempts, "Running job");

        let outcome = match self.execute(&queued.job).await {
            Ok(Some(at)) => {
                queue.requeue(queued.id, at).await?;
                JobOutcome::Rescheduled { at }
            }
            Ok(None) => {
                queue.complete(queued.id).await?;
                JobOutcome::Completed
            }
            Err(e) => self.handle_failure(&queued, e).await?,
        };

        Ok(Some(outcome))
    }

    /// Run jobs until none is due. Returns how many ran.
    pub async fn drain(&self) -> Result<usize, DispatchError> {
        self.drain_until(usize::MAX, &AtomicBool::new(false)).await
    }

    /// Run due jobs until none is left, `limit` have run or `stop` is set.
    /// Returns how many ran.
    pub async fn drain_until(
        &self,
        limit: usize,
        stop: &AtomicBool,
    ) -> Result<usize, DispatchError> {
        let mut ran = 0;
        while ran < limit && !stop.load(Ordering::SeqCst) {
            if self.run_once().await?.is_none() {
                break;
            }
            ran += 1;
        }
        Ok(ran)
    }

    /// Enqueue campaigns whose scheduled time or warmup stage has come.
    pub async fn tick(&self) -> Result<usize, DispatchError> {
        self.campaigns.schedule_due().await
    }

    async fn execute(&self, job: &Job) -> Result<Option<DateTime<Utc>>, DispatchError> {
        match job {
            Job::CampaignBatch { campaign_id } => Ok(self
                .campaigns
                .process_batch(campaign_id)
                .await?
                .next_run()),
            Job::SequenceStep {
                sequence_id,
                enrollment_id,
            } => Ok(self
                .sequences
                .process_step(sequence_id, enrollment_id)
                .await?
                .next_run()),
        }
    }

    async fn handle_failure(
        &self,
        queued: &QueuedJob,
        error: DispatchError,
    ) -> Result<JobOutcome, DispatchError> {
        let queue = &self.services.queue;
        let attempt = queued.attempts + 1;
        let reason = error.to_string();

        if error.is_retryable() && attempt < self.config.attempt_limit(&queued.job) {
            let at = self.services.clock.now() + wait_as_delta(self.config.retry.delay(attempt));
            tracing::warn!(
                job = %queued.job,
                attempt,
                retry_at = %at,
                error = %reason,
                "Job failed, retrying with backoff"
            );
            queue.retry(queued.id, at, reason).await?;
            return Ok(JobOutcome::Retrying { attempt, at });
        }

        tracing::error!(job = %queued.job, attempt, error = %reason, "Job failed permanently");
        queue.dead_letter(queued.id, reason.clone()).await?;

        if !matches!(error, DispatchError::NotFound(_)) {
            self.give_up(&queued.job, &reason).await;
        }

        Ok(JobOutcome::DeadLettered { error: reason })
    }

    /// Surface a job that will not run again on its record.
    async fn give_up(&self, job: &Job, reason: &str) {
        let result = match job {
            Job::CampaignBatch { campaign_id } => {
                self.campaigns.fail(campaign_id, reason).await.map(drop)
            }
            Job::SequenceStep { enrollment_id, .. } => self
                .sequences
                .pause_enrollment(enrollment_id, reason)
                .await
                .map(drop),
        };

        if let Err(e) = result {
            tracing::error!(job = %job, error = %e, "Failed to record job failure");
        }
    }

    /// Run the worker until a shutdown signal arrives.
    ///
    /// Each poll runs up to `max_jobs_per_poll` jobs on a separate task so
    /// the scheduler tick and the shutdown signal are never starved. A poll
    /// that finds the previous one still running is skipped. On shutdown no
    /// new job is started and the in-flight one is given
    /// `shutdown_timeout_secs` to finish. A job that does not finish keeps
    /// its lease and is picked up again once the lease expires.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DispatchError> {
        internal!(level = INFO, "Dispatch worker starting");

        let mut poll_timer =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        let mut tick_timer =
            tokio::time::interval(Duration::from_secs(self.config.scheduler_tick_secs.max(1)));

        let processing = Arc::new(AtomicBool::new(false));
        let stopping = Arc::new(AtomicBool::new(false));
        let limit = self.config.max_jobs_per_poll.max(1);

        loop {
            tokio::select! {
                _ = tick_timer.tick() => {
                    match self.tick().await {
                        Ok(count) if count > 0 => {
                            tracing::info!("Scheduler promoted {count} campaigns");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!("Error promoting due campaigns: {e}");
                        }
                    }
                }
                _ = poll_timer.tick() => {
                    if processing.swap(true, Ordering::SeqCst) {
                        internal!("Previous poll still running, skipping");
                    } else {
                        let worker = self.clone();
                        let processing = Arc::clone(&processing);
                        let stopping = Arc::clone(&stopping);

                        tokio::spawn(async move {
                            match worker.drain_until(limit, &stopping).await {
                                Ok(count) if count > 0 => {
                                    tracing::debug!("Ran {count} jobs");
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    tracing::error!("Error running jobs: {e}");
                                }
                            }

                            processing.store(false, Ordering::SeqCst);
                        });
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(level = INFO, "Dispatch worker received shutdown signal");
                            stopping.store(true, Ordering::SeqCst);

                            let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
                            let start = tokio::time::Instant::now();

                            while processing.load(Ordering::SeqCst) {
                                if start.elapsed() >= timeout {
                                    tracing::warn!(
                                        "Shutdown timeout exceeded, the in-flight job will run again once its lease expires"
                                    );
                                    break;
                                }
                                tokio::time::sleep(Duration::from_millis(100)).await;
                            }

                            internal!(level = INFO, "Dispatch worker shutdown complete");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("Dispatch worker shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
