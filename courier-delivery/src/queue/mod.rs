//! Job queue shared by dispatch workers
//!
//! Jobs are leased, not popped: a reserved job stays invisible to other
//! workers until it is completed, requeued or retried, or until its lease
//! runs out and it becomes due again. A job that is pending or leased is
//! never enqueued twice.

pub mod retry;

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use courier_common::{CampaignId, EnrollmentId, SequenceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Work item payloads
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Send the next batch of a campaign from its persisted cursor
    CampaignBatch { campaign_id: CampaignId },
    /// Send the current step of one enrollment
    SequenceStep {
        sequence_id: SequenceId,
        enrollment_id: EnrollmentId,
    },
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CampaignBatch { campaign_id } => write!(f, "campaign {campaign_id}"),
            Self::SequenceStep {
                sequence_id,
                enrollment_id,
            } => write!(f, "sequence {sequence_id} enrollment {enrollment_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub job: Job,
    /// Failed attempts since the job last made progress
    pub attempts: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Job {0} is not leased")]
    NotLeased(JobId),
}

#[async_trait]
pub trait JobQueue: Send + Sync + fmt::Debug {
    /// Add `job`, due at `run_at`.
    ///
    /// Returns `false` when the job is already pending or leased. A pending
    /// duplicate is moved earlier if `run_at` is sooner.
    async fn enqueue(&self, job: Job, run_at: DateTime<Utc>) -> Result<bool, QueueError>;

    /// Lease the earliest job due at `now`.
    async fn reserve(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>, QueueError>;

    /// Drop a finished job.
    async fn complete(&self, id: JobId) -> Result<(), QueueError>;

    /// Put a job that made progress back, due at `run_at`, with its failure
    /// count cleared.
    async fn requeue(&self, id: JobId, run_at: DateTime<Utc>) -> Result<(), QueueError>;

    /// Put a failed job back, due at `run_at`, counting the failure.
    async fn retry(
        &self,
        id: JobId,
        run_at: DateTime<Utc>,
        error: String,
    ) -> Result<(), QueueError>;

    /// Park a job that will not be attempted again.
    async fn dead_letter(&self, id: JobId, error: String) -> Result<(), QueueError>;

    /// Number of jobs waiting to be reserved.
    async fn pending(&self) -> Result<usize, QueueError>;
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<QueuedJob>,
    leased: HashMap<JobId, (QueuedJob, DateTime<Utc>)>,
    dead: Vec<QueuedJob>,
}

impl QueueState {
    fn reclaim_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<JobId> = self
            .leased
            .iter()
            .filter(|(_, (_, until))| *until <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some((job, _)) = self.leased.remove(&id) {
                self.pending.push(job);
            }
        }
    }

    fn take_leased(&mut self, id: JobId) -> Result<QueuedJob, QueueError> {
        self.leased
            .remove(&id)
            .map(|(job, _)| job)
            .ok_or(QueueError::NotLeased(id))
    }
}

/// In-process queue for a single-node deployment and for tests
#[derive(Debug)]
pub struct MemoryJobQueue {
    lease: Duration,
    state: parking_lot::Mutex<QueueState>,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

impl MemoryJobQueue {
    /// A queue whose leases expire after `lease`.
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            state: parking_lot::Mutex::new(QueueState::default()),
        }
    }

    /// Jobs waiting to be reserved, earliest first.
    pub fn pending_jobs(&self) -> Vec<QueuedJob> {
        let mut jobs = self.state.lock().pending.clone();
        jobs.sort_by_key(|job| (job.run_at, job.id));
        jobs
    }

    /// Jobs that were given up on.
    pub fn dead_letters(&self) -> Vec<QueuedJob> {
        self.state.lock().dead.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job, run_at: DateTime<Utc>) -> Result<bool, QueueError> {
        let mut state = self.state.lock();

        if state.leased.values().any(|(leased, _)| leased.job == job) {
            return Ok(false);
        }

        if let Some(existing) = state.pending.iter_mut().find(|queued| queued.job == job) {
            existing.run_at = existing.run_at.min(run_at);
            return Ok(false);
        }

        state.pending.push(QueuedJob {
            id: JobId::generate(),
            job,
            attempts: 0,
            run_at,
            last_error: None,
        });
        drop(state);

        Ok(true)
    }

    async fn reserve(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>, QueueError> {
        let mut state = self.state.lock();
        state.reclaim_expired(now);

        let next = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, job)| job.run_at <= now)
            .min_by_key(|(_, job)| (job.run_at, job.id))
            .map(|(index, _)| index);

        let Some(index) = next else {
            return Ok(None);
        };

        let job = state.pending.swap_remove(index);
        state.leased.insert(job.id, (job.clone(), now + self.lease));
        drop(state);

        Ok(Some(job))
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        self.state.lock().take_leased(id).map(|_| ())
    }

    async fn requeue(&self, id: JobId, run_at: DateTime<Utc>) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let mut job = state.take_leased(id)?;
        job.attempts = 0;
        job.last_error = None;
        job.run_at = run_at;
        state.pending.push(job);
        drop(state);

        Ok(())
    }

    async fn retry(
        &self,
        id: JobId,
        run_at: DateTime<Utc>,
        error: String,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let mut job = state.take_leased(id)?;
        job.attempts += 1;
        job.last_error = Some(error);
        job.run_at = run_at;
        state.pending.push(job);
        drop(state);

        Ok(())
    }

    async fn dead_letter(&self, id: JobId, error: String) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let mut job = state.take_leased(id)?;
        job.attempts += 1;
        job.last_error = Some(error);
        state.dead.push(job);
        drop(state);

        Ok(())
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().pending.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn campaign_job(id: &str) -> Job {
        Job::CampaignBatch {
            campaign_id: CampaignId::from(id),
        }
    }

    #[tokio::test]
    async fn test_reserve_respects_run_at() {
        let queue = MemoryJobQueue::default();
        let now = Utc::now();

        queue
            .enqueue(campaign_job("later"), now + Duration::minutes(5))
            .await
            .unwrap();
        queue.enqueue(campaign_job("now"), now).await.unwrap();

        let job = queue.reserve(now).await.unwrap().unwrap();
        assert_eq!(job.job, campaign_job("now"));
        assert!(queue.reserve(now).await.unwrap().is_none());

        let job = queue
            .reserve(now + Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.job, campaign_job("later"));
    }

    #[tokio::test]
    async fn test_duplicates_are_merged() {
        let queue = MemoryJobQueue::default();
        let now = Utc::now();

        assert!(
            queue
                .enqueue(campaign_job("c"), now + Duration::hours(1))
                .await
                .unwrap()
        );
        assert!(!queue.enqueue(campaign_job("c"), now).await.unwrap());
        assert_eq!(queue.pending().await.unwrap(), 1);
        assert_eq!(queue.pending_jobs()[0].run_at, now);

        let leased = queue.reserve(now).await.unwrap().unwrap();
        assert!(!queue.enqueue(campaign_job("c"), now).await.unwrap());

        queue.complete(leased.id).await.unwrap();
        assert!(queue.enqueue(campaign_job("c"), now).await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_counts_failures_and_requeue_clears_them() {
        let queue = MemoryJobQueue::default();
        let now = Utc::now();
        queue.enqueue(campaign_job("c"), now).await.unwrap();

        let job = queue.reserve(now).await.unwrap().unwrap();
        queue
            .retry(job.id, now, "store timeout".to_string())
            .await
            .unwrap();

        let job = queue.reserve(now).await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("store timeout"));

        queue.requeue(job.id, now).await.unwrap();
        let job = queue.reserve(now).await.unwrap().unwrap();
        assert_eq!(job.attempts, 0);
        assert!(job.last_error.is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        let queue = MemoryJobQueue::new(Duration::seconds(30));
        let now = Utc::now();
        queue.enqueue(campaign_job("c"), now).await.unwrap();

        let first = queue.reserve(now).await.unwrap().unwrap();
        assert!(queue.reserve(now + Duration::seconds(10)).await.unwrap().is_none());

        let second = queue
            .reserve(now + Duration::seconds(31))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_dead_letter() {
        let queue = MemoryJobQueue::default();
        let now = Utc::now();
        queue.enqueue(campaign_job("c"), now).await.unwrap();

        let job = queue.reserve(now).await.unwrap().unwrap();
        queue
            .dead_letter(job.id, "brand inactive".to_string())
            .await
            .unwrap();

        assert_eq!(queue.pending().await.unwrap(), 0);
        assert_eq!(queue.dead_letters().len(), 1);
        assert!(matches!(
            queue.complete(job.id).await,
            Err(QueueError::NotLeased(_))
        ));
    }

    #[test]
    fn test_job_payload_shape() {
        let job = Job::SequenceStep {
            sequence_id: SequenceId::from("s-1"),
            enrollment_id: EnrollmentId::from("e-1"),
        };
        assert_eq!(
            serde_json::to_value(&job).unwrap(),
            serde_json::json!({"type": "sequence_step", "sequence_id": "s-1", "enrollment_id": "e-1"})
        );
    }
}
