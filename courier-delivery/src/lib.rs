//! Campaign dispatch and sequence delivery
//!
//! - [`warmup`]: staged send plans for new sending domains
//! - [`rate_limiter`]: per brand and provider send pacing
//! - [`queue`]: leased job queue with backoff
//! - [`store`]: record store contracts and an in-memory implementation
//! - [`dispatch`]: checkpointed campaign batches and the shared send path
//! - [`sequence`]: enrollment lifecycle for drip sequences
//! - [`worker`]: the runtime that pulls jobs off the queue

pub mod dispatch;
pub mod error;
pub mod queue;
pub mod rate_limiter;
pub mod sequence;
pub mod store;
pub mod warmup;
pub mod worker;

pub use dispatch::{BatchOutcome, CampaignDispatcher, DispatchSettings, Services};
pub use error::DispatchError;
pub use queue::{Job, JobId, JobQueue, MemoryJobQueue, QueueError, QueuedJob, retry::RetryPolicy};
pub use rate_limiter::{RateLimitConfig, RateLimitKey, RateLimiter, SendLimiter};
pub use sequence::{SequenceEngine, StepOutcome};
pub use store::{MemoryStore, Seed, Store, StoreError};
pub use worker::{JobOutcome, Worker, WorkerConfig};
