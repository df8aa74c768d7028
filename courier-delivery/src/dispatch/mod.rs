//! Campaign dispatch
//!
//! [`Services`] bundles the collaborators every job needs. The send path in
//! [`send`] is shared by campaign batches and sequence steps so both inject
//! tracking, respect rate limits and record deliveries the same way.

pub mod campaign;
pub mod send;

use std::{sync::Arc, time::Duration};

use courier_common::Clock;
use courier_providers::ProviderResolver;
use courier_tracking::TrackingInjector;

use crate::{
    queue::{JobQueue, retry::RetryPolicy},
    rate_limiter::SendLimiter,
    store::Store,
};

pub use campaign::{BatchOutcome, CampaignDispatcher, validate_campaign};
pub use send::{Message, Sender, Source};

/// Injected dependencies shared by the dispatcher, the sequence engine and
/// the worker
#[derive(Debug, Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn JobQueue>,
    pub providers: Arc<dyn ProviderResolver>,
    pub limiter: Arc<dyn SendLimiter>,
    pub injector: Arc<TrackingInjector>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Contacts examined per campaign job
    pub batch_size: usize,
    /// Longest a send waits in place for a rate-limit permit before the job
    /// is throttled instead
    pub max_inline_wait: Duration,
    /// Backoff before a recipient's send is tried again
    pub retry: RetryPolicy,
    /// Transient failures before a recipient is counted failed
    pub max_recipient_attempts: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_inline_wait: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            max_recipient_attempts: 3,
        }
    }
}

/// Attempts at a read-modify-write before giving up on a contended record
pub(crate) const UPDATE_ATTEMPTS: usize = 3;

/// Convert a wait into a wall-clock offset, capped at a day.
pub(crate) fn wait_as_delta(wait: Duration) -> chrono::Duration {
    chrono::Duration::from_std(wait)
        .unwrap_or_else(|_| chrono::Duration::days(1))
        .min(chrono::Duration::days(1))
}
