//! Typed error handling for dispatch operations.
//!
//! Failures fall into a handful of classes that decide what happens next:
//! - Configuration problems stop the campaign (or pause the enrollment) and
//!   are never retried
//! - Provider failures are recorded against the recipient and the batch
//!   moves on
//! - Quota exhaustion throttles the job until the provider has capacity
//! - Infrastructure failures are retried with exponential backoff

use std::time::Duration;

use courier_common::ValidationError;
use courier_providers::ProviderError;
use courier_tracking::TrackingError;
use thiserror::Error;

use crate::{queue::QueueError, store::StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The brand, provider credentials or the record itself are unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The provider's rate or daily budget is used up for now.
    #[error("Sending quota exhausted, retry in {}s", .wait.as_secs())]
    QuotaExceeded { wait: Duration },

    /// The store or queue could not be reached.
    #[error("Transient infrastructure error: {0}")]
    TransientInfra(String),

    /// The contact is no longer eligible for sends.
    #[error("Recipient skipped: {0}")]
    RecipientSkipped(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Another writer changed the record between our read and write.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The requested action does not apply to the record's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DispatchError {
    /// Returns `true` if the job should be retried with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::TransientInfra(_) | Self::Conflict(_) | Self::QuotaExceeded { .. } => true,
            Self::Provider(e) => e.is_retryable(),
            Self::Config(_)
            | Self::RecipientSkipped(_)
            | Self::NotFound(_)
            | Self::InvalidState(_) => false,
        }
    }

    /// Returns `true` if the error must be fixed by a person before sending
    /// can continue.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Provider(e) => e.is_config(),
            _ => false,
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => Self::NotFound(error.to_string()),
            StoreError::Conflict { .. } => Self::Conflict(error.to_string()),
            StoreError::Unavailable(_) => Self::TransientInfra(error.to_string()),
        }
    }
}

impl From<QueueError> for DispatchError {
    fn from(error: QueueError) -> Self {
        Self::TransientInfra(error.to_string())
    }
}

impl From<ValidationError> for DispatchError {
    fn from(error: ValidationError) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<TrackingError> for DispatchError {
    fn from(error: TrackingError) -> Self {
        Self::Config(error.to_string())
    }
}
