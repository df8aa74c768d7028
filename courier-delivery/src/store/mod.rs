//! Record store contracts
//!
//! Every record the pipeline writes carries a `version`. Saving a record
//! whose version no longer matches the stored one fails with
//! [`StoreError::Conflict`]; a successful save bumps the version and returns
//! the stored copy.

pub mod memory;

use async_trait::async_trait;
use courier_common::{
    BrandId, CampaignId, ContactId, EnrollmentId, ListId, SequenceId,
    models::{
        Brand, Campaign, CampaignStatus, Contact, EmailSequence, EnrollmentStatus,
        SequenceEnrollment, TrackingEvent,
    },
};
use thiserror::Error;

pub use memory::{MemoryStore, Seed};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} was modified concurrently")]
    Conflict { kind: &'static str, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn conflict(kind: &'static str, id: impl ToString) -> Self {
        Self::Conflict {
            kind,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[async_trait]
pub trait BrandStore: Send + Sync {
    async fn brand(&self, id: &BrandId) -> Result<Brand, StoreError>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn campaign(&self, id: &CampaignId) -> Result<Campaign, StoreError>;

    async fn save_campaign(&self, campaign: &Campaign) -> Result<Campaign, StoreError>;

    async fn campaigns_with_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, StoreError>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn contact(&self, id: &ContactId) -> Result<Contact, StoreError>;

    /// Contacts of `list` in a stable order, starting at `offset`.
    ///
    /// Contacts keep their position when their status changes, so an offset
    /// taken from a checkpoint always points at the same contact.
    async fn list_page(
        &self,
        list: &ListId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError>;

    async fn count_active(&self, list: &ListId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn sequence(&self, id: &SequenceId) -> Result<EmailSequence, StoreError>;

    async fn save_sequence(&self, sequence: &EmailSequence) -> Result<EmailSequence, StoreError>;

    async fn enrollment(&self, id: &EnrollmentId) -> Result<SequenceEnrollment, StoreError>;

    async fn find_enrollment(
        &self,
        sequence: &SequenceId,
        contact: &ContactId,
    ) -> Result<Option<SequenceEnrollment>, StoreError>;

    async fn enrollments_for_contact(
        &self,
        contact: &ContactId,
    ) -> Result<Vec<SequenceEnrollment>, StoreError>;

    async fn enrollments_with_status(
        &self,
        sequence: &SequenceId,
        status: EnrollmentStatus,
    ) -> Result<Vec<SequenceEnrollment>, StoreError>;

    /// Store a new enrollment. Fails with a conflict when the contact is
    /// already enrolled in the sequence.
    async fn insert_enrollment(
        &self,
        enrollment: &SequenceEnrollment,
    ) -> Result<SequenceEnrollment, StoreError>;

    async fn save_enrollment(
        &self,
        enrollment: &SequenceEnrollment,
    ) -> Result<SequenceEnrollment, StoreError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_event(&self, event: TrackingEvent) -> Result<(), StoreError>;
}

/// Everything the pipeline reads and writes
pub trait Store:
    BrandStore + CampaignStore + ContactStore + SequenceStore + EventStore + std::fmt::Debug
{
}

impl<T> Store for T where
    T: BrandStore + CampaignStore + ContactStore + SequenceStore + EventStore + std::fmt::Debug
{
}
