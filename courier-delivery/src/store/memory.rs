//! In-memory record store

use async_trait::async_trait;
use courier_common::{
    BrandId, CampaignId, ContactId, EnrollmentId, ListId, SequenceId,
    models::{
        Brand, Campaign, CampaignStatus, Contact, ContactStatus, EmailSequence, EnrollmentStatus,
        SequenceEnrollment, TrackingEvent,
    },
};
use dashmap::{DashMap, mapref::entry::Entry};
use serde::Deserialize;

use super::{BrandStore, CampaignStore, ContactStore, EventStore, SequenceStore, StoreError};

/// Records to preload into a [`MemoryStore`]
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub brands: Vec<Brand>,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    /// Contacts in list order
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub sequences: Vec<EmailSequence>,
    #[serde(default)]
    pub enrollments: Vec<SequenceEnrollment>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    brands: DashMap<BrandId, Brand>,
    campaigns: DashMap<CampaignId, Campaign>,
    contacts: DashMap<ContactId, Contact>,
    lists: DashMap<ListId, Vec<ContactId>>,
    sequences: DashMap<SequenceId, EmailSequence>,
    enrollments: DashMap<EnrollmentId, SequenceEnrollment>,
    enrollment_index: DashMap<(SequenceId, ContactId), EnrollmentId>,
    events: parking_lot::Mutex<Vec<TrackingEvent>>,
}

/// Compare-and-swap on a versioned record.
fn save_versioned<K, V>(
    map: &DashMap<K, V>,
    key: &K,
    record: &V,
    kind: &'static str,
    version: impl Fn(&V) -> u64,
    bump: impl Fn(&mut V),
) -> Result<V, StoreError>
where
    K: Eq + std::hash::Hash + std::fmt::Display,
    V: Clone,
{
    let mut stored = map
        .get_mut(key)
        .ok_or_else(|| StoreError::not_found(kind, key))?;

    if version(&*stored) != version(record) {
        return Err(StoreError::conflict(kind, key));
    }

    let mut saved = record.clone();
    bump(&mut saved);
    *stored = saved.clone();

    Ok(saved)
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();

        for brand in seed.brands {
            store.insert_brand(brand);
        }
        for contact in seed.contacts {
            store.insert_contact(contact);
        }
        for campaign in seed.campaigns {
            store.insert_campaign(campaign);
        }
        for sequence in seed.sequences {
            store.insert_sequence(sequence);
        }
        for enrollment in seed.enrollments {
            store
                .enrollment_index
                .insert(
                    (enrollment.sequence_id.clone(), enrollment.contact_id.clone()),
                    enrollment.id.clone(),
                );
            store.enrollments.insert(enrollment.id.clone(), enrollment);
        }

        store
    }

    pub fn insert_brand(&self, brand: Brand) {
        self.brands.insert(brand.id.clone(), brand);
    }

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id.clone(), campaign);
    }

    pub fn insert_sequence(&self, sequence: EmailSequence) {
        self.sequences.insert(sequence.id.clone(), sequence);
    }

    /// Add or replace a contact. New contacts go to the end of their list.
    pub fn insert_contact(&self, contact: Contact) {
        if self
            .contacts
            .insert(contact.id.clone(), contact.clone())
            .is_none()
        {
            self.lists
                .entry(contact.list_id.clone())
                .or_default()
                .push(contact.id);
        }
    }

    pub fn set_contact_status(&self, id: &ContactId, status: ContactStatus) {
        if let Some(mut contact) = self.contacts.get_mut(id) {
            contact.status = status;
        }
    }

    /// Every event appended so far, oldest first.
    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl BrandStore for MemoryStore {
    async fn brand(&self, id: &BrandId) -> Result<Brand, StoreError> {
        self.brands
            .get(id)
            .map(|brand| brand.clone())
            .ok_or_else(|| StoreError::not_found("brand", id))
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn campaign(&self, id: &CampaignId) -> Result<Campaign, StoreError> {
        self.campaigns
            .get(id)
            .map(|campaign| campaign.clone())
            .ok_or_else(|| StoreError::not_found("campaign", id))
    }

    async fn save_campaign(&self, campaign: &Campaign) -> Result<Campaign, StoreError> {
        save_versioned(
            &self.campaigns,
            &campaign.id,
            campaign,
            "campaign",
            |c| c.version,
            |c| c.version += 1,
        )
    }

    async fn campaigns_with_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, StoreError> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|campaign| campaign.status == status)
            .map(|campaign| campaign.clone())
            .collect();
        campaigns.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(campaigns)
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn contact(&self, id: &ContactId) -> Result<Contact, StoreError> {
        self.contacts
            .get(id)
            .map(|contact| contact.clone())
            .ok_or_else(|| StoreError::not_found("contact", id))
    }

    async fn list_page(
        &self,
        list: &ListId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError> {
        let ids: Vec<ContactId> = self
            .lists
            .get(list)
            .map(|ids| ids.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .filter_map(|id| self.contacts.get(id).map(|contact| contact.clone()))
            .collect())
    }

    async fn count_active(&self, list: &ListId) -> Result<u64, StoreError> {
        let ids: Vec<ContactId> = self
            .lists
            .get(list)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let active = ids
            .iter()
            .filter(|id| {
                self.contacts
                    .get(*id)
                    .is_some_and(|contact| contact.is_sendable())
            })
            .count();

        Ok(u64::try_from(active).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn sequence(&self, id: &SequenceId) -> Result<EmailSequence, StoreError> {
        self.sequences
            .get(id)
            .map(|sequence| sequence.clone())
            .ok_or_else(|| StoreError::not_found("sequence", id))
    }

    async fn save_sequence(&self, sequence: &EmailSequence) -> Result<EmailSequence, StoreError> {
        save_versioned(
            &self.sequences,
            &sequence.id,
            sequence,
            "sequence",
            |s| s.version,
            |s| s.version += 1,
        )
    }

    async fn enrollment(&self, id: &EnrollmentId) -> Result<SequenceEnrollment, StoreError> {
        self.enrollments
            .get(id)
            .map(|enrollment| enrollment.clone())
            .ok_or_else(|| StoreError::not_found("enrollment", id))
    }

    async fn find_enrollment(
        &self,
        sequence: &SequenceId,
        contact: &ContactId,
    ) -> Result<Option<SequenceEnrollment>, StoreError> {
        let id = self
            .enrollment_index
            .get(&(sequence.clone(), contact.clone()))
            .map(|id| id.clone());

        Ok(id.and_then(|id| self.enrollments.get(&id).map(|enrollment| enrollment.clone())))
    }

    async fn enrollments_for_contact(
        &self,
        contact: &ContactId,
    ) -> Result<Vec<SequenceEnrollment>, StoreError> {
        Ok(self
            .enrollments
            .iter()
            .filter(|enrollment| enrollment.contact_id == *contact)
            .map(|enrollment| enrollment.clone())
            .collect())
    }

    async fn enrollments_with_status(
        &self,
        sequence: &SequenceId,
        status: EnrollmentStatus,
    ) -> Result<Vec<SequenceEnrollment>, StoreError> {
        let mut enrollments: Vec<SequenceEnrollment> = self
            .enrollments
            .iter()
            .filter(|enrollment| {
                enrollment.sequence_id == *sequence && enrollment.status == status
            })
            .map(|enrollment| enrollment.clone())
            .collect();
        enrollments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(enrollments)
    }

    async fn insert_enrollment(
        &self,
        enrollment: &SequenceEnrollment,
    ) -> Result<SequenceEnrollment, StoreError> {
        let key = (enrollment.sequence_id.clone(), enrollment.contact_id.clone());

        match self.enrollment_index.entry(key) {
            Entry::Occupied(_) => Err(StoreError::conflict("enrollment", &enrollment.id)),
            Entry::Vacant(slot) => {
                slot.insert(enrollment.id.clone());
                self.enrollments
                    .insert(enrollment.id.clone(), enrollment.clone());
                Ok(enrollment.clone())
            }
        }
    }

    async fn save_enrollment(
        &self,
        enrollment: &SequenceEnrollment,
    ) -> Result<SequenceEnrollment, StoreError> {
        save_versioned(
            &self.enrollments,
            &enrollment.id,
            enrollment,
            "enrollment",
            |e| e.version,
            |e| e.version += 1,
        )
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_event(&self, event: TrackingEvent) -> Result<(), StoreError> {
        self.events.lock().push(event);
        Ok(())
    }
}
