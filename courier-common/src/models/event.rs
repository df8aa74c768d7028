use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, ContactId, EventId, SequenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Open,
    Click,
    Bounce,
    Complaint,
    Delivery,
}

/// Append-only engagement and delivery record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: EventId,
    pub contact_id: ContactId,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    #[serde(default)]
    pub sequence_id: Option<SequenceId>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TrackingEvent {
    #[must_use]
    pub fn new(
        contact_id: ContactId,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::generate(),
            contact_id,
            campaign_id: None,
            sequence_id: None,
            event_type,
            timestamp,
            metadata,
        }
    }

    #[must_use]
    pub fn for_campaign(mut self, campaign_id: CampaignId) -> Self {
        self.campaign_id = Some(campaign_id);
        self
    }

    #[must_use]
    pub fn for_sequence(mut self, sequence_id: SequenceId) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }
}
