//! Campaign records and the resumable send cursor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BrandId, CampaignId, ListId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Queued,
    Scheduled,
    Sending,
    Warmup,
    Paused,
    Sent,
    Failed,
}

impl CampaignStatus {
    /// States in which the dispatch worker may process batches.
    #[must_use]
    pub const fn is_dispatchable(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Scheduled | Self::Sending | Self::Warmup
        )
    }

    /// States that can be paused by the user.
    #[must_use]
    pub const fn is_pausable(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Scheduled | Self::Sending | Self::Warmup
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    #[default]
    SendNow,
    Schedule,
    Warmup,
}

/// Per-campaign tracking toggles. Both default to on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSettings {
    #[serde(default = "default_true")]
    pub track_opens: bool,
    #[serde(default = "default_true")]
    pub track_clicks: bool,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            track_opens: true,
            track_clicks: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Parameters for a gradual volume ramp-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub initial_batch_size: u64,
    pub increment_factor: f64,
    pub increment_interval_hours: f64,
    pub max_batch_size: u64,
    pub start_date: DateTime<Utc>,
}

/// One stage of a warmup plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupStage {
    pub stage: u32,
    pub batch_size: u64,
    pub cumulative_sent: u64,
    /// Fractional days are truncated; `scheduled_date` carries the exact time.
    pub day_offset: u32,
    pub scheduled_date: DateTime<Utc>,
}

/// Resumable position of a campaign send
///
/// `last_processed_list_index` selects the contact list being walked and
/// `last_processed_contact_index` is the number of contacts of that list
/// already handled, so the next contact to process sits at that offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProcessingCursor {
    #[serde(default)]
    pub last_processed_list_index: usize,
    #[serde(default)]
    pub last_processed_contact_index: usize,
    #[serde(default)]
    pub has_more_to_process: bool,
    #[serde(default)]
    pub processed_batches: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Precomputed plan for warmup sends, empty otherwise
    #[serde(default)]
    pub warmup_plan: Vec<WarmupStage>,
    #[serde(default)]
    pub current_stage: usize,
    /// Sends attempted within the current warmup stage
    #[serde(default)]
    pub stage_sent: u64,
    /// Transient failures of the contact under the cursor
    #[serde(default)]
    pub recipient_attempts: u32,
}

impl ProcessingCursor {
    /// A cursor positioned before the first contact of the first list.
    #[must_use]
    pub fn start(now: DateTime<Utc>, warmup_plan: Vec<WarmupStage>) -> Self {
        Self {
            has_more_to_process: true,
            started_at: Some(now),
            warmup_plan,
            ..Self::default()
        }
    }

    /// Move past one contact of the current list.
    pub const fn advance_contact(&mut self) {
        self.last_processed_contact_index += 1;
        self.recipient_attempts = 0;
    }

    /// Move to the start of the next list, closing the cursor after the last one.
    pub const fn advance_list(&mut self, list_count: usize) {
        self.last_processed_list_index += 1;
        self.last_processed_contact_index = 0;
        self.recipient_attempts = 0;
        if self.last_processed_list_index >= list_count {
            self.has_more_to_process = false;
        }
    }

    /// `(list, offset)` of the next contact to process, ordered by walk order.
    #[must_use]
    pub const fn position(&self) -> (usize, usize) {
        (
            self.last_processed_list_index,
            self.last_processed_contact_index,
        )
    }

    #[must_use]
    pub fn current_warmup_stage(&self) -> Option<&WarmupStage> {
        self.warmup_plan.get(self.current_stage)
    }

    /// Count sends against the current warmup stage, moving to the next stage
    /// when it is full. Returns `true` when the plan is exhausted.
    pub fn record_stage_sends(&mut self, sends: u64) -> bool {
        self.stage_sent += sends;
        if let Some(stage) = self.current_warmup_stage()
            && self.stage_sent >= stage.batch_size
        {
            self.current_stage += 1;
            self.stage_sent = 0;
        }
        self.current_stage >= self.warmup_plan.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    /// Active audience resolved when the send was triggered
    #[serde(default)]
    pub recipients: u64,
    /// Recipients a send was attempted for, successful or not
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub delivered: u64,
    #[serde(default)]
    pub failed: u64,
    /// Contacts that were no longer active at send time
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub opens: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub bounces: u64,
    #[serde(default)]
    pub complaints: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub brand_id: BrandId,
    pub name: String,
    pub subject: String,
    /// HTML body template
    pub content: String,
    #[serde(default)]
    pub text_content: Option<String>,
    pub contact_list_ids: Vec<ListId>,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default)]
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub warmup_config: Option<WarmupConfig>,
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub processing: ProcessingCursor,
    #[serde(default)]
    pub stats: CampaignStats,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version, bumped by the store on every save
    #[serde(default)]
    pub version: u64,
}
