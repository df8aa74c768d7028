//! Checkpointed campaign sends
//!
//! A campaign walks its contact lists in order. Every job sends one bounded
//! batch starting at the persisted cursor, then saves the cursor and stats
//! back in a single versioned write. The queue re-runs the job while the
//! cursor says there is more to send.
//!
//! ```text
//! draft ──trigger──► queued | scheduled | warmup ──► sending ──► sent
//!                          │             │              │
//!                          └─────────────┴──► paused ◄──┘
//!                                           failed ◄── config error,
//!                                                      repeated job failures
//! ```

use chrono::{DateTime, Utc};
use courier_common::{
    CampaignId, ValidationError,
    error::describe,
    internal,
    models::{
        Brand, Campaign, CampaignStats, CampaignStatus, ProcessingCursor, ScheduleType,
    },
    tracing,
};
use courier_providers::validate_config;

use super::{
    DispatchSettings, Services, UPDATE_ATTEMPTS,
    send::{Connection, Message, Sender, Source},
    wait_as_delta,
};
use crate::{error::DispatchError, queue::Job, store::StoreError, warmup};

/// What a campaign job achieved and when the campaign wants to run next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A batch went out and more recipients remain
    Continue { at: DateTime<Utc> },
    /// The scheduled time or the current warmup stage is not due yet
    Waiting { until: DateTime<Utc> },
    /// The provider's capacity is used up
    Throttled { until: DateTime<Utc> },
    /// Every list has been walked
    Completed,
    /// Paused, or in a state that does not send
    Halted,
    Failed { reason: String },
}

impl BatchOutcome {
    /// When the campaign's job should run again, if at all.
    #[must_use]
    pub const fn next_run(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Continue { at } => Some(*at),
            Self::Waiting { until } | Self::Throttled { until } => Some(*until),
            Self::Completed | Self::Halted | Self::Failed { .. } => None,
        }
    }
}

/// Why a walk over the contact lists stopped
#[derive(Debug)]
enum WalkEnd {
    BatchFull,
    ListsExhausted,
    StageComplete,
    /// Provider capacity ran out or the current recipient hit a transient
    /// error; the cursor stays on the next contact to try
    Throttled(std::time::Duration),
}

/// Check the fields a campaign needs before it can be sent.
#[must_use]
pub fn validate_campaign(campaign: &Campaign, now: DateTime<Utc>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if campaign.subject.trim().is_empty() {
        errors.push(ValidationError::missing("subject"));
    }
    if campaign.content.trim().is_empty() {
        errors.push(ValidationError::missing("content"));
    }
    if campaign.contact_list_ids.is_empty() {
        errors.push(ValidationError::missing("contact_list_ids"));
    }

    match campaign.schedule_type {
        ScheduleType::SendNow => {}
        ScheduleType::Schedule => {
            if campaign.scheduled_at.is_none() {
                errors.push(ValidationError::missing("scheduled_at"));
            }
        }
        ScheduleType::Warmup => match &campaign.warmup_config {
            Some(config) => errors.extend(warmup::validate(config, now)),
            None => errors.push(ValidationError::missing("warmup_config")),
        },
    }

    errors
}

/// The state a paused or failed campaign returns to.
fn resumed_status(campaign: &Campaign, now: DateTime<Utc>) -> CampaignStatus {
    match campaign.schedule_type {
        ScheduleType::Warmup => CampaignStatus::Warmup,
        ScheduleType::Schedule if campaign.scheduled_at.is_some_and(|at| at > now) => {
            CampaignStatus::Scheduled
        }
        _ if campaign.processing.processed_batches == 0 => CampaignStatus::Queued,
        _ => CampaignStatus::Sending,
    }
}

/// When a dispatchable campaign's next batch is due.
fn due_at(campaign: &Campaign, now: DateTime<Utc>) -> DateTime<Utc> {
    let due = match campaign.status {
        CampaignStatus::Scheduled => campaign.scheduled_at,
        CampaignStatus::Warmup => campaign
            .processing
            .current_warmup_stage()
            .map(|stage| stage.scheduled_date),
        _ => None,
    };

    due.map_or(now, |due| due.max(now))
}

/// Resolve a checkpoint that lost a version race against `current`.
///
/// Returns the record to write, or `None` when `current` has walked further
/// or counted more recipients and must not be overwritten.
fn reconcile(mut ours: Campaign, current: &Campaign) -> Option<Campaign> {
    if current.processing.position() > ours.processing.position()
        || current.stats.processed > ours.stats.processed
    {
        return None;
    }

    if current.status == CampaignStatus::Paused && ours.status != CampaignStatus::Sent {
        ours.status = CampaignStatus::Paused;
    }
    ours.version = current.version;
    Some(ours)
}

fn batch_job(id: &CampaignId) -> Job {
    Job::CampaignBatch {
        campaign_id: id.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct CampaignDispatcher {
    services: Services,
    settings: DispatchSettings,
}

impl CampaignDispatcher {
    #[must_use]
    pub const fn new(services: Services, settings: DispatchSettings) -> Self {
        Self { services, settings }
    }

    /// Accept a draft campaign for sending.
    ///
    /// Validates the brand, its provider credentials and the campaign,
    /// fixes the recipient count, positions the cursor and enqueues the
    /// first batch. Nothing is changed when validation fails.
    pub async fn trigger_send(&self, id: &CampaignId) -> Result<Campaign, DispatchError> {
        let store = &self.services.store;
        let now = self.services.clock.now();
        let mut campaign = store.campaign(id).await?;

        if campaign.status != CampaignStatus::Draft {
            return Err(DispatchError::InvalidState(format!(
                "campaign {id} is {:?}, only drafts can be sent",
                campaign.status
            )));
        }

        let brand = store.brand(&campaign.brand_id).await?;
        if !brand.can_send() {
            return Err(DispatchError::Config(format!(
                "brand {} is not active",
                brand.id
            )));
        }

        let mut errors = validate_config(brand.provider, brand.connection_type, &brand.credentials);
        errors.extend(validate_campaign(&campaign, now));
        if !errors.is_empty() {
            return Err(DispatchError::Config(describe(&errors)));
        }

        let mut recipients = 0;
        for list in &campaign.contact_list_ids {
            recipients += store.count_active(list).await?;
        }
        if recipients == 0 {
            return Err(DispatchError::Config(format!(
                "campaign {id} has no active recipients"
            )));
        }

        let plan = match (&campaign.schedule_type, &campaign.warmup_config) {
            (ScheduleType::Warmup, Some(config)) => warmup::plan(recipients, config),
            _ => Vec::new(),
        };

        campaign.status = match campaign.schedule_type {
            ScheduleType::SendNow => CampaignStatus::Queued,
            ScheduleType::Schedule if campaign.scheduled_at.is_some_and(|at| at > now) => {
                CampaignStatus::Scheduled
            }
            ScheduleType::Schedule => CampaignStatus::Queued,
            ScheduleType::Warmup => CampaignStatus::Warmup,
        };
        campaign.processing = ProcessingCursor::start(now, plan);
        campaign.stats = CampaignStats {
            recipients,
            ..CampaignStats::default()
        };
        campaign.failure_reason = None;
        campaign.completed_at = None;

        let campaign = store.save_campaign(&campaign).await?;
        let run_at = due_at(&campaign, now);
        self.services.queue.enqueue(batch_job(id), run_at).await?;

        internal!(
            level = INFO,
            campaign_id = %id,
            recipients,
            status = ?campaign.status,
            stages = campaign.processing.warmup_plan.len(),
            "Campaign send triggered"
        );

        Ok(campaign)
    }

    /// Stop a campaign after its in-flight batch.
    pub async fn pause(&self, id: &CampaignId) -> Result<Campaign, DispatchError> {
        let campaign = self
            .update(id, |campaign| {
                if !campaign.status.is_pausable() {
                    return Err(DispatchError::InvalidState(format!(
                        "campaign {} is {:?} and cannot be paused",
                        campaign.id, campaign.status
                    )));
                }
                campaign.status = CampaignStatus::Paused;
                Ok(())
            })
            .await?;

        internal!(level = INFO, campaign_id = %id, "Campaign paused");
        Ok(campaign)
    }

    /// Continue a paused campaign from its cursor.
    pub async fn resume(&self, id: &CampaignId) -> Result<Campaign, DispatchError> {
        let now = self.services.clock.now();
        let campaign = self
            .update(id, |campaign| {
                if campaign.status != CampaignStatus::Paused {
                    return Err(DispatchError::InvalidState(format!(
                        "campaign {} is {:?}, not paused",
                        campaign.id, campaign.status
                    )));
                }
                campaign.status = resumed_status(campaign, now);
                Ok(())
            })
            .await?;

        self.services
            .queue
            .enqueue(batch_job(id), due_at(&campaign, now))
            .await?;

        internal!(level = INFO, campaign_id = %id, status = ?campaign.status, "Campaign resumed");
        Ok(campaign)
    }

    /// Re-trigger a failed campaign from its persisted cursor.
    pub async fn retry_failed(&self, id: &CampaignId) -> Result<Campaign, DispatchError> {
        let now = self.services.clock.now();
        let campaign = self
            .update(id, |campaign| {
                if campaign.status != CampaignStatus::Failed {
                    return Err(DispatchError::InvalidState(format!(
                        "campaign {} is {:?}, not failed",
                        campaign.id, campaign.status
                    )));
                }
                campaign.status = resumed_status(campaign, now);
                campaign.failure_reason = None;
                Ok(())
            })
            .await?;

        self.services
            .queue
            .enqueue(batch_job(id), due_at(&campaign, now))
            .await?;

        internal!(level = INFO, campaign_id = %id, "Failed campaign re-triggered");
        Ok(campaign)
    }

    /// Mark a campaign failed with a user-visible reason.
    pub async fn fail(&self, id: &CampaignId, reason: &str) -> Result<Campaign, DispatchError> {
        let campaign = self
            .update(id, |campaign| {
                campaign.status = CampaignStatus::Failed;
                campaign.failure_reason = Some(reason.to_string());
                Ok(())
            })
            .await?;

        tracing::warn!(campaign_id = %id, reason, "Campaign failed");
        Ok(campaign)
    }

    /// Enqueue every campaign that is due: scheduled sends whose time has
    /// come, warmup stages that have opened and sends whose continuation
    /// job went missing. Returns the number of jobs added.
    pub async fn schedule_due(&self) -> Result<usize, DispatchError> {
        let store = &self.services.store;
        let now = self.services.clock.now();
        let mut enqueued = 0;

        for status in [
            CampaignStatus::Queued,
            CampaignStatus::Scheduled,
            CampaignStatus::Sending,
            CampaignStatus::Warmup,
        ] {
            for campaign in store.campaigns_with_status(status).await? {
                let due = due_at(&campaign, now);
                if due > now {
                    continue;
                }

                if self
                    .services
                    .queue
                    .enqueue(batch_job(&campaign.id), due)
                    .await?
                {
                    internal!(campaign_id = %campaign.id, status = ?status, "Scheduled campaign batch");
                    enqueued += 1;
                }
            }
        }

        Ok(enqueued)
    }

    /// Run one batch of a campaign.
    ///
    /// Configuration errors mark the campaign failed and come back as
    /// [`BatchOutcome::Failed`]; every other error is left to the caller to
    /// retry.
    pub async fn process_batch(&self, id: &CampaignId) -> Result<BatchOutcome, DispatchError> {
        match self.dispatch_batch(id).await {
            Err(e) if e.is_config() => {
                let reason = e.to_string();
                self.fail(id, &reason).await?;
                Ok(BatchOutcome::Failed { reason })
            }
            other => other,
        }
    }

    async fn dispatch_batch(&self, id: &CampaignId) -> Result<BatchOutcome, DispatchError> {
        let store = &self.services.store;
        let now = self.services.clock.now();
        let mut campaign = store.campaign(id).await?;

        if !campaign.status.is_dispatchable() {
            internal!(
                campaign_id = %id,
                status = ?campaign.status,
                "Campaign is not dispatchable, dropping batch"
            );
            return Ok(BatchOutcome::Halted);
        }

        if campaign.status == CampaignStatus::Scheduled
            && let Some(at) = campaign.scheduled_at
            && at > now
        {
            return Ok(BatchOutcome::Waiting { until: at });
        }

        if campaign.status == CampaignStatus::Warmup {
            match campaign.processing.current_warmup_stage() {
                Some(stage) if stage.scheduled_date > now => {
                    internal!(
                        campaign_id = %id,
                        stage = stage.stage,
                        "Warmup stage not open yet"
                    );
                    return Ok(BatchOutcome::Waiting {
                        until: stage.scheduled_date,
                    });
                }
                Some(_) => {}
                None => campaign.processing.has_more_to_process = false,
            }
        }

        let walked = if campaign.processing.has_more_to_process {
            let brand = store.brand(&campaign.brand_id).await?;
            if !brand.can_send() {
                return Err(DispatchError::Config(format!(
                    "brand {} is not active",
                    brand.id
                )));
            }
            let connection = self.services.connect(&brand).await?;

            if matches!(
                campaign.status,
                CampaignStatus::Queued | CampaignStatus::Scheduled
            ) {
                campaign.status = CampaignStatus::Sending;
            }

            self.walk(&mut campaign, &brand, &connection).await
        } else {
            Ok(WalkEnd::ListsExhausted)
        };

        campaign.processing.processed_batches += 1;
        if !campaign.processing.has_more_to_process {
            campaign.status = CampaignStatus::Sent;
            campaign.completed_at = Some(self.services.clock.now());
        }

        // Progress made before an error is saved so it is never re-sent
        let campaign = self.checkpoint(campaign).await?;
        let end = walked?;

        internal!(
            level = DEBUG,
            campaign_id = %id,
            processed = campaign.stats.processed,
            recipients = campaign.stats.recipients,
            list = campaign.processing.last_processed_list_index,
            offset = campaign.processing.last_processed_contact_index,
            "Checkpointed campaign batch"
        );

        Ok(match (campaign.status, end) {
            (CampaignStatus::Sent, _) => {
                internal!(level = INFO, campaign_id = %id, stats = ?campaign.stats, "Campaign sent");
                BatchOutcome::Completed
            }
            (CampaignStatus::Paused, _) => BatchOutcome::Halted,
            (_, WalkEnd::Throttled(wait)) => BatchOutcome::Throttled {
                until: now + wait_as_delta(wait),
            },
            (_, WalkEnd::StageComplete) => BatchOutcome::Waiting {
                until: due_at(&campaign, now),
            },
            (_, WalkEnd::BatchFull | WalkEnd::ListsExhausted) => {
                BatchOutcome::Continue { at: now }
            }
        })
    }

    /// Send to the next contacts after the cursor, moving the cursor and
    /// stats along as recipients are handled.
    async fn walk(
        &self,
        campaign: &mut Campaign,
        brand: &Brand,
        connection: &Connection,
    ) -> Result<WalkEnd, DispatchError> {
        let store = &self.services.store;
        let batch_size = self.settings.batch_size.max(1);
        let list_count = campaign.contact_list_ids.len();
        let warmup = campaign.status == CampaignStatus::Warmup;

        let subject = campaign.subject.clone();
        let content = campaign.content.clone();
        let text = campaign.text_content.clone();
        let campaign_id = campaign.id.clone();
        let message = Message {
            subject: &subject,
            html: &content,
            text: text.as_deref(),
            tracking: campaign.tracking,
            source: Source::Campaign(&campaign_id),
        };
        let sender = Sender::for_brand(brand);
        let mut examined = 0;

        while campaign.processing.has_more_to_process {
            if examined >= batch_size {
                return Ok(WalkEnd::BatchFull);
            }

            if campaign.stats.processed >= campaign.stats.recipients {
                campaign.processing.has_more_to_process = false;
                break;
            }

            let cursor = &campaign.processing;
            let Some(list) = campaign
                .contact_list_ids
                .get(cursor.last_processed_list_index)
                .cloned()
            else {
                campaign.processing.has_more_to_process = false;
                break;
            };

            let page = store
                .list_page(
                    &list,
                    cursor.last_processed_contact_index,
                    batch_size - examined,
                )
                .await?;

            if page.is_empty() {
                campaign.processing.advance_list(list_count);
                continue;
            }

            for listed in page {
                examined += 1;

                // Status can change between paging and sending
                let contact = match store.contact(&listed.id).await {
                    Ok(contact) => contact,
                    Err(StoreError::NotFound { .. }) => listed,
                    Err(e) => return Err(e.into()),
                };

                if !contact.is_sendable() {
                    internal!(
                        level = DEBUG,
                        campaign_id = %campaign.id,
                        contact_id = %contact.id,
                        status = ?contact.status,
                        "Recipient skipped"
                    );
                    campaign.stats.skipped += 1;
                    campaign.processing.advance_contact();
                    continue;
                }

                match self
                    .services
                    .deliver(connection, brand, &sender, &contact, &message, &self.settings)
                    .await
                {
                    Ok(_) => {
                        campaign.stats.delivered += 1;
                    }
                    Err(DispatchError::QuotaExceeded { wait }) => {
                        internal!(
                            level = INFO,
                            campaign_id = %campaign.id,
                            wait_seconds = wait.as_secs(),
                            "Provider quota exhausted, throttling campaign"
                        );
                        return Ok(WalkEnd::Throttled(wait));
                    }
                    Err(DispatchError::Provider(e))
                        if e.is_retryable()
                            && campaign.processing.recipient_attempts + 1
                                < self.settings.max_recipient_attempts =>
                    {
                        campaign.processing.recipient_attempts += 1;
                        let attempt = campaign.processing.recipient_attempts;
                        let wait = self.settings.retry.delay(attempt);
                        tracing::warn!(
                            campaign_id = %campaign.id,
                            contact_id = %contact.id,
                            attempt,
                            retry_in_secs = wait.as_secs(),
                            error = %e,
                            "Send failed for recipient, retrying with backoff"
                        );
                        return Ok(WalkEnd::Throttled(wait));
                    }
                    Err(DispatchError::Provider(e)) if !e.is_config() => {
                        tracing::warn!(
                            campaign_id = %campaign.id,
                            contact_id = %contact.id,
                            error = %e,
                            "Send failed for recipient"
                        );
                        campaign.stats.failed += 1;
                    }
                    Err(e) => return Err(e),
                }

                campaign.stats.processed += 1;
                campaign.processing.advance_contact();

                if warmup {
                    let stage = campaign.processing.current_stage;
                    if campaign.processing.record_stage_sends(1) {
                        campaign.processing.has_more_to_process = false;
                        return Ok(WalkEnd::ListsExhausted);
                    }
                    if campaign.processing.current_stage != stage {
                        return Ok(WalkEnd::StageComplete);
                    }
                }
            }
        }

        Ok(WalkEnd::ListsExhausted)
    }

    /// Save a campaign's progress.
    ///
    /// A concurrent pause wins over the batch's own status change unless the
    /// batch finished the campaign. A competing write that is further along
    /// is kept as it is.
    async fn checkpoint(&self, campaign: Campaign) -> Result<Campaign, DispatchError> {
        let store = &self.services.store;

        match store.save_campaign(&campaign).await {
            Ok(saved) => Ok(saved),
            Err(e) if e.is_conflict() => {
                let current = store.campaign(&campaign.id).await?;
                let ours = campaign.processing.position();

                let Some(merged) = reconcile(campaign, &current) else {
                    tracing::warn!(
                        campaign_id = %current.id,
                        ours = ?ours,
                        theirs = ?current.processing.position(),
                        processed = current.stats.processed,
                        "Checkpoint lost to a writer further along, keeping its progress"
                    );
                    return Ok(current);
                };

                internal!(
                    level = DEBUG,
                    campaign_id = %merged.id,
                    status = ?merged.status,
                    "Checkpoint raced another writer, merged"
                );
                Ok(store.save_campaign(&merged).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write with retries on version conflicts.
    async fn update<F>(&self, id: &CampaignId, apply: F) -> Result<Campaign, DispatchError>
    where
        F: Fn(&mut Campaign) -> Result<(), DispatchError> + Send + Sync,
    {
        let store = &self.services.store;
        let mut attempts = 0;

        loop {
            let mut campaign = store.campaign(id).await?;
            apply(&mut campaign)?;

            match store.save_campaign(&campaign).await {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_conflict() && attempts + 1 < UPDATE_ATTEMPTS => attempts += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use courier_common::{BrandId, ListId, models::TrackingSettings};

    use super::*;

    fn campaign(schedule_type: ScheduleType) -> Campaign {
        Campaign {
            id: CampaignId::from("c-1"),
            brand_id: BrandId::from("b-1"),
            name: "Launch".to_string(),
            subject: "Hello".to_string(),
            content: "<p>Hi</p>".to_string(),
            text_content: None,
            contact_list_ids: vec![ListId::from("l-1")],
            status: CampaignStatus::Draft,
            schedule_type,
            scheduled_at: None,
            warmup_config: None,
            tracking: TrackingSettings::default(),
            processing: ProcessingCursor::default(),
            stats: CampaignStats::default(),
            failure_reason: None,
            completed_at: None,
            version: 0,
        }
    }

    #[test]
    fn test_validate_campaign_fields() {
        let now = Utc::now();
        let mut draft = campaign(ScheduleType::Schedule);
        draft.subject = " ".to_string();
        draft.contact_list_ids.clear();

        let fields: Vec<String> = validate_campaign(&draft, now)
            .iter()
            .map(|e| e.field().to_string())
            .collect();
        assert_eq!(fields, vec!["subject", "contact_list_ids", "scheduled_at"]);

        let warmup = campaign(ScheduleType::Warmup);
        let fields: Vec<String> = validate_campaign(&warmup, now)
            .iter()
            .map(|e| e.field().to_string())
            .collect();
        assert_eq!(fields, vec!["warmup_config"]);

        assert!(validate_campaign(&campaign(ScheduleType::SendNow), now).is_empty());
    }

    #[test]
    fn test_resumed_status() {
        let now = Utc::now();
        let mut paused = campaign(ScheduleType::SendNow);
        assert_eq!(resumed_status(&paused, now), CampaignStatus::Queued);

        paused.processing.processed_batches = 2;
        assert_eq!(resumed_status(&paused, now), CampaignStatus::Sending);

        let mut scheduled = campaign(ScheduleType::Schedule);
        scheduled.scheduled_at = Some(now + Duration::hours(1));
        assert_eq!(resumed_status(&scheduled, now), CampaignStatus::Scheduled);

        scheduled.scheduled_at = Some(now - Duration::hours(1));
        assert_eq!(resumed_status(&scheduled, now), CampaignStatus::Queued);

        assert_eq!(
            resumed_status(&campaign(ScheduleType::Warmup), now),
            CampaignStatus::Warmup
        );
    }

    #[test]
    fn test_reconcile_keeps_pause_and_takes_version() {
        let mut ours = campaign(ScheduleType::SendNow);
        ours.status = CampaignStatus::Sending;
        ours.processing.last_processed_contact_index = 4;
        ours.stats.processed = 4;

        let mut current = campaign(ScheduleType::SendNow);
        current.status = CampaignStatus::Paused;
        current.processing.last_processed_contact_index = 2;
        current.stats.processed = 2;
        current.version = 7;

        let merged = reconcile(ours.clone(), &current).unwrap_or_else(|| panic!("merges"));
        assert_eq!(merged.status, CampaignStatus::Paused);
        assert_eq!(merged.version, 7);
        assert_eq!(merged.processing.last_processed_contact_index, 4);

        ours.status = CampaignStatus::Sent;
        let finished = reconcile(ours, &current).unwrap_or_else(|| panic!("merges"));
        assert_eq!(finished.status, CampaignStatus::Sent);
    }

    #[test]
    fn test_reconcile_never_moves_cursor_back() {
        let mut ours = campaign(ScheduleType::SendNow);
        ours.processing.last_processed_contact_index = 3;
        ours.stats.processed = 3;

        let mut further = ours.clone();
        further.processing.advance_list(2);
        further.stats.processed = 5;
        assert_eq!(reconcile(ours.clone(), &further), None);

        let mut counted_more = ours.clone();
        counted_more.stats.processed = 6;
        assert_eq!(reconcile(ours, &counted_more), None);
    }

    #[test]
    fn test_outcome_next_run() {
        let now = Utc::now();
        assert_eq!(BatchOutcome::Continue { at: now }.next_run(), Some(now));
        assert_eq!(BatchOutcome::Throttled { until: now }.next_run(), Some(now));
        assert_eq!(BatchOutcome::Completed.next_run(), None);
        assert_eq!(
            BatchOutcome::Failed {
                reason: "x".to_string()
            }
            .next_run(),
            None
        );
    }
}
