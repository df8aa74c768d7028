#![allow(dead_code)]

//! In-memory collaborators for driving the dispatch pipeline in tests

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_common::{
    BrandId, CampaignId, Clock, ContactId, ListId, SequenceEmailId, SequenceId,
    models::{
        Brand, BrandCredentials, BrandStatus, Campaign, CampaignStats, CampaignStatus,
        ConnectionType, Contact, ContactStatus, DelayUnit, EmailSequence, EnrollmentStats,
        ProcessingCursor, ProviderKind, ScheduleType, SequenceEmail, SequenceEmailConfig,
        SequenceStatus, SequenceTrigger, TrackingSettings,
    },
};
use courier_delivery::{
    MemoryJobQueue, MemoryStore, RateLimitConfig, RateLimiter, Services, Worker, WorkerConfig,
};
use courier_providers::{
    CredentialCheck, EmailProvider, OutboundEmail, ProviderError, ProviderResolver, Quota,
    RawEmail, SendReceipt,
};
use courier_tracking::{TrackingConfig, TrackingInjector};

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Provider that records every message it accepts
#[derive(Debug, Default)]
pub struct FakeProvider {
    sent: parking_lot::Mutex<Vec<RawEmail>>,
    calls: AtomicUsize,
    /// Recipients the provider refuses permanently
    rejected: parking_lot::Mutex<HashSet<String>>,
    /// Error returned for every send, classified by the test
    failure: parking_lot::Mutex<Option<fn() -> ProviderError>>,
    daily_limit: parking_lot::Mutex<Option<u64>>,
}

impl FakeProvider {
    pub fn reject(&self, email: &str) {
        self.rejected.lock().insert(email.to_string());
    }

    pub fn fail_with(&self, failure: fn() -> ProviderError) {
        *self.failure.lock() = Some(failure);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    pub fn limit_daily(&self, limit: u64) {
        *self.daily_limit.lock() = Some(limit);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<RawEmail> {
        self.sent.lock().clone()
    }

    /// Recipients in send order.
    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|raw| raw.email.to.clone())
            .collect()
    }
}

#[async_trait]
impl EmailProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        self.send_raw(&RawEmail {
            email: email.clone(),
            list_unsubscribe: None,
            list_unsubscribe_post: None,
        })
        .await
    }

    async fn send_raw(&self, email: &RawEmail) -> Result<SendReceipt, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = *self.failure.lock() {
            return Err(failure());
        }
        if self.rejected.lock().contains(&email.email.to) {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "mailbox does not exist".to_string(),
            });
        }

        self.sent.lock().push(email.clone());
        Ok(SendReceipt {
            message_id: format!("msg-{call}"),
        })
    }

    async fn get_quota(&self) -> Quota {
        Quota {
            max_send_rate: 10_000.0,
            max_24_hour_send: *self.daily_limit.lock(),
            sent_last_24_hours: 0,
            is_monthly_quota: false,
        }
    }

    async fn verify_credentials(&self) -> CredentialCheck {
        CredentialCheck::valid()
    }
}

/// Resolves every brand to the same fake provider
#[derive(Debug)]
pub struct FakeResolver(pub Arc<FakeProvider>);

impl ProviderResolver for FakeResolver {
    fn resolve(&self, _brand: &Brand) -> Result<Arc<dyn EmailProvider>, ProviderError> {
        Ok(self.0.clone())
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("valid start time"))
}

pub fn brand() -> Brand {
    let mut credentials = BrandCredentials::default();
    credentials.sendgrid.api_key = Some("SG.test".to_string());

    Brand {
        id: BrandId::from("acme"),
        name: "Acme".to_string(),
        provider: ProviderKind::Sendgrid,
        connection_type: ConnectionType::Api,
        credentials,
        from_email: "news@acme.test".to_string(),
        from_name: Some("Acme".to_string()),
        reply_to: None,
        tracking_domain: Some("https://t.acme.test".to_string()),
        status: BrandStatus::Active,
    }
}

pub fn contact(list: &str, n: usize) -> Contact {
    Contact {
        id: ContactId::from(format!("{list}-{n}").as_str()),
        list_id: ListId::from(list),
        email: format!("{list}-{n}@example.test"),
        name: None,
        phone: None,
        status: ContactStatus::Active,
    }
}

pub fn campaign(id: &str, lists: &[&str]) -> Campaign {
    Campaign {
        id: CampaignId::from(id),
        brand_id: BrandId::from("acme"),
        name: format!("Campaign {id}"),
        subject: "Spring news".to_string(),
        content: r#"<html><body><p>Hello</p><a href="https://acme.test/sale">Sale</a></body></html>"#
            .to_string(),
        text_content: None,
        contact_list_ids: lists.iter().map(|list| ListId::from(*list)).collect(),
        status: CampaignStatus::Draft,
        schedule_type: ScheduleType::SendNow,
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

pub fn sequence(id: &str, delays_hours: &[u32]) -> EmailSequence {
    EmailSequence {
        id: SequenceId::from(id),
        brand_id: BrandId::from("acme"),
        name: format!("Sequence {id}"),
        emails: delays_hours
            .iter()
            .enumerate()
            .map(|(order, delay)| SequenceEmail {
                id: SequenceEmailId::generate(),
                order: u32::try_from(order).unwrap_or(u32::MAX),
                subject: format!("Step {order}"),
                content: format!("<p>Step {order}</p>"),
                delay_amount: *delay,
                delay_unit: DelayUnit::Hours,
            })
            .collect(),
        trigger: SequenceTrigger::default(),
        email_config: SequenceEmailConfig::default(),
        tracking: TrackingSettings::default(),
        status: SequenceStatus::Active,
        stats: EnrollmentStats::default(),
        version: 0,
    }
}

/// A worker wired to in-memory collaborators
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub provider: Arc<FakeProvider>,
    pub clock: Arc<ManualClock>,
    pub worker: Worker,
}

impl Harness {
    pub fn new(config: WorkerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_brand(brand());

        let queue = Arc::new(MemoryJobQueue::default());
        let provider = Arc::new(FakeProvider::default());
        let clock = Arc::new(ManualClock::new(start()));

        let services = Services {
            store: store.clone(),
            queue: queue.clone(),
            providers: Arc::new(FakeResolver(provider.clone())),
            limiter: Arc::new(RateLimiter::new(RateLimitConfig {
                messages_per_second: 10_000.0,
                burst_size: 10_000,
                quota_refresh_secs: 0,
                ..RateLimitConfig::default()
            })),
            injector: Arc::new(TrackingInjector::new(
                &TrackingConfig::default(),
                "test-server-secret",
            )),
            clock: clock.clone(),
        };

        Self {
            worker: Worker::new(config, services),
            store,
            queue,
            provider,
            clock,
        }
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self::new(WorkerConfig {
            batch_size,
            ..WorkerConfig::default()
        })
    }

    /// Add `count` active contacts to `list`.
    pub fn fill_list(&self, list: &str, count: usize) {
        for n in 0..count {
            self.store.insert_contact(contact(list, n));
        }
    }
}
