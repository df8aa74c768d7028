//! The per-recipient send path
//!
//! One recipient, one message: take a rate-limit permit, inject tracking and
//! the unsubscribe footer, send with one-click unsubscribe headers and
//! append a delivery event.

use std::sync::Arc;

use courier_common::{
    CampaignId, SequenceId, outgoing,
    models::{
        Brand, Contact, EventType, SequenceEmailConfig, TrackingEvent, TrackingSettings,
    },
    tracing,
};
use courier_providers::{EmailProvider, OutboundEmail, RawEmail, SendReceipt};
use courier_tracking::InjectionContext;
use serde_json::json;

use super::{DispatchSettings, Services};
use crate::{
    error::DispatchError,
    rate_limiter::RateLimitKey,
};

/// What a message belongs to
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Campaign(&'a CampaignId),
    Sequence(&'a SequenceId),
}

impl Source<'_> {
    fn id(&self) -> &str {
        match self {
            Self::Campaign(id) => id.as_str(),
            Self::Sequence(id) => id.as_str(),
        }
    }
}

/// Message content before per-recipient injection
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub subject: &'a str,
    pub html: &'a str,
    pub text: Option<&'a str>,
    pub tracking: TrackingSettings,
    pub source: Source<'a>,
}

/// Envelope sender for a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub from_email: String,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
}

impl Sender {
    #[must_use]
    pub fn for_brand(brand: &Brand) -> Self {
        Self {
            from_email: brand.from_email.clone(),
            from_name: brand.from_name.clone(),
            reply_to: brand.reply_to.clone(),
        }
    }

    /// The sequence's overrides, falling back to the brand field by field.
    #[must_use]
    pub fn for_sequence(brand: &Brand, config: &SequenceEmailConfig) -> Self {
        let pick = |value: Option<&String>| value.filter(|v| !v.trim().is_empty()).cloned();

        Self {
            from_email: pick(config.from_email.as_ref()).unwrap_or_else(|| brand.from_email.clone()),
            from_name: pick(config.from_name.as_ref()).or_else(|| brand.from_name.clone()),
            reply_to: pick(config.reply_to.as_ref()).or_else(|| brand.reply_to.clone()),
        }
    }
}

/// A brand's provider together with its rate-limit account
#[derive(Debug, Clone)]
pub struct Connection {
    pub provider: Arc<dyn EmailProvider>,
    pub key: RateLimitKey,
}

impl Services {
    /// Resolve the brand's provider and make sure its quota is current.
    pub async fn connect(&self, brand: &Brand) -> Result<Connection, DispatchError> {
        let provider = self.providers.resolve(brand)?;
        let key = RateLimitKey::new(brand.id.clone(), provider.name());

        if self.limiter.needs_quota(&key) {
            let quota = provider.get_quota().await;
            outgoing!(
                level = DEBUG,
                brand_id = %brand.id,
                provider = provider.name(),
                max_send_rate = quota.max_send_rate,
                "Refreshed provider quota"
            );
            self.limiter.apply_quota(&key, &quota);
        }

        Ok(Connection { provider, key })
    }

    /// Take a send permit, waiting in place for short waits only.
    async fn acquire(
        &self,
        key: &RateLimitKey,
        settings: &DispatchSettings,
    ) -> Result<(), DispatchError> {
        loop {
            match self.limiter.try_acquire(key) {
                Ok(()) => return Ok(()),
                Err(wait) if wait <= settings.max_inline_wait => tokio::time::sleep(wait).await,
                Err(wait) => return Err(DispatchError::QuotaExceeded { wait }),
            }
        }
    }

    /// Send `message` to one recipient.
    ///
    /// Provider failures come back as [`DispatchError::Provider`]; the caller
    /// decides whether they end the batch.
    pub async fn deliver(
        &self,
        connection: &Connection,
        brand: &Brand,
        sender: &Sender,
        contact: &Contact,
        message: &Message<'_>,
        settings: &DispatchSettings,
    ) -> Result<SendReceipt, DispatchError> {
        self.acquire(&connection.key, settings).await?;

        let now = self.clock.now();
        let campaign_id = match message.source {
            Source::Campaign(id) => Some(id),
            Source::Sequence(_) => None,
        };
        let injected = self.injector.inject(
            message.html,
            &InjectionContext {
                source_id: message.source.id(),
                campaign_id,
                contact_id: &contact.id,
                brand_id: &brand.id,
                email: &contact.email,
                settings: message.tracking,
                tracking_domain: brand.tracking_domain.as_deref(),
            },
            now,
        )?;

        let mut email = OutboundEmail::new(
            sender.from_email.as_str(),
            contact.email.as_str(),
            message.subject,
            injected.html,
        )
        .with_from_name(sender.from_name.clone())
        .with_reply_to(sender.reply_to.clone())
        .with_text(message.text.map(ToOwned::to_owned))
        .with_tag("contact_id", contact.id.as_str());

        email = match message.source {
            Source::Campaign(id) => email.with_tag("campaign_id", id.as_str()),
            Source::Sequence(id) => email.with_tag("sequence_id", id.as_str()),
        };

        let provider = connection.provider.name();
        let receipt = connection
            .provider
            .send_raw(&RawEmail::with_unsubscribe(email, &injected.unsubscribe_url))
            .await?;

        outgoing!(
            level = DEBUG,
            brand_id = %brand.id,
            contact_id = %contact.id,
            provider,
            message_id = %receipt.message_id,
            "Message accepted by provider"
        );

        let event = TrackingEvent::new(
            contact.id.clone(),
            EventType::Delivery,
            now,
            json!({ "message_id": receipt.message_id, "provider": provider }),
        );
        let event = match message.source {
            Source::Campaign(id) => event.for_campaign(id.clone()),
            Source::Sequence(id) => event.for_sequence(id.clone()),
        };

        // The message is out; a lost event must not cause a resend
        if let Err(e) = self.store.append_event(event).await {
            tracing::warn!(
                contact_id = %contact.id,
                error = %e,
                "Failed to record delivery event"
            );
        }

        Ok(receipt)
    }
}
