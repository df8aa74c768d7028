//! SMTP relay adapter for providers that expose a submission endpoint

use std::time::Duration;

use async_trait::async_trait;
use courier_common::outgoing;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    transport::smtp::authentication::Credentials,
};

use crate::{
    EmailProvider, ProviderError,
    message::{CredentialCheck, OutboundEmail, Quota, RawEmail, SendReceipt},
    mime,
};

/// Connection parameters for a STARTTLS submission relay
#[derive(Clone)]
pub struct SmtpRelay {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SmtpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpRelay")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

pub struct SmtpProvider {
    name: &'static str,
    host: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    fallback_quota: Quota,
}

impl std::fmt::Debug for SmtpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpProvider")
            .field("name", &self.name)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SmtpProvider {
    /// Build a pooled transport for `relay`. No connection is made until the
    /// first send.
    pub fn new(
        name: &'static str,
        relay: SmtpRelay,
        fallback_quota: Quota,
    ) -> Result<Self, ProviderError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&relay.host)
            .map_err(|e| ProviderError::Configuration(format!("Invalid SMTP relay: {e}")))?
            .port(relay.port)
            .credentials(Credentials::new(relay.username, relay.password))
            .timeout(Some(relay.timeout))
            .build();

        Ok(Self {
            name,
            host: relay.host,
            transport,
            fallback_quota,
        })
    }

    async fn deliver(
        &self,
        email: &OutboundEmail,
        extra_headers: &[(String, String)],
    ) -> Result<SendReceipt, ProviderError> {
        let built = mime::build(email, extra_headers)?;

        outgoing!(
            level = DEBUG,
            provider = self.name,
            relay = %self.host,
            "Submitting message to SMTP relay"
        );
        self.transport.send(built.message).await?;

        Ok(SendReceipt {
            message_id: built.message_id,
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        self.deliver(email, &[]).await
    }

    async fn send_raw(&self, email: &RawEmail) -> Result<SendReceipt, ProviderError> {
        self.deliver(&email.email, &email.compliance_headers()).await
    }

    /// Relays do not report limits.
    async fn get_quota(&self) -> Quota {
        self.fallback_quota
    }

    async fn verify_credentials(&self) -> CredentialCheck {
        match self.transport.test_connection().await {
            Ok(true) => CredentialCheck::valid(),
            Ok(false) => CredentialCheck::invalid(format!("{} did not accept the connection", self.host)),
            Err(e) => CredentialCheck::invalid(ProviderError::from(e).to_string()),
        }
    }
}
