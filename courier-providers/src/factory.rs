//! Provider selection from a brand's configuration
//!
//! The factory decrypts the brand's stored secrets and picks one of a closed
//! set of adapters by `(provider, connection_type)`. Unknown providers fall
//! back to SES.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_common::{
    ValidationError, crypto::CredentialCipher, error::describe, internal,
    models::{Brand, BrandCredentials, ConnectionType, ProviderKind},
};
use tracing::warn;

use crate::{
    EmailProvider, ProviderError,
    mailgun::MailgunProvider,
    message::{BatchOptions, BatchResult, CredentialCheck, OutboundEmail, Quota, RawEmail, SendReceipt},
    sendgrid::SendgridProvider,
    ses::SesProvider,
    settings::ProviderSettings,
    smtp::{SmtpProvider, SmtpRelay},
};

/// Every transport the pipeline can send through
#[derive(Debug)]
pub enum Transport {
    Ses(SesProvider),
    SendgridApi(SendgridProvider),
    SendgridSmtp(SmtpProvider),
    MailgunApi(MailgunProvider),
    MailgunSmtp(SmtpProvider),
}

impl Transport {
    fn inner(&self) -> &dyn EmailProvider {
        match self {
            Self::Ses(provider) => provider,
            Self::SendgridApi(provider) => provider,
            Self::MailgunApi(provider) => provider,
            Self::SendgridSmtp(provider) | Self::MailgunSmtp(provider) => provider,
        }
    }
}

#[async_trait]
impl EmailProvider for Transport {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        self.inner().send(email).await
    }

    async fn send_raw(&self, email: &RawEmail) -> Result<SendReceipt, ProviderError> {
        self.inner().send_raw(email).await
    }

    async fn send_batch(
        &self,
        emails: &[OutboundEmail],
        options: &BatchOptions,
    ) -> Vec<BatchResult> {
        self.inner().send_batch(emails, options).await
    }

    async fn get_quota(&self) -> Quota {
        self.inner().get_quota().await
    }

    async fn verify_credentials(&self) -> CredentialCheck {
        self.inner().verify_credentials().await
    }
}

/// Resolves the provider a brand sends through
pub trait ProviderResolver: Send + Sync + std::fmt::Debug {
    fn resolve(&self, brand: &Brand) -> Result<Arc<dyn EmailProvider>, ProviderError>;
}

fn present(value: Option<&String>) -> bool {
    value.is_some_and(|value| !value.trim().is_empty())
}

fn require(errors: &mut Vec<ValidationError>, value: Option<&String>, field: &str) {
    if !present(value) {
        errors.push(ValidationError::missing(field));
    }
}

/// Check that the credentials needed by `(provider, connection)` are present.
#[must_use]
pub fn validate_config(
    provider: ProviderKind,
    connection: ConnectionType,
    credentials: &BrandCredentials,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match (provider, connection) {
        (ProviderKind::Sendgrid, _) => {
            require(&mut errors, credentials.sendgrid.api_key.as_ref(), "sendgrid.api_key");
        }
        (ProviderKind::Mailgun, connection) => {
            let mailgun = &credentials.mailgun;
            if connection == ConnectionType::Smtp {
                require(&mut errors, mailgun.smtp_username.as_ref(), "mailgun.smtp_username");
                require(&mut errors, mailgun.smtp_password.as_ref(), "mailgun.smtp_password");
            } else {
                require(&mut errors, mailgun.api_key.as_ref(), "mailgun.api_key");
                require(&mut errors, mailgun.domain.as_ref(), "mailgun.domain");
            }
            if let Some(region) = &mailgun.region
                && !matches!(region.as_str(), "" | "us" | "eu")
            {
                errors.push(ValidationError::invalid("mailgun.region", "must be us or eu"));
            }
        }
        (ProviderKind::Ses | ProviderKind::Unknown, _) => {
            let ses = &credentials.ses;
            require(&mut errors, ses.region.as_ref(), "ses.region");
            require(&mut errors, ses.access_key_id.as_ref(), "ses.access_key_id");
            require(&mut errors, ses.secret_access_key.as_ref(), "ses.secret_access_key");
        }
    }

    errors
}

#[derive(Debug)]
pub struct ProviderFactory {
    cipher: Arc<CredentialCipher>,
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl ProviderFactory {
    pub fn new(
        cipher: Arc<CredentialCipher>,
        settings: ProviderSettings,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            cipher,
            settings,
            client,
        })
    }

    fn secret(&self, value: Option<&String>, decrypt: bool) -> String {
        let value = value.map(String::as_str).unwrap_or_default();
        if decrypt {
            self.cipher.decrypt(value)
        } else {
            value.to_string()
        }
    }

    fn plain(value: Option<&String>) -> String {
        value.cloned().unwrap_or_default()
    }

    /// Build the transport for `brand`, decrypting stored secrets when
    /// `decrypt` is set.
    pub fn create(&self, brand: &Brand, decrypt: bool) -> Result<Transport, ProviderError> {
        let errors = validate_config(brand.provider, brand.connection_type, &brand.credentials);
        if !errors.is_empty() {
            return Err(ProviderError::Configuration(describe(&errors)));
        }

        let credentials = &brand.credentials;
        let quotas = &self.settings.default_quotas;
        let timeout = Duration::from_secs(self.settings.request_timeout_secs);

        let transport = match (brand.provider, brand.connection_type) {
            (ProviderKind::Sendgrid, ConnectionType::Api) => {
                Transport::SendgridApi(SendgridProvider::new(
                    self.client.clone(),
                    &self.settings.sendgrid.api_base,
                    self.secret(credentials.sendgrid.api_key.as_ref(), decrypt),
                    quotas.sendgrid,
                ))
            }
            (ProviderKind::Sendgrid, ConnectionType::Smtp) => Transport::SendgridSmtp(
                SmtpProvider::new(
                    "sendgrid-smtp",
                    SmtpRelay {
                        host: self.settings.sendgrid.smtp_host.clone(),
                        port: self.settings.sendgrid.smtp_port,
                        username: "apikey".to_string(),
                        password: self.secret(credentials.sendgrid.api_key.as_ref(), decrypt),
                        timeout,
                    },
                    quotas.sendgrid,
                )?,
            ),
            (ProviderKind::Mailgun, connection) => {
                let mailgun = &credentials.mailgun;
                let eu = mailgun.region.as_deref() == Some("eu");

                if connection == ConnectionType::Smtp {
                    let host = if eu {
                        &self.settings.mailgun.smtp_host_eu
                    } else {
                        &self.settings.mailgun.smtp_host_us
                    };
                    Transport::MailgunSmtp(SmtpProvider::new(
                        "mailgun-smtp",
                        SmtpRelay {
                            host: host.clone(),
                            port: self.settings.mailgun.smtp_port,
                            username: Self::plain(mailgun.smtp_username.as_ref()),
                            password: self.secret(mailgun.smtp_password.as_ref(), decrypt),
                            timeout,
                        },
                        quotas.mailgun,
                    )?)
                } else {
                    let api_base = if eu {
                        &self.settings.mailgun.api_base_eu
                    } else {
                        &self.settings.mailgun.api_base_us
                    };
                    Transport::MailgunApi(MailgunProvider::new(
                        self.client.clone(),
                        api_base,
                        self.secret(mailgun.api_key.as_ref(), decrypt),
                        Self::plain(mailgun.domain.as_ref()),
                        quotas.mailgun,
                    ))
                }
            }
            (kind @ (ProviderKind::Ses | ProviderKind::Unknown), connection) => {
                if kind == ProviderKind::Unknown {
                    warn!(brand_id = %brand.id, "Unknown provider, falling back to SES");
                }
                if connection == ConnectionType::Smtp {
                    internal!(
                        level = DEBUG,
                        brand_id = %brand.id,
                        "SES brands always send through the API"
                    );
                }

                let ses = &credentials.ses;
                let region = ses
                    .region
                    .clone()
                    .filter(|region| !region.is_empty())
                    .unwrap_or_else(|| self.settings.ses.default_region.clone());
                Transport::Ses(SesProvider::new(
                    self.client.clone(),
                    self.settings.ses.endpoint.as_deref(),
                    &region,
                    Self::plain(ses.access_key_id.as_ref()),
                    self.secret(ses.secret_access_key.as_ref(), decrypt),
                    quotas.ses,
                ))
            }
        };

        Ok(transport)
    }
}

impl ProviderResolver for ProviderFactory {
    fn resolve(&self, brand: &Brand) -> Result<Arc<dyn EmailProvider>, ProviderError> {
        Ok(Arc::new(self.create(brand, true)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use courier_common::{
        BrandId,
        models::{BrandStatus, MailgunCredentials, SendgridCredentials, SesCredentials},
    };

    use super::*;

    fn cipher() -> Arc<CredentialCipher> {
        static CIPHER: OnceLock<Arc<CredentialCipher>> = OnceLock::new();
        CIPHER
            .get_or_init(|| {
                Arc::new(CredentialCipher::new("factory-tests").unwrap_or_else(|e| panic!("{e}")))
            })
            .clone()
    }

    fn factory() -> ProviderFactory {
        ProviderFactory::new(cipher(), ProviderSettings::default()).unwrap_or_else(|e| panic!("{e}"))
    }

    fn brand(provider: ProviderKind, connection: ConnectionType) -> Brand {
        Brand {
            id: BrandId::from("brand-1"),
            name: "Acme".to_string(),
            provider,
            connection_type: connection,
            credentials: BrandCredentials {
                ses: SesCredentials {
                    region: Some("eu-west-1".to_string()),
                    access_key_id: Some("AKID".to_string()),
                    secret_access_key: Some("secret".to_string()),
                },
                sendgrid: SendgridCredentials {
                    api_key: Some("SG.key".to_string()),
                },
                mailgun: MailgunCredentials {
                    api_key: Some("key-1".to_string()),
                    domain: Some("mg.acme.test".to_string()),
                    region: Some("eu".to_string()),
                    smtp_username: Some("postmaster@mg.acme.test".to_string()),
                    smtp_password: Some("pw".to_string()),
                },
            },
            from_email: "news@acme.test".to_string(),
            from_name: None,
            reply_to: None,
            tracking_domain: None,
            status: BrandStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_selects_adapter_by_provider_and_connection() {
        let factory = factory();

        let cases = [
            (ProviderKind::Ses, ConnectionType::Api, "ses"),
            (ProviderKind::Ses, ConnectionType::Smtp, "ses"),
            (ProviderKind::Sendgrid, ConnectionType::Api, "sendgrid"),
            (ProviderKind::Sendgrid, ConnectionType::Smtp, "sendgrid-smtp"),
            (ProviderKind::Mailgun, ConnectionType::Api, "mailgun"),
            (ProviderKind::Mailgun, ConnectionType::Smtp, "mailgun-smtp"),
            (ProviderKind::Unknown, ConnectionType::Api, "ses"),
        ];

        for (provider, connection, expected) in cases {
            let transport = factory
                .create(&brand(provider, connection), false)
                .unwrap_or_else(|e| panic!("{provider}/{connection:?}: {e}"));
            assert_eq!(transport.name(), expected);
        }
    }

    #[test]
    fn test_missing_credentials_are_listed() {
        let errors = validate_config(
            ProviderKind::Mailgun,
            ConnectionType::Api,
            &BrandCredentials::default(),
        );
        let fields: Vec<_> = errors.iter().map(ValidationError::field).collect();
        assert_eq!(fields, vec!["mailgun.api_key", "mailgun.domain"]);

        let errors = validate_config(
            ProviderKind::Sendgrid,
            ConnectionType::Smtp,
            &BrandCredentials::default(),
        );
        assert_eq!(errors, vec![ValidationError::missing("sendgrid.api_key")]);

        let errors = validate_config(
            ProviderKind::Unknown,
            ConnectionType::Api,
            &BrandCredentials::default(),
        );
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let mut credentials = BrandCredentials::default();
        credentials.sendgrid.api_key = Some("   ".to_string());
        let errors = validate_config(ProviderKind::Sendgrid, ConnectionType::Api, &credentials);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_invalid_mailgun_region() {
        let mut brand = brand(ProviderKind::Mailgun, ConnectionType::Api);
        brand.credentials.mailgun.region = Some("apac".to_string());
        let errors = validate_config(brand.provider, brand.connection_type, &brand.credentials);
        assert_eq!(
            errors,
            vec![ValidationError::invalid("mailgun.region", "must be us or eu")]
        );
    }

    #[test]
    fn test_create_rejects_incomplete_config() {
        let mut brand = brand(ProviderKind::Sendgrid, ConnectionType::Api);
        brand.credentials.sendgrid.api_key = None;
        let err = factory().create(&brand, true).err();
        assert!(matches!(err, Some(ProviderError::Configuration(reason)) if reason.contains("sendgrid.api_key")));
    }

    #[test]
    fn test_secrets_are_decrypted() {
        let factory = factory();
        let stored = cipher().encrypt("SG.real").unwrap_or_default();
        assert_eq!(factory.secret(Some(&stored), true), "SG.real");
        assert_eq!(factory.secret(Some(&stored), false), stored);
        assert_eq!(factory.secret(Some(&"plain".to_string()), true), "plain");
    }
}
