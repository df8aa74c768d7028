//! Endpoint, timeout and fallback quota configuration for providers

use serde::Deserialize;

use crate::message::Quota;

const fn default_request_timeout() -> u64 {
    30
}

fn default_ses_region() -> String {
    "us-east-1".to_string()
}

fn default_sendgrid_api() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_sendgrid_smtp() -> String {
    "smtp.sendgrid.net".to_string()
}

fn default_mailgun_api_us() -> String {
    "https://api.mailgun.net".to_string()
}

fn default_mailgun_api_eu() -> String {
    "https://api.eu.mailgun.net".to_string()
}

fn default_mailgun_smtp_us() -> String {
    "smtp.mailgun.org".to_string()
}

fn default_mailgun_smtp_eu() -> String {
    "smtp.eu.mailgun.org".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_ses_quota() -> Quota {
    Quota {
        max_send_rate: 14.0,
        max_24_hour_send: Some(50_000),
        sent_last_24_hours: 0,
        is_monthly_quota: false,
    }
}

const fn default_sendgrid_quota() -> Quota {
    Quota {
        max_send_rate: 100.0,
        max_24_hour_send: None,
        sent_last_24_hours: 0,
        is_monthly_quota: true,
    }
}

const fn default_mailgun_quota() -> Quota {
    Quota {
        max_send_rate: 100.0,
        max_24_hour_send: None,
        sent_last_24_hours: 0,
        is_monthly_quota: true,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SesSettings {
    /// Region used when the brand does not name one
    #[serde(default = "default_ses_region")]
    pub default_region: String,

    /// Overrides `https://email.{region}.amazonaws.com`
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for SesSettings {
    fn default() -> Self {
        Self {
            default_region: default_ses_region(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendgridSettings {
    #[serde(default = "default_sendgrid_api")]
    pub api_base: String,
    #[serde(default = "default_sendgrid_smtp")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

impl Default for SendgridSettings {
    fn default() -> Self {
        Self {
            api_base: default_sendgrid_api(),
            smtp_host: default_sendgrid_smtp(),
            smtp_port: default_smtp_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunSettings {
    #[serde(default = "default_mailgun_api_us")]
    pub api_base_us: String,
    #[serde(default = "default_mailgun_api_eu")]
    pub api_base_eu: String,
    #[serde(default = "default_mailgun_smtp_us")]
    pub smtp_host_us: String,
    #[serde(default = "default_mailgun_smtp_eu")]
    pub smtp_host_eu: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

impl Default for MailgunSettings {
    fn default() -> Self {
        Self {
            api_base_us: default_mailgun_api_us(),
            api_base_eu: default_mailgun_api_eu(),
            smtp_host_us: default_mailgun_smtp_us(),
            smtp_host_eu: default_mailgun_smtp_eu(),
            smtp_port: default_smtp_port(),
        }
    }
}

/// Quotas assumed when a provider cannot report its own
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DefaultQuotas {
    #[serde(default = "default_ses_quota")]
    pub ses: Quota,
    #[serde(default = "default_sendgrid_quota")]
    pub sendgrid: Quota,
    #[serde(default = "default_mailgun_quota")]
    pub mailgun: Quota,
}

impl Default for DefaultQuotas {
    fn default() -> Self {
        Self {
            ses: default_ses_quota(),
            sendgrid: default_sendgrid_quota(),
            mailgun: default_mailgun_quota(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    /// Timeout for a single provider request (in seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub ses: SesSettings,

    #[serde(default)]
    pub sendgrid: SendgridSettings,

    #[serde(default)]
    pub mailgun: MailgunSettings,

    #[serde(default)]
    pub default_quotas: DefaultQuotas,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            ses: SesSettings::default(),
            sendgrid: SendgridSettings::default(),
            mailgun: MailgunSettings::default(),
            default_quotas: DefaultQuotas::default(),
        }
    }
}
