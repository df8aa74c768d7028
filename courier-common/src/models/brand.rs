//! Sender identity and provider selection

use serde::{Deserialize, Serialize};

use crate::BrandId;

/// Transport provider a brand sends through
///
/// Unknown values deserialize to [`ProviderKind::Unknown`]; the provider
/// factory treats those as SES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ses,
    Sendgrid,
    Mailgun,
    #[serde(other)]
    Unknown,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ses => "ses",
            Self::Sendgrid => "sendgrid",
            Self::Mailgun => "mailgun",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Api,
    Smtp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrandStatus {
    #[default]
    PendingSetup,
    PendingVerification,
    Active,
    Inactive,
}

/// Amazon SES credentials. `secret_access_key` is stored encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SesCredentials {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

/// SendGrid credentials. `api_key` is stored encrypted and doubles as the
/// SMTP relay password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendgridCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Mailgun credentials. `api_key` and `smtp_password` are stored encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailgunCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    /// `us` (default) or `eu`
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
}

/// Per-provider credential blocks. Only the block for the selected provider
/// is consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandCredentials {
    #[serde(default)]
    pub ses: SesCredentials,
    #[serde(default)]
    pub sendgrid: SendgridCredentials,
    #[serde(default)]
    pub mailgun: MailgunCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub credentials: BrandCredentials,
    pub from_email: String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Overrides the configured tracking domain for this brand's links
    #[serde(default)]
    pub tracking_domain: Option<String>,
    #[serde(default)]
    pub status: BrandStatus,
}

impl Brand {
    /// Whether the brand may send at all.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.status == BrandStatus::Active
    }
}
