//! Errors raised by transport providers.
//!
//! Providers distinguish between problems with the brand's configuration,
//! which no amount of retrying will fix, and rejections or transport failures
//! that may succeed later.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials or settings are missing or unusable.
    #[error("Provider misconfigured: {0}")]
    Configuration(String),

    /// The provider refused the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider's API answered with a non-success HTTP status.
    #[error("Rejected by provider ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The SMTP relay refused the message.
    #[error("SMTP relay error: {message}")]
    Smtp { permanent: bool, message: String },

    /// The request never produced an answer (connect, TLS, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The message could not be built (bad address, bad header).
    #[error("Message could not be built: {0}")]
    Message(String),
}

impl ProviderError {
    /// Classify a non-success HTTP answer.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => Self::Authentication(message),
            _ => Self::Rejected { status, message },
        }
    }

    /// Whether the same send may succeed if attempted again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Smtp { permanent, .. } => !*permanent,
            Self::Transport(_) => true,
            Self::Configuration(_) | Self::Authentication(_) | Self::Message(_) => false,
        }
    }

    /// Whether the failure is caused by the brand's provider setup rather
    /// than the individual message.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Authentication(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), error.to_string());
        }
        Self::Transport(error.to_string())
    }
}

impl From<lettre::error::Error> for ProviderError {
    fn from(error: lettre::error::Error) -> Self {
        Self::Message(error.to_string())
    }
}

impl From<lettre::address::AddressError> for ProviderError {
    fn from(error: lettre::address::AddressError) -> Self {
        Self::Message(format!("Invalid address: {error}"))
    }
}

impl From<lettre::transport::smtp::Error> for ProviderError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        if error.is_permanent() {
            Self::Smtp {
                permanent: true,
                message: error.to_string(),
            }
        } else if error.is_transient() {
            Self::Smtp {
                permanent: false,
                message: error.to_string(),
            }
        } else {
            Self::Transport(error.to_string())
        }
    }
}
