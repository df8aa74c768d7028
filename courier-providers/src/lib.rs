//! Transport providers for the courier delivery pipeline
//!
//! Every provider implements [`EmailProvider`]. The [`ProviderFactory`]
//! turns a brand record into one of the concrete adapters:
//!
//! | provider   | `api`                   | `smtp`                         |
//! |------------|-------------------------|--------------------------------|
//! | `ses`      | SES v2 `SendEmail` (raw) | SES v2 `SendEmail` (raw)       |
//! | `sendgrid` | v3 `mail/send`          | `smtp.sendgrid.net` (`apikey`) |
//! | `mailgun`  | `messages`              | `smtp.mailgun.org`             |

pub mod error;
pub mod factory;
pub mod mailgun;
pub mod message;
pub mod mime;
pub mod provider;
pub mod sendgrid;
pub mod ses;
pub mod settings;
pub mod sigv4;
pub mod smtp;
pub mod text;

pub use error::ProviderError;
pub use factory::{ProviderFactory, ProviderResolver, Transport, validate_config};
pub use message::{
    BatchOptions, BatchResult, CredentialCheck, OutboundEmail, Quota, RawEmail, SendReceipt,
};
pub use provider::EmailProvider;
pub use settings::ProviderSettings;
pub use text::html_to_text;
