//! Shared building blocks for the courier delivery pipeline
//!
//! - [`models`]: the records the pipeline reads and writes back
//! - [`crypto`]: credential protection, tracking tokens and unsubscribe tokens
//! - [`logging`]: subscriber setup and the `internal!` logging macro
//! - [`error`]: validation errors surfaced before a send is accepted

pub mod crypto;
pub mod error;
pub mod ids;
pub mod logging;
pub mod models;
pub mod time;

pub use error::ValidationError;
pub use ids::{
    BrandId, CampaignId, ContactId, EnrollmentId, EventId, ListId, SequenceEmailId, SequenceId,
};
pub use time::{Clock, SystemClock};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
