//! Records read and written by the delivery pipeline.
//!
//! Only the fields the pipeline depends on are modelled; everything else
//! belongs to the store's owners.

pub mod brand;
pub mod campaign;
pub mod contact;
pub mod event;
pub mod sequence;

pub use brand::{
    Brand, BrandCredentials, BrandStatus, ConnectionType, MailgunCredentials, ProviderKind,
    SendgridCredentials, SesCredentials,
};
pub use campaign::{
    Campaign, CampaignStats, CampaignStatus, ProcessingCursor, ScheduleType, TrackingSettings,
    WarmupConfig, WarmupStage,
};
pub use contact::{Contact, ContactStatus};
pub use event::{EventType, TrackingEvent};
pub use sequence::{
    DelayUnit, EmailSequence, EnrollmentStats, EnrollmentStatus, SendStatus, SentEmail,
    SequenceEmail, SequenceEmailConfig, SequenceEnrollment, SequenceStatus, SequenceTrigger,
    TriggerKind,
};
