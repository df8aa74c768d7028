//! Automated multi-step sequences and per-contact enrollments

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::campaign::TrackingSettings;
use crate::{BrandId, ContactId, EnrollmentId, ListId, SequenceEmailId, SequenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Minutes,
    Hours,
    #[default]
    Days,
}

impl DelayUnit {
    /// Length of `amount` units.
    #[must_use]
    pub fn duration(self, amount: u32) -> Duration {
        let amount = i64::from(amount);
        match self {
            Self::Minutes => Duration::minutes(amount),
            Self::Hours => Duration::hours(amount),
            Self::Days => Duration::days(amount),
        }
    }
}

/// One step of a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEmail {
    pub id: SequenceEmailId,
    pub order: u32,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub delay_amount: u32,
    #[serde(default)]
    pub delay_unit: DelayUnit,
}

impl SequenceEmail {
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay_unit.duration(self.delay_amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    ContactList,
    Integration,
    Webhook,
    #[default]
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceTrigger {
    #[serde(default)]
    pub kind: TriggerKind,
    /// Lists whose new contacts are enrolled, for `contact_list` triggers
    #[serde(default)]
    pub list_ids: Vec<ListId>,
}

/// Sender overrides for a sequence; unset fields fall back to the brand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEmailConfig {
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SequenceStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentStats {
    #[serde(default)]
    pub total_enrolled: u64,
    #[serde(default)]
    pub active: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub cancelled: u64,
    #[serde(default)]
    pub emails_sent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSequence {
    pub id: SequenceId,
    pub brand_id: BrandId,
    pub name: String,
    pub emails: Vec<SequenceEmail>,
    #[serde(default)]
    pub trigger: SequenceTrigger,
    #[serde(default)]
    pub email_config: SequenceEmailConfig,
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub status: SequenceStatus,
    #[serde(default)]
    pub stats: EnrollmentStats,
    #[serde(default)]
    pub version: u64,
}

impl EmailSequence {
    /// Steps in send order.
    #[must_use]
    pub fn ordered_steps(&self) -> Vec<&SequenceEmail> {
        let mut steps: Vec<_> = self.emails.iter().collect();
        steps.sort_by_key(|step| step.order);
        steps
    }

    /// The step at position `index` in send order.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&SequenceEmail> {
        self.ordered_steps().get(index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    /// Halted on a configuration problem; resumes once it is fixed
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
}

/// Audit entry for one step send attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentEmail {
    pub order: u32,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
    pub status: SendStatus,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEnrollment {
    pub id: EnrollmentId,
    pub sequence_id: SequenceId,
    pub contact_id: ContactId,
    #[serde(default)]
    pub status: EnrollmentStatus,
    /// Index into the sequence's steps in send order
    #[serde(default)]
    pub current_step: usize,
    pub enrolled_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub emails_sent: Vec<SentEmail>,
    #[serde(default)]
    pub version: u64,
}

impl SequenceEnrollment {
    #[must_use]
    pub fn new(sequence_id: SequenceId, contact_id: ContactId, now: DateTime<Utc>) -> Self {
        Self {
            id: EnrollmentId::generate(),
            sequence_id,
            contact_id,
            status: EnrollmentStatus::Active,
            current_step: 0,
            enrolled_at: now,
            completed_at: None,
            emails_sent: Vec::new(),
            version: 0,
        }
    }

    /// Whether the step with `order` already went out successfully.
    #[must_use]
    pub fn has_sent(&self, order: u32) -> bool {
        self.emails_sent
            .iter()
            .any(|sent| sent.order == order && sent.status == SendStatus::Sent)
    }

    /// When the most recent successful step went out.
    #[must_use]
    pub fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        self.emails_sent
            .iter()
            .filter(|sent| sent.status == SendStatus::Sent)
            .map(|sent| sent.sent_at)
            .max()
    }

    /// When `step` becomes due: its delay after the previous send, or after
    /// enrollment for the first step.
    #[must_use]
    pub fn due_at(&self, step: &SequenceEmail) -> DateTime<Utc> {
        self.last_sent_at().unwrap_or(self.enrolled_at) + step.delay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(order: u32, amount: u32, unit: DelayUnit) -> SequenceEmail {
        SequenceEmail {
            id: SequenceEmailId::generate(),
            order,
            subject: format!("Step {order}"),
            content: "<p>hi</p>".to_string(),
            delay_amount: amount,
            delay_unit: unit,
        }
    }

    #[test]
    fn test_delay_units() {
        assert_eq!(DelayUnit::Minutes.duration(5), Duration::minutes(5));
        assert_eq!(DelayUnit::Hours.duration(2), Duration::hours(2));
        assert_eq!(DelayUnit::Days.duration(1), Duration::days(1));
    }

    #[test]
    fn test_due_at_measures_from_last_send() {
        let enrolled = Utc::now();
        let mut enrollment =
            SequenceEnrollment::new(SequenceId::from("s"), ContactId::from("c"), enrolled);

        let first = step(0, 0, DelayUnit::Minutes);
        assert_eq!(enrollment.due_at(&first), enrolled);

        let sent_at = enrolled + Duration::minutes(3);
        enrollment.emails_sent.push(SentEmail {
            order: 0,
            sent_at,
            message_id: Some("m-1".to_string()),
            status: SendStatus::Sent,
            error: None,
        });
        assert!(enrollment.has_sent(0));
        assert!(!enrollment.has_sent(1));

        let second = step(1, 2, DelayUnit::Hours);
        assert_eq!(enrollment.due_at(&second), sent_at + Duration::hours(2));
    }

    #[test]
    fn test_failed_entries_do_not_count_as_sent() {
        let mut enrollment =
            SequenceEnrollment::new(SequenceId::from("s"), ContactId::from("c"), Utc::now());
        enrollment.emails_sent.push(SentEmail {
            order: 0,
            sent_at: Utc::now(),
            message_id: None,
            status: SendStatus::Failed,
            error: Some("rejected".to_string()),
        });
        assert!(!enrollment.has_sent(0));
        assert!(enrollment.last_sent_at().is_none());
    }
}
