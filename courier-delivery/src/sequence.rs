//! Sequence enrollment engine
//!
//! An enrollment moves through the steps of its sequence one job at a time.
//! Each step waits for its delay after the previous successful send (after
//! enrollment for the first step) and is never sent twice once the
//! enrollment records it as sent.

use chrono::{DateTime, Utc};
use courier_common::{
    ContactId, EnrollmentId, SequenceId, internal,
    models::{
        EmailSequence, EnrollmentStats, EnrollmentStatus, SendStatus, SentEmail, SequenceEnrollment,
        SequenceStatus,
    },
    tracing,
};

use crate::{
    dispatch::{
        DispatchSettings, Message, Sender, Services, Source, UPDATE_ATTEMPTS, wait_as_delta,
    },
    error::DispatchError,
    queue::Job,
    store::StoreError,
};

/// Result of running one sequence step job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step went out; `next_due` is when the following step is due
    Sent {
        message_id: String,
        next_due: Option<DateTime<Utc>>,
    },
    /// The step had already been sent and the enrollment moved past it
    AlreadySent { next_due: Option<DateTime<Utc>> },
    /// The provider permanently refused the step; the enrollment moves on
    Failed {
        error: String,
        next_due: Option<DateTime<Utc>>,
    },
    /// The step's delay has not elapsed
    Waiting { until: DateTime<Utc> },
    Throttled { until: DateTime<Utc> },
    Completed,
    Cancelled,
    /// Halted on a configuration problem
    Paused { reason: String },
    /// The sequence is not active
    Inactive,
}

impl StepOutcome {
    /// When the enrollment's job should run again, if at all.
    #[must_use]
    pub const fn next_run(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Sent { next_due, .. }
            | Self::AlreadySent { next_due }
            | Self::Failed { next_due, .. } => *next_due,
            Self::Waiting { until } | Self::Throttled { until } => Some(*until),
            Self::Completed | Self::Cancelled | Self::Paused { .. } | Self::Inactive => None,
        }
    }
}

fn step_job(enrollment: &SequenceEnrollment) -> Job {
    Job::SequenceStep {
        sequence_id: enrollment.sequence_id.clone(),
        enrollment_id: enrollment.id.clone(),
    }
}

/// Whether the enrollment still counts towards the sequence's `active` stat.
const fn in_progress(status: EnrollmentStatus) -> bool {
    matches!(status, EnrollmentStatus::Active | EnrollmentStatus::Paused)
}

#[derive(Debug, Clone)]
pub struct SequenceEngine {
    services: Services,
    settings: DispatchSettings,
}

impl SequenceEngine {
    #[must_use]
    pub const fn new(services: Services, settings: DispatchSettings) -> Self {
        Self { services, settings }
    }

    /// Enroll a contact in a sequence and schedule its first step.
    ///
    /// Enrolling a contact twice returns the existing enrollment.
    pub async fn enroll(
        &self,
        sequence_id: &SequenceId,
        contact_id: &ContactId,
    ) -> Result<SequenceEnrollment, DispatchError> {
        let store = &self.services.store;
        let now = self.services.clock.now();

        if let Some(existing) = store.find_enrollment(sequence_id, contact_id).await? {
            return Ok(existing);
        }

        let sequence = store.sequence(sequence_id).await?;
        if sequence.status != SequenceStatus::Active {
            return Err(DispatchError::InvalidState(format!(
                "sequence {sequence_id} is {:?}, only active sequences accept enrollments",
                sequence.status
            )));
        }
        let Some(first) = sequence.step(0) else {
            return Err(DispatchError::Config(format!(
                "sequence {sequence_id} has no steps"
            )));
        };

        let contact = store.contact(contact_id).await?;
        if !contact.is_sendable() {
            return Err(DispatchError::RecipientSkipped(format!(
                "contact {contact_id} is {:?}",
                contact.status
            )));
        }

        let enrollment = SequenceEnrollment::new(sequence_id.clone(), contact_id.clone(), now);
        let enrollment = match store.insert_enrollment(&enrollment).await {
            Ok(saved) => saved,
            Err(e) if e.is_conflict() => {
                // Lost a race with another enrollment of the same contact
                return store
                    .find_enrollment(sequence_id, contact_id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("enrollment", contact_id).into());
            }
            Err(e) => return Err(e.into()),
        };

        self.update_stats(sequence_id, |stats| {
            stats.total_enrolled += 1;
            stats.active += 1;
        })
        .await;

        let due = enrollment.due_at(first).max(now);
        self.services.queue.enqueue(step_job(&enrollment), due).await?;

        internal!(
            level = INFO,
            sequence_id = %sequence_id,
            contact_id = %contact_id,
            enrollment_id = %enrollment.id,
            "Contact enrolled in sequence"
        );

        Ok(enrollment)
    }

    /// Run the enrollment's current step if it is due.
    ///
    /// Configuration errors pause the enrollment and come back as
    /// [`StepOutcome::Paused`].
    pub async fn process_step(
        &self,
        sequence_id: &SequenceId,
        enrollment_id: &EnrollmentId,
    ) -> Result<StepOutcome, DispatchError> {
        match self.run_step(sequence_id, enrollment_id).await {
            Err(e) if e.is_config() => {
                let reason = e.to_string();
                self.pause_enrollment(enrollment_id, &reason).await?;
                Ok(StepOutcome::Paused { reason })
            }
            other => other,
        }
    }

    async fn run_step(
        &self,
        sequence_id: &SequenceId,
        enrollment_id: &EnrollmentId,
    ) -> Result<StepOutcome, DispatchError> {
        let store = &self.services.store;
        let now = self.services.clock.now();
        let mut enrollment = store.enrollment(enrollment_id).await?;

        match enrollment.status {
            EnrollmentStatus::Active => {}
            EnrollmentStatus::Cancelled => return Ok(StepOutcome::Cancelled),
            EnrollmentStatus::Completed => return Ok(StepOutcome::Completed),
            EnrollmentStatus::Paused => {
                return Ok(StepOutcome::Paused {
                    reason: "enrollment is paused".to_string(),
                });
            }
        }

        let sequence = store.sequence(sequence_id).await?;
        if sequence.status != SequenceStatus::Active {
            internal!(
                sequence_id = %sequence_id,
                status = ?sequence.status,
                "Sequence not active, holding step"
            );
            return Ok(StepOutcome::Inactive);
        }

        let contact = match store.contact(&enrollment.contact_id).await {
            Ok(contact) if contact.is_sendable() => contact,
            Ok(_) | Err(StoreError::NotFound { .. }) => {
                self.finish(&mut enrollment, EnrollmentStatus::Cancelled, now)
                    .await?;
                return Ok(StepOutcome::Cancelled);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(step) = sequence.step(enrollment.current_step) else {
            self.finish(&mut enrollment, EnrollmentStatus::Completed, now)
                .await?;
            return Ok(StepOutcome::Completed);
        };

        if enrollment.has_sent(step.order) {
            internal!(
                enrollment_id = %enrollment_id,
                order = step.order,
                "Step already sent, advancing"
            );
            enrollment.current_step += 1;
            let next_due = self.advance(&mut enrollment, &sequence, now).await?;
            return Ok(StepOutcome::AlreadySent { next_due });
        }

        let due = enrollment.due_at(step);
        if due > now {
            return Ok(StepOutcome::Waiting { until: due });
        }

        let brand = store.brand(&sequence.brand_id).await?;
        if !brand.can_send() {
            return Err(DispatchError::Config(format!(
                "brand {} is not active",
                brand.id
            )));
        }
        let connection = self.services.connect(&brand).await?;
        let sender = Sender::for_sequence(&brand, &sequence.email_config);
        let message = Message {
            subject: &step.subject,
            html: &step.content,
            text: None,
            tracking: sequence.tracking,
            source: Source::Sequence(&sequence.id),
        };

        let result = self
            .services
            .deliver(&connection, &brand, &sender, &contact, &message, &self.settings)
            .await;
        let order = step.order;

        match result {
            Ok(receipt) => {
                enrollment.emails_sent.push(SentEmail {
                    order,
                    sent_at: now,
                    message_id: Some(receipt.message_id.clone()),
                    status: SendStatus::Sent,
                    error: None,
                });
                enrollment.current_step += 1;
                let next_due = self.advance(&mut enrollment, &sequence, now).await?;

                self.update_stats(sequence_id, |stats| stats.emails_sent += 1)
                    .await;

                Ok(StepOutcome::Sent {
                    message_id: receipt.message_id,
                    next_due,
                })
            }
            Err(DispatchError::QuotaExceeded { wait }) => Ok(StepOutcome::Throttled {
                until: now + wait_as_delta(wait),
            }),
            Err(DispatchError::Provider(e)) if !e.is_config() => {
                let error = e.to_string();
                tracing::warn!(
                    enrollment_id = %enrollment_id,
                    order,
                    error = %error,
                    "Sequence step send failed"
                );

                enrollment.emails_sent.push(SentEmail {
                    order,
                    sent_at: now,
                    message_id: None,
                    status: SendStatus::Failed,
                    error: Some(error.clone()),
                });

                if e.is_retryable() {
                    store.save_enrollment(&enrollment).await?;
                    return Err(DispatchError::Provider(e));
                }

                enrollment.current_step += 1;
                let next_due = self.advance(&mut enrollment, &sequence, now).await?;
                Ok(StepOutcome::Failed { error, next_due })
            }
            Err(e) => Err(e),
        }
    }

    /// Save an enrollment that moved to its next step, completing it after
    /// the last step. Returns when the next step is due.
    async fn advance(
        &self,
        enrollment: &mut SequenceEnrollment,
        sequence: &EmailSequence,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, DispatchError> {
        let Some(next) = sequence.step(enrollment.current_step) else {
            self.finish(enrollment, EnrollmentStatus::Completed, now)
                .await?;
            return Ok(None);
        };

        let due = enrollment.due_at(next).max(now);
        *enrollment = self.services.store.save_enrollment(enrollment).await?;
        Ok(Some(due))
    }

    /// Move an enrollment into a final state and update the sequence stats.
    async fn finish(
        &self,
        enrollment: &mut SequenceEnrollment,
        status: EnrollmentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let was_in_progress = in_progress(enrollment.status);
        enrollment.status = status;
        enrollment.completed_at = Some(now);
        *enrollment = self.services.store.save_enrollment(enrollment).await?;

        let sequence_id = enrollment.sequence_id.clone();
        self.update_stats(&sequence_id, |stats| {
            match status {
                EnrollmentStatus::Completed => stats.completed += 1,
                EnrollmentStatus::Cancelled => stats.cancelled += 1,
                EnrollmentStatus::Active | EnrollmentStatus::Paused => {}
            }
            if was_in_progress {
                stats.active = stats.active.saturating_sub(1);
            }
        })
        .await;

        internal!(
            level = INFO,
            enrollment_id = %enrollment.id,
            status = ?status,
            "Enrollment finished"
        );
        Ok(())
    }

    /// Cancel every unfinished enrollment of a contact. Returns how many
    /// were cancelled.
    pub async fn cancel_for_contact(&self, contact_id: &ContactId) -> Result<usize, DispatchError> {
        let now = self.services.clock.now();
        let mut cancelled = 0;

        for enrollment in self
            .services
            .store
            .enrollments_for_contact(contact_id)
            .await?
        {
            if !in_progress(enrollment.status) {
                continue;
            }

            let mut enrollment = enrollment;
            let mut attempts = 0;
            loop {
                match self
                    .finish(&mut enrollment, EnrollmentStatus::Cancelled, now)
                    .await
                {
                    Ok(()) => break,
                    Err(DispatchError::Conflict(_)) if attempts + 1 < UPDATE_ATTEMPTS => {
                        attempts += 1;
                        enrollment = self.services.store.enrollment(&enrollment.id).await?;
                        if !in_progress(enrollment.status) {
                            break;
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            if enrollment.status == EnrollmentStatus::Cancelled {
                cancelled += 1;
            }
        }

        internal!(
            level = INFO,
            contact_id = %contact_id,
            cancelled,
            "Cancelled enrollments for contact"
        );
        Ok(cancelled)
    }

    /// Halt an enrollment until its configuration problem is fixed.
    pub async fn pause_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
        reason: &str,
    ) -> Result<SequenceEnrollment, DispatchError> {
        let store = &self.services.store;
        let mut attempts = 0;

        loop {
            let mut enrollment = store.enrollment(enrollment_id).await?;
            if enrollment.status != EnrollmentStatus::Active {
                return Ok(enrollment);
            }
            enrollment.status = EnrollmentStatus::Paused;

            match store.save_enrollment(&enrollment).await {
                Ok(saved) => {
                    tracing::warn!(enrollment_id = %enrollment_id, reason, "Enrollment paused");
                    return Ok(saved);
                }
                Err(e) if e.is_conflict() && attempts + 1 < UPDATE_ATTEMPTS => attempts += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reactivate paused enrollments of a sequence and make sure every
    /// active enrollment has a pending job. Returns how many enrollments
    /// were reactivated.
    pub async fn resume_paused(&self, sequence_id: &SequenceId) -> Result<usize, DispatchError> {
        let store = &self.services.store;
        let now = self.services.clock.now();
        let sequence = store.sequence(sequence_id).await?;

        if sequence.status != SequenceStatus::Active {
            return Err(DispatchError::InvalidState(format!(
                "sequence {sequence_id} is {:?}",
                sequence.status
            )));
        }

        let mut resumed = 0;
        for mut enrollment in store
            .enrollments_with_status(sequence_id, EnrollmentStatus::Paused)
            .await?
        {
            enrollment.status = EnrollmentStatus::Active;
            match store.save_enrollment(&enrollment).await {
                Ok(_) => resumed += 1,
                // Changed under us; the next call picks it up
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(e.into()),
            }
        }

        for enrollment in store
            .enrollments_with_status(sequence_id, EnrollmentStatus::Active)
            .await?
        {
            let due = sequence
                .step(enrollment.current_step)
                .map_or(now, |step| enrollment.due_at(step).max(now));
            self.services.queue.enqueue(step_job(&enrollment), due).await?;
        }

        internal!(
            level = INFO,
            sequence_id = %sequence_id,
            resumed,
            "Resumed paused enrollments"
        );
        Ok(resumed)
    }

    /// Apply a change to the sequence's enrollment stats. Stats are
    /// advisory, so failures are logged rather than returned.
    async fn update_stats<F>(&self, sequence_id: &SequenceId, apply: F)
    where
        F: Fn(&mut EnrollmentStats) + Send + Sync,
    {
        let store = &self.services.store;

        for _ in 0..UPDATE_ATTEMPTS {
            let mut sequence = match store.sequence(sequence_id).await {
                Ok(sequence) => sequence,
                Err(e) => {
                    tracing::warn!(sequence_id = %sequence_id, error = %e, "Failed to load sequence stats");
                    return;
                }
            };
            apply(&mut sequence.stats);

            match store.save_sequence(&sequence).await {
                Ok(_) => return,
                Err(e) if e.is_conflict() => {}
                Err(e) => {
                    tracing::warn!(sequence_id = %sequence_id, error = %e, "Failed to save sequence stats");
                    return;
                }
            }
        }

        tracing::warn!(sequence_id = %sequence_id, "Sequence stats update kept conflicting, dropped");
    }
}
