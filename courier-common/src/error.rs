//! Validation errors for records and configuration.
//!
//! These surface to the user before a send starts and are never retried.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field is present but its value is unacceptable.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The field this error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField(field) | Self::InvalidValue { field, .. } => field,
        }
    }
}

/// Join a list of validation failures into one reason string.
#[must_use]
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
