//! Typed record identifiers
//!
//! Every record owns its identity; the pipeline only ever passes these around.
//! New identifiers are ULIDs so that they sort by creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh identifier
            #[must_use]
            pub fn generate() -> Self {
                Self(ulid::Ulid::new().to_string())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

record_id!(
    /// Sender identity
    BrandId
);
record_id!(CampaignId);
record_id!(ContactId);
record_id!(
    /// A contact list a campaign targets
    ListId
);
record_id!(SequenceId);
record_id!(
    /// A single step of a sequence
    SequenceEmailId
);
record_id!(EnrollmentId);
record_id!(EventId);
