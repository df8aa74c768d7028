use serde::{Deserialize, Serialize};

use crate::{ContactId, ListId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Active,
    Unsubscribed,
    Bounced,
    Complained,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub list_id: ListId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: ContactStatus,
}

impl Contact {
    /// Only active contacts are eligible for any send.
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.status == ContactStatus::Active
    }
}
