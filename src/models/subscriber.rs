//! Subscriber data structures.

use serde::{Deserialize, Serialize};

use super::Domain;

fn enabled() -> bool {
    true
}

/// Per-domain notification switches. Every domain defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "enabled")]
    pub campaigns: bool,

    #[serde(default = "enabled")]
    pub recovery_updates: bool,

    #[serde(default = "enabled")]
    pub documents: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            campaigns: true,
            recovery_updates: true,
            documents: true,
        }
    }
}

impl NotificationPreferences {
    pub fn enabled_for(&self, domain: Domain) -> bool {
        match domain {
            Domain::Updates => self.recovery_updates,
            Domain::Campaigns => self.campaigns,
            Domain::Documents => self.documents,
        }
    }
}

/// A chat destination that receives notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub destination_id: String,
    pub username: Option<String>,
    pub preferences: NotificationPreferences,
}

impl Subscriber {
    pub fn new(destination_id: impl Into<String>) -> Self {
        Self {
            destination_id: destination_id.into(),
            username: None,
            preferences: NotificationPreferences::default(),
        }
    }

    pub fn enabled_for(&self, domain: Domain) -> bool {
        self.preferences.enabled_for(domain)
    }
}
