// src/models/mod.rs

//! Domain models for the notifier.
//!
//! Each polled source produces one record type. All three implement
//! [`Entity`], which is the only view the diff, ledger and dispatch code
//! has of them.

mod campaign;
mod config;
mod document;
pub mod flexible;
mod subscriber;
mod update;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// Re-export all public types
pub use campaign::CampaignRecord;
pub use config::{
    CampaignsConfig, CompanyPage, Config, DispatchConfig, HttpConfig, LenderConfig,
    LoggingConfig, PathsConfig, ScheduleConfig, SchedulesConfig, SnapshotGuardConfig,
    SourcesConfig, TelegramConfig, UpdatesConfig,
};
pub use document::DocumentRecord;
pub use subscriber::{NotificationPreferences, Subscriber};
pub use update::UpdateRecord;

/// One independently polled source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Updates,
    Campaigns,
    Documents,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Updates, Domain::Campaigns, Domain::Documents];

    /// Name used in persisted file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Updates => "updates",
            Domain::Campaigns => "campaigns",
            Domain::Documents => "documents",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "updates" | "recovery_updates" | "recovery" => Ok(Domain::Updates),
            "campaigns" | "campaign" => Ok(Domain::Campaigns),
            "documents" | "document" | "docs" => Ok(Domain::Documents),
            other => Err(format!("unknown domain '{other}'")),
        }
    }
}

/// A record fetched from one domain's source.
///
/// Records are immutable once fetched. Two records are "the same logical
/// entity" when their identity fields agree, and "changed" when any
/// significant field differs.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const DOMAIN: Domain;

    /// Identity fields that must be non-empty for a key to be built.
    const REQUIRED_FIELDS: &'static [&'static str];

    /// Allow-listed field tuple the identity key is derived from.
    fn identity_fields(&self) -> Vec<(&'static str, String)>;

    /// Fields whose change marks the record as changed.
    fn significant_fields(&self) -> Vec<(&'static str, String)>;

    /// The record's own date, if the domain has one.
    fn business_date(&self) -> Option<NaiveDate>;

    /// Message body sent to subscribers (Telegram HTML).
    fn render(&self) -> String;

    /// Short human label for logs.
    fn label(&self) -> String;
}

/// Parse the leading `YYYY-MM-DD` of a date-ish string.
pub(crate) fn parse_business_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Canonical text for an optional amount.
pub(crate) fn amount_text(amount: Option<f64>) -> String {
    amount.map(|a| a.to_string()).unwrap_or_default()
}
