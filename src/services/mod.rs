//! Adapters to the outside world.
//!
//! The engine only sees the traits defined here:
//! - Fetch sources (`UpdateSource`, `CampaignSource`, `DocumentSource`)
//! - Delivery channel (`Channel`)
//! - Subscriber registry (`SubscriberRegistry`)
//!
//! Concrete implementations talk to the recovery and campaign APIs, scrape
//! company pages, send through the Telegram Bot API and keep subscribers in
//! JSON files.

mod campaigns;
mod documents;
mod recovery;
mod telegram;

use async_trait::async_trait;

use crate::error::{Result, SendError};
use crate::models::{
    CampaignRecord, Domain, DocumentRecord, LenderConfig, Subscriber, UpdateRecord,
};

pub use campaigns::CampaignApi;
pub use documents::DocumentScraper;
pub use recovery::RecoveryApi;
pub use telegram::TelegramChannel;

/// One poll of every tracked lender.
///
/// Lenders listed in `failed_lenders` contributed nothing this time; their
/// records are missing from `records` and must not be read as removals.
#[derive(Debug, Clone, Default)]
pub struct UpdateBatch {
    pub records: Vec<UpdateRecord>,
    pub failed_lenders: Vec<String>,
}

/// Recovery updates for a set of tracked lenders.
///
/// Returns an error only when no lender could be fetched.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch_updates(&self, lenders: &[LenderConfig]) -> Result<UpdateBatch>;
}

#[async_trait]
pub trait CampaignSource: Send + Sync {
    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>>;
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_documents(&self) -> Result<Vec<DocumentRecord>>;
}

/// Delivers one rendered message to one destination.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> std::result::Result<(), SendError>;
}

/// Source of subscribers and their per-domain preferences.
#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;

    async fn notification_enabled(&self, destination: &str, domain: Domain) -> Result<bool>;

    /// Forget a destination that can no longer be reached.
    async fn remove_subscriber(&self, destination: &str) -> Result<()>;
}
