//! Campaigns waiting for the delayed general broadcast.

use std::path::Path;

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};

use super::BackedFile;
use crate::error::Result;
use crate::models::CampaignRecord;
use crate::pipeline::identity::{Fingerprinted, IdentityKey};

/// A campaign already shown to admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub key: IdentityKey,
    pub digest: String,
    pub campaign: CampaignRecord,

    /// Enqueue time, unix seconds
    pub timestamp: f64,

    pub admin_notified: bool,
}

impl PendingItem {
    pub fn enqueued_at(&self) -> Option<DateTime<Local>> {
        DateTime::from_timestamp_millis((self.timestamp * 1000.0) as i64)
            .map(|dt| dt.with_timezone(&Local))
    }

    pub fn to_fingerprinted(&self) -> Fingerprinted<CampaignRecord> {
        Fingerprinted {
            key: self.key.clone(),
            digest: self.digest.clone(),
            entity: self.campaign.clone(),
        }
    }
}

/// File-backed queue in enqueue order: `pending_campaigns.json`.
#[derive(Debug)]
pub struct PendingQueue {
    file: BackedFile,
    items: Vec<PendingItem>,
}

impl PendingQueue {
    pub async fn open(data_dir: &Path) -> Self {
        let file = BackedFile::new(data_dir.join("pending_campaigns.json"));
        let items: Vec<PendingItem> = file.load().await.unwrap_or_default();
        if !items.is_empty() {
            log::info!("{} campaigns pending general broadcast", items.len());
        }
        Self { file, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&PendingItem> {
        self.items.iter().find(|item| &item.key == key)
    }

    /// Add a campaign. Re-enqueueing a pending key replaces its content but
    /// keeps the original enqueue time so the broadcast is not pushed back.
    pub async fn enqueue(
        &mut self,
        item: &Fingerprinted<CampaignRecord>,
        admin_notified: bool,
        now: DateTime<Local>,
    ) -> Result<()> {
        match self.items.iter_mut().find(|p| p.key == item.key) {
            Some(existing) => {
                existing.digest = item.digest.clone();
                existing.campaign = item.entity.clone();
                existing.admin_notified |= admin_notified;
            }
            None => self.items.push(PendingItem {
                key: item.key.clone(),
                digest: item.digest.clone(),
                campaign: item.entity.clone(),
                timestamp: now.timestamp_millis() as f64 / 1000.0,
                admin_notified,
            }),
        }
        self.file.save_with_backup(&self.items).await
    }

    /// Items whose delay has elapsed, in enqueue order.
    pub fn ready(&self, delay_hours: f64, now: DateTime<Local>) -> Vec<PendingItem> {
        let delay = Duration::milliseconds((delay_hours * 3_600_000.0) as i64);
        self.items
            .iter()
            .filter(|item| {
                item.enqueued_at()
                    .is_none_or(|enqueued| enqueued + delay <= now)
            })
            .cloned()
            .collect()
    }

    pub async fn remove(&mut self, key: &IdentityKey) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|item| &item.key != key);
        if self.items.len() != before {
            self.file.save_with_backup(&self.items).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn campaign(id: i64, bonus: f64) -> Fingerprinted<CampaignRecord> {
        let record: CampaignRecord = serde_json::from_value(serde_json::json!({
            "id": id, "type": 2, "name": format!("C{id}"), "bonusAmount": bonus
        }))
        .unwrap();
        Fingerprinted::new(record).unwrap()
    }

    fn at(h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 22, h, min, 0).unwrap()
    }

    #[tokio::test]
    async fn test_ready_after_delay() {
        let tmp = TempDir::new().unwrap();
        let mut queue = PendingQueue::open(tmp.path()).await;
        queue.enqueue(&campaign(1, 10.0), true, at(8, 0)).await.unwrap();

        assert!(queue.ready(4.0, at(11, 59)).is_empty());
        assert_eq!(queue.ready(4.0, at(12, 0)).len(), 1);
    }

    #[tokio::test]
    async fn test_reenqueue_keeps_enqueue_time() {
        let tmp = TempDir::new().unwrap();
        let mut queue = PendingQueue::open(tmp.path()).await;
        queue.enqueue(&campaign(1, 10.0), false, at(8, 0)).await.unwrap();
        queue.enqueue(&campaign(1, 20.0), true, at(10, 0)).await.unwrap();

        assert_eq!(queue.len(), 1);
        let ready = queue.ready(4.0, at(12, 0));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].campaign.bonus_amount, Some(20.0));
        assert!(ready[0].admin_notified);
    }

    #[tokio::test]
    async fn test_remove_and_persist() {
        let tmp = TempDir::new().unwrap();
        let mut queue = PendingQueue::open(tmp.path()).await;
        let first = campaign(1, 10.0);
        queue.enqueue(&first, true, at(8, 0)).await.unwrap();
        queue.enqueue(&campaign(2, 5.0), true, at(8, 5)).await.unwrap();
        queue.remove(&first.key).await.unwrap();

        let reopened = PendingQueue::open(tmp.path()).await;
        assert_eq!(reopened.len(), 1);
        assert!(!reopened.contains(&first.key));
    }
}
