//! Sent ledger: which identity keys were delivered, and when.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::BackedFile;
use crate::error::Result;
use crate::models::{Domain, Entity};
use crate::pipeline::identity::{Fingerprinted, IdentityKey};

/// One delivered key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: IdentityKey,

    /// Unix seconds of the last dispatch pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,

    /// Digest of the significant fields at that pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl LedgerEntry {
    fn sent_day(&self) -> Option<NaiveDate> {
        let ts = self.timestamp?;
        let secs = ts.floor() as i64;
        let nanos = ((ts - ts.floor()) * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos).map(|dt| dt.with_timezone(&Local).date_naive())
    }
}

/// Ledger files also hold bare id strings written by older versions.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Full(LedgerEntry),
    Bare(String),
}

impl From<StoredEntry> for LedgerEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Full(entry) => entry,
            StoredEntry::Bare(id) => LedgerEntry {
                id: id.into(),
                timestamp: None,
                digest: None,
            },
        }
    }
}

fn unix_seconds(now: DateTime<Local>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}

/// Ledger for one domain: `sent_{domain}.json` plus backup.
#[derive(Debug)]
pub struct SentLedger {
    domain: Domain,
    file: BackedFile,
    entries: HashMap<IdentityKey, LedgerEntry>,
}

impl SentLedger {
    /// Open and load the ledger for a domain.
    pub async fn open(data_dir: &Path, domain: Domain) -> Self {
        let file = BackedFile::new(data_dir.join(format!("sent_{domain}.json")));
        let stored: Vec<StoredEntry> = file.load().await.unwrap_or_default();
        let entries: HashMap<_, _> = stored
            .into_iter()
            .map(LedgerEntry::from)
            .map(|e| (e.id.clone(), e))
            .collect();
        log::debug!("Loaded {} sent {} keys", entries.len(), domain);
        Self {
            domain,
            file,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    /// Whether the record should be suppressed as already delivered.
    ///
    /// Never recorded: not sent. Recorded with a different digest: a new
    /// change, not sent. Otherwise sent when the entry has no timestamp, was
    /// written today, or was written on the record's own business date.
    pub fn is_sent<E: Entity>(&self, item: &Fingerprinted<E>, now: DateTime<Local>) -> bool {
        let Some(entry) = self.entries.get(&item.key) else {
            return false;
        };

        if entry.digest.as_ref().is_some_and(|d| *d != item.digest) {
            return false;
        }

        let Some(sent_day) = entry.sent_day() else {
            return true;
        };

        if sent_day == now.date_naive() {
            return true;
        }

        item.entity.business_date() == Some(sent_day)
    }

    /// Upsert the record's entry and persist to primary and backup.
    pub async fn mark_sent<E: Entity>(
        &mut self,
        item: &Fingerprinted<E>,
        now: DateTime<Local>,
    ) -> Result<()> {
        self.record(item, now);
        self.persist().await
    }

    /// Upsert several entries with a single write.
    pub async fn mark_all_sent<E: Entity>(
        &mut self,
        items: &[Fingerprinted<E>],
        now: DateTime<Local>,
    ) -> Result<()> {
        for item in items {
            self.record(item, now);
        }
        self.persist().await
    }

    fn record<E: Entity>(&mut self, item: &Fingerprinted<E>, now: DateTime<Local>) {
        self.entries.insert(
            item.key.clone(),
            LedgerEntry {
                id: item.key.clone(),
                timestamp: Some(unix_seconds(now)),
                digest: Some(item.digest.clone()),
            },
        );
    }

    async fn persist(&self) -> Result<()> {
        let mut entries: Vec<&LedgerEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        self.file.save_mirrored(&entries).await?;
        log::debug!("Persisted {} sent {} keys", entries.len(), self.domain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateRecord;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn update(date: &str, description: &str) -> Fingerprinted<UpdateRecord> {
        let record: UpdateRecord = serde_json::from_value(serde_json::json!({
            "lenderId": 7, "year": 2025, "date": date, "description": description
        }))
        .unwrap();
        Fingerprinted::new(record).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_key_is_not_sent() {
        let tmp = TempDir::new().unwrap();
        let ledger = SentLedger::open(tmp.path(), Domain::Updates).await;
        assert!(!ledger.is_sent(&update("2025-04-19", "X"), at(2025, 4, 19, 15)));
    }

    #[tokio::test]
    async fn test_sent_today_is_suppressed() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = SentLedger::open(tmp.path(), Domain::Updates).await;
        let item = update("2025-04-10", "X");
        ledger.mark_sent(&item, at(2025, 4, 19, 15)).await.unwrap();
        assert!(ledger.is_sent(&item, at(2025, 4, 19, 17)));
    }

    #[tokio::test]
    async fn test_resend_after_day_boundary() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = SentLedger::open(tmp.path(), Domain::Updates).await;
        let item = update("2025-04-10", "X");
        ledger.mark_sent(&item, at(2025, 4, 19, 15)).await.unwrap();
        assert!(!ledger.is_sent(&item, at(2025, 4, 20, 15)));
    }

    #[tokio::test]
    async fn test_business_date_equal_to_sent_day_suppresses() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = SentLedger::open(tmp.path(), Domain::Updates).await;
        let item = update("2025-04-19", "X");
        ledger.mark_sent(&item, at(2025, 4, 19, 15)).await.unwrap();
        assert!(ledger.is_sent(&item, at(2025, 4, 25, 15)));
    }

    #[tokio::test]
    async fn test_changed_digest_is_eligible_same_day() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = SentLedger::open(tmp.path(), Domain::Updates).await;
        ledger
            .mark_sent(&update("2025-04-19", "X"), at(2025, 4, 19, 15))
            .await
            .unwrap();
        assert!(!ledger.is_sent(&update("2025-04-19", "Y"), at(2025, 4, 19, 16)));
    }

    #[tokio::test]
    async fn test_mark_sent_upserts_and_mirrors() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = SentLedger::open(tmp.path(), Domain::Updates).await;
        let now = at(2025, 4, 19, 15);
        ledger.mark_sent(&update("2025-04-19", "X"), now).await.unwrap();
        ledger
            .mark_sent(&update("2025-04-19", "Y"), now + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);

        let primary = std::fs::read(tmp.path().join("sent_updates.json")).unwrap();
        let backup = std::fs::read(tmp.path().join("sent_updates.json.bak")).unwrap();
        assert_eq!(primary, backup);

        let reopened = SentLedger::open(tmp.path(), Domain::Updates).await;
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_entries_without_timestamp_count_as_sent() {
        let tmp = TempDir::new().unwrap();
        let item = update("2025-04-19", "X");
        let legacy = serde_json::json!([item.key.as_str(), {"id": "other", "timestamp": 1.0}]);
        std::fs::write(
            tmp.path().join("sent_updates.json"),
            serde_json::to_vec(&legacy).unwrap(),
        )
        .unwrap();

        let ledger = SentLedger::open(tmp.path(), Domain::Updates).await;
        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_sent(&item, at(2025, 5, 1, 12)));
    }
}
