//! Last-seen entity list per domain.

use std::marker::PhantomData;
use std::path::Path;

use chrono::{DateTime, Duration, Local};

use super::BackedFile;
use crate::error::Result;
use crate::models::Entity;

async fn newest_modification(file: &BackedFile) -> Option<DateTime<Local>> {
    let mut newest = None;
    for path in [file.primary(), file.backup()] {
        if let Ok(modified) = tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            let modified = DateTime::<Local>::from(modified);
            if newest.is_none_or(|prev| modified > prev) {
                newest = Some(modified);
            }
        }
    }
    newest
}

/// Snapshot store for one domain: `{domain}_cache.json` plus backup.
#[derive(Debug)]
pub struct SnapshotStore<E> {
    file: BackedFile,
    last_saved: Option<DateTime<Local>>,
    _entity: PhantomData<E>,
}

impl<E: Entity> SnapshotStore<E> {
    /// Open the store. The last-save time is taken from the newest copy on
    /// disk so staleness survives restarts.
    pub async fn open(data_dir: &Path) -> Self {
        let file = BackedFile::new(data_dir.join(format!("{}_cache.json", E::DOMAIN)));
        let last_saved = newest_modification(&file).await;

        Self {
            file,
            last_saved,
            _entity: PhantomData,
        }
    }

    /// Pick up a first save made by another process since `open`.
    pub async fn refresh(&mut self) {
        if self.last_saved.is_none() {
            self.last_saved = newest_modification(&self.file).await;
        }
    }

    /// Load the snapshot; empty when none exists or none is readable.
    pub async fn load(&self) -> Vec<E> {
        self.file.load().await.unwrap_or_default()
    }

    /// Replace the snapshot with the full fetched list.
    pub async fn save(&mut self, entities: &[E], now: DateTime<Local>) -> Result<()> {
        self.file.save_with_backup(entities).await?;
        self.last_saved = Some(now);
        log::debug!("Saved {} {} records", entities.len(), E::DOMAIN);
        Ok(())
    }

    /// Time since the last successful save; `None` if never saved.
    pub fn age(&self, now: DateTime<Local>) -> Option<Duration> {
        self.last_saved.map(|saved| now - saved)
    }

    pub fn has_saved(&self) -> bool {
        self.last_saved.is_some()
    }

    pub fn last_saved(&self) -> Option<DateTime<Local>> {
        self.last_saved
    }
}
