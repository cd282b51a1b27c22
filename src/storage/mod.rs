//! Persisted state for the notifier.
//!
//! Every file the notifier owns lives in one data directory:
//!
//! ```text
//! {data_dir}/
//! ├── updates_cache.json          # Snapshot: last fetched list per domain
//! ├── updates_cache.json.bak
//! ├── sent_updates.json           # Ledger: delivered identity keys
//! ├── sent_updates.json.bak
//! ├── pending_campaigns.json      # Campaigns awaiting the general broadcast
//! ├── updates.lock                # Held by whichever process runs the cycle
//! ├── users.json                  # Subscribers
//! └── notification_preferences.json
//! ```
//!
//! Snapshot and ledger files always have a `.bak` sibling. Reads fall back
//! to it and recreate the primary from it.

pub mod ledger;
pub mod lock;
pub mod pending;
pub mod snapshot;
pub mod subscribers;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

// Re-export for convenience
pub use ledger::{LedgerEntry, SentLedger};
pub use lock::DomainLock;
pub use pending::{PendingItem, PendingQueue};
pub use snapshot::SnapshotStore;
pub use subscribers::FileSubscriberRegistry;

/// Append a suffix to the final path component (`a.json` → `a.json.bak`).
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Write bytes atomically (write to temp, sync, then rename).
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = with_suffix(path, ".tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read bytes, returning None if file doesn't exist.
pub(crate) async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Outcome of reading one copy of a backed file.
enum Read<T> {
    Parsed(T, Vec<u8>),
    Missing,
    Broken(AppError),
}

async fn read_copy<T: DeserializeOwned>(path: &Path) -> Read<T> {
    match read_bytes(path).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => Read::Parsed(value, bytes),
            Err(e) => Read::Broken(e.into()),
        },
        Ok(None) => Read::Missing,
        Err(e) => Read::Broken(e),
    }
}

/// A JSON file with a same-format `.bak` sibling.
#[derive(Debug, Clone)]
pub struct BackedFile {
    primary: PathBuf,
    backup: PathBuf,
}

impl BackedFile {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let backup = with_suffix(&primary, ".bak");
        Self { primary, backup }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Load the primary copy, falling back to the backup.
    ///
    /// When only the backup is readable the primary is recreated from it.
    /// Returns `None` when neither copy exists or neither parses; the
    /// latter is logged as an error because callers then start empty.
    pub async fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let primary_failure = match read_copy::<T>(&self.primary).await {
            Read::Parsed(value, _) => return Some(value),
            Read::Missing => None,
            Read::Broken(e) => {
                log::warn!("{} is unreadable: {}", self.primary.display(), e);
                Some(e)
            }
        };

        match read_copy::<T>(&self.backup).await {
            Read::Parsed(value, bytes) => {
                log::warn!(
                    "Loaded {} from backup {}",
                    self.primary.display(),
                    self.backup.display()
                );
                match write_atomic(&self.primary, &bytes).await {
                    Ok(()) => log::info!("Restored {} from backup", self.primary.display()),
                    Err(e) => log::error!(
                        "Failed to restore {} from backup: {}",
                        self.primary.display(),
                        e
                    ),
                }
                Some(value)
            }
            Read::Missing if primary_failure.is_none() => {
                log::debug!("No state at {} yet", self.primary.display());
                None
            }
            Read::Missing => {
                log::error!(
                    "{} is unreadable and has no backup; starting empty",
                    self.primary.display()
                );
                None
            }
            Read::Broken(e) => {
                log::error!(
                    "Both {} and its backup are unreadable ({}); starting empty",
                    self.primary.display(),
                    e
                );
                None
            }
        }
    }

    /// Save with backup-then-overwrite.
    ///
    /// The current primary is copied to the backup first, but only if it
    /// still parses, so a corrupt primary never replaces a good backup.
    /// With no primary yet, the backup receives the new content.
    pub async fn save_with_backup<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;

        match read_bytes(&self.primary).await? {
            Some(existing) if serde_json::from_slice::<serde_json::Value>(&existing).is_ok() => {
                write_atomic(&self.backup, &existing).await?;
            }
            Some(_) => {
                log::warn!(
                    "Not backing up unreadable {}; keeping previous backup",
                    self.primary.display()
                );
            }
            None => write_atomic(&self.backup, &bytes).await?,
        }

        write_atomic(&self.primary, &bytes).await
    }

    /// Save the same content to primary and backup.
    pub async fn save_mirrored<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.primary, &bytes).await?;
        write_atomic(&self.backup, &bytes).await
    }
}
