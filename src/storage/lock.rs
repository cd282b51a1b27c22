//! Advisory lock per domain, shared by every process using the data directory.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use fd_lock::{RwLock, RwLockWriteGuard};

use crate::error::{AppError, Result};
use crate::models::Domain;

/// `{data_dir}/{domain}.lock`; held for the whole of one cycle.
pub struct DomainLock {
    domain: Domain,
    lock: RwLock<File>,
}

impl DomainLock {
    pub async fn open(data_dir: &Path, domain: Domain) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(data_dir.join(format!("{domain}.lock")))
            .await?
            .into_std()
            .await;
        Ok(Self {
            domain,
            lock: RwLock::new(file),
        })
    }

    /// Take the lock without waiting.
    ///
    /// Fails with `AppError::Locked` while any other handle holds it.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        let domain = self.domain;
        self.lock.try_write().map_err(|e| match e.kind() {
            ErrorKind::WouldBlock => AppError::Locked(domain),
            _ => AppError::Io(e),
        })
    }
}
