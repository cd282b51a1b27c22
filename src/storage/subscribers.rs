//! File-backed subscriber registry.
//!
//! `users.json` maps destination id → optional username (older files hold a
//! bare list of ids). `notification_preferences.json` maps destination id →
//! per-domain flags; missing entries mean enabled. Files are re-read on
//! every call because chat commands edit them outside this process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{read_bytes, write_atomic};
use crate::error::Result;
use crate::models::flexible::canonical_id;
use crate::models::{Domain, NotificationPreferences, Subscriber};
use crate::services::SubscriberRegistry;

#[derive(Deserialize)]
#[serde(untagged)]
enum UsersFile {
    Map(BTreeMap<String, Option<String>>),
    List(Vec<Value>),
}

impl From<UsersFile> for BTreeMap<String, Option<String>> {
    fn from(file: UsersFile) -> Self {
        match file {
            UsersFile::Map(map) => map
                .into_iter()
                .map(|(id, name)| (canonical_id(&id), name))
                .collect(),
            UsersFile::List(ids) => ids
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(canonical_id(&s)),
                    Value::Number(n) => Some(canonical_id(&n.to_string())),
                    _ => None,
                })
                .map(|id| (id, None))
                .collect(),
        }
    }
}

pub struct FileSubscriberRegistry {
    users_path: PathBuf,
    preferences_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSubscriberRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            users_path: data_dir.join("users.json"),
            preferences_path: data_dir.join("notification_preferences.json"),
            write_lock: Mutex::new(()),
        }
    }

    async fn load_users(&self) -> Result<BTreeMap<String, Option<String>>> {
        match read_bytes(&self.users_path).await? {
            Some(bytes) => {
                let file: UsersFile = serde_json::from_slice(&bytes)?;
                Ok(file.into())
            }
            None => Ok(BTreeMap::new()),
        }
    }

    async fn load_preferences(&self) -> BTreeMap<String, NotificationPreferences> {
        let parsed = match read_bytes(&self.preferences_path).await {
            Ok(Some(bytes)) => serde_json::from_slice::<BTreeMap<String, NotificationPreferences>>(&bytes)
                .map_err(|e| e.to_string()),
            Ok(None) => return BTreeMap::new(),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(prefs) => prefs
                .into_iter()
                .map(|(id, p)| (canonical_id(&id), p))
                .collect(),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable {}: {}; all notifications enabled",
                    self.preferences_path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }
}

#[async_trait]
impl SubscriberRegistry for FileSubscriberRegistry {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        let users = self.load_users().await?;
        let preferences = self.load_preferences().await;

        Ok(users
            .into_iter()
            .map(|(id, username)| Subscriber {
                preferences: preferences.get(&id).copied().unwrap_or_default(),
                destination_id: id,
                username,
            })
            .collect())
    }

    async fn notification_enabled(&self, destination: &str, domain: Domain) -> Result<bool> {
        let preferences = self.load_preferences().await;
        Ok(preferences
            .get(&canonical_id(destination))
            .is_none_or(|p| p.enabled_for(domain)))
    }

    async fn remove_subscriber(&self, destination: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load_users().await?;
        let id = canonical_id(destination);

        match users.remove(&id) {
            Some(username) => {
                let bytes = serde_json::to_vec_pretty(&users)?;
                write_atomic(&self.users_path, &bytes).await?;
                log::info!(
                    "Removed subscriber {}{}",
                    id,
                    username.map(|u| format!(" ({u})")).unwrap_or_default()
                );
            }
            None => log::debug!("Subscriber {} already removed", id),
        }
        Ok(())
    }
}
