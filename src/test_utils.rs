//! Shared in-memory fakes for pipeline and scheduler tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AppError, Result, SendError};
use crate::models::{
    CampaignRecord, DispatchConfig, DocumentRecord, Domain, LenderConfig, Subscriber,
    UpdateRecord,
};
use crate::services::{
    CampaignSource, Channel, DocumentSource, SubscriberRegistry, UpdateBatch, UpdateSource,
};

/// Dispatch settings without any pacing or backoff sleeps.
pub fn instant_dispatch() -> DispatchConfig {
    DispatchConfig {
        base_delay_ms: 0,
        delay_per_kb_ms: 0,
        max_delay_ms: 0,
        max_attempts: 3,
        retry_base_ms: 0,
        rate_limit_buffer_ms: 0,
    }
}

/// Channel that records deliveries and replays scripted failures.
#[derive(Default)]
pub struct FakeChannel {
    scripts: Mutex<HashMap<String, VecDeque<SendError>>>,
    attempts: Mutex<HashMap<String, usize>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeChannel {
    /// Errors returned, in order, by the next sends to `destination`.
    pub fn script(&self, destination: &str, errors: Vec<SendError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(destination.to_string())
            .or_default()
            .extend(errors);
    }

    /// Messages successfully delivered to `destination`.
    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn attempts(&self, destination: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(destination)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Channel for FakeChannel {
    async fn send(&self, destination: &str, message: &str) -> std::result::Result<(), SendError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(destination.to_string())
            .or_default() += 1;

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(destination)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }

        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), message.to_string()));
        Ok(())
    }
}

/// In-memory registry.
#[derive(Default)]
pub struct FakeRegistry {
    subscribers: Mutex<BTreeMap<String, Subscriber>>,
}

impl FakeRegistry {
    pub fn with_ids(ids: &[&str]) -> Self {
        let registry = Self::default();
        {
            let mut subs = registry.subscribers.lock().unwrap();
            for id in ids {
                subs.insert(id.to_string(), Subscriber::new(*id));
            }
        }
        registry
    }

    pub fn disable(&self, id: &str, domain: Domain) {
        if let Some(sub) = self.subscribers.lock().unwrap().get_mut(id) {
            match domain {
                Domain::Updates => sub.preferences.recovery_updates = false,
                Domain::Campaigns => sub.preferences.campaigns = false,
                Domain::Documents => sub.preferences.documents = false,
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.lock().unwrap().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.subscribers.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl SubscriberRegistry for FakeRegistry {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.snapshot())
    }

    async fn notification_enabled(&self, destination: &str, domain: Domain) -> Result<bool> {
        Ok(self
            .subscribers
            .lock()
            .unwrap()
            .get(destination)
            .is_none_or(|s| s.enabled_for(domain)))
    }

    async fn remove_subscriber(&self, destination: &str) -> Result<()> {
        self.subscribers.lock().unwrap().remove(destination);
        Ok(())
    }
}

/// Source returning whatever records were last set, or a fetch error.
pub struct FakeSource<T> {
    records: Mutex<Vec<T>>,
    failing: Mutex<bool>,
    failed_lenders: Mutex<Vec<String>>,
    calls: Mutex<Vec<Instant>>,
}

impl<T: Clone> Default for FakeSource<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
            failed_lenders: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> FakeSource<T> {
    pub fn with(records: Vec<T>) -> Self {
        let source = Self::default();
        source.set(records);
        source
    }

    pub fn set(&self, records: Vec<T>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Lenders reported as failed by the next update polls.
    pub fn fail_lenders(&self, ids: &[&str]) {
        *self.failed_lenders.lock().unwrap() = ids.iter().map(|id| id.to_string()).collect();
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Tokio clock reading at each fetch.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, name: &str) -> Result<Vec<T>> {
        self.calls.lock().unwrap().push(Instant::now());
        if *self.failing.lock().unwrap() {
            return Err(AppError::fetch(name, "scripted failure"));
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

#[async_trait]
impl UpdateSource for FakeSource<UpdateRecord> {
    async fn fetch_updates(&self, _lenders: &[LenderConfig]) -> Result<UpdateBatch> {
        Ok(UpdateBatch {
            records: self.next("fake updates")?,
            failed_lenders: self.failed_lenders.lock().unwrap().clone(),
        })
    }
}

#[async_trait]
impl CampaignSource for FakeSource<CampaignRecord> {
    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>> {
        self.next("fake campaigns")
    }
}

#[async_trait]
impl DocumentSource for FakeSource<DocumentRecord> {
    async fn fetch_documents(&self) -> Result<Vec<DocumentRecord>> {
        self.next("fake documents")
    }
}
