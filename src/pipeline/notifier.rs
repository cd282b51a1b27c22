//! The notification service: owns per-domain state and runs cycles.
//!
//! Each domain's persisted state sits behind its own mutex so a manual run
//! can never interleave writes with the scheduled loop for that domain.
//! A cycle also holds the domain's file lock and re-reads its state from
//! disk, so a run from a separate process (`check`) is serialized the same
//! way and its ledger entries are never overwritten.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local};
use tokio::sync::Mutex;

use super::circuit_breaker::CircuitBreaker;
use super::cycle::{
    CampaignState, CycleContext, CycleReport, DomainState, merge_failed_lenders,
    run_campaign_cycle, run_standard_cycle,
};
use super::dispatch::{DispatchReport, Dispatcher};
use crate::error::{AppError, Result};
use crate::models::{Config, DocumentRecord, Domain, Entity, UpdateRecord};
use crate::services::{Channel, CampaignSource, DocumentSource, SubscriberRegistry, UpdateSource};
use crate::storage::DomainLock;

/// Fetch adapters, one per domain.
#[derive(Clone)]
pub struct Sources {
    pub updates: Arc<dyn UpdateSource>,
    pub campaigns: Arc<dyn CampaignSource>,
    pub documents: Arc<dyn DocumentSource>,
}

/// Outcome of a manual run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed(CycleReport),
    /// A run for the same domain holds the lock, here or in another process
    AlreadyRunning,
}

/// Persisted-state summary of one domain.
#[derive(Debug, Clone)]
pub struct DomainInfo {
    pub domain: Domain,
    pub last_saved: Option<DateTime<Local>>,
    pub snapshot_age: Option<Duration>,
    pub snapshot_len: usize,
    pub ledger_len: usize,
    /// Campaigns only
    pub pending_len: Option<usize>,
}

impl DomainInfo {
    async fn from_state<E: Entity>(
        state: &DomainState<E>,
        pending_len: Option<usize>,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            domain: E::DOMAIN,
            last_saved: state.snapshot.last_saved(),
            snapshot_age: state.snapshot.age(now),
            snapshot_len: state.snapshot.load().await.len(),
            ledger_len: state.ledger.len(),
            pending_len,
        }
    }

    /// Read every domain's state from disk without a running service.
    pub async fn collect(data_dir: &Path, now: DateTime<Local>) -> Vec<Self> {
        let updates = DomainState::<UpdateRecord>::open(data_dir).await;
        let campaigns = CampaignState::open(data_dir).await;
        let documents = DomainState::<DocumentRecord>::open(data_dir).await;
        vec![
            Self::from_state(&updates, None, now).await,
            Self::from_state(&campaigns.base, Some(campaigns.pending.len()), now).await,
            Self::from_state(&documents, None, now).await,
        ]
    }
}

pub struct Notifier {
    config: Config,
    sources: Sources,
    dispatcher: Dispatcher,
    breaker: CircuitBreaker,
    updates: Mutex<DomainState<UpdateRecord>>,
    campaigns: Mutex<CampaignState>,
    documents: Mutex<DomainState<DocumentRecord>>,
}

impl Notifier {
    /// Load persisted state for every domain and wire the collaborators.
    pub async fn open(
        config: Config,
        sources: Sources,
        channel: Arc<dyn Channel>,
        registry: Arc<dyn SubscriberRegistry>,
    ) -> Self {
        let data_dir = config.paths.data_dir.clone();
        log::info!("Loading state from {}", data_dir.display());

        Self {
            dispatcher: Dispatcher::new(channel, registry, config.dispatch.clone()),
            breaker: CircuitBreaker::new(config.snapshot_guard.clone()),
            updates: Mutex::new(DomainState::open(&data_dir).await),
            campaigns: Mutex::new(CampaignState::open(&data_dir).await),
            documents: Mutex::new(DomainState::open(&data_dir).await),
            sources,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Swap the delivery channel, e.g. after a credential rotation.
    pub async fn reconfigure_channel(&self, channel: Arc<dyn Channel>) {
        self.dispatcher.set_channel(channel).await;
        log::info!("Delivery channel reconfigured");
    }

    /// One extra attempt for every message deferred by earlier cycles.
    pub async fn retry_deferred(&self) -> DispatchReport {
        self.dispatcher.retry_deferred().await
    }

    /// Run one cycle, waiting for any run already in progress in this
    /// process. Fails with `AppError::Locked` if another process holds the
    /// domain.
    pub async fn run_cycle(&self, domain: Domain, now: DateTime<Local>) -> Result<CycleReport> {
        match domain {
            Domain::Updates => self.updates_cycle(&mut *self.updates.lock().await, now).await,
            Domain::Campaigns => {
                self.campaigns_cycle(&mut *self.campaigns.lock().await, now)
                    .await
            }
            Domain::Documents => {
                self.documents_cycle(&mut *self.documents.lock().await, now)
                    .await
            }
        }
    }

    /// Run one cycle unless the domain is already running.
    pub async fn try_run_cycle(&self, domain: Domain, now: DateTime<Local>) -> Result<RunStatus> {
        let result = match domain {
            Domain::Updates => match self.updates.try_lock() {
                Ok(mut state) => self.updates_cycle(&mut state, now).await,
                Err(_) => return Ok(RunStatus::AlreadyRunning),
            },
            Domain::Campaigns => match self.campaigns.try_lock() {
                Ok(mut state) => self.campaigns_cycle(&mut state, now).await,
                Err(_) => return Ok(RunStatus::AlreadyRunning),
            },
            Domain::Documents => match self.documents.try_lock() {
                Ok(mut state) => self.documents_cycle(&mut state, now).await,
                Err(_) => return Ok(RunStatus::AlreadyRunning),
            },
        };

        match result {
            Ok(report) => Ok(RunStatus::Completed(report)),
            Err(AppError::Locked(_)) => Ok(RunStatus::AlreadyRunning),
            Err(e) => Err(e),
        }
    }

    /// Time since the domain's snapshot was last saved; `None` if never.
    pub async fn snapshot_age(&self, domain: Domain, now: DateTime<Local>) -> Option<Duration> {
        match domain {
            Domain::Updates => self.updates.lock().await.snapshot.age(now),
            Domain::Campaigns => self.campaigns.lock().await.base.snapshot.age(now),
            Domain::Documents => self.documents.lock().await.snapshot.age(now),
        }
    }

    /// Persisted-state summary of every domain.
    pub async fn info(&self, now: DateTime<Local>) -> Vec<DomainInfo> {
        let campaigns = self.campaigns.lock().await;
        vec![
            DomainInfo::from_state(&*self.updates.lock().await, None, now).await,
            DomainInfo::from_state(&campaigns.base, Some(campaigns.pending.len()), now).await,
            DomainInfo::from_state(&*self.documents.lock().await, None, now).await,
        ]
    }

    fn context(&self, domain: Domain, now: DateTime<Local>) -> CycleContext<'_> {
        CycleContext {
            dispatcher: &self.dispatcher,
            breaker: &self.breaker,
            schedule: self.config.schedule.for_domain(domain),
            now,
        }
    }

    fn data_dir(&self) -> &Path {
        &self.config.paths.data_dir
    }

    async fn flush_deferred(&self) {
        let report = self.dispatcher.retry_deferred().await;
        if report != DispatchReport::default() {
            log::info!(
                "Deferred retry: {} delivered, {} pruned",
                report.delivered,
                report.pruned.len()
            );
        }
    }

    async fn updates_cycle(
        &self,
        state: &mut DomainState<UpdateRecord>,
        now: DateTime<Local>,
    ) -> Result<CycleReport> {
        let mut lock = DomainLock::open(self.data_dir(), Domain::Updates).await?;
        let _held = lock.try_acquire()?;
        state.reload(self.data_dir()).await;

        let batch = self
            .sources
            .updates
            .fetch_updates(&self.config.lenders)
            .await?;
        self.flush_deferred().await;

        let previous = if batch.failed_lenders.is_empty() {
            Vec::new()
        } else {
            state.snapshot.load().await
        };
        let fetched = merge_failed_lenders(previous, batch);

        let ctx = self.context(Domain::Updates, now);
        run_standard_cycle(&ctx, state, fetched, self.config.updates.same_day_only).await
    }

    async fn documents_cycle(
        &self,
        state: &mut DomainState<DocumentRecord>,
        now: DateTime<Local>,
    ) -> Result<CycleReport> {
        let mut lock = DomainLock::open(self.data_dir(), Domain::Documents).await?;
        let _held = lock.try_acquire()?;
        state.reload(self.data_dir()).await;

        let fetched = self.sources.documents.fetch_documents().await?;
        self.flush_deferred().await;

        let ctx = self.context(Domain::Documents, now);
        run_standard_cycle(&ctx, state, fetched, false).await
    }

    async fn campaigns_cycle(
        &self,
        state: &mut CampaignState,
        now: DateTime<Local>,
    ) -> Result<CycleReport> {
        let mut lock = DomainLock::open(self.data_dir(), Domain::Campaigns).await?;
        let _held = lock.try_acquire()?;
        state.reload(self.data_dir()).await;

        let fetched = self.sources.campaigns.fetch_campaigns().await;
        if fetched.is_ok() {
            self.flush_deferred().await;
        }

        let ctx = self.context(Domain::Campaigns, now);
        run_campaign_cycle(
            &ctx,
            state,
            fetched,
            &self.config.campaigns,
            &self.config.telegram.admin_ids,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, SendError};
    use crate::models::CampaignRecord;
    use crate::pipeline::identity::Fingerprinted;
    use crate::storage::{DomainLock, PendingQueue, SentLedger};
    use crate::test_utils::{FakeChannel, FakeRegistry, FakeSource, instant_dispatch};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Harness {
        _tmp: TempDir,
        config: Config,
        updates: Arc<FakeSource<UpdateRecord>>,
        campaigns: Arc<FakeSource<CampaignRecord>>,
        documents: Arc<FakeSource<DocumentRecord>>,
        channel: Arc<FakeChannel>,
        registry: Arc<FakeRegistry>,
    }

    impl Harness {
        fn new(subscribers: &[&str]) -> Self {
            let tmp = TempDir::new().unwrap();
            let mut config = Config::default();
            config.paths.data_dir = tmp.path().to_path_buf();
            config.dispatch = instant_dispatch();
            config.telegram.admin_ids = vec!["900".into()];

            Self {
                _tmp: tmp,
                config,
                updates: Arc::new(FakeSource::default()),
                campaigns: Arc::new(FakeSource::default()),
                documents: Arc::new(FakeSource::default()),
                channel: Arc::new(FakeChannel::default()),
                registry: Arc::new(FakeRegistry::with_ids(subscribers)),
            }
        }

        async fn notifier(&self) -> Notifier {
            let sources = Sources {
                updates: self.updates.clone(),
                campaigns: self.campaigns.clone(),
                documents: self.documents.clone(),
            };
            Notifier::open(
                self.config.clone(),
                sources,
                self.channel.clone(),
                self.registry.clone(),
            )
            .await
        }
    }

    fn update(lender: i64, date: &str, description: &str) -> UpdateRecord {
        serde_json::from_value(serde_json::json!({
            "lenderId": lender, "year": 2025, "date": date, "description": description
        }))
        .unwrap()
    }

    fn campaign(id: i64, category: i64) -> CampaignRecord {
        serde_json::from_value(serde_json::json!({
            "id": id, "type": category, "name": format!("Campaign {id}"),
            "validFrom": "2025-04-01", "validTo": "2025-04-30", "bonusAmount": 1.5
        }))
        .unwrap()
    }

    fn document(url: &str) -> DocumentRecord {
        DocumentRecord {
            company_name: "Acme".into(),
            doc_type: "financials".into(),
            title: "Q1 report".into(),
            date: "2025-04-01".into(),
            url: url.into(),
            company_page_url: Some("https://acme.example/docs".into()),
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_same_snapshot_twice_delivers_once() {
        let h = Harness::new(&["1", "2"]);
        h.updates.set(vec![update(7, "2025-04-19", "X")]);
        let notifier = h.notifier().await;

        let first = notifier.run_cycle(Domain::Updates, at(19, 15)).await.unwrap();
        assert_eq!(first.notified, 1);
        assert_eq!(first.dispatch.delivered, 2);

        let second = notifier.run_cycle(Domain::Updates, at(19, 16)).await.unwrap();
        assert_eq!(second.notified, 0);
        assert_eq!(h.channel.total_sent(), 2);
    }

    #[tokio::test]
    async fn test_changed_description_delivers_again() {
        let h = Harness::new(&["1"]);
        h.updates.set(vec![update(7, "2025-04-19", "Plan signed")]);
        let notifier = h.notifier().await;

        notifier.run_cycle(Domain::Updates, at(19, 15)).await.unwrap();
        notifier.run_cycle(Domain::Updates, at(19, 16)).await.unwrap();
        assert_eq!(h.channel.sent_to("1").len(), 1);

        h.updates.set(vec![update(7, "2025-04-19", "Plan amended")]);
        let report = notifier.run_cycle(Domain::Updates, at(19, 17)).await.unwrap();
        assert_eq!(report.notified, 1);

        let sent = h.channel.sent_to("1");
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("Plan amended"));

        let ledger = SentLedger::open(&h.config.paths.data_dir, Domain::Updates).await;
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_state_untouched() {
        let h = Harness::new(&["1"]);
        h.documents.set(vec![document("https://acme.example/a.pdf")]);
        let notifier = h.notifier().await;
        notifier.run_cycle(Domain::Documents, at(19, 10)).await.unwrap();
        let saved = notifier.snapshot_age(Domain::Documents, at(19, 10)).await;

        h.documents.fail(true);
        let result = notifier.run_cycle(Domain::Documents, at(19, 11)).await;
        assert!(matches!(result, Err(AppError::Fetch { .. })));
        assert_eq!(
            notifier.snapshot_age(Domain::Documents, at(19, 10)).await,
            saved
        );
    }

    #[tokio::test]
    async fn test_empty_fetch_trips_breaker() {
        let h = Harness::new(&["1"]);
        h.documents.set(vec![document("https://acme.example/a.pdf")]);
        let notifier = h.notifier().await;
        notifier.run_cycle(Domain::Documents, at(19, 10)).await.unwrap();

        h.documents.set(Vec::new());
        let result = notifier.run_cycle(Domain::Documents, at(19, 11)).await;
        assert!(matches!(result, Err(AppError::EmptyFetchResult)));

        let info = notifier.info(at(19, 11)).await;
        assert_eq!(info[2].snapshot_len, 1);
    }

    #[tokio::test]
    async fn test_two_tier_campaign_delivery() {
        let h = Harness::new(&["1", "2", "900"]);
        h.campaigns.set(vec![campaign(11, 2)]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Campaigns, at(22, 8)).await.unwrap();
        assert_eq!(report.enqueued, 1);
        assert_eq!(h.channel.sent_to("900").len(), 1);
        assert!(h.channel.sent_to("1").is_empty());

        notifier.run_cycle(Domain::Campaigns, at(22, 11)).await.unwrap();
        assert!(h.channel.sent_to("1").is_empty());

        let report = notifier.run_cycle(Domain::Campaigns, at(22, 12)).await.unwrap();
        assert_eq!(report.broadcast, 1);

        notifier.run_cycle(Domain::Campaigns, at(22, 13)).await.unwrap();
        assert_eq!(h.channel.sent_to("1").len(), 1);
        assert_eq!(h.channel.sent_to("2").len(), 1);
        assert_eq!(h.channel.sent_to("900").len(), 1);

        let info = notifier.info(at(22, 13)).await;
        assert_eq!(info[1].pending_len, Some(0));
    }

    #[tokio::test]
    async fn test_excluded_campaign_never_broadcast() {
        let h = Harness::new(&["1", "900"]);
        h.campaigns.set(vec![campaign(21, 1)]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Campaigns, at(22, 8)).await.unwrap();
        assert_eq!(report.enqueued, 0);
        notifier.run_cycle(Domain::Campaigns, at(22, 13)).await.unwrap();
        assert_eq!(h.channel.total_sent(), 0);
    }

    #[tokio::test]
    async fn test_excluded_pending_item_removed_without_marking() {
        let h = Harness::new(&["1", "900"]);
        let stale = Fingerprinted::new(campaign(31, 4)).unwrap();
        {
            let mut queue = PendingQueue::open(&h.config.paths.data_dir).await;
            queue.enqueue(&stale, true, at(21, 8)).await.unwrap();
        }
        h.campaigns.set(vec![campaign(11, 2)]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Campaigns, at(22, 8)).await.unwrap();
        assert_eq!(report.excluded, 1);
        assert!(h.channel.sent_to("1").is_empty());

        let queue = PendingQueue::open(&h.config.paths.data_dir).await;
        assert!(!queue.contains(&stale.key));
        let ledger = SentLedger::open(&h.config.paths.data_dir, Domain::Campaigns).await;
        assert!(ledger.get(&stale.key).is_none());
    }

    #[tokio::test]
    async fn test_pending_broadcast_survives_fetch_failure() {
        let h = Harness::new(&["1", "900"]);
        h.campaigns.set(vec![campaign(11, 2)]);
        let notifier = h.notifier().await;
        notifier.run_cycle(Domain::Campaigns, at(22, 8)).await.unwrap();

        h.campaigns.fail(true);
        let result = notifier.run_cycle(Domain::Campaigns, at(22, 12)).await;
        assert!(result.is_err());
        assert_eq!(h.channel.sent_to("1").len(), 1);
    }

    #[tokio::test]
    async fn test_silent_bootstrap() {
        let mut h = Harness::new(&["1"]);
        h.config.schedule.documents.bootstrap_silently = true;
        h.documents.set(vec![document("https://acme.example/a.pdf")]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Documents, at(19, 10)).await.unwrap();
        assert!(report.bootstrapped);
        assert_eq!(h.channel.total_sent(), 0);

        h.documents.set(vec![
            document("https://acme.example/a.pdf"),
            document("https://acme.example/b.pdf"),
        ]);
        let report = notifier.run_cycle(Domain::Documents, at(19, 11)).await.unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(h.channel.sent_to("1").len(), 1);
    }

    #[tokio::test]
    async fn test_manual_run_does_not_overlap() {
        let h = Harness::new(&["1"]);
        let notifier = h.notifier().await;

        let guard = notifier.updates.lock().await;
        let status = notifier
            .try_run_cycle(Domain::Updates, at(19, 15))
            .await
            .unwrap();
        assert_eq!(status, RunStatus::AlreadyRunning);
        assert_eq!(h.updates.calls(), 0);
        drop(guard);

        let status = notifier
            .try_run_cycle(Domain::Updates, at(19, 15))
            .await
            .unwrap();
        assert!(matches!(status, RunStatus::Completed(_)));
    }

    #[tokio::test]
    async fn test_deferred_message_retried_on_next_cycle() {
        let h = Harness::new(&["1"]);
        h.channel
            .script("1", vec![SendError::Transient("timeout".into()); 3]);
        h.documents.set(vec![document("https://acme.example/a.pdf")]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Documents, at(19, 10)).await.unwrap();
        assert_eq!(report.dispatch.deferred, 1);
        assert!(h.channel.sent_to("1").is_empty());

        notifier.run_cycle(Domain::Updates, at(19, 11)).await.unwrap();
        assert_eq!(h.channel.sent_to("1").len(), 1);
    }

    #[tokio::test]
    async fn test_blocked_subscriber_pruned_and_entity_still_marked() {
        let h = Harness::new(&["1", "2"]);
        h.channel
            .script("2", vec![SendError::PermanentlyBlocked("blocked".into())]);
        h.documents.set(vec![document("https://acme.example/a.pdf")]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Documents, at(19, 10)).await.unwrap();
        assert_eq!(report.dispatch.pruned, vec!["2"]);
        assert_eq!(h.registry.ids(), vec!["1"]);

        let ledger = SentLedger::open(&h.config.paths.data_dir, Domain::Documents).await;
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_reconfigured_channel_used_by_next_cycle() {
        let h = Harness::new(&["1"]);
        h.documents.set(vec![document("https://acme.example/a.pdf")]);
        let notifier = h.notifier().await;

        let rotated = Arc::new(FakeChannel::default());
        notifier.reconfigure_channel(rotated.clone()).await;
        notifier.run_cycle(Domain::Documents, at(19, 10)).await.unwrap();

        assert_eq!(h.channel.total_sent(), 0);
        assert_eq!(rotated.sent_to("1").len(), 1);
    }

    #[tokio::test]
    async fn test_collect_reads_state_without_service() {
        let h = Harness::new(&["1", "900"]);
        h.campaigns.set(vec![campaign(11, 2)]);
        h.updates.set(vec![update(7, "2025-04-22", "Plan signed")]);
        {
            let notifier = h.notifier().await;
            notifier.run_cycle(Domain::Campaigns, at(22, 8)).await.unwrap();
            notifier.run_cycle(Domain::Updates, at(22, 15)).await.unwrap();
        }

        let info = DomainInfo::collect(&h.config.paths.data_dir, at(22, 16)).await;
        assert_eq!(info[0].domain, Domain::Updates);
        assert_eq!(info[0].ledger_len, 1);
        assert_eq!(info[1].snapshot_len, 1);
        assert_eq!(info[1].pending_len, Some(1));
        assert_eq!(info[1].ledger_len, 0);
        assert!(info[2].last_saved.is_none());
    }

    #[tokio::test]
    async fn test_repeated_shrink_becomes_new_baseline() {
        let h = Harness::new(&["1", "900"]);
        h.campaigns.set((1..=12).map(|id| campaign(id, 2)).collect());
        let notifier = h.notifier().await;
        let report = notifier.run_cycle(Domain::Campaigns, at(22, 8)).await.unwrap();
        assert_eq!(report.enqueued, 12);

        h.campaigns.set(vec![campaign(12, 2), campaign(99, 2)]);
        for day in 23..25 {
            let result = notifier.run_cycle(Domain::Campaigns, at(day, 9)).await;
            assert!(matches!(result, Err(AppError::CircuitBreakerTriggered { .. })));
        }

        let report = notifier.run_cycle(Domain::Campaigns, at(25, 9)).await.unwrap();
        assert_eq!(report.enqueued, 1);
        let to_admin = h.channel.sent_to("900");
        assert_eq!(to_admin.len(), 13);
        assert!(to_admin[12].contains("Campaign 99"));
        assert_eq!(notifier.info(at(25, 9)).await[1].snapshot_len, 2);
    }

    #[tokio::test]
    async fn test_failed_lender_keeps_its_stored_updates() {
        let mut h = Harness::new(&["1"]);
        h.config.updates.same_day_only = false;
        let old = update(7, "2025-03-01", "Claim filed");
        let current = update(8, "2025-04-19", "Plan signed");
        h.updates.set(vec![old.clone(), current.clone()]);
        let notifier = h.notifier().await;

        notifier.run_cycle(Domain::Updates, at(19, 15)).await.unwrap();
        assert_eq!(h.channel.sent_to("1").len(), 2);

        h.updates.set(vec![current.clone()]);
        h.updates.fail_lenders(&["7"]);
        notifier.run_cycle(Domain::Updates, at(20, 15)).await.unwrap();
        assert_eq!(notifier.info(at(20, 15)).await[0].snapshot_len, 2);

        h.updates.set(vec![old, current]);
        h.updates.fail_lenders(&[]);
        let report = notifier.run_cycle(Domain::Updates, at(21, 15)).await.unwrap();
        assert_eq!(report.changed, 0);
        assert_eq!(h.channel.sent_to("1").len(), 2);
    }

    #[tokio::test]
    async fn test_first_run_only_announces_todays_updates() {
        let h = Harness::new(&["1"]);
        h.updates.set(vec![
            update(7, "2025-03-01", "Claim filed"),
            update(8, "2025-04-19", "Plan signed"),
        ]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Updates, at(19, 15)).await.unwrap();
        assert_eq!(report.notified, 1);
        let sent = h.channel.sent_to("1");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Plan signed"));
    }

    #[tokio::test]
    async fn test_run_from_other_process_is_not_overwritten() {
        let h = Harness::new(&["1"]);
        let daemon = h.notifier().await;
        let manual = h.notifier().await;

        h.updates.set(vec![update(7, "2025-04-19", "Plan signed")]);
        let status = manual
            .try_run_cycle(Domain::Updates, at(19, 15))
            .await
            .unwrap();
        assert!(matches!(status, RunStatus::Completed(_)));

        h.updates.set(vec![
            update(7, "2025-04-19", "Plan signed"),
            update(8, "2025-04-19", "Claim filed"),
        ]);
        let report = daemon.run_cycle(Domain::Updates, at(19, 16)).await.unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(h.channel.sent_to("1").len(), 2);

        let ledger = SentLedger::open(&h.config.paths.data_dir, Domain::Updates).await;
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_domain_held_by_other_process() {
        let h = Harness::new(&["1"]);
        let notifier = h.notifier().await;
        let mut other = DomainLock::open(&h.config.paths.data_dir, Domain::Documents)
            .await
            .unwrap();
        let _held = other.try_acquire().unwrap();

        let status = notifier
            .try_run_cycle(Domain::Documents, at(19, 10))
            .await
            .unwrap();
        assert_eq!(status, RunStatus::AlreadyRunning);
        assert!(matches!(
            notifier.run_cycle(Domain::Documents, at(19, 10)).await,
            Err(AppError::Locked(Domain::Documents))
        ));
        assert_eq!(h.documents.calls(), 0);
    }

    #[tokio::test]
    async fn test_pruned_destination_skipped_for_rest_of_pass() {
        let h = Harness::new(&["1", "2"]);
        h.channel
            .script("2", vec![SendError::PermanentlyBlocked("blocked".into())]);
        h.documents.set(vec![
            document("https://acme.example/a.pdf"),
            document("https://acme.example/b.pdf"),
        ]);
        let notifier = h.notifier().await;

        let report = notifier.run_cycle(Domain::Documents, at(19, 10)).await.unwrap();
        assert_eq!(report.notified, 2);
        assert_eq!(report.dispatch.pruned, vec!["2"]);
        assert_eq!(h.channel.attempts("2"), 1);
        assert_eq!(h.channel.sent_to("1").len(), 2);
    }
}
