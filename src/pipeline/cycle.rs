//! One poll-diff-dispatch pass per domain.
//!
//! A pass never partially overwrites persisted state on failure: the
//! snapshot is only replaced after every changed record has been
//! dispatched and recorded in the ledger.

use std::path::Path;

use chrono::{DateTime, Local};

use super::circuit_breaker::CircuitBreaker;
use super::diff::{calculate_diff, fingerprint_all};
use super::dispatch::{DispatchReport, Dispatcher};
use super::identity::Fingerprinted;
use crate::error::{AppError, Result};
use crate::models::{
    CampaignRecord, CampaignsConfig, Domain, Entity, ScheduleConfig, Subscriber, UpdateRecord,
};
use crate::services::UpdateBatch;
use crate::storage::{PendingQueue, SentLedger, SnapshotStore};

/// Persisted state of one domain.
#[derive(Debug)]
pub struct DomainState<E> {
    pub snapshot: SnapshotStore<E>,
    pub ledger: SentLedger,
    /// Consecutive passes refused by the circuit breaker
    pub breaker_trips: u32,
}

impl<E: Entity> DomainState<E> {
    pub async fn open(data_dir: &Path) -> Self {
        Self {
            snapshot: SnapshotStore::open(data_dir).await,
            ledger: SentLedger::open(data_dir, E::DOMAIN).await,
            breaker_trips: 0,
        }
    }

    /// Re-read what another process may have written since `open`.
    ///
    /// Only called while the domain's file lock is held.
    pub async fn reload(&mut self, data_dir: &Path) {
        self.snapshot.refresh().await;
        self.ledger = SentLedger::open(data_dir, E::DOMAIN).await;
    }
}

/// Campaign state adds the pending queue for the delayed broadcast.
#[derive(Debug)]
pub struct CampaignState {
    pub base: DomainState<CampaignRecord>,
    pub pending: PendingQueue,
}

impl CampaignState {
    pub async fn open(data_dir: &Path) -> Self {
        Self {
            base: DomainState::open(data_dir).await,
            pending: PendingQueue::open(data_dir).await,
        }
    }

    pub async fn reload(&mut self, data_dir: &Path) {
        self.base.reload(data_dir).await;
        self.pending = PendingQueue::open(data_dir).await;
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub domain: Option<Domain>,
    pub fetched: usize,
    /// Added or changed since the previous snapshot
    pub changed: usize,
    /// Records actually dispatched (changed and not already sent)
    pub notified: usize,
    /// First pass recorded everything as sent without delivering
    pub bootstrapped: bool,
    /// Campaigns shown to admins and queued
    pub enqueued: usize,
    /// Queued campaigns broadcast to everyone else
    pub broadcast: usize,
    /// Queued campaigns dropped because their category is excluded
    pub excluded: usize,
    pub dispatch: DispatchReport,
}

impl CycleReport {
    fn new(domain: Domain, fetched: usize) -> Self {
        Self {
            domain: Some(domain),
            fetched,
            ..Self::default()
        }
    }
}

/// Shared collaborators of a pass.
pub(crate) struct CycleContext<'a> {
    pub dispatcher: &'a Dispatcher,
    pub breaker: &'a CircuitBreaker,
    pub schedule: &'a ScheduleConfig,
    pub now: DateTime<Local>,
}

/// Guard the fetch, handle a silent bootstrap, and diff.
///
/// Returns `None` when the pass was a bootstrap and is already complete.
async fn prepare<E: Entity>(
    ctx: &CycleContext<'_>,
    state: &mut DomainState<E>,
    fetched: &[E],
    report: &mut CycleReport,
) -> Result<Option<Vec<Fingerprinted<E>>>> {
    let previous = state.snapshot.load().await;
    match ctx
        .breaker
        .validate(E::DOMAIN, fetched.len(), previous.len(), state.breaker_trips)
    {
        Ok(()) => state.breaker_trips = 0,
        Err(e) => {
            if matches!(e, AppError::CircuitBreakerTriggered { .. }) {
                state.breaker_trips += 1;
            }
            return Err(e);
        }
    }

    if ctx.schedule.bootstrap_silently && !state.snapshot.has_saved() {
        let (current, _) = fingerprint_all(fetched);
        state.ledger.mark_all_sent(&current, ctx.now).await?;
        state.snapshot.save(fetched, ctx.now).await?;
        log::info!(
            "{}: first run, recorded {} records as sent without notifying",
            E::DOMAIN,
            current.len()
        );
        report.bootstrapped = true;
        return Ok(None);
    }

    let diff = calculate_diff(&previous, fetched);
    if diff.has_changes() {
        log::info!(
            "{}: {} added, {} updated, {} removed",
            E::DOMAIN,
            diff.added.len(),
            diff.updated.len(),
            diff.removed.len()
        );
    }
    let changed = diff.changed();
    report.changed = changed.len();
    Ok(Some(changed))
}

/// Complete a partial updates poll with the stored records of the lenders
/// that failed, so their absence is not read as removal and their history
/// is not announced again once they answer.
pub(crate) fn merge_failed_lenders(previous: Vec<UpdateRecord>, batch: UpdateBatch) -> Vec<UpdateRecord> {
    let UpdateBatch {
        mut records,
        failed_lenders,
    } = batch;
    if failed_lenders.is_empty() {
        return records;
    }

    let carried: Vec<UpdateRecord> = previous
        .into_iter()
        .filter(|r| failed_lenders.contains(&r.lender_id))
        .collect();
    log::info!(
        "Keeping {} stored updates for {} lenders that failed this poll",
        carried.len(),
        failed_lenders.len()
    );
    records.extend(carried);
    records
}

/// Drop destinations pruned earlier in the same pass.
fn forget_pruned(subscribers: &mut Vec<Subscriber>, pruned: &[String]) {
    if !pruned.is_empty() {
        subscribers.retain(|s| !pruned.contains(&s.destination_id));
    }
}

/// Pass for domains delivered straight to subscribers (updates, documents).
pub(crate) async fn run_standard_cycle<E: Entity>(
    ctx: &CycleContext<'_>,
    state: &mut DomainState<E>,
    fetched: Vec<E>,
    same_day_only: bool,
) -> Result<CycleReport> {
    let mut report = CycleReport::new(E::DOMAIN, fetched.len());
    let Some(mut changed) = prepare(ctx, state, &fetched, &mut report).await? else {
        return Ok(report);
    };

    if same_day_only {
        let today = ctx.now.date_naive();
        changed.retain(|item| item.entity.business_date() == Some(today));
    }

    let eligible: Vec<_> = changed
        .into_iter()
        .filter(|item| {
            let sent = state.ledger.is_sent(item, ctx.now);
            if sent {
                log::debug!("{} already sent, skipping", item.entity.label());
            }
            !sent
        })
        .collect();

    if !eligible.is_empty() {
        let mut subscribers = ctx.dispatcher.registry().list_subscribers().await?;
        log::info!(
            "{}: notifying {} subscribers of {} records",
            E::DOMAIN,
            subscribers.len(),
            eligible.len()
        );

        for item in &eligible {
            let outcome = ctx
                .dispatcher
                .fan_out(E::DOMAIN, &item.entity.render(), &subscribers)
                .await;
            forget_pruned(&mut subscribers, &outcome.pruned);
            report.dispatch.merge(&outcome);
            state.ledger.mark_sent(item, ctx.now).await?;
            report.notified += 1;
        }
    }

    state.snapshot.save(&fetched, ctx.now).await?;
    Ok(report)
}

/// Campaign pass: admins first, everyone else after the configured delay.
///
/// Ready queue items are processed even when the fetch failed; the fetch
/// error is still returned so the scheduler backs off.
pub(crate) async fn run_campaign_cycle(
    ctx: &CycleContext<'_>,
    state: &mut CampaignState,
    fetched: Result<Vec<CampaignRecord>>,
    campaigns: &CampaignsConfig,
    admin_ids: &[String],
) -> Result<CycleReport> {
    let mut report = CycleReport::new(Domain::Campaigns, 0);

    let intake = match fetched {
        Ok(list) => {
            report.fetched = list.len();
            intake_campaigns(ctx, state, list, campaigns, admin_ids, &mut report).await
        }
        Err(e) => Err(e),
    };

    let broadcast = broadcast_ready(ctx, state, campaigns, admin_ids, &mut report).await;

    intake?;
    broadcast?;
    Ok(report)
}

/// Deliver new campaigns to admins and queue them.
async fn intake_campaigns(
    ctx: &CycleContext<'_>,
    state: &mut CampaignState,
    fetched: Vec<CampaignRecord>,
    campaigns: &CampaignsConfig,
    admin_ids: &[String],
    report: &mut CycleReport,
) -> Result<()> {
    let Some(changed) = prepare(ctx, &mut state.base, &fetched, report).await? else {
        return Ok(());
    };

    for item in changed {
        if campaigns.is_excluded(item.entity.category) {
            log::debug!("{} has an excluded category, skipping", item.entity.label());
            continue;
        }
        if state.base.ledger.is_sent(&item, ctx.now) {
            log::debug!("{} already sent, skipping", item.entity.label());
            continue;
        }
        if state.pending.get(&item.key).is_some_and(|p| p.digest == item.digest) {
            log::debug!("{} already pending, skipping", item.entity.label());
            continue;
        }

        let admin = ctx
            .dispatcher
            .deliver_to(Domain::Campaigns, &item.entity.render(), admin_ids)
            .await;
        report.dispatch.merge(&admin);
        let admin_notified = admin.delivered > 0;
        if !admin_notified {
            log::warn!("{} was not delivered to any admin", item.entity.label());
        }

        state.pending.enqueue(&item, admin_notified, ctx.now).await?;
        report.enqueued += 1;
        log::info!(
            "{} queued for broadcast in {}h",
            item.entity.label(),
            campaigns.delay_hours
        );
    }

    state.base.snapshot.save(&fetched, ctx.now).await?;
    Ok(())
}

/// Broadcast queue items whose delay has elapsed to non-admin subscribers.
async fn broadcast_ready(
    ctx: &CycleContext<'_>,
    state: &mut CampaignState,
    campaigns: &CampaignsConfig,
    admin_ids: &[String],
    report: &mut CycleReport,
) -> Result<()> {
    let ready = state.pending.ready(campaigns.delay_hours, ctx.now);
    if ready.is_empty() {
        return Ok(());
    }

    let mut subscribers: Vec<Subscriber> = ctx
        .dispatcher
        .registry()
        .list_subscribers()
        .await?
        .into_iter()
        .filter(|s| !admin_ids.contains(&s.destination_id))
        .collect();

    for pending in ready {
        if campaigns.is_excluded(pending.campaign.category) {
            log::info!(
                "Dropping queued {} (excluded category)",
                pending.campaign.label()
            );
            state.pending.remove(&pending.key).await?;
            report.excluded += 1;
            continue;
        }

        let item = pending.to_fingerprinted();
        if state.base.ledger.is_sent(&item, ctx.now) {
            state.pending.remove(&item.key).await?;
            continue;
        }

        let outcome = ctx
            .dispatcher
            .fan_out(Domain::Campaigns, &item.entity.render(), &subscribers)
            .await;
        forget_pruned(&mut subscribers, &outcome.pruned);
        report.dispatch.merge(&outcome);
        state.base.ledger.mark_sent(&item, ctx.now).await?;
        state.pending.remove(&item.key).await?;
        report.broadcast += 1;
        log::info!(
            "Broadcast {} to {} subscribers",
            item.entity.label(),
            outcome.delivered
        );
    }

    Ok(())
}
