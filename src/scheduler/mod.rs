//! One supervisory loop per domain.
//!
//! Each loop checks its gate, runs a cycle through the shared `Notifier`,
//! then sleeps for the success cooldown or the current failure backoff.
//! Shutdown is only observed between cycles so a run never stops mid-write.

mod backoff;
mod gate;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::Domain;
use crate::pipeline::Notifier;

pub use backoff::Backoff;
pub use gate::{GateDecision, SkipReason, evaluate};

/// Spawns and supervises the domain loops.
pub struct Scheduler {
    notifier: Arc<Notifier>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(notifier: Arc<Notifier>, shutdown: CancellationToken) -> Self {
        Self { notifier, shutdown }
    }

    /// Start one task per domain.
    pub fn spawn_all(&self) -> Vec<(Domain, JoinHandle<()>)> {
        Domain::ALL
            .into_iter()
            .map(|domain| {
                let notifier = self.notifier.clone();
                let shutdown = self.shutdown.clone();
                let handle = tokio::spawn(run_domain(notifier, domain, shutdown));
                (domain, handle)
            })
            .collect()
    }

    /// Run every loop until shutdown is requested and all have exited.
    pub async fn run(&self) {
        let handles = self.spawn_all();
        log::info!("Started {} domain loops", handles.len());

        for (domain, handle) in handles {
            if let Err(e) = handle.await {
                log::error!("{} loop ended abnormally: {}", domain, e);
            }
        }
        log::info!("All domain loops stopped");
    }
}

/// The loop for one domain.
pub async fn run_domain(notifier: Arc<Notifier>, domain: Domain, shutdown: CancellationToken) {
    let schedule = notifier.config().schedule.for_domain(domain).clone();
    let mut backoff = Backoff::new(&schedule);
    log::info!("{} loop started", domain);

    while !shutdown.is_cancelled() {
        let now = Local::now();
        let age = notifier.snapshot_age(domain, now).await;

        let wait = match evaluate(&schedule, now, age) {
            GateDecision::Skip(reason) => {
                log::debug!("{}: skipping ({:?})", domain, reason);
                Duration::from_secs(schedule.poll_interval_secs)
            }
            decision => {
                if decision == GateDecision::StaleOverride {
                    log::info!(
                        "{}: snapshot is stale ({}), running outside the window",
                        domain,
                        age.map(|a| format!("{}h old", a.num_hours()))
                            .unwrap_or_else(|| "never saved".into())
                    );
                }

                match notifier.run_cycle(domain, now).await {
                    Ok(report) => {
                        backoff.record_success();
                        log::info!(
                            "{}: fetched {}, changed {}, notified {}, delivered {}",
                            domain,
                            report.fetched,
                            report.changed,
                            report.notified + report.broadcast,
                            report.dispatch.delivered
                        );
                        Duration::from_secs(schedule.success_cooldown_secs)
                    }
                    Err(AppError::Locked(_)) => {
                        log::info!("{}: another process is running this domain", domain);
                        Duration::from_secs(schedule.poll_interval_secs)
                    }
                    Err(e) => {
                        let wait = backoff.record_failure();
                        log::warn!(
                            "{}: cycle failed ({} in a row): {}; retrying in {:?}",
                            domain,
                            backoff.failures(),
                            e,
                            wait
                        );
                        wait
                    }
                }
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    log::info!("{} loop stopped", domain);
}
