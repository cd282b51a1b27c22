//! Message fan-out with pacing, retries and subscriber pruning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::error::SendError;
use crate::models::{DispatchConfig, Domain, Subscriber};
use crate::services::{Channel, SubscriberRegistry};

/// What happened to one (destination, message) delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Destination is gone and was removed from the registry
    Pruned,
    /// Retries exhausted; kept for one later retry pass
    Deferred,
    /// The channel refused the message itself; the destination is kept
    Dropped,
}

/// A message that failed transiently and waits for its single retry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredMessage {
    pub domain: Domain,
    pub destination: String,
    pub message: String,
}

/// Counts for one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Destinations removed from the registry
    pub pruned: Vec<String>,
    pub deferred: usize,
    /// Messages the channel rejected as undeliverable
    pub dropped: usize,
    /// Subscribers with the domain switched off
    pub skipped: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: DeliveryOutcome, destination: &str) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Pruned => self.pruned.push(destination.to_string()),
            DeliveryOutcome::Deferred => self.deferred += 1,
            DeliveryOutcome::Dropped => self.dropped += 1,
        }
    }

    pub fn merge(&mut self, other: &DispatchReport) {
        self.delivered += other.delivered;
        self.pruned.extend(other.pruned.iter().cloned());
        self.deferred += other.deferred;
        self.dropped += other.dropped;
        self.skipped += other.skipped;
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Sends rendered messages through the current channel.
pub struct Dispatcher {
    channel: RwLock<Arc<dyn Channel>>,
    registry: Arc<dyn SubscriberRegistry>,
    config: DispatchConfig,
    deferred: Mutex<Vec<DeferredMessage>>,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn Channel>,
        registry: Arc<dyn SubscriberRegistry>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            channel: RwLock::new(channel),
            registry,
            config,
            deferred: Mutex::new(Vec::new()),
        }
    }

    /// Replace the channel; in-flight sends finish on the old one.
    pub async fn set_channel(&self, channel: Arc<dyn Channel>) {
        *self.channel.write().await = channel;
    }

    pub fn registry(&self) -> &Arc<dyn SubscriberRegistry> {
        &self.registry
    }

    pub async fn deferred_len(&self) -> usize {
        self.deferred.lock().await.len()
    }

    async fn prune(&self, destination: &str, reason: &str) {
        log::warn!("Destination {} is unreachable ({}); removing", destination, reason);
        if let Err(e) = self.registry.remove_subscriber(destination).await {
            log::error!("Failed to remove subscriber {}: {}", destination, e);
        }
    }

    /// Deliver one message to one destination.
    ///
    /// Rate limits are honoured once, then treated as a transient failure.
    /// Transient failures back off exponentially up to `max_attempts` and
    /// are then deferred.
    pub async fn deliver(&self, domain: Domain, destination: &str, message: &str) -> DeliveryOutcome {
        let channel = self.channel.read().await.clone();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;
        let mut rate_limited = false;

        loop {
            pause(self.config.adaptive_delay(message.len(), attempt == 1 && !rate_limited)).await;

            let error = match channel.send(destination, message).await {
                Ok(()) => {
                    log::debug!("Delivered {} message to {}", domain, destination);
                    return DeliveryOutcome::Delivered;
                }
                Err(e) => e,
            };

            match error {
                SendError::RateLimited { retry_after } if !rate_limited => {
                    rate_limited = true;
                    let wait = retry_after + Duration::from_millis(self.config.rate_limit_buffer_ms);
                    log::warn!("Rate limited sending to {}; waiting {:?}", destination, wait);
                    pause(wait).await;
                }
                SendError::PermanentlyBlocked(reason) => {
                    self.prune(destination, &reason).await;
                    return DeliveryOutcome::Pruned;
                }
                SendError::Rejected(reason) => {
                    log::error!(
                        "{} message to {} rejected ({}); dropping it",
                        domain,
                        destination,
                        reason
                    );
                    return DeliveryOutcome::Dropped;
                }
                other if attempt >= max_attempts || matches!(other, SendError::RateLimited { .. }) => {
                    log::warn!(
                        "Giving up on {} after {} attempts ({}); deferring",
                        destination,
                        attempt,
                        other
                    );
                    self.deferred.lock().await.push(DeferredMessage {
                        domain,
                        destination: destination.to_string(),
                        message: message.to_string(),
                    });
                    return DeliveryOutcome::Deferred;
                }
                other => {
                    let backoff = Duration::from_millis(
                        self.config.retry_base_ms.saturating_mul(1 << (attempt - 1).min(16)),
                    );
                    log::debug!(
                        "Send to {} failed (attempt {}/{}): {}; retrying in {:?}",
                        destination,
                        attempt,
                        max_attempts,
                        other,
                        backoff
                    );
                    pause(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Deliver a message to every subscriber that has the domain enabled.
    pub async fn fan_out(
        &self,
        domain: Domain,
        message: &str,
        subscribers: &[Subscriber],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for subscriber in subscribers {
            let enabled = match self
                .registry
                .notification_enabled(&subscriber.destination_id, domain)
                .await
            {
                Ok(enabled) => enabled,
                Err(e) => {
                    log::warn!(
                        "Preference lookup for {} failed: {}; using cached value",
                        subscriber.destination_id,
                        e
                    );
                    subscriber.enabled_for(domain)
                }
            };

            if !enabled {
                report.skipped += 1;
                continue;
            }

            let outcome = self
                .deliver(domain, &subscriber.destination_id, message)
                .await;
            report.record(outcome, &subscriber.destination_id);
        }

        report
    }

    /// Deliver to fixed destinations regardless of preferences.
    pub async fn deliver_to(
        &self,
        domain: Domain,
        message: &str,
        destinations: &[String],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for destination in destinations {
            let outcome = self.deliver(domain, destination, message).await;
            report.record(outcome, destination);
        }
        report
    }

    /// Give every deferred message exactly one more attempt.
    pub async fn retry_deferred(&self) -> DispatchReport {
        let pending = std::mem::take(&mut *self.deferred.lock().await);
        let mut report = DispatchReport::default();
        if pending.is_empty() {
            return report;
        }

        log::info!("Retrying {} deferred messages", pending.len());
        let channel = self.channel.read().await.clone();

        for item in pending {
            pause(self.config.adaptive_delay(item.message.len(), false)).await;
            match channel.send(&item.destination, &item.message).await {
                Ok(()) => report.delivered += 1,
                Err(SendError::PermanentlyBlocked(reason)) => {
                    self.prune(&item.destination, &reason).await;
                    report.pruned.push(item.destination);
                }
                Err(e) => {
                    log::warn!(
                        "Dropping deferred {} message for {}: {}",
                        item.domain,
                        item.destination,
                        e
                    );
                }
            }
        }

        report
    }
}
