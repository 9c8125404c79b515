//! Delivery worker.
//!
//! One pass drains the due items under the worker lease: claim, attempt,
//! persist the resulting transition, publish the event. The lease keeps
//! concurrent processes from running passes at the same time; the per-item
//! claim keeps a racing pass from double-sending even if the lease is
//! somehow held twice.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zelo_core::{
    events::{EventHandler, MessageDead, MessageRetrying, MessageSent, OutboxEvent},
    models::{ItemStatus, OutboxItem},
    payload::{MessageContext, MessagePayload},
    time::Clock,
};

use crate::{
    backoff::{circuit_open_retry_at, effective_max_retries, RetrySchedule, DEFAULT_MAX_RETRIES},
    error::{OutboxError, Result},
    executor::DeliveryExecutor,
    lease::{LeaseStore, WORKER_LOCK_RESOURCE},
    store::OutboxStore,
};

/// Tuning for the delivery worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum items drained per pass.
    pub batch_size: usize,
    /// Retry budget per item. Non-positive values fall back to the default.
    pub max_retries: i32,
    /// Lease duration; a crashed worker is displaced after this long.
    pub lease_ttl: std::time::Duration,
    /// Backoff ladder for failed attempts.
    pub schedule: RetrySchedule,
    /// Lease resource name; deployments sharing a database must agree on it.
    pub resource: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_retries: DEFAULT_MAX_RETRIES,
            lease_ttl: std::time::Duration::from_secs(30),
            schedule: RetrySchedule::new(),
            resource: WORKER_LOCK_RESOURCE.to_string(),
        }
    }
}

/// Per-call overrides for one pass.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Overrides the configured batch size.
    pub limit: Option<usize>,
    /// Overrides the configured retry budget.
    pub max_retries: Option<i32>,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Due items selected for this pass.
    pub picked: usize,
    /// Items delivered.
    pub sent: usize,
    /// Items rescheduled for another attempt.
    pub retrying: usize,
    /// Items dead-lettered.
    pub dead: usize,
    /// Items that were withdrawn between selection and claim.
    pub canceled: usize,
    /// True when the pass did not run because another worker holds the lease.
    pub skipped_by_lock: bool,
}

/// Drains due outbox items, one lease-guarded pass at a time.
pub struct OutboxWorker {
    store: Arc<dyn OutboxStore>,
    lease: Arc<dyn LeaseStore>,
    executor: DeliveryExecutor,
    events: Arc<dyn EventHandler>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    owner: Uuid,
}

impl OutboxWorker {
    /// Wires the worker from its collaborators. Each worker instance gets a
    /// random lease owner identity.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        lease: Arc<dyn LeaseStore>,
        executor: DeliveryExecutor,
        events: Arc<dyn EventHandler>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            lease,
            executor,
            events,
            clock,
            config,
            owner: Uuid::new_v4(),
        }
    }

    /// Lease owner identity of this worker.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Runs one delivery pass.
    ///
    /// Returns a report of what happened; a pass that lost the lease race
    /// reports `skipped_by_lock` and touches nothing. Individual item
    /// failures never abort the pass.
    pub async fn process_once(&self, options: PassOptions) -> Result<PassReport> {
        let now = self.clock.now();
        let acquired = self
            .lease
            .acquire(&self.config.resource, self.owner, self.config.lease_ttl, now)
            .await?;
        if !acquired {
            debug!(resource = %self.config.resource, "another worker holds the lease");
            return Ok(PassReport {
                skipped_by_lock: true,
                ..PassReport::default()
            });
        }

        let report = self.drain(options).await;

        // The lease self-expires, so a failed release only delays the next
        // pass by at most the TTL.
        match self.lease.release(&self.config.resource, self.owner).await {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "worker lease release failed"),
        }

        report
    }

    async fn drain(&self, options: PassOptions) -> Result<PassReport> {
        let limit = options.limit.unwrap_or(self.config.batch_size);
        let max_retries =
            effective_max_retries(Some(options.max_retries.unwrap_or(self.config.max_retries)));

        let now = self.clock.now();
        let due = self.store.find_due(now, limit).await?;
        let mut report = PassReport {
            picked: due.len(),
            ..PassReport::default()
        };

        if due.is_empty() {
            return Ok(report);
        }
        debug!(picked = due.len(), "delivery pass starting");

        for item in due {
            self.process_item(item, max_retries, &mut report).await;
        }

        info!(
            picked = report.picked,
            sent = report.sent,
            retrying = report.retrying,
            dead = report.dead,
            canceled = report.canceled,
            "delivery pass finished"
        );
        Ok(report)
    }

    /// Handles one item; all failures end up in the report, not in an `Err`.
    async fn process_item(&self, item: OutboxItem, max_retries: i32, report: &mut PassReport) {
        let now = self.clock.now();
        let claimed = match self.store.claim(item.id, now).await {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(item_id = %item.id, error = %e, "claim failed, leaving item for next pass");
                return;
            }
        };
        if !claimed {
            // Someone moved the item between selection and claim; a cancel
            // is the expected cause, anything else just skips silently.
            match self.store.find_item(item.id).await {
                Ok(Some(current)) if current.status == ItemStatus::Canceled => {
                    report.canceled += 1;
                }
                Ok(_) => debug!(item_id = %item.id, "item left claimable states, skipping"),
                Err(e) => warn!(item_id = %item.id, error = %e, "re-read after lost claim failed"),
            }
            return;
        }

        let payload = match MessagePayload::from_value(&item.payload) {
            Ok(payload) => payload,
            Err(e) => {
                // A payload that no longer parses can never send.
                let error = OutboxError::from(e);
                self.settle_dead(&item, item.retries, &error, None, report).await;
                return;
            }
        };
        let context = payload.context.clone();

        match self.executor.execute(&item, &payload).await {
            Ok(outcome) => {
                self.settle_sent(&item, outcome.provider_message_id, context, report)
                    .await;
            }
            Err(error) if error.is_circuit_open() => {
                // The bridge is shedding load on purpose: short fixed delay,
                // no budget consumed.
                let retry_at = circuit_open_retry_at(self.clock.now());
                self.settle_retrying(&item, item.retries, retry_at, &error, true, context, report)
                    .await;
            }
            Err(error) => {
                let retries = item.retries + 1;
                if !error.is_retryable() || retries >= max_retries {
                    self.settle_dead(&item, retries, &error, context, report).await;
                } else {
                    let retry_at = self.config.schedule.next_attempt_at(retries, self.clock.now());
                    self.settle_retrying(&item, retries, retry_at, &error, false, context, report)
                        .await;
                }
            }
        }
    }

    async fn settle_sent(
        &self,
        item: &OutboxItem,
        provider_message_id: Option<String>,
        context: Option<MessageContext>,
        report: &mut PassReport,
    ) {
        let now = self.clock.now();
        if let Err(e) = self
            .store
            .mark_sent(item.id, provider_message_id.clone(), now)
            .await
        {
            // Delivered but not recorded; the item stays `sending` for a
            // human to reconcile rather than risking a duplicate send.
            error!(item_id = %item.id, error = %e, "failed to record delivered item");
            return;
        }
        info!(
            item_id = %item.id,
            phone = %item.phone,
            provider_message_id = ?provider_message_id,
            attempts = item.retries + 1,
            "message delivered"
        );
        report.sent += 1;
        self.events
            .handle_event(OutboxEvent::Sent(MessageSent {
                item_id: item.id,
                phone: item.phone.clone(),
                idempotency_key: item.idempotency_key.clone(),
                internal_message_id: item.internal_message_id.clone(),
                provider_message_id,
                attempts: item.retries + 1,
                context,
                sent_at: now,
            }))
            .await;
    }

    async fn settle_retrying(
        &self,
        item: &OutboxItem,
        retries: i32,
        next_attempt_at: chrono::DateTime<chrono::Utc>,
        error: &OutboxError,
        circuit_open: bool,
        context: Option<MessageContext>,
        report: &mut PassReport,
    ) {
        let now = self.clock.now();
        let error_text = error.to_string();
        if let Err(e) = self
            .store
            .mark_retrying(item.id, retries, next_attempt_at, error_text.clone(), now)
            .await
        {
            error!(item_id = %item.id, error = %e, "failed to reschedule item");
            return;
        }
        warn!(
            item_id = %item.id,
            retries,
            next_attempt_at = %next_attempt_at,
            circuit_open,
            error = %error_text,
            "delivery attempt failed, rescheduled"
        );
        report.retrying += 1;
        self.events
            .handle_event(OutboxEvent::Retrying(MessageRetrying {
                item_id: item.id,
                phone: item.phone.clone(),
                idempotency_key: item.idempotency_key.clone(),
                internal_message_id: item.internal_message_id.clone(),
                error: error_text,
                retries,
                next_attempt_at,
                circuit_open,
                context,
            }))
            .await;
    }

    async fn settle_dead(
        &self,
        item: &OutboxItem,
        retries: i32,
        error: &OutboxError,
        context: Option<MessageContext>,
        report: &mut PassReport,
    ) {
        let now = self.clock.now();
        let error_text = error.to_string();
        if let Err(e) = self
            .store
            .mark_dead(item.id, retries, error_text.clone(), now)
            .await
        {
            error!(item_id = %item.id, error = %e, "failed to dead-letter item");
            return;
        }
        error!(
            item_id = %item.id,
            phone = %item.phone,
            retries,
            error = %error_text,
            "message dead-lettered"
        );
        report.dead += 1;
        self.events
            .handle_event(OutboxEvent::Dead(MessageDead {
                item_id: item.id,
                phone: item.phone.clone(),
                idempotency_key: item.idempotency_key.clone(),
                internal_message_id: item.internal_message_id.clone(),
                error: error_text,
                retries,
                failed_at: now,
                context,
            }))
            .await;
    }
}
