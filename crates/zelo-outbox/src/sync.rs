//! Side-effect subscribers.
//!
//! These event handlers keep platform records in step with delivery
//! outcomes: evaluations learn whether their message arrived, scheduled
//! sends are settled once their message reaches a terminal state. Retrying
//! events are ignored; only settled outcomes are propagated.

use std::sync::Arc;

use tracing::{debug, warn};
use zelo_core::{
    events::{EventHandler, OutboxEvent},
    time::Clock,
};

use crate::store::OutboxStore;

/// Mirrors delivery outcomes onto linked evaluations.
pub struct EvaluationSync {
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
}

impl EvaluationSync {
    /// Wires the subscriber.
    pub fn new(store: Arc<dyn OutboxStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl std::fmt::Debug for EvaluationSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationSync").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl EventHandler for EvaluationSync {
    async fn handle_event(&self, event: OutboxEvent) {
        let Some(evaluation_id) = event.context().and_then(|c| c.evaluation_id) else {
            return;
        };
        let now = self.clock.now();
        let result = match &event {
            OutboxEvent::Sent(sent) => {
                self.store
                    .record_evaluation_delivery(
                        evaluation_id,
                        true,
                        sent.provider_message_id.clone(),
                        None,
                        now,
                    )
                    .await
            }
            OutboxEvent::Dead(dead) => {
                self.store
                    .record_evaluation_delivery(
                        evaluation_id,
                        false,
                        None,
                        Some(dead.error.clone()),
                        now,
                    )
                    .await
            }
            OutboxEvent::Retrying(_) => return,
        };
        match result {
            Ok(()) => debug!(
                evaluation_id = %evaluation_id,
                outcome = event.kind(),
                "evaluation delivery recorded"
            ),
            // The delivery outcome already stands; this bookkeeping retries
            // naturally the next time the evaluation is messaged.
            Err(e) => warn!(
                evaluation_id = %evaluation_id,
                error = %e,
                "evaluation delivery update failed"
            ),
        }
    }
}

/// Settles scheduled sends when their message reaches a terminal state.
pub struct ScheduledSendSync {
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
}

impl ScheduledSendSync {
    /// Wires the subscriber.
    pub fn new(store: Arc<dyn OutboxStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl std::fmt::Debug for ScheduledSendSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledSendSync").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl EventHandler for ScheduledSendSync {
    async fn handle_event(&self, event: OutboxEvent) {
        let Some(send_id) = event.context().and_then(|c| c.scheduled_send_id) else {
            return;
        };
        let now = self.clock.now();
        let result = match &event {
            OutboxEvent::Sent(_) => self.store.mark_scheduled_send_sent(send_id, now).await,
            OutboxEvent::Dead(dead) => {
                self.store
                    .mark_scheduled_send_failed(send_id, dead.error.clone(), now)
                    .await
            }
            OutboxEvent::Retrying(_) => return,
        };
        match result {
            Ok(()) => debug!(
                scheduled_send_id = %send_id,
                outcome = event.kind(),
                "scheduled send settled"
            ),
            Err(e) => warn!(
                scheduled_send_id = %send_id,
                error = %e,
                "scheduled send settlement failed"
            ),
        }
    }
}
