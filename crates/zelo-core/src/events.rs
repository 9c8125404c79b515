//! Delivery lifecycle events and the subscriber plumbing around them.
//!
//! The worker publishes an event after every persisted state transition.
//! Subscribers run side effects (evaluation bookkeeping, scheduled-send
//! settlement, logging) and are strictly best-effort: nothing they do can
//! change the delivery outcome that was already stored.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    models::ItemId,
    payload::MessageContext,
};

/// Outcome of a delivery attempt, published after the item row was updated.
#[derive(Debug, Clone)]
pub enum OutboxEvent {
    /// The message reached the chat provider.
    Sent(MessageSent),
    /// The attempt failed and another one is scheduled.
    Retrying(MessageRetrying),
    /// The item was dead-lettered.
    Dead(MessageDead),
}

impl OutboxEvent {
    /// Identifier of the item the event belongs to.
    pub fn item_id(&self) -> ItemId {
        match self {
            Self::Sent(e) => e.item_id,
            Self::Retrying(e) => e.item_id,
            Self::Dead(e) => e.item_id,
        }
    }

    /// Platform context carried by the message, if any.
    pub fn context(&self) -> Option<&MessageContext> {
        match self {
            Self::Sent(e) => e.context.as_ref(),
            Self::Retrying(e) => e.context.as_ref(),
            Self::Dead(e) => e.context.as_ref(),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sent(_) => "sent",
            Self::Retrying(_) => "retrying",
            Self::Dead(_) => "dead",
        }
    }
}

/// Details of a successful delivery.
#[derive(Debug, Clone)]
pub struct MessageSent {
    /// Item that was delivered.
    pub item_id: ItemId,
    /// Destination number.
    pub phone: String,
    /// Deduplication key of the item.
    pub idempotency_key: String,
    /// Platform message identifier.
    pub internal_message_id: String,
    /// Identifier assigned by the chat provider, when it returned one.
    pub provider_message_id: Option<String>,
    /// Attempt number that succeeded, starting at 1.
    pub attempts: i32,
    /// Platform context carried by the message.
    pub context: Option<MessageContext>,
    /// When the delivery was recorded.
    pub sent_at: DateTime<Utc>,
}

/// Details of a failed attempt that will be retried.
#[derive(Debug, Clone)]
pub struct MessageRetrying {
    /// Item that failed.
    pub item_id: ItemId,
    /// Destination number.
    pub phone: String,
    /// Deduplication key of the item.
    pub idempotency_key: String,
    /// Platform message identifier.
    pub internal_message_id: String,
    /// Text of the failure.
    pub error: String,
    /// Retry counter after this attempt.
    pub retries: i32,
    /// When the next attempt becomes due.
    pub next_attempt_at: DateTime<Utc>,
    /// True when the bridge reported an open circuit, which does not
    /// consume retry budget.
    pub circuit_open: bool,
    /// Platform context carried by the message.
    pub context: Option<MessageContext>,
}

/// Details of a permanent failure.
#[derive(Debug, Clone)]
pub struct MessageDead {
    /// Item that was dead-lettered.
    pub item_id: ItemId,
    /// Destination number.
    pub phone: String,
    /// Deduplication key of the item.
    pub idempotency_key: String,
    /// Platform message identifier.
    pub internal_message_id: String,
    /// Text of the final failure.
    pub error: String,
    /// Retry counter at the time of burial.
    pub retries: i32,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
    /// Platform context carried by the message.
    pub context: Option<MessageContext>,
}

/// Receives delivery events.
///
/// Handlers must not fail: anything that can go wrong inside a handler is
/// its own responsibility to log and swallow.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + fmt::Debug {
    /// Handles a single event.
    async fn handle_event(&self, event: OutboxEvent);
}

/// Handler that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventHandler;

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: OutboxEvent) {}
}

/// Fans one event out to several subscribers.
///
/// Subscribers run sequentially in registration order, so a subscriber that
/// must observe another's writes can simply be registered after it.
#[derive(Debug, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates an empty multicast handler.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Appends a subscriber to the dispatch order.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: OutboxEvent) {
        for handler in &self.handlers {
            handler.handle_event(event.clone()).await;
        }
    }
}
