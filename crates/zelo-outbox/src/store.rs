//! Storage abstraction for the enqueue service and worker.
//!
//! One trait covers everything delivery touches: the outbox items
//! themselves plus the platform records the executor and side-effect
//! subscribers read and update. Production wraps the concrete
//! `zelo_core::Storage`; tests use the in-memory [`mock`] implementation.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use zelo_core::{
    error::Result,
    models::{
        EvaluationId, ItemId, ItemStatus, MessageTemplate, OutboxItem, Quote, QuoteId,
        QuoteStatus, ScheduledSendId, TemplateId,
    },
};

/// Storage operations required by the outbox.
///
/// Item methods own every lifecycle transition; the claim is the
/// compare-and-swap that keeps racing workers off the same row. The
/// remaining methods serve the delivery executor (templates, quotes) and
/// the side-effect subscribers (evaluations, scheduled sends).
pub trait OutboxStore: Send + Sync + 'static {
    /// Inserts a new item.
    ///
    /// The `idempotency_key` column is unique; concurrent inserts with the
    /// same key surface as a constraint violation the enqueue service
    /// resolves by re-reading.
    fn create_item(
        &self,
        item: OutboxItem,
    ) -> Pin<Box<dyn Future<Output = Result<ItemId>> + Send + '_>>;

    /// Looks up one item by id.
    fn find_item(
        &self,
        id: ItemId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OutboxItem>>> + Send + '_>>;

    /// Looks up the item holding an idempotency key, regardless of status.
    fn find_by_idempotency_key(
        &self,
        key: String,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OutboxItem>>> + Send + '_>>;

    /// Selects up to `limit` claimable items whose schedule has come due,
    /// ordered by schedule time (absent first) then enqueue time.
    fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OutboxItem>>> + Send + '_>>;

    /// Conditionally moves a claimable item to `sending`.
    ///
    /// Returns false when the row already left the claimable states, which
    /// is how a racing claimer learns it lost.
    fn claim(
        &self,
        id: ItemId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    /// Records a successful delivery.
    fn mark_sent(
        &self,
        id: ItemId,
        provider_message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Schedules another attempt after a failure.
    fn mark_retrying(
        &self,
        id: ItemId,
        retries: i32,
        next_attempt_at: DateTime<Utc>,
        error: String,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Dead-letters an item.
    fn mark_dead(
        &self,
        id: ItemId,
        retries: i32,
        error: String,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Withdraws a not-yet-delivered item. Returns false when the item was
    /// already claimed or finished.
    fn cancel_item(
        &self,
        id: ItemId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    /// Counts items in a status, for introspection and tests.
    fn count_by_status(
        &self,
        status: ItemStatus,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;

    /// Looks up a stored message template.
    fn find_template(
        &self,
        id: TemplateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<MessageTemplate>>> + Send + '_>>;

    /// Looks up a quote.
    fn find_quote(
        &self,
        id: QuoteId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Quote>>> + Send + '_>>;

    /// Persists a quote's post-delivery status and price snapshot.
    fn record_quote_sent(
        &self,
        id: QuoteId,
        status: QuoteStatus,
        price_snapshot_cents: i64,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Records a delivery outcome against an evaluation.
    fn record_evaluation_delivery(
        &self,
        id: EvaluationId,
        delivered: bool,
        provider_message_id: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Settles a scheduled send whose message was delivered.
    fn mark_scheduled_send_sent(
        &self,
        id: ScheduledSendId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Settles a scheduled send whose message was dead-lettered.
    fn mark_scheduled_send_failed(
        &self,
        id: ScheduledSendId,
        error: String,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production store over PostgreSQL, delegating to the repositories.
pub struct PostgresOutboxStore {
    storage: Arc<zelo_core::Storage>,
}

impl PostgresOutboxStore {
    /// Wraps the concrete storage layer.
    pub fn new(storage: Arc<zelo_core::Storage>) -> Self {
        Self { storage }
    }
}

impl OutboxStore for PostgresOutboxStore {
    fn create_item(
        &self,
        item: OutboxItem,
    ) -> Pin<Box<dyn Future<Output = Result<ItemId>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.create(&item).await })
    }

    fn find_item(
        &self,
        id: ItemId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OutboxItem>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.find_by_id(id).await })
    }

    fn find_by_idempotency_key(
        &self,
        key: String,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OutboxItem>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.find_by_idempotency_key(&key).await })
    }

    fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OutboxItem>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.find_due(now, limit).await })
    }

    fn claim(
        &self,
        id: ItemId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.claim(id, now).await })
    }

    fn mark_sent(
        &self,
        id: ItemId,
        provider_message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .outbox_items
                .mark_sent(id, provider_message_id.as_deref(), now)
                .await
        })
    }

    fn mark_retrying(
        &self,
        id: ItemId,
        retries: i32,
        next_attempt_at: DateTime<Utc>,
        error: String,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .outbox_items
                .mark_retrying(id, retries, next_attempt_at, &error, now)
                .await
        })
    }

    fn mark_dead(
        &self,
        id: ItemId,
        retries: i32,
        error: String,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.mark_dead(id, retries, &error, now).await })
    }

    fn cancel_item(
        &self,
        id: ItemId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.cancel(id, now).await })
    }

    fn count_by_status(
        &self,
        status: ItemStatus,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.outbox_items.count_by_status(status).await })
    }

    fn find_template(
        &self,
        id: TemplateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<MessageTemplate>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.templates.find_by_id(id).await })
    }

    fn find_quote(
        &self,
        id: QuoteId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Quote>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.quotes.find_by_id(id).await })
    }

    fn record_quote_sent(
        &self,
        id: QuoteId,
        status: QuoteStatus,
        price_snapshot_cents: i64,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .quotes
                .record_sent(id, status, price_snapshot_cents, now)
                .await
        })
    }

    fn record_evaluation_delivery(
        &self,
        id: EvaluationId,
        delivered: bool,
        provider_message_id: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .evaluations
                .record_delivery(id, delivered, provider_message_id.as_deref(), error.as_deref(), now)
                .await
        })
    }

    fn mark_scheduled_send_sent(
        &self,
        id: ScheduledSendId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.scheduled_sends.mark_sent(id, now).await })
    }

    fn mark_scheduled_send_failed(
        &self,
        id: ScheduledSendId,
        error: String,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.scheduled_sends.mark_failed(id, &error, now).await })
    }
}

pub mod mock {
    //! In-memory store for tests.
    //!
    //! Mirrors the Postgres behavior closely enough for worker and enqueue
    //! logic: the claim is a real compare-and-swap under a write lock, the
    //! idempotency lookup is exact, and due-item ordering matches the SQL
    //! `scheduled_at ASC NULLS FIRST, created_at ASC`.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use chrono::{DateTime, Utc};
    use tokio::sync::RwLock;
    use zelo_core::{
        error::{CoreError, Result},
        models::{
            Evaluation, EvaluationId, ItemId, ItemStatus, MessageTemplate, OutboxItem, Quote,
            QuoteId, QuoteStatus, ScheduledSend, ScheduledSendId, ScheduledSendStatus, TemplateId,
        },
    };

    use super::OutboxStore;

    /// In-memory store with the same observable behavior as Postgres.
    #[derive(Debug, Default)]
    pub struct MockOutboxStore {
        items: Arc<RwLock<HashMap<ItemId, OutboxItem>>>,
        templates: Arc<RwLock<HashMap<TemplateId, MessageTemplate>>>,
        quotes: Arc<RwLock<HashMap<QuoteId, Quote>>>,
        evaluations: Arc<RwLock<HashMap<EvaluationId, Evaluation>>>,
        scheduled_sends: Arc<RwLock<HashMap<ScheduledSendId, ScheduledSend>>>,
    }

    impl MockOutboxStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a template.
        pub async fn insert_template(&self, template: MessageTemplate) {
            self.templates.write().await.insert(template.id, template);
        }

        /// Seeds a quote.
        pub async fn insert_quote(&self, quote: Quote) {
            self.quotes.write().await.insert(quote.id, quote);
        }

        /// Seeds an evaluation.
        pub async fn insert_evaluation(&self, evaluation: Evaluation) {
            self.evaluations.write().await.insert(evaluation.id, evaluation);
        }

        /// Seeds a scheduled send.
        pub async fn insert_scheduled_send(&self, send: ScheduledSend) {
            self.scheduled_sends.write().await.insert(send.id, send);
        }

        /// Seeds an item directly, bypassing the enqueue service.
        pub async fn insert_item(&self, item: OutboxItem) {
            self.items.write().await.insert(item.id, item);
        }

        /// Reads an evaluation back for verification.
        pub async fn evaluation(&self, id: EvaluationId) -> Option<Evaluation> {
            self.evaluations.read().await.get(&id).cloned()
        }

        /// Reads a scheduled send back for verification.
        pub async fn scheduled_send(&self, id: ScheduledSendId) -> Option<ScheduledSend> {
            self.scheduled_sends.read().await.get(&id).cloned()
        }

        /// Reads a quote back for verification.
        pub async fn quote(&self, id: QuoteId) -> Option<Quote> {
            self.quotes.read().await.get(&id).cloned()
        }

        /// Number of stored items across all statuses.
        pub async fn item_count(&self) -> usize {
            self.items.read().await.len()
        }
    }

    impl OutboxStore for MockOutboxStore {
        fn create_item(
            &self,
            item: OutboxItem,
        ) -> Pin<Box<dyn Future<Output = Result<ItemId>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let mut items = items.write().await;
                if items
                    .values()
                    .any(|existing| existing.idempotency_key == item.idempotency_key)
                {
                    return Err(CoreError::ConstraintViolation(format!(
                        "duplicate idempotency key: {}",
                        item.idempotency_key
                    )));
                }
                let id = item.id;
                items.insert(id, item);
                Ok(id)
            })
        }

        fn find_item(
            &self,
            id: ItemId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<OutboxItem>>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move { Ok(items.read().await.get(&id).cloned()) })
        }

        fn find_by_idempotency_key(
            &self,
            key: String,
        ) -> Pin<Box<dyn Future<Output = Result<Option<OutboxItem>>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                Ok(items
                    .read()
                    .await
                    .values()
                    .find(|item| item.idempotency_key == key)
                    .cloned())
            })
        }

        fn find_due(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<OutboxItem>>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let mut due: Vec<OutboxItem> = items
                    .read()
                    .await
                    .values()
                    .filter(|item| item.is_due(now))
                    .cloned()
                    .collect();
                // None sorts as immediately due, i.e. before every schedule.
                due.sort_by_key(|item| {
                    (
                        item.scheduled_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
                        item.created_at,
                    )
                });
                due.truncate(limit);
                Ok(due)
            })
        }

        fn claim(
            &self,
            id: ItemId,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let mut items = items.write().await;
                match items.get_mut(&id) {
                    Some(item) if item.status.is_claimable() => {
                        item.status = ItemStatus::Sending;
                        item.last_attempt_at = Some(now);
                        item.updated_at = now;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
        }

        fn mark_sent(
            &self,
            id: ItemId,
            provider_message_id: Option<String>,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let mut items = items.write().await;
                let item = items.get_mut(&id).ok_or(CoreError::NotFound)?;
                item.status = ItemStatus::Sent;
                item.provider_message_id = provider_message_id;
                item.sent_at = Some(now);
                item.error = None;
                item.updated_at = now;
                Ok(())
            })
        }

        fn mark_retrying(
            &self,
            id: ItemId,
            retries: i32,
            next_attempt_at: DateTime<Utc>,
            error: String,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let mut items = items.write().await;
                let item = items.get_mut(&id).ok_or(CoreError::NotFound)?;
                item.status = ItemStatus::Retrying;
                item.retries = retries;
                item.scheduled_at = Some(next_attempt_at);
                item.error = Some(error);
                item.updated_at = now;
                Ok(())
            })
        }

        fn mark_dead(
            &self,
            id: ItemId,
            retries: i32,
            error: String,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let mut items = items.write().await;
                let item = items.get_mut(&id).ok_or(CoreError::NotFound)?;
                item.status = ItemStatus::Dead;
                item.retries = retries;
                item.scheduled_at = None;
                item.error = Some(error);
                item.updated_at = now;
                Ok(())
            })
        }

        fn cancel_item(
            &self,
            id: ItemId,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let mut items = items.write().await;
                match items.get_mut(&id) {
                    Some(item) if item.status.is_claimable() => {
                        item.status = ItemStatus::Canceled;
                        item.updated_at = now;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
        }

        fn count_by_status(
            &self,
            status: ItemStatus,
        ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
            let items = self.items.clone();
            Box::pin(async move {
                let count = items
                    .read()
                    .await
                    .values()
                    .filter(|item| item.status == status)
                    .count();
                Ok(i64::try_from(count).unwrap_or(i64::MAX))
            })
        }

        fn find_template(
            &self,
            id: TemplateId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<MessageTemplate>>> + Send + '_>> {
            let templates = self.templates.clone();
            Box::pin(async move { Ok(templates.read().await.get(&id).cloned()) })
        }

        fn find_quote(
            &self,
            id: QuoteId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Quote>>> + Send + '_>> {
            let quotes = self.quotes.clone();
            Box::pin(async move { Ok(quotes.read().await.get(&id).cloned()) })
        }

        fn record_quote_sent(
            &self,
            id: QuoteId,
            status: QuoteStatus,
            price_snapshot_cents: i64,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let quotes = self.quotes.clone();
            Box::pin(async move {
                let mut quotes = quotes.write().await;
                let quote = quotes.get_mut(&id).ok_or(CoreError::NotFound)?;
                quote.status = status;
                quote.price_snapshot_cents = Some(price_snapshot_cents);
                quote.updated_at = now;
                Ok(())
            })
        }

        fn record_evaluation_delivery(
            &self,
            id: EvaluationId,
            delivered: bool,
            provider_message_id: Option<String>,
            error: Option<String>,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let evaluations = self.evaluations.clone();
            Box::pin(async move {
                let mut evaluations = evaluations.write().await;
                let evaluation = evaluations.get_mut(&id).ok_or(CoreError::NotFound)?;
                evaluation.delivered = delivered;
                if delivered {
                    evaluation.delivered_at = Some(now);
                }
                if provider_message_id.is_some() {
                    evaluation.provider_message_id = provider_message_id;
                }
                evaluation.delivery_error = error;
                evaluation.send_attempts += 1;
                evaluation.updated_at = now;
                Ok(())
            })
        }

        fn mark_scheduled_send_sent(
            &self,
            id: ScheduledSendId,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let scheduled_sends = self.scheduled_sends.clone();
            Box::pin(async move {
                let mut sends = scheduled_sends.write().await;
                let send = sends.get_mut(&id).ok_or(CoreError::NotFound)?;
                send.status = ScheduledSendStatus::Sent;
                send.sent_at = Some(now);
                send.error = None;
                send.updated_at = now;
                Ok(())
            })
        }

        fn mark_scheduled_send_failed(
            &self,
            id: ScheduledSendId,
            error: String,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let scheduled_sends = self.scheduled_sends.clone();
            Box::pin(async move {
                let mut sends = scheduled_sends.write().await;
                let send = sends.get_mut(&id).ok_or(CoreError::NotFound)?;
                send.status = ScheduledSendStatus::Failed;
                send.error = Some(error);
                send.updated_at = now;
                Ok(())
            })
        }
    }

}
