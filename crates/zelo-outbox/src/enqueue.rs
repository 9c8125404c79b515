//! Enqueue service.
//!
//! The single write path into the outbox: validates the destination and
//! payload, deduplicates on the idempotency key, persists the item, and
//! nudges the worker. Persistence is the acceptance point; everything after
//! the insert is best effort.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use zelo_core::{
    models::{ItemId, ItemStatus, OutboxItem},
    payload::{Channel, MessageContext, MessageIntent, MessagePayload},
    time::Clock,
};

use crate::{
    error::{OutboxError, Result},
    notify::WorkerNotifier,
    phone::{PhoneError, PhoneNormalizer},
    store::OutboxStore,
};

/// Derives a fresh idempotency key for callers that supplied none.
///
/// Derived keys are deliberately random per call: only caller-supplied keys
/// deduplicate across calls.
pub fn derive_idempotency_key(intent: &MessageIntent) -> String {
    format!("zelo:{}:{}", intent.name(), Uuid::new_v4())
}

fn derive_internal_message_id() -> String {
    format!("msg-{}", Uuid::new_v4().simple())
}

/// Optional knobs for one enqueue call.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Caller-supplied deduplication key. Absent keys are derived fresh,
    /// making the call non-deduplicating.
    pub idempotency_key: Option<String>,
    /// Caller-supplied platform message identifier.
    pub internal_message_id: Option<String>,
    /// Earliest delivery time. Absent means due immediately.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Platform records to update once delivery settles.
    pub context: Option<MessageContext>,
    /// Free-form caller data stored with the payload.
    pub metadata: Option<serde_json::Value>,
}

/// What the caller gets back from an accepted enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueReceipt {
    /// Identifier of the stored item.
    pub item_id: ItemId,
    /// Key the item is deduplicated under.
    pub idempotency_key: String,
    /// Platform message identifier.
    pub internal_message_id: String,
    /// Status at return time.
    pub status: ItemStatus,
    /// Normalized destination the message will go to.
    pub phone: String,
    /// True when an earlier item already held the key and no new row was
    /// written.
    pub duplicated: bool,
}

/// Accepts messages into the outbox.
pub struct OutboxService {
    store: Arc<dyn OutboxStore>,
    phones: Arc<dyn PhoneNormalizer>,
    notifier: Arc<dyn WorkerNotifier>,
    clock: Arc<dyn Clock>,
}

impl OutboxService {
    /// Wires the service from its collaborators.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        phones: Arc<dyn PhoneNormalizer>,
        notifier: Arc<dyn WorkerNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            phones,
            notifier,
            clock,
        }
    }

    /// Enqueues a plain text message.
    pub async fn send_text(
        &self,
        phone: &str,
        text: impl Into<String>,
        options: SendOptions,
    ) -> Result<EnqueueReceipt> {
        self.enqueue(phone, MessageIntent::SendText { text: text.into() }, options)
            .await
    }

    /// Enqueues a templated text message.
    pub async fn send_template(
        &self,
        phone: &str,
        template_id: Option<zelo_core::models::TemplateId>,
        template_content: Option<String>,
        variables: std::collections::HashMap<String, String>,
        options: SendOptions,
    ) -> Result<EnqueueReceipt> {
        self.enqueue(
            phone,
            MessageIntent::SendTemplate {
                template_id,
                template_content,
                variables,
            },
            options,
        )
        .await
    }

    /// Enqueues a document attachment.
    pub async fn send_document(
        &self,
        phone: &str,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        caption: impl Into<String>,
        content_base64: impl Into<String>,
        options: SendOptions,
    ) -> Result<EnqueueReceipt> {
        self.enqueue(
            phone,
            MessageIntent::SendDocument {
                file_name: file_name.into(),
                mime_type: mime_type.into(),
                caption: caption.into(),
                content: content_base64.into(),
            },
            options,
        )
        .await
    }

    /// Enqueues the proposal document for a quote.
    pub async fn send_proposta(
        &self,
        phone: &str,
        quote_id: zelo_core::models::QuoteId,
        options: SendOptions,
    ) -> Result<EnqueueReceipt> {
        self.enqueue(phone, MessageIntent::SendProposta { quote_id }, options)
            .await
    }

    /// Enqueues the contract document for a quote.
    pub async fn send_contrato(
        &self,
        phone: &str,
        quote_id: zelo_core::models::QuoteId,
        options: SendOptions,
    ) -> Result<EnqueueReceipt> {
        self.enqueue(phone, MessageIntent::SendContrato { quote_id }, options)
            .await
    }

    /// Accepts one message into the outbox.
    ///
    /// Validation failures reject the call before anything is written. A
    /// key already present in the outbox short-circuits to the existing
    /// item regardless of its status, including terminal ones.
    pub async fn enqueue(
        &self,
        phone: &str,
        intent: MessageIntent,
        options: SendOptions,
    ) -> Result<EnqueueReceipt> {
        let normalized = self.phones.normalize(phone).map_err(|e| match e {
            PhoneError::Malformed { reason } => OutboxError::invalid_phone(phone, reason),
            PhoneError::NotMobile => {
                OutboxError::invalid_phone(phone, "not a mobile number".to_string())
            }
        })?;

        let idempotency_key = options
            .idempotency_key
            .unwrap_or_else(|| derive_idempotency_key(&intent));
        let internal_message_id = options
            .internal_message_id
            .unwrap_or_else(derive_internal_message_id);
        let now = self.clock.now();

        let payload = MessagePayload {
            channel: Channel::Whatsapp,
            idempotency_key: idempotency_key.clone(),
            internal_message_id: internal_message_id.clone(),
            created_at: now,
            context: options.context,
            metadata: options.metadata,
            intent,
        };
        payload.validate()?;

        if let Some(existing) = self
            .store
            .find_by_idempotency_key(idempotency_key.clone())
            .await?
        {
            debug!(
                item_id = %existing.id,
                idempotency_key = %idempotency_key,
                status = %existing.status,
                "duplicate enqueue resolved to existing item"
            );
            return Ok(receipt_for(&existing, true));
        }

        let item = OutboxItem::new(
            normalized.into_string(),
            payload.to_value()?,
            idempotency_key.clone(),
            internal_message_id,
            options.scheduled_at,
            now,
        );

        let item_id = match self.store.create_item(item.clone()).await {
            Ok(id) => id,
            // A concurrent enqueue with the same key won the insert race.
            Err(e) if e.is_constraint_violation() => {
                let existing = self
                    .store
                    .find_by_idempotency_key(idempotency_key.clone())
                    .await?
                    .ok_or_else(|| {
                        OutboxError::internal(format!(
                            "idempotency key vanished after conflict: {idempotency_key}"
                        ))
                    })?;
                debug!(
                    item_id = %existing.id,
                    idempotency_key = %idempotency_key,
                    "lost enqueue race, returning winner"
                );
                return Ok(receipt_for(&existing, true));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            item_id = %item_id,
            phone = %item.phone,
            intent = payload.intent.name(),
            scheduled_at = ?item.scheduled_at,
            "message enqueued"
        );

        // The item is durable; a failed nudge only delays pickup until the
        // next poll tick.
        if let Err(e) = self.notifier.nudge().await {
            debug!(error = %e, "worker nudge failed");
        }

        Ok(EnqueueReceipt {
            item_id,
            idempotency_key: item.idempotency_key,
            internal_message_id: item.internal_message_id,
            status: item.status,
            phone: item.phone,
            duplicated: false,
        })
    }

    /// Withdraws a not-yet-delivered item.
    ///
    /// Returns the status after the call. Cancellation only wins against
    /// items the worker has not claimed; anything else is left untouched.
    pub async fn cancel(&self, item_id: ItemId) -> Result<ItemStatus> {
        let now = self.clock.now();
        let canceled = self.store.cancel_item(item_id, now).await?;
        let item = self
            .store
            .find_item(item_id)
            .await?
            .ok_or(OutboxError::Storage(zelo_core::error::CoreError::NotFound))?;
        if canceled {
            info!(item_id = %item_id, "outbox item canceled");
        } else {
            debug!(item_id = %item_id, status = %item.status, "cancel lost to item state");
        }
        Ok(item.status)
    }

    /// Looks up an item by id.
    pub async fn find_item(&self, item_id: ItemId) -> Result<Option<OutboxItem>> {
        Ok(self.store.find_item(item_id).await?)
    }

    /// Counts items currently in a status.
    pub async fn count_by_status(&self, status: ItemStatus) -> Result<i64> {
        Ok(self.store.count_by_status(status).await?)
    }
}

fn receipt_for(item: &OutboxItem, duplicated: bool) -> EnqueueReceipt {
    EnqueueReceipt {
        item_id: item.id,
        idempotency_key: item.idempotency_key.clone(),
        internal_message_id: item.internal_message_id.clone(),
        status: item.status,
        phone: item.phone.clone(),
        duplicated,
    }
}
