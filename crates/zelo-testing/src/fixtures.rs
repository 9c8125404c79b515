//! Builders for platform records used in outbox tests.

use chrono::{DateTime, Utc};
use zelo_core::models::{
    Evaluation, EvaluationId, MessageTemplate, OutboxItem, Quote, QuoteId, QuoteStatus,
    ScheduledSend, ScheduledSendId, ScheduledSendStatus, TemplateId,
};
use zelo_core::payload::{Channel, MessageContext, MessageIntent, MessagePayload};

/// Builder for outbox items seeded directly into a store.
pub struct ItemBuilder {
    phone: String,
    intent: MessageIntent,
    idempotency_key: String,
    internal_message_id: String,
    scheduled_at: Option<DateTime<Utc>>,
    context: Option<MessageContext>,
    retries: i32,
    created_at: DateTime<Utc>,
}

impl ItemBuilder {
    /// Creates a builder for a plain text item with sensible defaults.
    pub fn text(text: impl Into<String>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            phone: "+5511999998888".to_string(),
            intent: MessageIntent::SendText { text: text.into() },
            idempotency_key: format!("test-key-{suffix}"),
            internal_message_id: format!("msg-{suffix}"),
            scheduled_at: None,
            context: None,
            retries: 0,
            created_at: Utc::now(),
        }
    }

    /// Creates a builder for an arbitrary intent.
    pub fn intent(intent: MessageIntent) -> Self {
        let mut builder = Self::text("");
        builder.intent = intent;
        builder
    }

    /// Sets the destination number.
    #[must_use]
    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    /// Defers the item to the given instant.
    #[must_use]
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Links the message to platform records.
    #[must_use]
    pub fn context(mut self, context: MessageContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Pre-loads the retry counter, as if earlier attempts already failed.
    #[must_use]
    pub fn retries(mut self, retries: i32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the enqueue time.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Builds the item.
    pub fn build(self) -> OutboxItem {
        let payload = MessagePayload {
            channel: Channel::Whatsapp,
            idempotency_key: self.idempotency_key.clone(),
            internal_message_id: self.internal_message_id.clone(),
            created_at: self.created_at,
            context: self.context,
            metadata: None,
            intent: self.intent,
        };
        let mut item = OutboxItem::new(
            self.phone,
            payload.to_value().expect("fixture payload serializes"),
            self.idempotency_key,
            self.internal_message_id,
            self.scheduled_at,
            self.created_at,
        );
        if self.retries > 0 {
            item.retries = self.retries;
            item.status = zelo_core::models::ItemStatus::Retrying;
        }
        item
    }
}

/// Builder for quotes.
pub struct QuoteBuilder {
    customer_name: String,
    phone: String,
    status: QuoteStatus,
    total_cents: i64,
}

impl QuoteBuilder {
    /// Creates a builder with sensible defaults.
    pub fn new() -> Self {
        Self {
            customer_name: "Maria Silva".to_string(),
            phone: "+5511999998888".to_string(),
            status: QuoteStatus::Pendente,
            total_cents: 189_900,
        }
    }

    /// Sets the customer name.
    #[must_use]
    pub fn customer(mut self, name: impl Into<String>) -> Self {
        self.customer_name = name.into();
        self
    }

    /// Sets the quoted value in centavos.
    #[must_use]
    pub fn total_cents(mut self, cents: i64) -> Self {
        self.total_cents = cents;
        self
    }

    /// Sets the quote status.
    #[must_use]
    pub fn status(mut self, status: QuoteStatus) -> Self {
        self.status = status;
        self
    }

    /// Builds the quote with a fresh id.
    pub fn build(self) -> Quote {
        let now = Utc::now();
        Quote {
            id: QuoteId::new(),
            customer_name: self.customer_name,
            phone: self.phone,
            status: self.status,
            total_cents: self.total_cents,
            price_snapshot_cents: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for QuoteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for message templates.
pub struct TemplateBuilder {
    name: String,
    content: String,
    active: bool,
}

impl TemplateBuilder {
    /// Creates a builder for an active template with the given body.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            name: "test-template".to_string(),
            content: content.into(),
            active: true,
        }
    }

    /// Sets the template name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Deactivates the template.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Builds the template with a fresh id.
    pub fn build(self) -> MessageTemplate {
        let now = Utc::now();
        MessageTemplate {
            id: TemplateId::new(),
            name: self.name,
            content: self.content,
            active: self.active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A fresh evaluation that has not been messaged yet.
pub fn evaluation() -> Evaluation {
    let now = Utc::now();
    Evaluation {
        id: EvaluationId::new(),
        delivered: false,
        delivered_at: None,
        provider_message_id: None,
        delivery_error: None,
        send_attempts: 0,
        created_at: now,
        updated_at: now,
    }
}

/// A scheduled send still waiting for its message to settle.
pub fn scheduled_send() -> ScheduledSend {
    let now = Utc::now();
    ScheduledSend {
        id: ScheduledSendId::new(),
        status: ScheduledSendStatus::Scheduled,
        sent_at: None,
        error: None,
        created_at: now,
        updated_at: now,
    }
}
