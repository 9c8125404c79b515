//! Domain models for the message outbox.
//!
//! Defines the outbox item and its lifecycle states, the cooperative worker
//! lock row, and the platform entities the outbox reads and updates while
//! delivering messages (templates, quotes, evaluations, scheduled sends).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Aliases for the sqlx Postgres types used by the manual trait
// implementations below.
type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Unique identifier for an outbox item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ItemId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for ItemId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ItemId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl<'q> sqlx::Encode<'q, PgDb> for ItemId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Unique identifier for a stored message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub Uuid);

impl TemplateId {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TemplateId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for TemplateId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for TemplateId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl<'q> sqlx::Encode<'q, PgDb> for TemplateId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Unique identifier for a care quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub Uuid);

impl QuoteId {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for QuoteId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for QuoteId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for QuoteId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl<'q> sqlx::Encode<'q, PgDb> for QuoteId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Unique identifier for a service evaluation awaiting a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationId(pub Uuid);

impl EvaluationId {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EvaluationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for EvaluationId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EvaluationId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl<'q> sqlx::Encode<'q, PgDb> for EvaluationId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Unique identifier for a scheduled send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledSendId(pub Uuid);

impl ScheduledSendId {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScheduledSendId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScheduledSendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ScheduledSendId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for ScheduledSendId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ScheduledSendId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl<'q> sqlx::Encode<'q, PgDb> for ScheduledSendId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Lifecycle status of an outbox item.
///
/// Items enter as `pending`, are claimed into `sending` by the worker, and
/// end in one of the terminal states `sent`, `dead` or `canceled`. A failed
/// attempt that still has retry budget moves the item to `retrying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Queued and waiting for the first delivery attempt.
    Pending,
    /// Claimed by a worker, delivery in flight.
    Sending,
    /// Delivered to the chat bridge.
    Sent,
    /// Failed but scheduled for another attempt.
    Retrying,
    /// Permanently failed, no further attempts.
    Dead,
    /// Withdrawn by the caller before delivery.
    Canceled,
}

impl ItemStatus {
    /// Returns true for states the worker will never touch again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Dead | Self::Canceled)
    }

    /// Returns true for states the worker may claim for delivery.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retrying)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Retrying => "retrying",
            Self::Dead => "dead",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl sqlx::Type<PgDb> for ItemStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ItemStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "retrying" => Ok(Self::Retrying),
            "dead" => Ok(Self::Dead),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("invalid item status: {s}").into()),
        }
    }
}

/// Lifecycle status of a care quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    /// Open quote, nothing sent yet.
    Pendente,
    /// Proposal document was delivered to the customer.
    PropostaEnviada,
    /// Contract document was delivered to the customer.
    ContratoEnviado,
    /// Customer accepted the quote.
    Aceito,
    /// Customer declined the quote.
    Recusado,
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pendente => "pendente",
            Self::PropostaEnviada => "proposta_enviada",
            Self::ContratoEnviado => "contrato_enviado",
            Self::Aceito => "aceito",
            Self::Recusado => "recusado",
        };
        write!(f, "{s}")
    }
}

impl sqlx::Type<PgDb> for QuoteStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for QuoteStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pendente" => Ok(Self::Pendente),
            "proposta_enviada" => Ok(Self::PropostaEnviada),
            "contrato_enviado" => Ok(Self::ContratoEnviado),
            "aceito" => Ok(Self::Aceito),
            "recusado" => Ok(Self::Recusado),
            _ => Err(format!("invalid quote status: {s}").into()),
        }
    }
}

/// Lifecycle status of a scheduled send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledSendStatus {
    /// Waiting for its outbox item to reach a terminal state.
    Scheduled,
    /// The associated message was delivered.
    Sent,
    /// The associated message was dead-lettered.
    Failed,
}

impl fmt::Display for ScheduledSendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl sqlx::Type<PgDb> for ScheduledSendStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ScheduledSendStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid scheduled send status: {s}").into()),
        }
    }
}

/// A durable message waiting for (or finished with) delivery.
///
/// The payload column holds the serialized [`MessagePayload`] exactly as it
/// was accepted at enqueue time; the worker re-parses it on every attempt.
///
/// [`MessagePayload`]: crate::payload::MessagePayload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxItem {
    /// Unique item identifier.
    pub id: ItemId,
    /// Normalized E.164 destination number.
    pub phone: String,
    /// Serialized message payload.
    pub payload: serde_json::Value,
    /// Current lifecycle status.
    pub status: ItemStatus,
    /// Number of delivery attempts consumed so far.
    pub retries: i32,
    /// Earliest time the item may be attempted; `None` means due now.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Caller-supplied or derived deduplication key.
    pub idempotency_key: String,
    /// Platform-side message identifier.
    pub internal_message_id: String,
    /// Message identifier assigned by the chat provider on success.
    pub provider_message_id: Option<String>,
    /// Text of the most recent failure, if any.
    pub error: Option<String>,
    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the item was last modified.
    pub updated_at: DateTime<Utc>,
    /// When the most recent delivery attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the item was delivered.
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxItem {
    /// Creates a fresh pending item.
    pub fn new(
        phone: String,
        payload: serde_json::Value,
        idempotency_key: String,
        internal_message_id: String,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemId::new(),
            phone,
            payload,
            status: ItemStatus::Pending,
            retries: 0,
            scheduled_at,
            idempotency_key,
            internal_message_id,
            provider_message_id: None,
            error: None,
            created_at: now,
            updated_at: now,
            last_attempt_at: None,
            sent_at: None,
        }
    }

    /// Returns true when the item is claimable and its schedule has come due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.scheduled_at.is_none_or(|at| at <= now)
    }
}

/// Cooperative lock row guarding the outbox worker pass.
///
/// A single row per resource; ownership changes hands when the previous
/// lease expires or the same owner renews it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WorkerLock {
    /// Name of the guarded resource.
    pub resource: String,
    /// Random identity of the current holder.
    pub owner: Uuid,
    /// Instant the lease lapses on its own.
    pub expires_at: DateTime<Utc>,
}

impl WorkerLock {
    /// Returns true when the lease has lapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A reusable message template stored by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageTemplate {
    /// Unique template identifier.
    pub id: TemplateId,
    /// Human-readable template name.
    pub name: String,
    /// Template body with `{{variable}}` placeholders.
    pub content: String,
    /// Inactive templates are rejected at send time.
    pub active: bool,
    /// When the template was created.
    pub created_at: DateTime<Utc>,
    /// When the template was last modified.
    pub updated_at: DateTime<Utc>,
}

/// A care quote that proposta and contrato messages are generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quote {
    /// Unique quote identifier.
    pub id: QuoteId,
    /// Name of the customer the quote was prepared for.
    pub customer_name: String,
    /// Customer contact number.
    pub phone: String,
    /// Current quote status.
    pub status: QuoteStatus,
    /// Quoted monthly value in centavos.
    pub total_cents: i64,
    /// Value frozen at the moment a document was delivered.
    pub price_snapshot_cents: Option<i64>,
    /// When the quote was created.
    pub created_at: DateTime<Utc>,
    /// When the quote was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// Formats the quoted value as Brazilian currency, e.g. `R$ 1.899,00`.
    pub fn formatted_total(&self) -> String {
        format_brl_cents(self.total_cents)
    }
}

/// Formats a centavo amount as Brazilian currency.
pub fn format_brl_cents(cents: i64) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let reais = abs / 100;
    let centavos = abs % 100;

    let digits = reais.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}R$ {grouped},{centavos:02}")
}

/// A service evaluation whose delivery outcome is tracked by the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Evaluation {
    /// Unique evaluation identifier.
    pub id: EvaluationId,
    /// Whether the evaluation request reached the customer.
    pub delivered: bool,
    /// When delivery was confirmed.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Provider identifier of the delivered message.
    pub provider_message_id: Option<String>,
    /// Text of the delivery failure, if any.
    pub delivery_error: Option<String>,
    /// Number of delivery outcomes recorded against this evaluation.
    pub send_attempts: i32,
    /// When the evaluation was created.
    pub created_at: DateTime<Utc>,
    /// When the evaluation was last modified.
    pub updated_at: DateTime<Utc>,
}

/// A follow-up message scheduled by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledSend {
    /// Unique scheduled send identifier.
    pub id: ScheduledSendId,
    /// Current scheduled send status.
    pub status: ScheduledSendStatus,
    /// When the associated message was delivered.
    pub sent_at: Option<DateTime<Utc>>,
    /// Text of the delivery failure, if any.
    pub error: Option<String>,
    /// When the scheduled send was created.
    pub created_at: DateTime<Utc>,
    /// When the scheduled send was last modified.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(now: DateTime<Utc>) -> OutboxItem {
        OutboxItem::new(
            "+5511999998888".to_string(),
            serde_json::json!({"intent": "SEND_TEXT", "text": "oi"}),
            "key-12345678".to_string(),
            "msg-12345678".to_string(),
            None,
            now,
        )
    }

    #[test]
    fn new_item_starts_pending_with_zero_retries() {
        let now = Utc::now();
        let item = sample_item(now);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.retries, 0);
        assert_eq!(item.created_at, now);
        assert_eq!(item.updated_at, now);
        assert!(item.provider_message_id.is_none());
        assert!(item.error.is_none());
    }

    #[test]
    fn item_without_schedule_is_due_immediately() {
        let now = Utc::now();
        let item = sample_item(now);
        assert!(item.is_due(now));
    }

    #[test]
    fn future_schedule_defers_the_item() {
        let now = Utc::now();
        let mut item = sample_item(now);
        item.scheduled_at = Some(now + chrono::Duration::minutes(10));
        assert!(!item.is_due(now));
        assert!(item.is_due(now + chrono::Duration::minutes(10)));
    }

    #[test]
    fn terminal_items_are_never_due() {
        let now = Utc::now();
        for status in [ItemStatus::Sent, ItemStatus::Dead, ItemStatus::Canceled] {
            let mut item = sample_item(now);
            item.status = status;
            assert!(!item.is_due(now), "{status} should not be due");
        }
    }

    #[test]
    fn status_display_matches_wire_form() {
        assert_eq!(ItemStatus::Pending.to_string(), "pending");
        assert_eq!(ItemStatus::Sending.to_string(), "sending");
        assert_eq!(ItemStatus::Sent.to_string(), "sent");
        assert_eq!(ItemStatus::Retrying.to_string(), "retrying");
        assert_eq!(ItemStatus::Dead.to_string(), "dead");
        assert_eq!(ItemStatus::Canceled.to_string(), "canceled");
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&ItemStatus::Retrying).unwrap();
        assert_eq!(json, "\"retrying\"");
        let back: ItemStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(back, ItemStatus::Canceled);
    }

    #[test]
    fn claimable_and_terminal_are_disjoint() {
        let all = [
            ItemStatus::Pending,
            ItemStatus::Sending,
            ItemStatus::Sent,
            ItemStatus::Retrying,
            ItemStatus::Dead,
            ItemStatus::Canceled,
        ];
        for status in all {
            assert!(
                !(status.is_claimable() && status.is_terminal()),
                "{status} cannot be both claimable and terminal"
            );
        }
    }

    #[test]
    fn quote_status_display_matches_wire_form() {
        assert_eq!(QuoteStatus::PropostaEnviada.to_string(), "proposta_enviada");
        assert_eq!(QuoteStatus::ContratoEnviado.to_string(), "contrato_enviado");
        assert_eq!(QuoteStatus::Pendente.to_string(), "pendente");
    }

    #[test]
    fn worker_lock_expiry_is_inclusive() {
        let now = Utc::now();
        let lock = WorkerLock {
            resource: "outbox:worker".to_string(),
            owner: Uuid::new_v4(),
            expires_at: now,
        };
        assert!(lock.is_expired(now));
        assert!(!lock.is_expired(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn ids_round_trip_through_display() {
        let id = ItemId::new();
        let parsed: Uuid = id.to_string().parse().unwrap();
        assert_eq!(ItemId::from(parsed), id);
    }

    #[test]
    fn brl_formatting_handles_grouping() {
        assert_eq!(format_brl_cents(0), "R$ 0,00");
        assert_eq!(format_brl_cents(950), "R$ 9,50");
        assert_eq!(format_brl_cents(189_900), "R$ 1.899,00");
        assert_eq!(format_brl_cents(123_456_789), "R$ 1.234.567,89");
        assert_eq!(format_brl_cents(-250), "-R$ 2,50");
    }
}
