//! Core domain types and storage for the Zelo message outbox.
//!
//! This crate defines the outbox item model and its lifecycle, the message
//! payload schema shared with the rest of the platform, the delivery event
//! types consumed by side-effect subscribers, and the Postgres repositories
//! behind all of it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod payload;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{
    EventHandler, MessageDead, MessageRetrying, MessageSent, MulticastEventHandler,
    NoOpEventHandler, OutboxEvent,
};
pub use models::{
    Evaluation, EvaluationId, ItemId, ItemStatus, MessageTemplate, OutboxItem, Quote, QuoteId,
    QuoteStatus, ScheduledSend, ScheduledSendId, ScheduledSendStatus, TemplateId, WorkerLock,
};
pub use payload::{
    Channel, MessageContext, MessageIntent, MessagePayload, PayloadError, MIN_IDENTITY_KEY_LEN,
};
pub use storage::{schema::ensure_schema, Storage};
pub use time::{Clock, RealClock, TestClock};
