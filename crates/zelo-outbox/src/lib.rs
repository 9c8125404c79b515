//! Enqueue service and delivery worker for the Zelo message outbox.
//!
//! Messages enter through [`OutboxService`], which validates the
//! destination and payload, deduplicates on the idempotency key, and
//! persists a durable item. The [`OutboxWorker`] drains due items under a
//! database lease, hands each one to the [`DeliveryExecutor`], applies the
//! resulting state transition, and publishes the outcome to event
//! subscribers such as [`EvaluationSync`] and [`ScheduledSendSync`].
//!
//! External collaborators (the chat bridge and the document renderer) sit
//! behind traits so the whole pipeline runs against in-memory stand-ins in
//! tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod bridge;
pub mod enqueue;
pub mod error;
pub mod executor;
pub mod lease;
pub mod notify;
pub mod phone;
pub mod render;
pub mod runner;
pub mod store;
pub mod sync;
pub mod worker;

pub use backoff::{RetrySchedule, CIRCUIT_OPEN_DELAY_SECS, DEFAULT_MAX_RETRIES};
pub use bridge::{BridgeConfig, BridgeResponse, ChatBridge, HttpChatBridge, OutboundMessage};
pub use enqueue::{derive_idempotency_key, EnqueueReceipt, OutboxService, SendOptions};
pub use error::{OutboxError, Result};
pub use executor::{DeliveryExecutor, DeliveryOutcome};
pub use lease::{InMemoryLeaseStore, LeaseStore, PgLeaseStore, WORKER_LOCK_RESOURCE};
pub use notify::{NoopNotifier, NotifyHandle, WorkerNotifier};
pub use phone::{BrazilPhoneNormalizer, Phone, PhoneError, PhoneNormalizer};
pub use render::{
    render_template, DocumentRenderer, HttpDocumentRenderer, RenderedDocument, RendererConfig,
};
pub use runner::{RunnerConfig, WorkerRunner};
pub use store::{mock::MockOutboxStore, OutboxStore, PostgresOutboxStore};
pub use sync::{EvaluationSync, ScheduledSendSync};
pub use worker::{OutboxWorker, PassOptions, PassReport, WorkerConfig};
