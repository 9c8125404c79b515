//! Test environment, fixtures and stubs for the Zelo message outbox.
//!
//! [`TestEnv`] wires the enqueue service and delivery worker against
//! in-memory storage, a scripted chat bridge, a static document renderer
//! and a deterministic clock, so integration tests drive the whole pipeline
//! without Postgres or the network. Tests that do want real SQL use
//! [`TestDatabase`] behind `DATABASE_URL`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{sync::Arc, time::Duration};

use zelo_core::{
    models::{ItemId, ItemStatus, OutboxItem},
    MulticastEventHandler, TestClock,
};
use zelo_outbox::{
    BrazilPhoneNormalizer, DeliveryExecutor, EvaluationSync, InMemoryLeaseStore, MockOutboxStore,
    NotifyHandle, OutboxService, OutboxStore, OutboxWorker, PassOptions, PassReport,
    ScheduledSendSync, WorkerConfig,
};

pub mod database;
pub mod fixtures;
pub mod stubs;

pub use database::TestDatabase;
pub use fixtures::{ItemBuilder, QuoteBuilder, TemplateBuilder};
pub use stubs::{FailingNotifier, ScriptedBridge, StaticRenderer};

/// Fully wired in-memory outbox for integration tests.
pub struct TestEnv {
    /// Shared in-memory store behind both service and worker.
    pub store: Arc<MockOutboxStore>,
    /// Scripted chat bridge.
    pub bridge: Arc<ScriptedBridge>,
    /// In-memory worker lease.
    pub lease: Arc<InMemoryLeaseStore>,
    /// Deterministic clock driving schedules and backoff.
    pub clock: TestClock,
    /// Wake handle shared by the service's notifier and the runner.
    pub wake: NotifyHandle,
    service: OutboxService,
    worker: OutboxWorker,
}

impl TestEnv {
    /// Builds the environment with default worker configuration.
    pub fn new() -> Self {
        Self::with_config(WorkerConfig::default())
    }

    /// Builds the environment with explicit worker configuration.
    pub fn with_config(config: WorkerConfig) -> Self {
        let store = Arc::new(MockOutboxStore::new());
        let bridge = Arc::new(ScriptedBridge::new());
        let lease = Arc::new(InMemoryLeaseStore::new());
        let clock = TestClock::new();
        let wake = NotifyHandle::new();

        let service = OutboxService::new(
            store.clone(),
            Arc::new(BrazilPhoneNormalizer),
            Arc::new(wake.clone()),
            Arc::new(clock.clone()),
        );

        let executor = DeliveryExecutor::new(
            bridge.clone(),
            Arc::new(StaticRenderer::new()),
            store.clone(),
            Arc::new(clock.clone()),
        );

        // Same subscriber order as production wiring.
        let mut events = MulticastEventHandler::new();
        events.add_subscriber(Arc::new(EvaluationSync::new(
            store.clone(),
            Arc::new(clock.clone()),
        )));
        events.add_subscriber(Arc::new(ScheduledSendSync::new(
            store.clone(),
            Arc::new(clock.clone()),
        )));

        let worker = OutboxWorker::new(
            store.clone(),
            lease.clone(),
            executor,
            Arc::new(events),
            Arc::new(clock.clone()),
            config,
        );

        Self {
            store,
            bridge,
            lease,
            clock,
            wake,
            service,
            worker,
        }
    }

    /// The enqueue service.
    pub fn service(&self) -> &OutboxService {
        &self.service
    }

    /// The delivery worker.
    pub fn worker(&self) -> &OutboxWorker {
        &self.worker
    }

    /// Runs one worker pass with default options.
    pub async fn run_pass(&self) -> PassReport {
        self.worker
            .process_once(PassOptions::default())
            .await
            .expect("worker pass")
    }

    /// Advances the test clock.
    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Reads an item back, panicking when it does not exist.
    pub async fn item(&self, id: ItemId) -> OutboxItem {
        self.store
            .find_item(id)
            .await
            .expect("store read")
            .expect("item exists")
    }

    /// Current status of an item.
    pub async fn item_status(&self, id: ItemId) -> ItemStatus {
        self.item(id).await.status
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
