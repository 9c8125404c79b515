//! Worker run loop.
//!
//! Wraps the worker's single pass in a loop that waits on three things:
//! the poll timer, an enqueue nudge, or shutdown. Pass errors are logged
//! and the loop keeps going; the queue is durable, so a broken pass only
//! delays delivery.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use zelo_core::time::Clock;

use crate::{
    notify::NotifyHandle,
    worker::{OutboxWorker, PassOptions},
};

/// Tuning for the run loop.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Interval between passes when no nudge arrives.
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Drives the worker until shutdown.
pub struct WorkerRunner {
    worker: Arc<OutboxWorker>,
    wake: NotifyHandle,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
    shutdown: CancellationToken,
}

impl WorkerRunner {
    /// Wires the runner. The `wake` handle is the same one handed to the
    /// enqueue service as its notifier.
    pub fn new(
        worker: Arc<OutboxWorker>,
        wake: NotifyHandle,
        clock: Arc<dyn Clock>,
        config: RunnerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            worker,
            wake,
            clock,
            config,
            shutdown,
        }
    }

    /// Runs passes until the shutdown token fires.
    ///
    /// An in-flight pass always completes before the loop exits, so items
    /// are never abandoned mid-transition.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            owner = %self.worker.owner(),
            "outbox worker started"
        );
        loop {
            match self.worker.process_once(PassOptions::default()).await {
                Ok(report) if report.picked > 0 || report.skipped_by_lock => {
                    debug!(?report, "pass complete");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "delivery pass failed"),
            }

            tokio::select! {
                () = self.clock.sleep(self.config.poll_interval) => {}
                () = self.wake.notified() => {
                    debug!("woken by enqueue nudge");
                }
                () = self.shutdown.cancelled() => {
                    info!("outbox worker stopping");
                    return;
                }
            }
        }
    }
}
