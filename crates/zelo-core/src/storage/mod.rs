//! Postgres storage layer.
//!
//! One repository per table, aggregated behind [`Storage`]. Repositories
//! expose plain async methods over the shared pool; each statement is its
//! own transaction, and cross-row races are settled by conditional
//! UPDATEs rather than explicit locking.

use std::sync::Arc;

use sqlx::PgPool;

use crate::error::Result;

pub mod evaluations;
pub mod outbox_items;
pub mod quotes;
pub mod schema;
pub mod scheduled_sends;
pub mod templates;
pub mod worker_locks;

/// Aggregated access to all repositories.
#[derive(Debug, Clone)]
pub struct Storage {
    /// Outbox item repository.
    pub outbox_items: Arc<outbox_items::Repository>,
    /// Worker lock repository.
    pub worker_locks: Arc<worker_locks::Repository>,
    /// Message template repository.
    pub templates: Arc<templates::Repository>,
    /// Quote repository.
    pub quotes: Arc<quotes::Repository>,
    /// Evaluation repository.
    pub evaluations: Arc<evaluations::Repository>,
    /// Scheduled send repository.
    pub scheduled_sends: Arc<scheduled_sends::Repository>,
    pool: Arc<PgPool>,
}

impl Storage {
    /// Creates the storage layer over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);
        Self {
            outbox_items: Arc::new(outbox_items::Repository::new(pool.clone())),
            worker_locks: Arc::new(worker_locks::Repository::new(pool.clone())),
            templates: Arc::new(templates::Repository::new(pool.clone())),
            quotes: Arc::new(quotes::Repository::new(pool.clone())),
            evaluations: Arc::new(evaluations::Repository::new(pool.clone())),
            scheduled_sends: Arc::new(scheduled_sends::Repository::new(pool.clone())),
            pool,
        }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Verifies database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }
}
