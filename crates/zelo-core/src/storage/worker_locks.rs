//! Repository for cooperative worker locks.
//!
//! A lock is one row keyed by resource name. Acquisition is a single
//! conditional upsert: the insert wins when no row exists, and the update
//! arm only fires when the existing lease expired or already belongs to
//! the caller. Everything else leaves the row untouched, which is how a
//! contender learns it lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::Result, models::WorkerLock};

/// Data access for the `worker_locks` table.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a repository over the shared pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Attempts to take or renew the lock in one round trip.
    ///
    /// Returns true when the caller now holds the lease until `expires_at`.
    pub async fn acquire(
        &self,
        resource: &str,
        owner: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO worker_locks (resource, owner, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (resource) DO UPDATE
            SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
            WHERE worker_locks.expires_at <= $4
               OR worker_locks.owner = EXCLUDED.owner
            "#,
        )
        .bind(resource)
        .bind(owner)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Releases the lock if the caller still owns it.
    ///
    /// Returns false when the lease had already changed hands, in which
    /// case nothing is deleted.
    pub async fn release(&self, resource: &str, owner: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM worker_locks WHERE resource = $1 AND owner = $2",
        )
        .bind(resource)
        .bind(owner)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns the current lock row, expired or not.
    pub async fn find(&self, resource: &str) -> Result<Option<WorkerLock>> {
        let lock = sqlx::query_as::<_, WorkerLock>(
            "SELECT resource, owner, expires_at FROM worker_locks WHERE resource = $1",
        )
        .bind(resource)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = PgPool::connect_lazy("postgresql://test").unwrap();
        let _repository = Repository::new(Arc::new(pool));
    }
}
