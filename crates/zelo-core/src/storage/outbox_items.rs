//! Repository for outbox items.
//!
//! Owns every state transition of the item lifecycle. The claim operation
//! is the concurrency gate: it only moves claimable rows to `sending`, so
//! two workers racing for the same item cannot both win.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{ItemId, ItemStatus, OutboxItem},
};

/// Data access for the `outbox_items` table.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a repository over the shared pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a new item and returns its id.
    pub async fn create(&self, item: &OutboxItem) -> Result<ItemId> {
        let id = sqlx::query_scalar::<_, ItemId>(
            r#"
            INSERT INTO outbox_items (
                id, phone, payload, status, retries, scheduled_at,
                idempotency_key, internal_message_id, provider_message_id,
                error, created_at, updated_at, last_attempt_at, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(item.id)
        .bind(&item.phone)
        .bind(&item.payload)
        .bind(item.status.to_string())
        .bind(item.retries)
        .bind(item.scheduled_at)
        .bind(&item.idempotency_key)
        .bind(&item.internal_message_id)
        .bind(&item.provider_message_id)
        .bind(&item.error)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.last_attempt_at)
        .bind(item.sent_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    /// Looks up a single item by id.
    pub async fn find_by_id(&self, id: ItemId) -> Result<Option<OutboxItem>> {
        let item = sqlx::query_as::<_, OutboxItem>(
            r#"
            SELECT id, phone, payload, status, retries, scheduled_at,
                   idempotency_key, internal_message_id, provider_message_id,
                   error, created_at, updated_at, last_attempt_at, sent_at
            FROM outbox_items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(item)
    }

    /// Looks up the item holding an idempotency key, regardless of status.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OutboxItem>> {
        let item = sqlx::query_as::<_, OutboxItem>(
            r#"
            SELECT id, phone, payload, status, retries, scheduled_at,
                   idempotency_key, internal_message_id, provider_message_id,
                   error, created_at, updated_at, last_attempt_at, sent_at
            FROM outbox_items
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(item)
    }

    /// Selects the batch of items due for delivery.
    ///
    /// Items with no schedule sort first, then by enqueue order. The rows
    /// are returned unclaimed; callers race through [`claim`](Self::claim)
    /// before touching any of them.
    pub async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxItem>> {
        let items = sqlx::query_as::<_, OutboxItem>(
            r#"
            SELECT id, phone, payload, status, retries, scheduled_at,
                   idempotency_key, internal_message_id, provider_message_id,
                   error, created_at, updated_at, last_attempt_at, sent_at
            FROM outbox_items
            WHERE status IN ('pending', 'retrying')
              AND (scheduled_at IS NULL OR scheduled_at <= $1)
            ORDER BY scheduled_at ASC NULLS FIRST, created_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(items)
    }

    /// Atomically moves a claimable item to `sending`.
    ///
    /// Returns false when the row was concurrently claimed, canceled or
    /// otherwise left the claimable states since selection.
    pub async fn claim(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_items
            SET status = 'sending', last_attempt_at = $2, updated_at = $2
            WHERE id = $1 AND status IN ('pending', 'retrying')
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records a successful delivery.
    pub async fn mark_sent(
        &self,
        id: ItemId,
        provider_message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_items
            SET status = 'sent', provider_message_id = $2, sent_at = $3,
                updated_at = $3, error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(crate::error::CoreError::NotFound);
        }
        Ok(())
    }

    /// Schedules another attempt after a failure.
    pub async fn mark_retrying(
        &self,
        id: ItemId,
        retries: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_items
            SET status = 'retrying', retries = $2, scheduled_at = $3,
                error = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(retries)
        .bind(next_attempt_at)
        .bind(error)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(crate::error::CoreError::NotFound);
        }
        Ok(())
    }

    /// Dead-letters an item.
    pub async fn mark_dead(
        &self,
        id: ItemId,
        retries: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_items
            SET status = 'dead', retries = $2, error = $3,
                scheduled_at = NULL, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(retries)
        .bind(error)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(crate::error::CoreError::NotFound);
        }
        Ok(())
    }

    /// Withdraws an item that has not been delivered yet.
    ///
    /// Returns false when the item was already claimed, finished or
    /// canceled.
    pub async fn cancel(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_items
            SET status = 'canceled', updated_at = $2
            WHERE id = $1 AND status IN ('pending', 'retrying')
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Counts items currently in the given status.
    pub async fn count_by_status(&self, status: ItemStatus) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM outbox_items WHERE status = $1",
        )
        .bind(status.to_string())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }
}
