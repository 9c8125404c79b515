//! Repository for scheduled sends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{ScheduledSend, ScheduledSendId},
};

/// Data access for the `scheduled_sends` table.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a repository over the shared pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a scheduled send and returns its id.
    pub async fn create(&self, send: &ScheduledSend) -> Result<ScheduledSendId> {
        let id = sqlx::query_scalar::<_, ScheduledSendId>(
            r#"
            INSERT INTO scheduled_sends (id, status, sent_at, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(send.id)
        .bind(send.status.to_string())
        .bind(send.sent_at)
        .bind(&send.error)
        .bind(send.created_at)
        .bind(send.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    /// Looks up a scheduled send by id.
    pub async fn find_by_id(&self, id: ScheduledSendId) -> Result<Option<ScheduledSend>> {
        let send = sqlx::query_as::<_, ScheduledSend>(
            r#"
            SELECT id, status, sent_at, error, created_at, updated_at
            FROM scheduled_sends
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(send)
    }

    /// Settles the scheduled send after its message was delivered.
    pub async fn mark_sent(&self, id: ScheduledSendId, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_sends
            SET status = 'sent', sent_at = $2, error = NULL, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    /// Settles the scheduled send after its message was dead-lettered.
    pub async fn mark_failed(
        &self,
        id: ScheduledSendId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_sends
            SET status = 'failed', error = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
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
