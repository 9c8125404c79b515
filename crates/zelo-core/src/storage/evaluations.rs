//! Repository for service evaluations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Evaluation, EvaluationId},
};

/// Data access for the `evaluations` table.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a repository over the shared pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts an evaluation and returns its id.
    pub async fn create(&self, evaluation: &Evaluation) -> Result<EvaluationId> {
        let id = sqlx::query_scalar::<_, EvaluationId>(
            r#"
            INSERT INTO evaluations (
                id, delivered, delivered_at, provider_message_id,
                delivery_error, send_attempts, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(evaluation.id)
        .bind(evaluation.delivered)
        .bind(evaluation.delivered_at)
        .bind(&evaluation.provider_message_id)
        .bind(&evaluation.delivery_error)
        .bind(evaluation.send_attempts)
        .bind(evaluation.created_at)
        .bind(evaluation.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    /// Looks up an evaluation by id.
    pub async fn find_by_id(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        let evaluation = sqlx::query_as::<_, Evaluation>(
            r#"
            SELECT id, delivered, delivered_at, provider_message_id,
                   delivery_error, send_attempts, created_at, updated_at
            FROM evaluations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(evaluation)
    }

    /// Records the outcome of a delivery attempt against this evaluation.
    ///
    /// `delivered_at` is only stamped on success; the attempt counter moves
    /// either way.
    pub async fn record_delivery(
        &self,
        id: EvaluationId,
        delivered: bool,
        provider_message_id: Option<&str>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE evaluations
            SET delivered = $2,
                delivered_at = CASE WHEN $2 THEN $5 ELSE delivered_at END,
                provider_message_id = COALESCE($3, provider_message_id),
                delivery_error = $4,
                send_attempts = send_attempts + 1,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delivered)
        .bind(provider_message_id)
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
