//! Repository for care quotes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Quote, QuoteId, QuoteStatus},
};

/// Data access for the `quotes` table.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a repository over the shared pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a quote and returns its id.
    pub async fn create(&self, quote: &Quote) -> Result<QuoteId> {
        let id = sqlx::query_scalar::<_, QuoteId>(
            r#"
            INSERT INTO quotes (
                id, customer_name, phone, status, total_cents,
                price_snapshot_cents, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(quote.id)
        .bind(&quote.customer_name)
        .bind(&quote.phone)
        .bind(quote.status.to_string())
        .bind(quote.total_cents)
        .bind(quote.price_snapshot_cents)
        .bind(quote.created_at)
        .bind(quote.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    /// Looks up a quote by id.
    pub async fn find_by_id(&self, id: QuoteId) -> Result<Option<Quote>> {
        let quote = sqlx::query_as::<_, Quote>(
            r#"
            SELECT id, customer_name, phone, status, total_cents,
                   price_snapshot_cents, created_at, updated_at
            FROM quotes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(quote)
    }

    /// Moves a quote to its post-delivery status and freezes the price the
    /// customer saw.
    pub async fn record_sent(
        &self,
        id: QuoteId,
        status: QuoteStatus,
        price_snapshot_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE quotes
            SET status = $2, price_snapshot_cents = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(price_snapshot_cents)
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
