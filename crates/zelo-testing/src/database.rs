//! Postgres harness for tests that need real SQL.
//!
//! Opt-in via `DATABASE_URL`; tests call [`TestDatabase::connect`] and skip
//! themselves when no database is configured, so the default test run stays
//! hermetic.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use zelo_core::{storage::schema::ensure_schema, Storage};

/// A connected test database with the outbox schema in place.
pub struct TestDatabase {
    pool: PgPool,
}

impl TestDatabase {
    /// Connects using `DATABASE_URL` and bootstraps the schema.
    ///
    /// Returns `Ok(None)` when the variable is unset, letting callers skip.
    pub async fn connect() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return Ok(None);
        };
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .context("connecting to DATABASE_URL")?;
        ensure_schema(&pool).await.context("bootstrapping schema")?;
        Ok(Some(Self { pool }))
    }

    /// Storage layer over this database.
    pub fn storage(&self) -> Storage {
        Storage::new(self.pool.clone())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Empties every outbox table, for tests sharing one database.
    pub async fn truncate(&self) -> Result<()> {
        sqlx::query(
            "TRUNCATE outbox_items, worker_locks, message_templates, quotes, \
             evaluations, scheduled_sends",
        )
        .execute(&self.pool)
        .await
        .context("truncating test tables")?;
        Ok(())
    }
}
