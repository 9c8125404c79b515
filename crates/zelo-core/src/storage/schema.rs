//! Schema bootstrap.
//!
//! Idempotent DDL for every table the outbox touches. The binary runs this
//! at startup and the integration harness runs it per test database, so a
//! fresh Postgres needs no separate migration step.

use sqlx::PgPool;

use crate::error::Result;

/// Creates all outbox tables and indexes if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS outbox_items (
            id UUID PRIMARY KEY,
            phone TEXT NOT NULL,
            payload JSONB NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            retries INTEGER NOT NULL DEFAULT 0,
            scheduled_at TIMESTAMPTZ,
            idempotency_key TEXT NOT NULL,
            internal_message_id TEXT NOT NULL,
            provider_message_id TEXT,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            last_attempt_at TIMESTAMPTZ,
            sent_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS outbox_items_idempotency_key_idx
            ON outbox_items (idempotency_key)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS outbox_items_due_idx
            ON outbox_items (status, scheduled_at)
            WHERE status IN ('pending', 'retrying')
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS worker_locks (
            resource TEXT PRIMARY KEY,
            owner UUID NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS message_templates (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            content TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS quotes (
            id UUID PRIMARY KEY,
            customer_name TEXT NOT NULL,
            phone TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pendente',
            total_cents BIGINT NOT NULL,
            price_snapshot_cents BIGINT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS evaluations (
            id UUID PRIMARY KEY,
            delivered BOOLEAN NOT NULL DEFAULT FALSE,
            delivered_at TIMESTAMPTZ,
            provider_message_id TEXT,
            delivery_error TEXT,
            send_attempts INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_sends (
            id UUID PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'scheduled',
            sent_at TIMESTAMPTZ,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
