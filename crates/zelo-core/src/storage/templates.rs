//! Repository for stored message templates.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{MessageTemplate, TemplateId},
};

/// Data access for the `message_templates` table.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a repository over the shared pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a template and returns its id.
    pub async fn create(&self, template: &MessageTemplate) -> Result<TemplateId> {
        let id = sqlx::query_scalar::<_, TemplateId>(
            r#"
            INSERT INTO message_templates (id, name, content, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.content)
        .bind(template.active)
        .bind(template.created_at)
        .bind(template.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    /// Looks up a template by id.
    pub async fn find_by_id(&self, id: TemplateId) -> Result<Option<MessageTemplate>> {
        let template = sqlx::query_as::<_, MessageTemplate>(
            r#"
            SELECT id, name, content, active, created_at, updated_at
            FROM message_templates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(template)
    }
}
