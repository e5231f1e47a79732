use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::api_key_repository::ApiKeyRepository;
use super::webhook_repository::{WebhookInsert, WebhookRepository};
use crate::errors::AppError;
use crate::models::api_key::PlatformApiKey;
use crate::models::webhook::WebhookEndpoint;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS platform_api_keys (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        key TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_used TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS webhooks (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        events TEXT[] NOT NULL DEFAULT '{}',
        secret TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        last_triggered TIMESTAMPTZ,
        success_count BIGINT NOT NULL DEFAULT 0,
        failure_count BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Creates the platform tables when they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("platform tables ready");
    Ok(())
}

pub struct PostgresApiKeyRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn create_api_key(&self, name: &str, key: &str) -> Result<PlatformApiKey, AppError> {
        let record = sqlx::query_as::<_, PlatformApiKey>(
            r#"
            INSERT INTO platform_api_keys (id, name, key, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id, name, key, created_at, last_used
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_api_keys(&self) -> Result<Vec<PlatformApiKey>, AppError> {
        let rows = sqlx::query_as::<_, PlatformApiKey>(
            r#"
            SELECT id, name, key, created_at, last_used
            FROM platform_api_keys
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_api_key(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM platform_api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct PostgresWebhookRepository {
    pub pool: PgPool,
}

#[async_trait]
impl WebhookRepository for PostgresWebhookRepository {
    async fn create_webhook(&self, new: WebhookInsert) -> Result<WebhookEndpoint, AppError> {
        let endpoint = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            INSERT INTO webhooks (id, name, url, events, secret, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            RETURNING id, name, url, events, secret, enabled, last_triggered,
                      success_count, failure_count, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.url)
        .bind(&new.events)
        .bind(&new.secret)
        .bind(new.enabled)
        .fetch_one(&self.pool)
        .await?;
        Ok(endpoint)
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookEndpoint>, AppError> {
        let rows = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            SELECT id, name, url, events, secret, enabled, last_triggered,
                   success_count, failure_count, created_at
            FROM webhooks
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, AppError> {
        let row = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            SELECT id, name, url, events, secret, enabled, last_triggered,
                   success_count, failure_count, created_at
            FROM webhooks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_webhook(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_delivery(
        &self,
        id: Uuid,
        success: bool,
        at: OffsetDateTime,
    ) -> Result<(), AppError> {
        // Increment in SQL, never read-modify-write.
        sqlx::query(
            r#"
            UPDATE webhooks
            SET last_triggered = $2,
                success_count = success_count + CASE WHEN $3 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $3 THEN 0 ELSE 1 END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_triggered(&self, id: Uuid, at: OffsetDateTime) -> Result<(), AppError> {
        sqlx::query("UPDATE webhooks SET last_triggered = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
