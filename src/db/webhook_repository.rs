use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::webhook::WebhookEndpoint;

#[derive(Debug, Clone)]
pub struct WebhookInsert {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: String,
    pub enabled: bool,
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create_webhook(&self, new: WebhookInsert) -> Result<WebhookEndpoint, AppError>;

    async fn list_webhooks(&self) -> Result<Vec<WebhookEndpoint>, AppError>;

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, AppError>;

    /// `false` when nothing was deleted.
    async fn delete_webhook(&self, id: Uuid) -> Result<bool, AppError>;

    /// Sets `last_triggered` and bumps the success or failure counter atomically.
    async fn record_delivery(
        &self,
        id: Uuid,
        success: bool,
        at: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// Sets `last_triggered` without touching counters (test deliveries).
    async fn mark_triggered(&self, id: Uuid, at: OffsetDateTime) -> Result<(), AppError>;
}
