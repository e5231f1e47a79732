use std::sync::Arc;

use base64::Engine;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IntegrationsSection;
use crate::db::api_key_repository::ApiKeyRepository;
use crate::db::webhook_repository::{WebhookInsert, WebhookRepository};
use crate::errors::AppError;
use crate::models::api_key::{ApiKeySummary, PlatformApiKey};
use crate::models::webhook::{NewWebhookEndpoint, WebhookEndpoint};
use crate::services::webhook_sender::{WebhookDelivery, WebhookSender};

const API_KEY_PREFIX: &str = "pk_";
const WEBHOOK_SECRET_PREFIX: &str = "whsec_";
const MASK: &str = "••••••••";

/// `pk_` followed by 64 hex characters.
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

pub fn generate_webhook_secret() -> String {
    let bytes: [u8; 24] = rand::random();
    format!(
        "{WEBHOOK_SECRET_PREFIX}{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    )
}

/// Keeps only the last eight characters visible.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(8)..].iter().collect();
    format!("{MASK}{tail}")
}

pub fn summarize(key: &PlatformApiKey) -> ApiKeySummary {
    ApiKeySummary {
        id: key.id,
        name: key.name.clone(),
        key: mask_api_key(&key.key),
        created_at: key.created_at,
        last_used: key.last_used,
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDeliveryResult {
    pub status: u16,
    pub success: bool,
}

/// API keys and webhook registrations.
#[derive(Clone)]
pub struct PlatformService {
    api_keys: Arc<dyn ApiKeyRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    sender: Arc<dyn WebhookSender>,
    limits: IntegrationsSection,
}

impl PlatformService {
    pub fn new(
        api_keys: Arc<dyn ApiKeyRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        sender: Arc<dyn WebhookSender>,
        limits: IntegrationsSection,
    ) -> Self {
        PlatformService {
            api_keys,
            webhooks,
            sender,
            limits,
        }
    }

    /// The only call that returns the key in full.
    pub async fn create_api_key(&self, name: &str) -> Result<PlatformApiKey, AppError> {
        if !self.limits.api_keys_enabled {
            return Err(AppError::Conflict("API keys are disabled".to_string()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("API key name is required"));
        }
        let created = self.api_keys.create_api_key(name, &generate_api_key()).await?;
        info!(api_key_id = %created.id, "api key created");
        Ok(created)
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeySummary>, AppError> {
        let keys = self.api_keys.list_api_keys().await?;
        Ok(keys.iter().map(summarize).collect())
    }

    pub async fn delete_api_key(&self, id: Uuid) -> Result<(), AppError> {
        if !self.api_keys.delete_api_key(id).await? {
            return Err(AppError::not_found("api key", id));
        }
        info!(api_key_id = %id, "api key deleted");
        Ok(())
    }

    pub async fn create_webhook(&self, new: NewWebhookEndpoint) -> Result<WebhookEndpoint, AppError> {
        if !self.limits.webhooks_enabled {
            return Err(AppError::Conflict("Webhooks are disabled".to_string()));
        }
        let mut errors = Vec::new();
        if new.name.trim().is_empty() {
            errors.push("Webhook name is required".to_string());
        }
        let url = new.url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            errors.push("Webhook URL must start with http:// or https://".to_string());
        }
        if new.events.iter().any(|e| e.trim().is_empty()) {
            errors.push("Webhook event names cannot be blank".to_string());
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let existing = self.webhooks.list_webhooks().await?.len();
        if existing >= self.limits.max_webhooks as usize {
            return Err(AppError::Conflict(format!(
                "Webhook limit of {} reached",
                self.limits.max_webhooks
            )));
        }

        let secret = new
            .secret
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(generate_webhook_secret);
        let created = self
            .webhooks
            .create_webhook(WebhookInsert {
                name: new.name.trim().to_string(),
                url: url.to_string(),
                events: new.events.into_iter().map(|e| e.trim().to_string()).collect(),
                secret,
                enabled: new.enabled,
            })
            .await?;
        info!(webhook_id = %created.id, url = %created.url, "webhook registered");
        Ok(created)
    }

    pub async fn list_webhooks(&self) -> Result<Vec<WebhookEndpoint>, AppError> {
        self.webhooks.list_webhooks().await
    }

    pub async fn delete_webhook(&self, id: Uuid) -> Result<(), AppError> {
        if !self.webhooks.delete_webhook(id).await? {
            return Err(AppError::not_found("webhook", id));
        }
        Ok(())
    }

    /// Sends a `webhook.test` event. `lastTriggered` is updated whenever the
    /// endpoint answers, whatever the status.
    pub async fn test_webhook(&self, id: Uuid) -> Result<TestDeliveryResult, AppError> {
        let endpoint = self
            .webhooks
            .find_webhook(id)
            .await?
            .ok_or_else(|| AppError::not_found("webhook", id))?;
        let now = OffsetDateTime::now_utc();
        let timestamp = now
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        let delivery = WebhookDelivery {
            url: endpoint.url.clone(),
            secret: endpoint.secret.clone(),
            event_type: "webhook.test".to_string(),
            payload: json!({
                "event": "webhook.test",
                "timestamp": timestamp,
                "data": { "message": "Test delivery", "webhookId": endpoint.id },
            }),
        };
        let status = match self.sender.deliver(delivery).await {
            Ok(status) => status,
            Err(err) => {
                warn!(webhook_id = %id, %err, "test delivery failed");
                return Err(err);
            }
        };
        self.webhooks.mark_triggered(id, now).await?;
        Ok(TestDeliveryResult {
            status,
            success: (200..300).contains(&status),
        })
    }
}
