mod http;
mod messaging;
mod quality;
mod tasks;

pub mod delay;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::templating::render_value;
use crate::errors::AppError;
use crate::models::automation_rule::ActionType;
use crate::services::Collaborators;

/// Runs one side-effecting action against a JSON context and returns its
/// output. Earlier actions are never rolled back when a later one fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action_type: ActionType,
        configuration: &Value,
        context: &Value,
    ) -> Result<Value, AppError>;
}

pub struct ServiceActionExecutor {
    services: Collaborators,
    http: Client,
    webhook_timeout: Duration,
    email_enabled: bool,
}

impl ServiceActionExecutor {
    pub fn new(
        services: Collaborators,
        http: Client,
        webhook_timeout: Duration,
        email_enabled: bool,
    ) -> Self {
        ServiceActionExecutor {
            services,
            http,
            webhook_timeout,
            email_enabled,
        }
    }
}

#[async_trait]
impl ActionExecutor for ServiceActionExecutor {
    async fn execute(
        &self,
        action_type: ActionType,
        configuration: &Value,
        context: &Value,
    ) -> Result<Value, AppError> {
        let config = render_value(configuration, context);
        debug!(action = action_type.as_str(), "executing action");

        let result = match action_type {
            ActionType::CreateTask => tasks::create_task(&self.services, &config, context),
            ActionType::UpdateStatus => tasks::update_status(&self.services, &config, context),
            ActionType::AssignUser => tasks::assign_user(&self.services, &config, context),
            ActionType::CreateRfi => quality::create_rfi(&self.services, &config, context),
            ActionType::ScheduleInspection => {
                quality::schedule_inspection(&self.services, &config, context)
            }
            ActionType::SendNotification => {
                messaging::send_notification(&self.services, &config, context)
            }
            ActionType::SendEmail => {
                messaging::send_email(&self.services, self.email_enabled, &config).await
            }
            ActionType::Webhook => http::call_webhook(&self.http, self.webhook_timeout, &config).await,
        };

        if let Err(err) = &result {
            warn!(action = action_type.as_str(), %err, "action failed");
        }
        result
    }
}

/// Trimmed, non-empty string at `key`. Numbers are rendered as strings.
pub(crate) fn cfg_str(config: &Value, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers, or strings that parse as numbers (templated values arrive as strings).
pub(crate) fn cfg_f64(config: &Value, key: &str) -> Option<f64> {
    match config.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn require_str(config: &Value, key: &str, label: &str) -> Result<String, AppError> {
    cfg_str(config, key).ok_or_else(|| AppError::validation(format!("{label} is required")))
}
