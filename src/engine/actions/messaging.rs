use serde_json::{json, Value};

use super::{cfg_str, require_str};
use crate::engine::templating::first_string;
use crate::errors::AppError;
use crate::models::notification::{NewNotification, NotificationKind, Priority};
use crate::services::Collaborators;
use crate::utils::validation::validate_email;

/// Expands the `assignee` and `manager` aliases against the context; any
/// other value is taken as a user id.
fn resolve_recipient(raw: &str, context: &Value) -> Option<String> {
    match raw {
        "assignee" => first_string(
            &["previous.assignedTo", "task.assignedToId", "assignedToId"],
            context,
        ),
        "manager" => first_string(&["project.managerId", "managerId"], context),
        other => Some(other.to_string()),
    }
}

fn recipients(config: &Value, context: &Value) -> Vec<String> {
    let raw: Vec<String> = match config.get("recipients").or_else(|| config.get("recipient")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => cfg_str(config, "userId").into_iter().collect(),
    };
    let mut resolved: Vec<String> = raw
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .filter_map(|r| resolve_recipient(r, context))
        .collect();
    resolved.dedup();
    resolved
}

pub(super) fn send_notification(
    services: &Collaborators,
    config: &Value,
    context: &Value,
) -> Result<Value, AppError> {
    let users = recipients(config, context);
    if users.is_empty() {
        return Err(AppError::validation("Notification has no resolvable recipient"));
    }
    let priority: Option<Priority> = cfg_str(config, "priority")
        .map(|p| serde_json::from_value(Value::String(p.to_ascii_lowercase())))
        .transpose()
        .map_err(|_| AppError::validation("Unknown notification priority"))?;
    let kind: NotificationKind = cfg_str(config, "type")
        .and_then(|k| serde_json::from_value(Value::String(k)).ok())
        .unwrap_or_default();

    let mut ids = Vec::with_capacity(users.len());
    for user in &users {
        let created = match cfg_str(config, "template") {
            Some(template) => services
                .notifications
                .create_from_template(&template, user, context, priority)?,
            None => services.notifications.create(NewNotification {
                user_id: user.clone(),
                kind,
                title: cfg_str(config, "title").unwrap_or_default(),
                message: cfg_str(config, "message").unwrap_or_default(),
                data: config.get("data").cloned(),
                priority: priority.unwrap_or_default(),
                category: cfg_str(config, "category"),
                action_url: cfg_str(config, "actionUrl"),
            })?,
        };
        ids.push(created.id);
    }

    Ok(json!({ "notified": users, "notificationIds": ids }))
}

fn email_recipients(config: &Value) -> Vec<String> {
    match config.get("to") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

pub(super) async fn send_email(
    services: &Collaborators,
    email_enabled: bool,
    config: &Value,
) -> Result<Value, AppError> {
    if !email_enabled {
        tracing::info!("email service disabled; skipping send_email action");
        return Ok(json!({ "sent": 0, "skipped": true }));
    }

    let to = email_recipients(config);
    if to.is_empty() {
        return Err(AppError::validation("Email recipient is required"));
    }
    let invalid: Vec<String> = to
        .iter()
        .filter(|addr| !validate_email(addr).is_valid)
        .map(|addr| format!("Invalid email address: {addr}"))
        .collect();
    if !invalid.is_empty() {
        return Err(AppError::Validation(invalid));
    }
    let subject = require_str(config, "subject", "Email subject")?;
    let body = cfg_str(config, "body").unwrap_or_default();

    for addr in &to {
        services.mailer.send_email(addr, &subject, &body).await?;
    }
    Ok(json!({ "sent": to.len(), "recipients": to }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::actions::test_support::services_with_mailer;
    use crate::services::mailer::MockMailer;
    use crate::services::notifications::NotificationFilter;
    use std::sync::Arc;

    #[test]
    fn assignee_prefers_previous_action_output() {
        let services = services_with_mailer(Arc::new(MockMailer::default()));
        let ctx = json!({
            "previous": {"assignedTo": "user-2"},
            "task": {"assignedToId": "user-1", "title": "Pour slab"},
            "project": {"name": "Dockside"}
        });
        let out = send_notification(
            &services,
            &json!({"recipient": "assignee", "template": "task_assigned", "priority": "high"}),
            &ctx,
        )
        .unwrap();
        assert_eq!(out["notified"], json!(["user-2"]));

        let page = services
            .notifications
            .list_for_user("user-2", &NotificationFilter::default());
        assert_eq!(page.total, 1);
        assert_eq!(
            page.notifications[0].message,
            "You have been assigned a new task: Pour slab in project Dockside"
        );
        assert_eq!(page.notifications[0].priority, Priority::High);
    }

    #[test]
    fn unresolvable_manager_is_rejected() {
        let services = services_with_mailer(Arc::new(MockMailer::default()));
        let err = send_notification(
            &services,
            &json!({"recipient": "manager", "title": "Heads up"}),
            &json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn email_accepts_comma_list_and_validates_each() {
        let mailer = Arc::new(MockMailer::default());
        let services = services_with_mailer(mailer.clone());

        let out = send_email(
            &services,
            true,
            &json!({"to": "pm@site.io, qa@site.io", "subject": "Daily report", "body": "ok"}),
        )
        .await
        .unwrap();
        assert_eq!(out["sent"], 2);
        assert_eq!(mailer.sent_emails().len(), 2);

        let err = send_email(
            &services,
            true,
            &json!({"to": ["pm@site.io", "not-an-email"], "subject": "x"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.len() == 1));
        assert_eq!(mailer.sent_emails().len(), 2);
    }

    #[tokio::test]
    async fn disabled_email_service_skips() {
        let mailer = Arc::new(MockMailer::default());
        let services = services_with_mailer(mailer.clone());
        let out = send_email(&services, false, &json!({"to": "pm@site.io", "subject": "x"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"sent": 0, "skipped": true}));
        assert!(mailer.sent_emails().is_empty());
    }

    #[tokio::test]
    async fn mailer_failure_is_downstream() {
        let services = services_with_mailer(Arc::new(MockMailer::failing()));
        let err = send_email(&services, true, &json!({"to": "pm@site.io", "subject": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Downstream(_)));
    }
}
