use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::engine::templating::render;
use crate::errors::AppError;
use crate::models::notification::{
    NewNotification, Notification, NotificationKind, NotificationTemplate, Priority,
};

const TEMPLATES: &[NotificationTemplate] = &[
    NotificationTemplate {
        id: "task-assigned",
        kind: NotificationKind::Task,
        title: "New Task Assigned",
        message: "You have been assigned a new task: {{task.title}} in project {{project.name}}",
        category: "task",
    },
    NotificationTemplate {
        id: "task-overdue",
        kind: NotificationKind::Warning,
        title: "Task Overdue",
        message: "Task \"{{task.title}}\" is overdue. Due date was {{task.dueDate}}",
        category: "deadline",
    },
    NotificationTemplate {
        id: "rfi-response",
        kind: NotificationKind::Rfi,
        title: "RFI Response Received",
        message: "Your RFI \"{{rfi.subject}}\" has received a response from {{responder}}",
        category: "rfi",
    },
    NotificationTemplate {
        id: "project-milestone",
        kind: NotificationKind::Success,
        title: "Milestone Achieved",
        message: "Project {{project.name}} has reached milestone: {{milestone.name}}",
        category: "project",
    },
    NotificationTemplate {
        id: "budget-alert",
        kind: NotificationKind::Warning,
        title: "Budget Alert",
        message: "Project {{project.name}} is {{percentage}}% over budget",
        category: "project",
    },
    NotificationTemplate {
        id: "approval-required",
        kind: NotificationKind::Task,
        title: "Approval Required",
        message: "{{workflow.name}} is waiting for your approval on \"{{step.name}}\"",
        category: "approval",
    },
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    pub read: Option<bool>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: usize,
    pub unread_count: usize,
}

#[derive(Default)]
pub struct NotificationService {
    store: DashMap<Uuid, Notification>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn templates() -> &'static [NotificationTemplate] {
        TEMPLATES
    }

    /// Accepts `task_assigned` as well as `task-assigned`.
    pub fn find_template(id: &str) -> Option<&'static NotificationTemplate> {
        let normalized = id.trim().replace('_', "-");
        TEMPLATES.iter().find(|t| t.id == normalized)
    }

    pub fn create(&self, new: NewNotification) -> Result<Notification, AppError> {
        let mut errors = Vec::new();
        if new.user_id.trim().is_empty() {
            errors.push("Notification recipient is required".to_string());
        }
        if new.title.trim().is_empty() {
            errors.push("Notification title is required".to_string());
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let category = new
            .category
            .unwrap_or_else(|| category_for(new.kind).to_string());
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            data: new.data,
            read: false,
            read_at: None,
            priority: new.priority,
            category,
            action_url: new.action_url,
            created_at: OffsetDateTime::now_utc(),
        };
        debug!(notification_id = %notification.id, user_id = %notification.user_id, "notification created");
        self.store.insert(notification.id, notification.clone());
        Ok(notification)
    }

    pub fn create_from_template(
        &self,
        template_id: &str,
        user_id: &str,
        ctx: &Value,
        priority: Option<Priority>,
    ) -> Result<Notification, AppError> {
        let template = Self::find_template(template_id)
            .ok_or_else(|| AppError::not_found("notification template", template_id))?;

        self.create(NewNotification {
            user_id: user_id.to_string(),
            kind: template.kind,
            title: render(template.title, ctx),
            message: render(template.message, ctx),
            data: Some(ctx.clone()),
            priority: priority.unwrap_or_default(),
            category: Some(template.category.to_string()),
            action_url: None,
        })
    }

    /// Newest first.
    pub fn list_for_user(&self, user_id: &str, filter: &NotificationFilter) -> NotificationPage {
        let mut items: Vec<Notification> = self
            .store
            .iter()
            .filter(|n| n.user_id == user_id)
            .filter(|n| filter.read.map(|r| n.read == r).unwrap_or(true))
            .filter(|n| {
                filter
                    .category
                    .as_deref()
                    .map(|c| n.category == c)
                    .unwrap_or(true)
            })
            .filter(|n| filter.priority.map(|p| n.priority == p).unwrap_or(true))
            .map(|n| n.value().clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = items.len();
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50);
        let notifications = items.into_iter().skip(offset).take(limit).collect();

        NotificationPage {
            notifications,
            total,
            unread_count: self.unread_count(user_id),
        }
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.store
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count()
    }

    pub fn mark_as_read(&self, id: Uuid) -> Result<Notification, AppError> {
        let mut entry = self
            .store
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("notification", id))?;
        if !entry.read {
            entry.read = true;
            entry.read_at = Some(OffsetDateTime::now_utc());
        }
        Ok(entry.clone())
    }

    /// Returns how many notifications were newly marked.
    pub fn mark_all_as_read(&self, user_id: &str) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut marked = 0;
        for mut entry in self.store.iter_mut() {
            if entry.user_id == user_id && !entry.read {
                entry.read = true;
                entry.read_at = Some(now);
                marked += 1;
            }
        }
        marked
    }

    pub fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.store
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found("notification", id))
    }
}

fn category_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Task => "task",
        NotificationKind::Rfi => "rfi",
        NotificationKind::Project | NotificationKind::Success => "project",
        _ => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note(user: &str, title: &str) -> NewNotification {
        NewNotification {
            user_id: user.into(),
            title: title.into(),
            message: "body".into(),
            ..Default::default()
        }
    }

    #[test]
    fn mark_all_as_read_is_idempotent() {
        let service = NotificationService::new();
        service.create(note("user-1", "a")).unwrap();
        service.create(note("user-1", "b")).unwrap();
        service.create(note("user-2", "c")).unwrap();

        assert_eq!(service.mark_all_as_read("user-1"), 2);
        assert_eq!(service.unread_count("user-1"), 0);
        assert_eq!(service.mark_all_as_read("user-1"), 0);
        assert_eq!(service.unread_count("user-2"), 1);
    }

    #[test]
    fn template_renders_context_paths() {
        let service = NotificationService::new();
        let ctx = json!({"task": {"title": "Install facade panels"}, "project": {"name": "Canary Wharf"}});
        let created = service
            .create_from_template("task_assigned", "user-3", &ctx, Some(Priority::High))
            .unwrap();
        assert_eq!(created.title, "New Task Assigned");
        assert_eq!(
            created.message,
            "You have been assigned a new task: Install facade panels in project Canary Wharf"
        );
        assert_eq!(created.category, "task");
        assert_eq!(created.priority, Priority::High);
    }

    #[test]
    fn unknown_template_is_not_found() {
        let service = NotificationService::new();
        let err = service
            .create_from_template("nope", "user-1", &json!({}), None)
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn list_filters_unread_and_reports_totals() {
        let service = NotificationService::new();
        let first = service.create(note("user-1", "first")).unwrap();
        service.create(note("user-1", "second")).unwrap();
        service.mark_as_read(first.id).unwrap();

        let unread = service.list_for_user(
            "user-1",
            &NotificationFilter {
                read: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(unread.total, 1);
        assert_eq!(unread.notifications[0].title, "second");
        assert_eq!(unread.unread_count, 1);
    }

    #[test]
    fn create_requires_recipient_and_title() {
        let service = NotificationService::new();
        let err = service.create(note("", "")).unwrap_err();
        match err {
            AppError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn delete_missing_is_not_found() {
        let service = NotificationService::new();
        assert!(matches!(
            service.delete(Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }
}
