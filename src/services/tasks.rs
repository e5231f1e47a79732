use dashmap::DashMap;
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::construction::Task;
use crate::models::notification::Priority;
use crate::utils::validation::validate_task;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

#[derive(Default)]
pub struct TaskService {
    tasks: DashMap<String, Task>,
}

impl TaskService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, new: NewTask) -> Result<Task, AppError> {
        let check = validate_task(&new.title, new.priority.as_deref());
        if !check.is_valid {
            return Err(AppError::Validation(check.errors));
        }
        let priority = parse_priority(new.priority.as_deref())?;
        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: new.title.trim().to_string(),
            description: new.description,
            project_id: new.project_id,
            status: "todo".to_string(),
            priority,
            assigned_to: new.assigned_to,
            estimated_hours: new.estimated_hours.unwrap_or(8.0),
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|t| t.clone())
    }

    pub fn update_status(&self, id: &str, status: &str) -> Result<Task, AppError> {
        let mut task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("task", id))?;
        task.status = status.to_string();
        task.updated_at = OffsetDateTime::now_utc();
        Ok(task.clone())
    }

    pub fn assign(&self, id: &str, user_id: &str) -> Result<Task, AppError> {
        let mut task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("task", id))?;
        task.assigned_to = Some(user_id.to_string());
        task.updated_at = OffsetDateTime::now_utc();
        Ok(task.clone())
    }
}

pub(crate) fn parse_priority(raw: Option<&str>) -> Result<Priority, AppError> {
    match raw {
        None => Ok(Priority::default()),
        Some(p) => serde_json::from_value(serde_json::Value::String(p.to_ascii_lowercase()))
            .map_err(|_| AppError::validation(format!("Unknown priority `{p}`"))),
    }
}
