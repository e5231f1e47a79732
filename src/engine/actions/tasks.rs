use serde_json::{json, Value};

use super::{cfg_f64, cfg_str, require_str};
use crate::engine::templating::first_string;
use crate::errors::AppError;
use crate::models::construction::WorkloadEntry;
use crate::services::tasks::NewTask;
use crate::services::Collaborators;

pub(super) fn create_task(
    services: &Collaborators,
    config: &Value,
    context: &Value,
) -> Result<Value, AppError> {
    let task = services.tasks.create(NewTask {
        title: cfg_str(config, "title").unwrap_or_default(),
        description: cfg_str(config, "description"),
        project_id: cfg_str(config, "projectId")
            .or_else(|| first_string(&["project.id", "projectId"], context)),
        priority: cfg_str(config, "priority"),
        assigned_to: cfg_str(config, "assignedTo"),
        estimated_hours: cfg_f64(config, "estimatedHours"),
    })?;
    Ok(json!(task))
}

/// `entity` is one of `task`, `rfi` or `inspection`; the id defaults to
/// `<entity>.id` in the context.
pub(super) fn update_status(
    services: &Collaborators,
    config: &Value,
    context: &Value,
) -> Result<Value, AppError> {
    let entity = cfg_str(config, "entity").unwrap_or_else(|| "task".to_string());
    let status = require_str(config, "status", "Status")?;
    let default_path = format!("{entity}.id");
    let id = cfg_str(config, "entityId")
        .or_else(|| first_string(&[default_path.as_str()], context))
        .ok_or_else(|| AppError::validation(format!("No {entity} id to update")))?;

    match entity.as_str() {
        "task" => services.tasks.update_status(&id, &status).map(|_| ())?,
        "rfi" => services.rfis.update_status(&id, &status).map(|_| ())?,
        "inspection" => services
            .scheduling
            .update_inspection_status(&id, &status)
            .map(|_| ())?,
        other => {
            return Err(AppError::validation(format!(
                "Cannot update status of `{other}`"
            )))
        }
    };
    Ok(json!({ "entity": entity, "id": id, "status": status }))
}

/// `method` is `auto_assign` (least-loaded available member, optionally
/// filtered by `skills`) or `direct` with a `userId`.
pub(super) fn assign_user(
    services: &Collaborators,
    config: &Value,
    context: &Value,
) -> Result<Value, AppError> {
    let method = cfg_str(config, "method").unwrap_or_else(|| "auto_assign".to_string());
    let assignee = match method.as_str() {
        "direct" => require_str(config, "userId", "userId")?,
        "auto_assign" | "auto" => {
            let skills: Vec<String> = config
                .get("skills")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|s| s.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            services.team.auto_assign(&skills)?.id
        }
        other => {
            return Err(AppError::validation(format!(
                "Unknown assignment method `{other}`"
            )))
        }
    };

    let task_id = cfg_str(config, "taskId").or_else(|| first_string(&["task.id", "taskId"], context));
    let mut hours = context
        .get("task")
        .map(|t| cfg_f64(t, "estimatedHours"))
        .unwrap_or(None);
    if let Some(id) = task_id.as_deref() {
        if let Some(task) = services.tasks.get(id) {
            services.tasks.assign(id, &assignee)?;
            hours = hours.or(Some(task.estimated_hours));
        }
    }

    if services.team.get_member(&assignee).is_some() {
        services.team.update_member_workload(
            &assignee,
            WorkloadEntry {
                task_id: task_id.clone(),
                estimated_hours: hours.unwrap_or(8.0),
                priority: first_string(&["task.priority"], context),
            },
        )?;
    }

    Ok(json!({ "assignedTo": assignee, "taskId": task_id }))
}
