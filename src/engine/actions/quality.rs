use serde_json::{json, Value};

use super::{cfg_f64, cfg_str};
use crate::engine::templating::first_string;
use crate::errors::AppError;
use crate::services::rfis::NewRfi;
use crate::services::scheduling::NewInspection;
use crate::services::Collaborators;

pub(super) fn create_rfi(
    services: &Collaborators,
    config: &Value,
    context: &Value,
) -> Result<Value, AppError> {
    let rfi = services.rfis.create(NewRfi {
        project_id: cfg_str(config, "projectId")
            .or_else(|| first_string(&["project.id", "projectId"], context)),
        subject: cfg_str(config, "subject").unwrap_or_default(),
        question: cfg_str(config, "question").unwrap_or_default(),
        priority: cfg_str(config, "priority"),
        assigned_to: cfg_str(config, "assignedTo"),
    })?;
    Ok(json!(rfi))
}

pub(super) fn schedule_inspection(
    services: &Collaborators,
    config: &Value,
    context: &Value,
) -> Result<Value, AppError> {
    let inspection = services.scheduling.schedule_inspection(NewInspection {
        project_id: cfg_str(config, "projectId")
            .or_else(|| first_string(&["project.id", "projectId"], context)),
        inspection_type: cfg_str(config, "inspectionType")
            .or_else(|| cfg_str(config, "type"))
            .unwrap_or_default(),
        inspector: cfg_str(config, "inspector"),
        scheduled_in_days: cfg_f64(config, "scheduledInDays").map(|d| d.round() as i64),
    })?;
    Ok(json!(inspection))
}
