use std::collections::HashSet;

use serde_json::Value;

use crate::errors::AppError;
use crate::models::workflow::{NewWorkflowTemplate, StepType, WorkflowStep};

/// Step ids named in a loop's `body` or a parallel step's `branches`.
pub fn nested_step_ids(step: &WorkflowStep) -> Vec<String> {
    let key = match step.step_type {
        StepType::Loop => "body",
        StepType::Parallel => "branches",
        _ => return Vec::new(),
    };
    step.configuration
        .get(key)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Successors once `step` completes. A condition step takes `nextSteps[0]`
/// on true and `nextSteps[1]` on false; everything else takes all of them.
pub fn successors(step: &WorkflowStep, condition: Option<bool>) -> Vec<String> {
    match (step.step_type, condition) {
        (StepType::Condition, Some(true)) => step.next_steps.first().cloned().into_iter().collect(),
        (StepType::Condition, Some(false)) => step.next_steps.get(1).cloned().into_iter().collect(),
        _ => step.next_steps.clone(),
    }
}

pub fn validate_workflow(new: &NewWorkflowTemplate) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if new.name.trim().is_empty() {
        errors.push("Workflow name is required".to_string());
    }
    if new.steps.is_empty() {
        errors.push("A workflow needs at least one step".to_string());
    }

    let mut ids = HashSet::new();
    for step in &new.steps {
        if step.id.trim().is_empty() {
            errors.push("Step id is required".to_string());
        } else if !ids.insert(step.id.as_str()) {
            errors.push(format!("Duplicate step id `{}`", step.id));
        }
    }

    for step in &new.steps {
        for next in step.next_steps.iter().chain(nested_step_ids(step).iter()) {
            if !ids.contains(next.as_str()) {
                errors.push(format!(
                    "Step `{}` references unknown step `{}`",
                    step.id, next
                ));
            }
        }
        match step.step_type {
            StepType::Condition if step.conditions.is_empty() && step.expression.is_none() => {
                errors.push(format!("Condition step `{}` has no conditions", step.id));
            }
            StepType::Loop | StepType::Parallel if nested_step_ids(step).is_empty() => {
                errors.push(format!("Step `{}` has no nested steps", step.id));
            }
            StepType::Action if step.configuration.get("action").is_none() => {
                errors.push(format!("Action step `{}` does not name an action", step.id));
            }
            _ => {}
        }
        if step.required_approvals == Some(0) {
            errors.push(format!("Step `{}` requires zero approvals", step.id));
        }
    }

    let mut names = HashSet::new();
    for variable in &new.variables {
        if !names.insert(variable.name.as_str()) {
            errors.push(format!("Duplicate variable `{}`", variable.name));
        }
        if let Some(default) = &variable.default_value {
            if !variable.var_type.accepts(default) {
                errors.push(format!(
                    "Default for `{}` does not match its declared type",
                    variable.name
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
