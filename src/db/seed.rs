use serde_json::{json, Value};
use tracing::info;

use crate::engine::{RuleEngine, WorkflowEngine};
use crate::errors::AppError;
use crate::models::automation_rule::NewAutomationRule;
use crate::models::construction::{Availability, TeamMember};
use crate::models::workflow::NewWorkflowTemplate;
use crate::services::Collaborators;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub members: usize,
    pub rules: usize,
    pub workflows: usize,
}

fn team() -> Vec<TeamMember> {
    [
        ("user-1", "Morgan Ellis", "Project Manager", vec!["planning", "budgeting"], 24.0),
        ("user-2", "Adrian Cole", "Site Engineer", vec!["concrete", "steel", "inspection"], 16.0),
        ("user-3", "Sam Okafor", "Electrical Lead", vec!["electrical"], 32.0),
        ("user-4", "Jo Park", "Quality Inspector", vec!["inspection", "safety"], 8.0),
    ]
    .into_iter()
    .map(|(id, name, role, skills, hours)| TeamMember {
        id: id.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        skills: skills.into_iter().map(str::to_string).collect(),
        availability: Availability::Available,
        workload_hours: hours,
        assignments: Vec::new(),
    })
    .collect()
}

fn rules() -> Vec<Value> {
    vec![
        json!({
            "name": "Auto-assign High Priority Tasks",
            "description": "Assign high priority tasks to the least loaded available team member",
            "priority": 1,
            "trigger": {"event": "task.created"},
            "conditions": [
                {"field": "task.priority", "operator": "equals", "value": "high"},
                {"field": "task.assignedToId", "operator": "equals", "value": null, "logicalOperator": "AND"}
            ],
            "actions": [
                {"type": "assign_user", "configuration": {"method": "auto_assign"}, "order": 1},
                {"type": "send_notification",
                 "configuration": {"template": "task_assigned", "recipient": "assignee"}, "order": 2}
            ]
        }),
        json!({
            "name": "Follow Up Failed Inspections",
            "description": "Raise an RFI when an inspection scores below 70",
            "priority": 2,
            "trigger": {"event": "inspection.completed"},
            "conditions": [{"field": "overallScore", "operator": "less", "value": 70}],
            "actions": [
                {"type": "create_rfi", "order": 1, "configuration": {
                    "subject": "Inspection follow-up",
                    "question": "Inspection scored {{overallScore}}. What remediation is planned?",
                    "priority": "high"
                }}
            ]
        }),
    ]
}

fn workflows() -> Vec<Value> {
    vec![
        json!({
            "name": "Project Approval Workflow",
            "description": "Multi-stage approval process for new construction projects",
            "category": "approval",
            "version": "1.2.0",
            "triggers": [{"id": "trigger-1", "type": "event", "configuration": {"event": "project.created"}}],
            "variables": [{"name": "project_budget", "type": "number", "defaultValue": 0, "required": true,
                           "description": "Total project budget"}],
            "steps": [
                {"id": "step-1", "name": "Initial Review", "type": "approval", "order": 1,
                 "assignedTo": "user-1", "requiredApprovals": 1, "timeout": 86400,
                 "configuration": {"description": "Review project scope and requirements"},
                 "nextSteps": ["step-2"]},
                {"id": "step-2", "name": "Budget Approval", "type": "approval", "order": 2,
                 "assignedTo": "user-1", "requiredApprovals": 1, "timeout": 172800,
                 "errorHandling": {"onError": "escalate", "escalateTo": "finance-director"},
                 "configuration": {"description": "Approve project budget and financial plan"},
                 "nextSteps": ["step-3"]},
                {"id": "step-3", "name": "Final Approval", "type": "approval", "order": 3,
                 "assignedTo": "user-1", "requiredApprovals": 1, "timeout": 259200,
                 "configuration": {"description": "Final executive approval for project initiation"}}
            ]
        }),
        json!({
            "name": "Automated Quality Inspection",
            "description": "Weekly quality inspections with a follow-up notification",
            "category": "quality",
            "version": "2.0.1",
            "triggers": [{"id": "trigger-2", "type": "schedule", "configuration": {"schedule": "0 9 * * 1"}}],
            "steps": [
                {"id": "step-q1", "name": "Schedule Inspection", "type": "action", "order": 1,
                 "configuration": {"action": "schedule_inspection",
                                   "config": {"inspectionType": "quality", "inspector": "user-4"}},
                 "errorHandling": {"onError": "retry", "retryCount": 3, "retryDelay": 30},
                 "nextSteps": ["step-q2"]},
                {"id": "step-q2", "name": "Send Notification", "type": "notification", "order": 2,
                 "configuration": {"recipient": "user-4", "title": "Inspection scheduled",
                                   "message": "A weekly quality inspection has been scheduled"},
                 "errorHandling": {"onError": "continue"}}
            ]
        }),
    ]
}

/// Registers the demo team, rules and workflow templates.
pub async fn load_demo_fixtures(
    services: &Collaborators,
    rules_engine: &RuleEngine,
    workflow_engine: &WorkflowEngine,
) -> Result<SeedSummary, AppError> {
    let mut summary = SeedSummary::default();
    for member in team() {
        services.team.upsert_member(member);
        summary.members += 1;
    }
    for raw in rules() {
        let new: NewAutomationRule = serde_json::from_value(raw)
            .map_err(|e| AppError::validation(format!("invalid demo rule: {e}")))?;
        rules_engine.create_automation_rule(new).await?;
        summary.rules += 1;
    }
    for raw in workflows() {
        let new: NewWorkflowTemplate = serde_json::from_value(raw)
            .map_err(|e| AppError::validation(format!("invalid demo workflow: {e}")))?;
        workflow_engine.create_workflow(new, "system").await?;
        summary.workflows += 1;
    }
    info!(
        members = summary.members,
        rules = summary.rules,
        workflows = summary.workflows,
        "demo fixtures loaded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{InMemoryRuleRepository, InMemoryWorkflowRepository};
    use crate::engine::actions::MockActionExecutor;
    use crate::engine::WorkflowLimits;
    use crate::services::mailer::MockMailer;
    use std::sync::Arc;

    #[tokio::test]
    async fn fixtures_pass_validation() {
        let services = Collaborators::new(Arc::new(MockMailer::default()));
        let actions = Arc::new(MockActionExecutor::new());
        let rules = RuleEngine::new(Arc::new(InMemoryRuleRepository::default()), actions.clone());
        let workflows = WorkflowEngine::new(
            Arc::new(InMemoryWorkflowRepository::default()),
            actions,
            WorkflowLimits::default(),
        );

        let summary = load_demo_fixtures(&services, &rules, &workflows).await.unwrap();
        assert_eq!(summary, SeedSummary { members: 4, rules: 2, workflows: 2 });
        assert_eq!(rules.rules_for_event("task.created").await.unwrap().len(), 1);
        assert_eq!(workflows.scheduled_workflows().await.unwrap().len(), 1);
        assert_eq!(
            workflows.workflows_for_event("project.created").await.unwrap().len(),
            1
        );
    }
}
