use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::workflow::{TriggerType, WorkflowCategory};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepApproval {
    pub id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub decision: ApprovalDecision,
    pub comments: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedStep {
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub assigned_to: Option<String>,
    pub approvals: Vec<StepApproval>,
}

impl ExecutedStep {
    pub fn pending(step_id: &str, step_name: &str, assigned_to: Option<String>) -> Self {
        ExecutedStep {
            step_id: step_id.to_string(),
            step_name: step_name.to_string(),
            status: StepStatus::Pending,
            attempts: 0,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            assigned_to,
            approvals: Vec::new(),
        }
    }

    pub fn approved_count(&self) -> usize {
        self.approvals
            .iter()
            .filter(|a| a.decision == ApprovalDecision::Approved)
            .count()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
    pub step_id: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub triggered_by: String,
    pub trigger_type: TriggerType,
    pub status: ExecutionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub current_step: Option<String>,
    pub executed_steps: Vec<ExecutedStep>,
    pub variables: Map<String, Value>,
    pub logs: Vec<ExecutionLog>,
    pub error: Option<String>,
    /// Seconds between start and completion.
    pub duration: Option<f64>,
    /// Steps still to visit, top of the stack last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_steps: Vec<String>,
    #[serde(default)]
    pub transitions: usize,
}

impl WorkflowExecution {
    pub fn log(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        step_id: Option<&str>,
        data: Option<Value>,
    ) {
        self.logs.push(ExecutionLog {
            id: Uuid::new_v4(),
            timestamp: OffsetDateTime::now_utc(),
            level,
            message: message.into(),
            step_id: step_id.map(str::to_string),
            data,
        });
    }

    /// Most recent record for `step_id` (a step inside a loop can run more than once).
    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut ExecutedStep> {
        self.executed_steps
            .iter_mut()
            .rev()
            .find(|s| s.step_id == step_id)
    }

    pub fn step(&self, step_id: &str) -> Option<&ExecutedStep> {
        self.executed_steps.iter().rev().find(|s| s.step_id == step_id)
    }

    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        let now = OffsetDateTime::now_utc();
        self.status = status;
        self.error = error;
        self.completed_at = Some(now);
        self.duration = Some((now - self.started_at).as_seconds_f64());
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFilter {
    pub workflow_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub triggered_by: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub to: Option<OffsetDateTime>,
}

impl ExecutionFilter {
    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        if let Some(id) = self.workflow_id {
            if execution.workflow_id != id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if execution.status != status {
                return false;
            }
        }
        if let Some(by) = self.triggered_by.as_deref() {
            if execution.triggered_by != by {
                return false;
            }
        }
        if let Some(from) = self.from {
            if execution.started_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if execution.started_at > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowUsage {
    pub workflow_id: Uuid,
    pub name: String,
    pub usage_count: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub executions: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetrics {
    pub total_workflows: usize,
    pub active_workflows: usize,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub average_execution_time: f64,
    pub top_workflows: Vec<WorkflowUsage>,
    pub recent_executions: Vec<WorkflowExecution>,
    pub performance_by_category: BTreeMap<WorkflowCategory, CategoryPerformance>,
}
