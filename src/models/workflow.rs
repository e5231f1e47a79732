use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::automation_rule::{ConditionExpr, RuleCondition};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowCategory {
    Project,
    Task,
    Quality,
    Safety,
    Approval,
    Notification,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Manual,
    Schedule,
    Event,
    Webhook,
    Condition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTrigger {
    pub id: String,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl WorkflowTrigger {
    /// Event name for `event` triggers (`configuration.event`).
    pub fn event_name(&self) -> Option<&str> {
        if self.trigger_type != TriggerType::Event {
            return None;
        }
        self.configuration.get("event").and_then(|v| v.as_str())
    }

    /// Cron expression for `schedule` triggers (`configuration.schedule` or `configuration.cron`).
    pub fn cron(&self) -> Option<&str> {
        if self.trigger_type != TriggerType::Schedule {
            return None;
        }
        self.configuration
            .get("schedule")
            .or_else(|| self.configuration.get("cron"))
            .and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Action,
    Approval,
    Notification,
    Delay,
    Condition,
    Loop,
    Parallel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    #[default]
    Stop,
    Continue,
    Retry,
    Escalate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandling {
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub retry_count: u32,
    /// Seconds between retry attempts.
    #[serde(default)]
    pub retry_delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RuleCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<ConditionExpr>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_approvals: Option<u32>,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl VariableType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            VariableType::String | VariableType::Date => value.is_string(),
            VariableType::Number => value.is_number(),
            VariableType::Boolean => value.is_boolean(),
            VariableType::Array => value.is_array(),
            VariableType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPermissions {
    #[serde(default)]
    pub can_view: Vec<String>,
    #[serde(default)]
    pub can_edit: Vec<String>,
    #[serde(default)]
    pub can_execute: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: WorkflowCategory,
    pub version: String,
    pub is_active: bool,
    pub triggers: Vec<WorkflowTrigger>,
    pub steps: Vec<WorkflowStep>,
    pub variables: Vec<WorkflowVariable>,
    pub permissions: WorkflowPermissions,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub usage_count: u64,
    /// Percentage of finished executions that completed.
    pub success_rate: f64,
}

impl WorkflowTemplate {
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The step with the lowest `order`.
    pub fn entry_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().min_by_key(|s| s.order)
    }

    pub fn listens_to(&self, event_type: &str) -> bool {
        self.triggers
            .iter()
            .any(|t| t.enabled && t.event_name() == Some(event_type))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflowTemplate {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: WorkflowCategory,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub triggers: Vec<WorkflowTrigger>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub variables: Vec<WorkflowVariable>,
    #[serde(default)]
    pub permissions: WorkflowPermissions,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "1.0".to_string()
}

impl NewWorkflowTemplate {
    pub fn into_template(self, created_by: &str, now: OffsetDateTime) -> WorkflowTemplate {
        WorkflowTemplate {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name: self.name.trim().to_string(),
            description: self.description,
            category: self.category,
            version: self.version,
            is_active: self.is_active,
            triggers: self.triggers,
            steps: self.steps,
            variables: self.variables,
            permissions: self.permissions,
            created_by: self.created_by.unwrap_or_else(|| created_by.to_string()),
            created_at: now,
            updated_at: now,
            usage_count: 0,
            success_rate: 0.0,
        }
    }
}
