use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Greater,
    Less,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Between,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    /// Joins this condition's result with the *next* condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

/// Boolean expression tree with conventional precedence, used when a rule or
/// a condition step carries an `expression` instead of a flat list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionExpr {
    Leaf(RuleCondition),
    And { children: Vec<ConditionExpr> },
    Or { children: Vec<ConditionExpr> },
    Not { child: Box<ConditionExpr> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTask,
    SendNotification,
    UpdateStatus,
    AssignUser,
    CreateRfi,
    ScheduleInspection,
    SendEmail,
    Webhook,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateTask => "create_task",
            ActionType::SendNotification => "send_notification",
            ActionType::UpdateStatus => "update_status",
            ActionType::AssignUser => "assign_user",
            ActionType::CreateRfi => "create_rfi",
            ActionType::ScheduleInspection => "schedule_inspection",
            ActionType::SendEmail => "send_email",
            ActionType::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSchedule {
    #[default]
    Immediate,
    Delayed {
        #[serde(rename = "delayMinutes")]
        delay_minutes: u64,
    },
    Scheduled {
        cron: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleTrigger {
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub priority: i32,
    pub trigger: Option<RuleTrigger>,
    pub conditions: Vec<RuleCondition>,
    pub expression: Option<ConditionExpr>,
    pub actions: Vec<RuleAction>,
    pub schedule: RuleSchedule,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_executed: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AutomationRule {
    pub fn listens_to(&self, event_type: &str) -> bool {
        self.trigger
            .as_ref()
            .map(|t| t.event == event_type)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAutomationRule {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub trigger: Option<RuleTrigger>,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub expression: Option<ConditionExpr>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub schedule: RuleSchedule,
}

fn default_true() -> bool {
    true
}

impl NewAutomationRule {
    pub fn into_rule(self, now: OffsetDateTime) -> AutomationRule {
        AutomationRule {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name: self.name.trim().to_string(),
            description: self.description,
            enabled: self.enabled,
            priority: self.priority,
            trigger: self.trigger,
            conditions: self.conditions,
            expression: self.expression,
            actions: self.actions,
            schedule: self.schedule,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            last_executed: None,
            created_at: now,
        }
    }
}
