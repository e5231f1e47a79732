use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::ActionExecutor;
use super::conditions::evaluate;
use crate::db::rule_repository::RuleRepository;
use crate::errors::AppError;
use crate::models::automation_rule::{
    AutomationRule, ConditionExpr, ConditionOperator, NewAutomationRule, RuleCondition,
    RuleSchedule,
};
use crate::models::integration_event::IntegrationEvent;
use crate::utils::schedule::parse_cron;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub executed: usize,
    pub succeeded: usize,
    pub deferred: usize,
}

pub struct RuleEngine {
    rules: Arc<dyn RuleRepository>,
    actions: Arc<dyn ActionExecutor>,
}

impl RuleEngine {
    pub fn new(rules: Arc<dyn RuleRepository>, actions: Arc<dyn ActionExecutor>) -> Self {
        RuleEngine { rules, actions }
    }

    pub async fn create_automation_rule(
        &self,
        new: NewAutomationRule,
    ) -> Result<AutomationRule, AppError> {
        validate_rule(&new)?;
        if let Some(id) = new.id {
            if self.rules.find_rule(id).await?.is_some() {
                return Err(AppError::Conflict(format!(
                    "automation rule {id} already exists"
                )));
            }
        }
        let rule = self
            .rules
            .insert_rule(new.into_rule(OffsetDateTime::now_utc()))
            .await?;
        info!(rule_id = %rule.id, name = %rule.name, "automation rule created");
        Ok(rule)
    }

    pub async fn list_automation_rules(&self) -> Result<Vec<AutomationRule>, AppError> {
        self.rules.list_rules().await
    }

    pub async fn get_rule(&self, id: Uuid) -> Result<AutomationRule, AppError> {
        self.rules
            .find_rule(id)
            .await?
            .ok_or_else(|| AppError::not_found("automation rule", id))
    }

    pub async fn set_rule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
    ) -> Result<AutomationRule, AppError> {
        let rule = self.rules.set_rule_enabled(id, enabled).await?;
        info!(rule_id = %id, enabled, "automation rule toggled");
        Ok(rule)
    }

    /// `Ok(false)` without touching counters when the rule is disabled or its
    /// conditions do not hold. Otherwise runs actions in `order`, stopping at
    /// the first failure, and records the outcome.
    pub async fn execute_automation_rule(
        &self,
        rule_id: Uuid,
        context: &Value,
    ) -> Result<bool, AppError> {
        let rule = self.get_rule(rule_id).await?;
        if !rule.enabled {
            debug!(rule_id = %rule.id, "rule disabled; skipping");
            return Ok(false);
        }
        if !evaluate(&rule.conditions, rule.expression.as_ref(), context) {
            debug!(rule_id = %rule.id, "rule conditions not met");
            return Ok(false);
        }

        let mut actions = rule.actions.clone();
        actions.sort_by_key(|a| a.order);

        let mut ctx = as_object(context);
        let mut success = true;
        for action in &actions {
            let current = Value::Object(ctx.clone());
            match self
                .actions
                .execute(action.action_type, &action.configuration, &current)
                .await
            {
                Ok(output) => {
                    ctx.insert("previous".to_string(), output);
                }
                Err(err) => {
                    warn!(
                        rule_id = %rule.id,
                        action = action.action_type.as_str(),
                        %err,
                        "rule action failed; remaining actions skipped"
                    );
                    success = false;
                    break;
                }
            }
        }

        self.rules
            .record_rule_execution(rule.id, success, OffsetDateTime::now_utc())
            .await?;
        info!(rule_id = %rule.id, success, "automation rule executed");
        Ok(success)
    }

    /// Enabled rules triggered by `event_type`, in priority order.
    pub async fn rules_for_event(&self, event_type: &str) -> Result<Vec<AutomationRule>, AppError> {
        Ok(self
            .rules
            .list_rules()
            .await?
            .into_iter()
            .filter(|r| r.enabled && r.listens_to(event_type))
            .collect())
    }

    /// Rules with a cron schedule; the worker decides when they are due.
    pub async fn scheduled_rules(&self) -> Result<Vec<(Uuid, String)>, AppError> {
        Ok(self
            .rules
            .list_rules()
            .await?
            .into_iter()
            .filter(|r| r.enabled)
            .filter_map(|r| match r.schedule {
                RuleSchedule::Scheduled { cron } => Some((r.id, cron)),
                _ => None,
            })
            .collect())
    }

    pub async fn dispatch_event(
        self: &Arc<Self>,
        event: &IntegrationEvent,
    ) -> Result<DispatchSummary, AppError> {
        let context = event_context(event);
        let mut summary = DispatchSummary::default();

        for rule in self.rules_for_event(&event.event_type).await? {
            match rule.schedule {
                RuleSchedule::Immediate => {
                    summary.executed += 1;
                    if self.execute_automation_rule(rule.id, &context).await? {
                        summary.succeeded += 1;
                    }
                }
                RuleSchedule::Delayed { delay_minutes } => {
                    summary.deferred += 1;
                    let engine = Arc::clone(self);
                    let ctx = context.clone();
                    let rule_id = rule.id;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay_for(delay_minutes)).await;
                        if let Err(err) = engine.execute_automation_rule(rule_id, &ctx).await {
                            warn!(%rule_id, %err, "delayed rule execution failed");
                        }
                    });
                }
                RuleSchedule::Scheduled { .. } => {}
            }
        }

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            executed = summary.executed,
            deferred = summary.deferred,
            "rules dispatched"
        );
        Ok(summary)
    }
}

/// The event's data with an `event` envelope added alongside it.
pub(crate) fn event_context(event: &IntegrationEvent) -> Value {
    let mut ctx = as_object(&event.data);
    ctx.insert(
        "event".to_string(),
        json!({
            "id": event.id,
            "type": event.event_type,
            "source": event.source,
            "target": event.target,
        }),
    );
    Value::Object(ctx)
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other.clone());
            map
        }
    }
}

/// Saturates instead of overflowing on absurd delays.
fn delay_for(delay_minutes: u64) -> Duration {
    Duration::from_secs(delay_minutes.saturating_mul(60))
}

fn validate_rule(new: &NewAutomationRule) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if new.name.trim().is_empty() {
        errors.push("Rule name is required".to_string());
    }
    if new.actions.is_empty() {
        errors.push("At least one action is required".to_string());
    }
    if let Some(trigger) = &new.trigger {
        if trigger.event.trim().is_empty() {
            errors.push("Trigger event must not be blank".to_string());
        }
    }
    let mut leaves: Vec<&RuleCondition> = new.conditions.iter().collect();
    if let Some(expr) = &new.expression {
        collect_leaves(expr, &mut leaves);
    }
    for condition in leaves {
        if condition.field.trim().is_empty() {
            errors.push("Condition field is required".to_string());
        }
        if condition.operator == ConditionOperator::Between
            && condition.value.as_array().map(Vec::len) != Some(2)
        {
            errors.push(format!(
                "Condition on `{}` uses between and needs a two-element array",
                condition.field
            ));
        }
    }
    if let RuleSchedule::Scheduled { cron } = &new.schedule {
        if let Err(err) = parse_cron(cron) {
            errors.push(err.to_string());
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub(crate) fn collect_leaves<'a>(expr: &'a ConditionExpr, out: &mut Vec<&'a RuleCondition>) {
    match expr {
        ConditionExpr::Leaf(c) => out.push(c),
        ConditionExpr::And { children } | ConditionExpr::Or { children } => {
            children.iter().for_each(|c| collect_leaves(c, out))
        }
        ConditionExpr::Not { child } => collect_leaves(child, out),
    }
}
