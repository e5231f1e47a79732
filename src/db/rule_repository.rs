use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::automation_rule::AutomationRule;

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Fails with `Conflict` when a rule with the same id exists.
    async fn insert_rule(&self, rule: AutomationRule) -> Result<AutomationRule, AppError>;

    async fn find_rule(&self, id: Uuid) -> Result<Option<AutomationRule>, AppError>;

    /// Ascending priority; ties keep creation order.
    async fn list_rules(&self) -> Result<Vec<AutomationRule>, AppError>;

    async fn set_rule_enabled(&self, id: Uuid, enabled: bool) -> Result<AutomationRule, AppError>;

    /// Bumps `execution_count` and one of the outcome counters in a single
    /// atomic update.
    async fn record_rule_execution(
        &self,
        id: Uuid,
        success: bool,
        at: OffsetDateTime,
    ) -> Result<AutomationRule, AppError>;
}
