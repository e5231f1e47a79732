use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

use super::api_key_repository::ApiKeyRepository;
use super::event_repository::EventRepository;
use super::rule_repository::RuleRepository;
use super::user_repository::{NewUserRecord, UserRepository};
use super::webhook_repository::{WebhookInsert, WebhookRepository};
use super::workflow_repository::WorkflowRepository;
use crate::errors::AppError;
use crate::models::api_key::PlatformApiKey;
use crate::models::automation_rule::AutomationRule;
use crate::models::integration_event::{EventDeadLetter, IntegrationEvent};
use crate::models::user::User;
use crate::models::webhook::WebhookEndpoint;
use crate::models::workflow::WorkflowTemplate;
use crate::models::workflow_execution::{ExecutionFilter, WorkflowExecution};

/// Insertion sequence used to keep ties stable when sorting.
#[derive(Default)]
struct Sequence(AtomicU64);

impl Sequence {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

// Counter updates happen inside a single `get_mut` so the entry lock is held
// for the whole read-modify-write.

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: DashMap<Uuid, (u64, AutomationRule)>,
    seq: Sequence,
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn insert_rule(&self, rule: AutomationRule) -> Result<AutomationRule, AppError> {
        use dashmap::mapref::entry::Entry;
        match self.rules.entry(rule.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "automation rule {} already exists",
                rule.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert((self.seq.next(), rule.clone()));
                Ok(rule)
            }
        }
    }

    async fn find_rule(&self, id: Uuid) -> Result<Option<AutomationRule>, AppError> {
        Ok(self.rules.get(&id).map(|r| r.1.clone()))
    }

    async fn list_rules(&self) -> Result<Vec<AutomationRule>, AppError> {
        let mut rules: Vec<(u64, AutomationRule)> =
            self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then(a.0.cmp(&b.0)));
        Ok(rules.into_iter().map(|(_, rule)| rule).collect())
    }

    async fn set_rule_enabled(&self, id: Uuid, enabled: bool) -> Result<AutomationRule, AppError> {
        let mut entry = self
            .rules
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("automation rule", id))?;
        entry.1.enabled = enabled;
        Ok(entry.1.clone())
    }

    async fn record_rule_execution(
        &self,
        id: Uuid,
        success: bool,
        at: OffsetDateTime,
    ) -> Result<AutomationRule, AppError> {
        let mut entry = self
            .rules
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("automation rule", id))?;
        let rule = &mut entry.1;
        rule.execution_count += 1;
        if success {
            rule.success_count += 1;
        } else {
            rule.failure_count += 1;
        }
        rule.last_executed = Some(at);
        Ok(rule.clone())
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    templates: DashMap<Uuid, WorkflowTemplate>,
    executions: DashMap<Uuid, WorkflowExecution>,
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn insert_template(
        &self,
        template: WorkflowTemplate,
    ) -> Result<WorkflowTemplate, AppError> {
        use dashmap::mapref::entry::Entry;
        match self.templates.entry(template.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "workflow {} already exists",
                template.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(template.clone());
                Ok(template)
            }
        }
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, AppError> {
        Ok(self.templates.get(&id).map(|t| t.clone()))
    }

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, AppError> {
        let mut all: Vec<WorkflowTemplate> = self.templates.iter().map(|t| t.clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn set_template_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<WorkflowTemplate, AppError> {
        let mut template = self
            .templates
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("workflow", id))?;
        template.is_active = active;
        template.updated_at = OffsetDateTime::now_utc();
        Ok(template.clone())
    }

    async fn increment_usage(&self, id: Uuid) -> Result<WorkflowTemplate, AppError> {
        let mut template = self
            .templates
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("workflow", id))?;
        template.usage_count += 1;
        Ok(template.clone())
    }

    async fn set_success_rate(&self, id: Uuid, rate: f64) -> Result<(), AppError> {
        let mut template = self
            .templates
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("workflow", id))?;
        template.success_rate = rate;
        Ok(())
    }

    async fn insert_execution(
        &self,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecution, AppError> {
        self.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn find_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, AppError> {
        Ok(self.executions.get(&id).map(|e| e.clone()))
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), AppError> {
        let mut stored = self
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| AppError::not_found("workflow execution", execution.id))?;
        *stored = execution.clone();
        Ok(())
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<WorkflowExecution>, AppError> {
        let mut found: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.clone())
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryEventRepository {
    events: DashMap<Uuid, IntegrationEvent>,
    dead_letters: DashMap<Uuid, EventDeadLetter>,
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn insert_event(&self, event: IntegrationEvent) -> Result<IntegrationEvent, AppError> {
        self.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn save_event(&self, event: &IntegrationEvent) -> Result<(), AppError> {
        self.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<IntegrationEvent>, AppError> {
        Ok(self.events.get(&id).map(|e| e.clone()))
    }

    async fn list_events(&self) -> Result<Vec<IntegrationEvent>, AppError> {
        let mut all: Vec<IntegrationEvent> = self.events.iter().map(|e| e.clone()).collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(all)
    }

    async fn insert_dead_letter(&self, dead: EventDeadLetter) -> Result<(), AppError> {
        self.dead_letters.insert(dead.id, dead);
        Ok(())
    }

    async fn list_dead_letters(&self) -> Result<Vec<EventDeadLetter>, AppError> {
        let mut all: Vec<EventDeadLetter> = self.dead_letters.iter().map(|d| d.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn take_dead_letter(&self, id: Uuid) -> Result<EventDeadLetter, AppError> {
        self.dead_letters
            .remove(&id)
            .map(|(_, dead)| dead)
            .ok_or_else(|| AppError::not_found("dead letter", id))
    }
}

#[derive(Default)]
pub struct InMemoryWebhookRepository {
    webhooks: DashMap<Uuid, WebhookEndpoint>,
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn create_webhook(&self, new: WebhookInsert) -> Result<WebhookEndpoint, AppError> {
        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            name: new.name,
            url: new.url,
            events: new.events,
            secret: new.secret,
            enabled: new.enabled,
            last_triggered: None,
            success_count: 0,
            failure_count: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        self.webhooks.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookEndpoint>, AppError> {
        let mut all: Vec<WebhookEndpoint> = self.webhooks.iter().map(|w| w.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, AppError> {
        Ok(self.webhooks.get(&id).map(|w| w.clone()))
    }

    async fn delete_webhook(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.webhooks.remove(&id).is_some())
    }

    async fn record_delivery(
        &self,
        id: Uuid,
        success: bool,
        at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut endpoint = self
            .webhooks
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("webhook", id))?;
        endpoint.last_triggered = Some(at);
        if success {
            endpoint.success_count += 1;
        } else {
            endpoint.failure_count += 1;
        }
        Ok(())
    }

    async fn mark_triggered(&self, id: Uuid, at: OffsetDateTime) -> Result<(), AppError> {
        let mut endpoint = self
            .webhooks
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("webhook", id))?;
        endpoint.last_triggered = Some(at);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApiKeyRepository {
    keys: DashMap<Uuid, PlatformApiKey>,
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn create_api_key(&self, name: &str, key: &str) -> Result<PlatformApiKey, AppError> {
        let record = PlatformApiKey {
            id: Uuid::new_v4(),
            name: name.to_string(),
            key: key.to_string(),
            created_at: OffsetDateTime::now_utc(),
            last_used: None,
        };
        self.keys.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_api_keys(&self) -> Result<Vec<PlatformApiKey>, AppError> {
        let mut all: Vec<PlatformApiKey> = self.keys.iter().map(|k| k.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn delete_api_key(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.keys.remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<Uuid, User>,
    /// Lowercased email -> id.
    emails: DashMap<String, Uuid>,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, new: NewUserRecord) -> Result<User, AppError> {
        use dashmap::mapref::entry::Entry;
        let key = new.email.trim().to_lowercase();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email.trim().to_string(),
            password_hash: new.password_hash,
            name: new.name.trim().to_string(),
            company_name: new.company_name.trim().to_string(),
            role: new.role,
            created_at: OffsetDateTime::now_utc(),
        };
        match self.emails.entry(key) {
            Entry::Occupied(_) => Err(AppError::Conflict(
                "An account with this email already exists".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let key = email.trim().to_lowercase();
        Ok(self
            .emails
            .get(&key)
            .and_then(|id| self.users.get(id.value()).map(|u| u.clone())))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::automation_rule::NewAutomationRule;
    use crate::models::user::UserRole;
    use serde_json::json;
    use std::sync::Arc;

    fn rule(priority: i32) -> AutomationRule {
        let new: NewAutomationRule =
            serde_json::from_value(json!({"name": "r", "priority": priority})).unwrap();
        new.into_rule(OffsetDateTime::now_utc())
    }

    #[tokio::test]
    async fn rules_list_by_priority_and_reject_duplicate_ids() {
        let repo = InMemoryRuleRepository::default();
        let late = repo.insert_rule(rule(5)).await.unwrap();
        let early = repo.insert_rule(rule(1)).await.unwrap();
        let ids: Vec<Uuid> = repo.list_rules().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);

        assert!(matches!(
            repo.insert_rule(early.clone()).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_counter_updates_do_not_lose_increments() {
        let repo = Arc::new(InMemoryRuleRepository::default());
        let id = repo.insert_rule(rule(0)).await.unwrap().id;

        let mut handles = Vec::new();
        for i in 0..64 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.record_rule_execution(id, i % 2 == 0, OffsetDateTime::now_utc())
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let stored = repo.find_rule(id).await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 64);
        assert_eq!(stored.success_count, 32);
        assert_eq!(stored.failure_count, 32);
    }

    #[tokio::test]
    async fn user_emails_are_unique_ignoring_case() {
        let repo = InMemoryUserRepository::default();
        let record = |email: &str| NewUserRecord {
            email: email.into(),
            password_hash: "hash".into(),
            name: "Pat".into(),
            company_name: "Acme Build".into(),
            role: UserRole::ProjectManager,
        };
        repo.create_user(record("pat@acme.co")).await.unwrap();
        assert!(matches!(
            repo.create_user(record("PAT@acme.co")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(repo.find_user_by_email(" Pat@Acme.co ").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dead_letters_are_taken_once() {
        let repo = InMemoryEventRepository::default();
        let dead = EventDeadLetter {
            id: Uuid::new_v4(),
            event: IntegrationEvent::new("task.assigned", "tests", json!({}), None),
            error: "boom".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        let id = dead.id;
        repo.insert_dead_letter(dead).await.unwrap();
        assert!(repo.take_dead_letter(id).await.is_ok());
        assert!(matches!(
            repo.take_dead_letter(id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
