use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::event_repository::EventRepository;
use crate::db::webhook_repository::WebhookRepository;
use crate::engine::{RuleEngine, WorkflowEngine};
use crate::errors::AppError;
use crate::models::construction::WorkloadEntry;
use crate::models::integration_event::{EventDeadLetter, IntegrationEvent, PublishEvent};
use crate::models::notification::{NewNotification, NotificationKind, Priority};
use crate::services::insights::QUALITY_SCORE_KPI;
use crate::services::scheduling::NewProjectSchedule;
use crate::services::webhook_sender::{WebhookDelivery, WebhookSender};
use crate::services::Collaborators;

const LOW_QUALITY_SCORE: f64 = 80.0;
const DEFAULT_TASK_HOURS: f64 = 8.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookFanout {
    pub attempted: usize,
    pub succeeded: usize,
}

#[derive(Clone)]
pub struct IntegrationBus {
    pub events: Arc<dyn EventRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub sender: Arc<dyn WebhookSender>,
    pub rules: Arc<RuleEngine>,
    pub workflows: Arc<WorkflowEngine>,
    pub services: Collaborators,
    pub config: Arc<AppConfig>,
    /// First retry waits this long; later ones scale with the attempt count.
    pub retry_base: Duration,
}

impl IntegrationBus {
    pub async fn publish_event(
        self: &Arc<Self>,
        new: PublishEvent,
    ) -> Result<IntegrationEvent, AppError> {
        let mut errors = Vec::new();
        if new.event_type.trim().is_empty() {
            errors.push("Event type is required".to_string());
        }
        if new.source.trim().is_empty() {
            errors.push("Event source is required".to_string());
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let event = IntegrationEvent::new(new.event_type.trim(), new.source.trim(), new.data, new.target);
        let event = self.events.insert_event(event).await?;
        info!(event_id = %event.id, event_type = %event.event_type, source = %event.source, "event published");
        self.process(event).await
    }

    pub async fn list_events(&self) -> Result<Vec<IntegrationEvent>, AppError> {
        self.events.list_events().await
    }

    pub async fn get_event(&self, id: Uuid) -> Result<IntegrationEvent, AppError> {
        self.events
            .find_event(id)
            .await?
            .ok_or_else(|| AppError::not_found("event", id))
    }

    pub async fn list_dead_letters(&self) -> Result<Vec<EventDeadLetter>, AppError> {
        self.events.list_dead_letters().await
    }

    /// Moves a dead letter back onto the bus with a fresh retry budget.
    pub async fn requeue_dead_letter(
        self: &Arc<Self>,
        id: Uuid,
    ) -> Result<IntegrationEvent, AppError> {
        let dead = self.events.take_dead_letter(id).await?;
        let mut event = dead.event;
        event.retry_count = 0;
        event.processed = false;
        event.last_error = None;
        self.events.save_event(&event).await?;
        info!(event_id = %event.id, dead_letter_id = %id, "dead letter requeued");
        self.process(event).await
    }

    async fn process(
        self: &Arc<Self>,
        mut event: IntegrationEvent,
    ) -> Result<IntegrationEvent, AppError> {
        match self.handle(&event).await {
            Ok(()) => {
                event.processed = true;
                event.last_error = None;
                self.events.save_event(&event).await?;
                debug!(event_id = %event.id, "event processed");
            }
            Err(err) => {
                event.retry_count += 1;
                event.last_error = Some(err.to_string());
                self.events.save_event(&event).await?;

                let limit = self.config.performance.event_retry_limit;
                if event.retry_count < limit {
                    let delay = self.retry_base * event.retry_count;
                    warn!(
                        event_id = %event.id,
                        attempt = event.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "event processing failed, retrying"
                    );
                    self.schedule_retry(event.id, delay);
                } else {
                    self.events
                        .insert_dead_letter(EventDeadLetter {
                            id: Uuid::new_v4(),
                            event: event.clone(),
                            error: err.to_string(),
                            created_at: OffsetDateTime::now_utc(),
                        })
                        .await?;
                    warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        attempts = event.retry_count,
                        %err,
                        "event moved to dead letters"
                    );
                }
            }
        }
        Ok(event)
    }

    fn schedule_retry(self: &Arc<Self>, id: Uuid, delay: Duration) {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = bus.retry(id).await {
                warn!(event_id = %id, %err, "event retry aborted");
            }
        });
    }

    async fn retry(self: &Arc<Self>, id: Uuid) -> Result<(), AppError> {
        let event = self.get_event(id).await?;
        if event.processed {
            return Ok(());
        }
        self.process(event).await.map(|_| ())
    }

    async fn handle(self: &Arc<Self>, event: &IntegrationEvent) -> Result<(), AppError> {
        self.handle_builtin(event).await?;

        if self.config.is_feature_enabled("automationRules") {
            self.rules.dispatch_event(event).await?;
        }
        if self.config.is_feature_enabled("workflows") {
            self.workflows.trigger_event_workflows(event).await?;
        }
        if self.config.is_feature_enabled("webhooks") && self.config.integrations.webhooks_enabled {
            self.trigger_webhooks(event).await?;
        }
        Ok(())
    }

    async fn handle_builtin(&self, event: &IntegrationEvent) -> Result<(), AppError> {
        let data = &event.data;
        match event.event_type.as_str() {
            "project.created" => {
                let project_id = str_field(data, &["id", "projectId"]).unwrap_or_default();
                let name = str_field(data, &["name"]).unwrap_or_else(|| "Project".to_string());
                self.services.scheduling.create_project_schedule(
                    &project_id,
                    NewProjectSchedule {
                        name: format!("{name} Schedule"),
                        start_date: str_field(data, &["startDate"]),
                        end_date: str_field(data, &["endDate"]),
                        ..Default::default()
                    },
                )?;
                if let Some(manager) = str_field(data, &["managerId"]) {
                    self.services.notifications.create(NewNotification {
                        user_id: manager,
                        kind: NotificationKind::Project,
                        title: "New Project Created".to_string(),
                        message: format!("Project {name} has been created and is ready for planning"),
                        data: Some(data.clone()),
                        priority: Priority::Medium,
                        category: Some("project".to_string()),
                        action_url: Some(format!("/projects/{project_id}")),
                    })?;
                }
            }
            "task.assigned" => {
                let Some(assignee) = str_field(data, &["assignedToId", "assignedTo"]) else {
                    return Ok(());
                };
                let ctx = json!({ "task": data, "project": data.get("project").cloned().unwrap_or(Value::Null) });
                self.services.notifications.create_from_template(
                    "task-assigned",
                    &assignee,
                    &ctx,
                    None,
                )?;
                if self.services.team.get_member(&assignee).is_some() {
                    self.services.team.update_member_workload(
                        &assignee,
                        WorkloadEntry {
                            task_id: str_field(data, &["id", "taskId"]),
                            estimated_hours: data
                                .get("estimatedHours")
                                .and_then(Value::as_f64)
                                .unwrap_or(DEFAULT_TASK_HOURS),
                            priority: str_field(data, &["priority"]),
                        },
                    )?;
                }
            }
            "inspection.completed" => {
                let Some(score) = data.get("overallScore").and_then(Value::as_f64) else {
                    return Ok(());
                };
                self.services.insights.update_kpi(QUALITY_SCORE_KPI, score)?;
                if score < LOW_QUALITY_SCORE {
                    let project = str_field(data, &["projectId"]);
                    self.services
                        .insights
                        .generate_recommendations(project.as_deref(), "quality_improvement");
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Delivers the event to every enabled endpoint subscribed to its type.
    /// Deliveries are independent; a failing endpoint only bumps its own
    /// failure counter.
    pub async fn trigger_webhooks(&self, event: &IntegrationEvent) -> Result<WebhookFanout, AppError> {
        let endpoints: Vec<_> = self
            .webhooks
            .list_webhooks()
            .await?
            .into_iter()
            .filter(|w| w.enabled && w.subscribed_to(&event.event_type))
            .collect();
        if endpoints.is_empty() {
            return Ok(WebhookFanout::default());
        }

        let timestamp = event.timestamp.format(&Rfc3339).unwrap_or_default();
        let payload = json!({
            "event": event.event_type,
            "data": event.data,
            "timestamp": timestamp,
        });

        let mut set = JoinSet::new();
        for endpoint in &endpoints {
            let sender = Arc::clone(&self.sender);
            let delivery = WebhookDelivery {
                url: endpoint.url.clone(),
                secret: endpoint.secret.clone(),
                event_type: event.event_type.clone(),
                payload: payload.clone(),
            };
            let id = endpoint.id;
            set.spawn(async move { (id, sender.deliver(delivery).await) });
        }

        let mut fanout = WebhookFanout {
            attempted: endpoints.len(),
            succeeded: 0,
        };
        while let Some(joined) = set.join_next().await {
            let (id, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(event_id = %event.id, %err, "webhook delivery task failed");
                    continue;
                }
            };
            let success = match result {
                Ok(status) => (200..300).contains(&status),
                Err(err) => {
                    warn!(webhook_id = %id, event_id = %event.id, %err, "webhook delivery failed");
                    false
                }
            };
            if success {
                fanout.succeeded += 1;
            }
            if let Err(err) = self
                .webhooks
                .record_delivery(id, success, OffsetDateTime::now_utc())
                .await
            {
                warn!(webhook_id = %id, event_id = %event.id, %err, "webhook delivery not recorded");
            }
        }
        debug!(
            event_id = %event.id,
            attempted = fanout.attempted,
            succeeded = fanout.succeeded,
            "webhooks triggered"
        );
        Ok(fanout)
    }
}

fn str_field(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match data.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
