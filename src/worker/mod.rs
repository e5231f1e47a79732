use std::collections::HashMap;

use serde_json::{json, Map};
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::workflow::TriggerType;
use crate::state::AppState;
use crate::utils::schedule::is_due;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ScheduleKind {
    Rule,
    Workflow,
}

/// Last fire time per cron entry. Entries the tracker has never seen count
/// from boot, so a restart never replays missed occurrences.
#[derive(Debug)]
pub struct ScheduleTracker {
    booted_at: OffsetDateTime,
    last_fire: HashMap<(ScheduleKind, Uuid, String), OffsetDateTime>,
}

impl ScheduleTracker {
    pub fn new(booted_at: OffsetDateTime) -> Self {
        ScheduleTracker {
            booted_at,
            last_fire: HashMap::new(),
        }
    }

    /// True at most once per occurrence; marks the entry fired at `now`.
    fn take_due(&mut self, kind: ScheduleKind, id: Uuid, cron: &str, now: OffsetDateTime) -> bool {
        let key = (kind, id, cron.to_string());
        let last = self.last_fire.get(&key).copied().unwrap_or(self.booted_at);
        match is_due(cron, last, now) {
            Ok(true) => {
                self.last_fire.insert(key, now);
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(?kind, %id, %err, "skipping entry with invalid cron");
                false
            }
        }
    }
}

pub async fn start_background_workers(state: AppState) {
    let interval = state.config.schedule_poll_interval;
    tokio::spawn(async move {
        let mut tracker = ScheduleTracker::new(OffsetDateTime::now_utc());
        info!(?interval, "schedule worker started");
        loop {
            sleep(interval).await;
            match process_due_schedules(&state, &mut tracker, OffsetDateTime::now_utc()).await {
                Ok(0) => {}
                Ok(fired) => debug!(fired, "scheduled work dispatched"),
                Err(err) => error!(%err, "worker: error processing schedules"),
            }
        }
    });
}

/// Fires every rule and workflow schedule with an occurrence since its last
/// run. Returns how many were started.
pub async fn process_due_schedules(
    state: &AppState,
    tracker: &mut ScheduleTracker,
    now: OffsetDateTime,
) -> Result<usize, AppError> {
    let mut fired = 0;

    if state.config.app.is_feature_enabled("automationRules") {
        for (rule_id, cron) in state.rules.scheduled_rules().await? {
            if !tracker.take_due(ScheduleKind::Rule, rule_id, &cron, now) {
                continue;
            }
            match state
                .rules
                .execute_automation_rule(rule_id, &json!({ "scheduled": true }))
                .await
            {
                Ok(_) => fired += 1,
                Err(err) => warn!(%rule_id, %err, "scheduled rule failed"),
            }
        }
    }

    if state.config.app.is_feature_enabled("workflows") {
        for (workflow_id, cron) in state.workflows.scheduled_workflows().await? {
            if !tracker.take_due(ScheduleKind::Workflow, workflow_id, &cron, now) {
                continue;
            }
            match state
                .workflows
                .execute_workflow(workflow_id, "schedule", TriggerType::Schedule, Map::new())
                .await
            {
                Ok(execution) => {
                    info!(%workflow_id, execution_id = %execution.id, "scheduled workflow started");
                    fired += 1;
                }
                Err(err) => warn!(%workflow_id, %err, "scheduled workflow did not start"),
            }
        }
    }

    Ok(fired)
}
