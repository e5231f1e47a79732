use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::delay::{compute_delay_plan, parse_delay_config};
use super::actions::ActionExecutor;
use super::conditions::evaluate;
use super::graph::{nested_step_ids, successors, validate_workflow};
use super::templating::lookup_path;
use crate::db::workflow_repository::WorkflowRepository;
use crate::errors::AppError;
use crate::models::automation_rule::ActionType;
use crate::models::integration_event::IntegrationEvent;
use crate::models::workflow::{
    NewWorkflowTemplate, OnError, StepType, TriggerType, WorkflowCategory, WorkflowStep,
    WorkflowTemplate,
};
use crate::models::workflow_execution::{
    ApprovalDecision, CategoryPerformance, ExecutedStep, ExecutionFilter, ExecutionStatus,
    LogLevel, StepApproval, StepStatus, WorkflowExecution, WorkflowMetrics, WorkflowUsage,
};

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<StepOutcome, AppError>> + Send + 'a>>;
type BranchFuture = Pin<Box<dyn Future<Output = Result<(String, Value), AppError>> + Send>>;

#[derive(Debug, Clone)]
pub struct WorkflowLimits {
    pub max_step_transitions: usize,
    pub max_concurrent: usize,
    /// Adds debug-level entries (step outputs) to execution logs.
    pub verbose_logs: bool,
}

impl Default for WorkflowLimits {
    fn default() -> Self {
        WorkflowLimits {
            max_step_transitions: 500,
            max_concurrent: 50,
            verbose_logs: false,
        }
    }
}

enum StepOutcome {
    Completed {
        output: Value,
        condition: Option<bool>,
    },
    AwaitApproval,
}

impl StepOutcome {
    fn done(output: Value) -> Self {
        StepOutcome::Completed {
            output,
            condition: None,
        }
    }
}

enum Next {
    Run(WorkflowStep),
    Skip,
    Finished,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum After {
    Continue,
    AwaitingApproval,
    Escalated,
    Finished,
    Halt,
}

/// Walks a template's step graph with a LIFO work list persisted on the
/// execution (`pending_steps`), so a paused run resumes where it stopped.
/// Step bodies run outside the per-execution lock taken by `mutate`.
pub struct WorkflowEngine {
    repo: Arc<dyn WorkflowRepository>,
    actions: Arc<dyn ActionExecutor>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    limits: WorkflowLimits,
}

impl WorkflowEngine {
    pub fn new(
        repo: Arc<dyn WorkflowRepository>,
        actions: Arc<dyn ActionExecutor>,
        limits: WorkflowLimits,
    ) -> Self {
        WorkflowEngine {
            repo,
            actions,
            locks: DashMap::new(),
            limits,
        }
    }

    // ---- templates -------------------------------------------------------

    pub async fn create_workflow(
        &self,
        new: NewWorkflowTemplate,
        created_by: &str,
    ) -> Result<WorkflowTemplate, AppError> {
        validate_workflow(&new)?;
        let template = self
            .repo
            .insert_template(new.into_template(created_by, OffsetDateTime::now_utc()))
            .await?;
        info!(workflow_id = %template.id, name = %template.name, "workflow created");
        Ok(template)
    }

    /// Most used first.
    pub async fn list_workflows(
        &self,
        category: Option<WorkflowCategory>,
    ) -> Result<Vec<WorkflowTemplate>, AppError> {
        let mut templates: Vec<WorkflowTemplate> = self
            .repo
            .list_templates()
            .await?
            .into_iter()
            .filter(|t| category.map(|c| t.category == c).unwrap_or(true))
            .collect();
        templates.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        Ok(templates)
    }

    pub async fn get_workflow(&self, id: Uuid) -> Result<WorkflowTemplate, AppError> {
        self.repo
            .find_template(id)
            .await?
            .ok_or_else(|| AppError::not_found("workflow", id))
    }

    pub async fn set_workflow_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<WorkflowTemplate, AppError> {
        self.repo.set_template_active(id, active).await
    }

    /// Active templates with an enabled event trigger for `event_type`.
    pub async fn workflows_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WorkflowTemplate>, AppError> {
        Ok(self
            .repo
            .list_templates()
            .await?
            .into_iter()
            .filter(|t| t.is_active && t.listens_to(event_type))
            .collect())
    }

    /// `(workflow id, cron)` for every enabled schedule trigger on an active template.
    pub async fn scheduled_workflows(&self) -> Result<Vec<(Uuid, String)>, AppError> {
        Ok(self
            .repo
            .list_templates()
            .await?
            .into_iter()
            .filter(|t| t.is_active)
            .flat_map(|t| {
                t.triggers
                    .iter()
                    .filter(|tr| tr.enabled)
                    .filter_map(|tr| tr.cron().map(|c| (t.id, c.to_string())))
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    // ---- executions ------------------------------------------------------

    /// Creates the execution and drives it on a spawned task.
    pub async fn execute_workflow(
        self: &Arc<Self>,
        workflow_id: Uuid,
        triggered_by: &str,
        trigger_type: TriggerType,
        variables: Map<String, Value>,
    ) -> Result<WorkflowExecution, AppError> {
        let execution = self
            .start_execution(workflow_id, triggered_by, trigger_type, variables)
            .await?;
        self.spawn_drive(execution.id);
        Ok(execution)
    }

    /// Same as [`execute_workflow`](Self::execute_workflow) but drives the
    /// graph before returning; the result is completed, failed or paused.
    pub async fn execute_workflow_inline(
        self: &Arc<Self>,
        workflow_id: Uuid,
        triggered_by: &str,
        trigger_type: TriggerType,
        variables: Map<String, Value>,
    ) -> Result<WorkflowExecution, AppError> {
        let execution = self
            .start_execution(workflow_id, triggered_by, trigger_type, variables)
            .await?;
        Arc::clone(self).drive(execution.id).await?;
        self.get_execution(execution.id).await
    }

    /// Starts every workflow listening for the event. Start failures are
    /// logged and skipped; returns how many executions began.
    pub async fn trigger_event_workflows(
        self: &Arc<Self>,
        event: &IntegrationEvent,
    ) -> Result<usize, AppError> {
        let variables = match &event.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let triggered_by = format!("event:{}", event.event_type);
        let mut started = 0;
        for template in self.workflows_for_event(&event.event_type).await? {
            match self
                .execute_workflow(template.id, &triggered_by, TriggerType::Event, variables.clone())
                .await
            {
                Ok(_) => started += 1,
                Err(err) => warn!(
                    workflow_id = %template.id,
                    event_id = %event.id,
                    %err,
                    "event-triggered workflow did not start"
                ),
            }
        }
        Ok(started)
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution, AppError> {
        self.repo
            .find_execution(id)
            .await?
            .ok_or_else(|| AppError::not_found("workflow execution", id))
    }

    pub async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<WorkflowExecution>, AppError> {
        self.repo.list_executions(filter).await
    }

    pub async fn cancel_execution(&self, id: Uuid) -> Result<WorkflowExecution, AppError> {
        let (execution, _) = self
            .mutate(id, |exec| {
                if exec.status.is_terminal() {
                    return Err(AppError::Conflict(format!(
                        "Execution {} is already {}",
                        exec.id,
                        status_label(exec.status)
                    )));
                }
                for step in exec.executed_steps.iter_mut() {
                    if matches!(step.status, StepStatus::Running | StepStatus::Pending) {
                        step.status = StepStatus::Skipped;
                    }
                }
                exec.pending_steps.clear();
                exec.finish(ExecutionStatus::Cancelled, None);
                exec.log(LogLevel::Warning, "Workflow execution cancelled", None, None);
                Ok(())
            })
            .await?;
        info!(execution_id = %id, "workflow execution cancelled");
        self.finalize(&execution).await;
        Ok(execution)
    }

    /// Re-runs the current step of an execution paused by escalation.
    pub async fn resume_execution(
        self: &Arc<Self>,
        id: Uuid,
    ) -> Result<WorkflowExecution, AppError> {
        let (execution, _) = self
            .mutate(id, |exec| {
                if exec.status != ExecutionStatus::Paused {
                    return Err(AppError::Conflict(format!(
                        "Execution {} is {}, not paused",
                        exec.id,
                        status_label(exec.status)
                    )));
                }
                let current = exec
                    .current_step
                    .clone()
                    .ok_or_else(|| AppError::Conflict("Execution has no current step".into()))?;
                match exec.step(&current) {
                    Some(step) if step.status == StepStatus::Pending => {}
                    _ => {
                        return Err(AppError::Conflict(
                            "Execution is waiting for approvals, not escalation".into(),
                        ))
                    }
                }
                exec.pending_steps.push(current.clone());
                exec.status = ExecutionStatus::Running;
                exec.log(LogLevel::Info, "Workflow execution resumed", Some(&current), None);
                Ok(())
            })
            .await?;
        self.spawn_drive(id);
        Ok(execution)
    }

    pub async fn submit_approval(
        self: &Arc<Self>,
        id: Uuid,
        step_id: &str,
        user_id: &str,
        user_name: &str,
        decision: ApprovalDecision,
        comments: Option<String>,
    ) -> Result<WorkflowExecution, AppError> {
        let current = self.get_execution(id).await?;
        let template = self.get_workflow(current.workflow_id).await?;
        let step = template
            .step(step_id)
            .filter(|s| s.step_type == StepType::Approval)
            .ok_or_else(|| AppError::not_found("approval step", step_id))?;
        let required = step.required_approvals.unwrap_or(1) as usize;
        let verbose = self.limits.verbose_logs;

        let (execution, after) = self
            .mutate(id, |exec| {
                if exec.status != ExecutionStatus::Paused
                    || exec.current_step.as_deref() != Some(step_id)
                {
                    return Err(AppError::Conflict(format!(
                        "Execution is not waiting on step `{step_id}`"
                    )));
                }
                let record = exec
                    .step_mut(step_id)
                    .filter(|r| r.status == StepStatus::Running)
                    .ok_or_else(|| {
                        AppError::Conflict(format!("Step `{step_id}` is not awaiting approval"))
                    })?;
                if record
                    .approvals
                    .iter()
                    .any(|a| a.user_id == user_id && a.decision != ApprovalDecision::Pending)
                {
                    return Err(AppError::Conflict(format!(
                        "{user_name} has already decided on this step"
                    )));
                }
                record.approvals.push(StepApproval {
                    id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    user_name: user_name.to_string(),
                    decision,
                    comments: comments.clone(),
                    timestamp: OffsetDateTime::now_utc(),
                });
                let approved = record.approved_count();
                let attempts = record.attempts;
                let approvers: Vec<String> = record
                    .approvals
                    .iter()
                    .filter(|a| a.decision == ApprovalDecision::Approved)
                    .map(|a| a.user_name.clone())
                    .collect();
                exec.log(
                    LogLevel::Info,
                    format!("{user_name} recorded `{}` on {}", decision_label(decision), step.name),
                    Some(step_id),
                    None,
                );

                Ok(match decision {
                    ApprovalDecision::Rejected => {
                        let err = AppError::Conflict(format!("Approval rejected by {user_name}"));
                        apply_failure(exec, step, attempts, &err)
                    }
                    ApprovalDecision::Approved if approved >= required => {
                        exec.status = ExecutionStatus::Running;
                        complete_step(
                            exec,
                            step,
                            attempts,
                            json!({ "approvals": approved, "approvedBy": approvers }),
                            None,
                            verbose,
                        );
                        After::Continue
                    }
                    _ => After::AwaitingApproval,
                })
            })
            .await?;

        match after {
            After::Continue => self.spawn_drive(id),
            After::Finished => self.finalize(&execution).await,
            _ => {}
        }
        Ok(execution)
    }

    pub async fn workflow_metrics(&self) -> Result<WorkflowMetrics, AppError> {
        let templates = self.repo.list_templates().await?;
        let executions = self.repo.list_executions(&ExecutionFilter::default()).await?;

        let successful = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .count();
        let failed = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Failed)
            .count();
        let durations: Vec<f64> = executions.iter().filter_map(|e| e.duration).collect();
        let average_execution_time = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        let mut by_usage = templates.clone();
        by_usage.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        let top_workflows = by_usage
            .iter()
            .take(5)
            .map(|t| WorkflowUsage {
                workflow_id: t.id,
                name: t.name.clone(),
                usage_count: t.usage_count,
                success_rate: t.success_rate,
            })
            .collect();

        let mut grouped: BTreeMap<WorkflowCategory, Vec<&WorkflowTemplate>> = BTreeMap::new();
        for template in &templates {
            grouped.entry(template.category).or_default().push(template);
        }
        let performance_by_category = grouped
            .into_iter()
            .map(|(category, members)| {
                let executions = members.iter().map(|t| t.usage_count).sum();
                let success_rate =
                    members.iter().map(|t| t.success_rate).sum::<f64>() / members.len() as f64;
                (
                    category,
                    CategoryPerformance {
                        executions,
                        success_rate,
                    },
                )
            })
            .collect();

        Ok(WorkflowMetrics {
            total_workflows: templates.len(),
            active_workflows: templates.iter().filter(|t| t.is_active).count(),
            total_executions: executions.len(),
            successful_executions: successful,
            failed_executions: failed,
            average_execution_time,
            top_workflows,
            recent_executions: executions.into_iter().take(10).collect(),
            performance_by_category,
        })
    }

    // ---- interpreter -----------------------------------------------------

    async fn start_execution(
        &self,
        workflow_id: Uuid,
        triggered_by: &str,
        trigger_type: TriggerType,
        supplied: Map<String, Value>,
    ) -> Result<WorkflowExecution, AppError> {
        let template = self.get_workflow(workflow_id).await?;
        if !template.is_active {
            return Err(AppError::Conflict(format!(
                "Workflow `{}` is not active",
                template.name
            )));
        }
        let running = self
            .repo
            .list_executions(&ExecutionFilter {
                status: Some(ExecutionStatus::Running),
                ..Default::default()
            })
            .await?
            .len();
        if running >= self.limits.max_concurrent {
            return Err(AppError::Conflict(format!(
                "{running} workflows are already running"
            )));
        }
        let variables = resolve_variables(&template, supplied)?;
        let entry = template
            .entry_step()
            .ok_or_else(|| AppError::validation("Workflow has no steps"))?;

        let mut execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id,
            workflow_name: template.name.clone(),
            triggered_by: triggered_by.to_string(),
            trigger_type,
            status: ExecutionStatus::Running,
            started_at: OffsetDateTime::now_utc(),
            completed_at: None,
            current_step: None,
            executed_steps: Vec::new(),
            variables,
            logs: Vec::new(),
            error: None,
            duration: None,
            pending_steps: vec![entry.id.clone()],
            transitions: 0,
        };
        execution.log(
            LogLevel::Info,
            format!("Workflow execution started by {triggered_by}"),
            None,
            None,
        );
        let execution = self.repo.insert_execution(execution).await?;
        self.repo.increment_usage(workflow_id).await?;
        info!(
            execution_id = %execution.id,
            workflow_id = %workflow_id,
            triggered_by,
            "workflow execution started"
        );
        Ok(execution)
    }

    fn spawn_drive(self: &Arc<Self>, id: Uuid) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = engine.drive(id).await {
                warn!(execution_id = %id, %err, "workflow drive aborted");
            }
        });
    }

    async fn drive(self: Arc<Self>, id: Uuid) -> Result<(), AppError> {
        let execution = self.get_execution(id).await?;
        let template = Arc::new(self.get_workflow(execution.workflow_id).await?);
        let max_transitions = self.limits.max_step_transitions;
        let verbose = self.limits.verbose_logs;

        loop {
            let (execution, next) = self
                .mutate(id, |exec| {
                    if exec.status != ExecutionStatus::Running {
                        return Ok(Next::Halt);
                    }
                    let Some(step_id) = exec.pending_steps.pop() else {
                        exec.current_step = None;
                        exec.finish(ExecutionStatus::Completed, None);
                        exec.log(LogLevel::Info, "Workflow execution completed", None, None);
                        return Ok(Next::Finished);
                    };
                    exec.transitions += 1;
                    if exec.transitions > max_transitions {
                        let msg = format!("Exceeded {max_transitions} step transitions");
                        exec.log(LogLevel::Error, msg.clone(), Some(&step_id), None);
                        exec.finish(ExecutionStatus::Failed, Some(msg));
                        return Ok(Next::Finished);
                    }
                    let Some(step) = template.step(&step_id) else {
                        exec.log(
                            LogLevel::Warning,
                            format!("Skipping unknown step `{step_id}`"),
                            Some(&step_id),
                            None,
                        );
                        return Ok(Next::Skip);
                    };
                    begin_step(exec, step);
                    Ok(Next::Run(step.clone()))
                })
                .await?;

            let step = match next {
                Next::Run(step) => step,
                Next::Skip => continue,
                Next::Finished => {
                    self.finalize(&execution).await;
                    return Ok(());
                }
                Next::Halt => return Ok(()),
            };

            debug!(execution_id = %id, step_id = %step.id, step_type = ?step.step_type, "executing workflow step");
            let ctx = step_context(&execution, &template);
            let retry_limit = match step.error_handling.on_error {
                OnError::Retry => step.error_handling.retry_count,
                _ => 0,
            };

            let mut attempt: u32 = 0;
            let result = loop {
                attempt += 1;
                let result = self
                    .with_timeout(&step, self.run_step(&template, &step, &ctx, id))
                    .await;
                match result {
                    Err(err) if attempt <= retry_limit => {
                        self.mutate(id, |exec| {
                            if let Some(record) = exec.step_mut(&step.id) {
                                record.attempts = attempt;
                            }
                            exec.log(
                                LogLevel::Warning,
                                format!("{} failed on attempt {attempt}: {err}; retrying", step.name),
                                Some(&step.id),
                                None,
                            );
                            Ok(())
                        })
                        .await?;
                        tokio::time::sleep(Duration::from_secs(step.error_handling.retry_delay))
                            .await;
                    }
                    other => break other,
                }
            };

            let (execution, after) = self
                .mutate(id, |exec| {
                    if exec.status != ExecutionStatus::Running {
                        return Ok(After::Halt);
                    }
                    Ok(match result {
                        Ok(StepOutcome::Completed { output, condition }) => {
                            complete_step(exec, &step, attempt, output, condition, verbose);
                            After::Continue
                        }
                        Ok(StepOutcome::AwaitApproval) => {
                            await_approval(exec, &step, attempt);
                            After::AwaitingApproval
                        }
                        Err(err) => apply_failure(exec, &step, attempt, &err),
                    })
                })
                .await?;

            match after {
                After::Continue => {}
                After::AwaitingApproval => {
                    self.notify_approver(&execution, &template, &step).await;
                    if let Some(secs) = step.timeout.filter(|s| *s > 0) {
                        let started = execution.step(&step.id).and_then(|s| s.started_at);
                        self.schedule_approval_timeout(id, step.id.clone(), secs, started);
                    }
                    return Ok(());
                }
                After::Escalated | After::Halt => return Ok(()),
                After::Finished => {
                    self.finalize(&execution).await;
                    return Ok(());
                }
            }
        }
    }

    fn run_step<'a>(
        self: &'a Arc<Self>,
        template: &'a Arc<WorkflowTemplate>,
        step: &'a WorkflowStep,
        ctx: &'a Value,
        execution_id: Uuid,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            match step.step_type {
                StepType::Action => {
                    let action = action_type(&step.configuration)?;
                    let config = step
                        .configuration
                        .get("config")
                        .cloned()
                        .unwrap_or_else(|| step.configuration.clone());
                    let output = self.actions.execute(action, &config, ctx).await?;
                    Ok(StepOutcome::done(output))
                }
                StepType::Notification => {
                    let output = self
                        .actions
                        .execute(ActionType::SendNotification, &step.configuration, ctx)
                        .await?;
                    Ok(StepOutcome::done(output))
                }
                StepType::Delay => {
                    let config = parse_delay_config(&step.configuration)?;
                    let plan = {
                        let mut rng = rand::rng();
                        compute_delay_plan(&config, Utc::now(), &mut rng)?
                    };
                    tokio::time::sleep(plan.total_delay).await;
                    Ok(StepOutcome::done(json!({
                        "delayedSeconds": plan.total_delay.as_secs(),
                        "jitterSeconds": plan.jitter_applied.as_secs(),
                        "resumeAt": plan.resume_at.to_rfc3339(),
                    })))
                }
                StepType::Condition => {
                    let result = evaluate(&step.conditions, step.expression.as_ref(), ctx);
                    Ok(StepOutcome::Completed {
                        output: json!({ "result": result }),
                        condition: Some(result),
                    })
                }
                StepType::Loop => self.run_loop(template, step, ctx, execution_id).await,
                StepType::Parallel => self.run_parallel(template, step, ctx, execution_id).await,
                StepType::Approval => Ok(StepOutcome::AwaitApproval),
            }
        })
    }

    async fn with_timeout(
        &self,
        step: &WorkflowStep,
        fut: StepFuture<'_>,
    ) -> Result<StepOutcome, AppError> {
        match step.timeout {
            Some(secs) if secs > 0 && step.step_type != StepType::Approval => {
                tokio::time::timeout(Duration::from_secs(secs), fut)
                    .await
                    .map_err(|_| {
                        AppError::Timeout(format!("step `{}` exceeded {secs}s", step.id))
                    })?
            }
            _ => fut.await,
        }
    }

    async fn run_loop(
        self: &Arc<Self>,
        template: &Arc<WorkflowTemplate>,
        step: &WorkflowStep,
        ctx: &Value,
        execution_id: Uuid,
    ) -> Result<StepOutcome, AppError> {
        let items: Vec<Value> = match step.configuration.get("items") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(path)) => match lookup_path(path, ctx) {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return Err(AppError::validation(format!(
                        "Loop `{}` expects `{path}` to be an array",
                        step.id
                    )))
                }
            },
            _ => match step.configuration.get("iterations").and_then(Value::as_u64) {
                Some(n) => (0..n).map(|i| json!(i)).collect(),
                None => {
                    return Err(AppError::validation(format!(
                        "Loop `{}` needs `items` or `iterations`",
                        step.id
                    )))
                }
            },
        };
        let body = nested_step_ids(step);
        if items.len().saturating_mul(body.len()) > self.limits.max_step_transitions {
            return Err(AppError::validation(format!(
                "Loop `{}` would exceed the step budget",
                step.id
            )));
        }

        let count = items.len();
        let mut results = Vec::with_capacity(count);
        for (index, item) in items.into_iter().enumerate() {
            let mut iteration_ctx = ctx.clone();
            if let Value::Object(map) = &mut iteration_ctx {
                map.insert(
                    "loop".to_string(),
                    json!({ "index": index, "item": item, "count": count }),
                );
            }
            let mut outputs = Map::new();
            for body_id in &body {
                let body_step = template
                    .step(body_id)
                    .ok_or_else(|| AppError::not_found("workflow step", body_id))?;
                let output = self
                    .run_nested(template, body_step, &iteration_ctx, execution_id)
                    .await?;
                if let Value::Object(map) = &mut iteration_ctx {
                    map.insert("previous".to_string(), output.clone());
                }
                outputs.insert(body_id.clone(), output);
            }
            results.push(Value::Object(outputs));
        }
        Ok(StepOutcome::done(
            json!({ "iterations": count, "results": results }),
        ))
    }

    async fn run_parallel(
        self: &Arc<Self>,
        template: &Arc<WorkflowTemplate>,
        step: &WorkflowStep,
        ctx: &Value,
        execution_id: Uuid,
    ) -> Result<StepOutcome, AppError> {
        let mut set = JoinSet::new();
        for branch in nested_step_ids(step) {
            set.spawn(self.branch(Arc::clone(template), branch, ctx.clone(), execution_id));
        }

        let mut outputs = Map::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((branch, output))) => {
                    outputs.insert(branch, output);
                }
                Ok(Err(err)) => {
                    set.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    set.abort_all();
                    return Err(AppError::Downstream(format!(
                        "parallel branch aborted: {join_err}"
                    )));
                }
            }
        }
        Ok(StepOutcome::done(json!({ "branches": outputs })))
    }

    fn branch(
        self: &Arc<Self>,
        template: Arc<WorkflowTemplate>,
        step_id: String,
        ctx: Value,
        execution_id: Uuid,
    ) -> BranchFuture {
        let engine = Arc::clone(self);
        Box::pin(async move {
            let step = template
                .step(&step_id)
                .ok_or_else(|| AppError::not_found("workflow step", &step_id))?;
            let output = engine
                .run_nested(&template, step, &ctx, execution_id)
                .await?;
            Ok((step_id, output))
        })
    }

    /// Runs a loop body or parallel branch step, recording it on the
    /// execution. Its `nextSteps` are not followed.
    async fn run_nested(
        self: &Arc<Self>,
        template: &Arc<WorkflowTemplate>,
        step: &WorkflowStep,
        ctx: &Value,
        execution_id: Uuid,
    ) -> Result<Value, AppError> {
        self.mutate(execution_id, |exec| {
            if exec.status != ExecutionStatus::Running {
                return Err(AppError::Conflict(format!(
                    "Execution is {}",
                    status_label(exec.status)
                )));
            }
            let mut record = ExecutedStep::pending(&step.id, &step.name, step.assigned_to.clone());
            record.status = StepStatus::Running;
            record.attempts = 1;
            record.started_at = Some(OffsetDateTime::now_utc());
            exec.executed_steps.push(record);
            Ok(())
        })
        .await?;

        let result = match self
            .with_timeout(step, self.run_step(template, step, ctx, execution_id))
            .await
        {
            Ok(StepOutcome::Completed { output, .. }) => Ok(output),
            Ok(StepOutcome::AwaitApproval) => Err(AppError::validation(format!(
                "Approval step `{}` cannot run inside a loop or parallel step",
                step.id
            ))),
            Err(err) => Err(err),
        };

        let verbose = self.limits.verbose_logs;
        self.mutate(execution_id, |exec| {
            if let Some(record) = exec.step_mut(&step.id) {
                record.completed_at = Some(OffsetDateTime::now_utc());
                match &result {
                    Ok(output) => {
                        record.status = StepStatus::Completed;
                        record.output = Some(output.clone());
                    }
                    Err(err) => {
                        record.status = StepStatus::Failed;
                        record.error = Some(err.to_string());
                    }
                }
            }
            if verbose {
                if let Ok(output) = &result {
                    exec.log(
                        LogLevel::Debug,
                        format!("Nested step {} output", step.name),
                        Some(&step.id),
                        Some(output.clone()),
                    );
                }
            }
            Ok(())
        })
        .await?;
        result
    }

    fn schedule_approval_timeout(
        self: &Arc<Self>,
        id: Uuid,
        step_id: String,
        secs: u64,
        started: Option<OffsetDateTime>,
    ) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if let Err(err) = engine.expire_approval(id, &step_id, secs, started).await {
                warn!(execution_id = %id, step_id = %step_id, %err, "approval timeout handling failed");
            }
        });
    }

    async fn expire_approval(
        self: &Arc<Self>,
        id: Uuid,
        step_id: &str,
        secs: u64,
        started: Option<OffsetDateTime>,
    ) -> Result<(), AppError> {
        let current = self.get_execution(id).await?;
        let template = self.get_workflow(current.workflow_id).await?;
        let Some(step) = template.step(step_id) else {
            return Ok(());
        };
        let (execution, after) = self
            .mutate(id, |exec| {
                let waiting = exec.status == ExecutionStatus::Paused
                    && exec.current_step.as_deref() == Some(step_id);
                let attempts = match exec.step(step_id) {
                    Some(r)
                        if waiting
                            && r.status == StepStatus::Running
                            && r.started_at == started =>
                    {
                        r.attempts
                    }
                    _ => return Ok(After::Halt),
                };
                let err = AppError::Timeout(format!(
                    "approvals for `{step_id}` did not arrive within {secs}s"
                ));
                Ok(apply_failure(exec, step, attempts, &err))
            })
            .await?;
        match after {
            After::Continue => self.spawn_drive(id),
            After::Finished => self.finalize(&execution).await,
            _ => {}
        }
        Ok(())
    }

    async fn notify_approver(
        &self,
        execution: &WorkflowExecution,
        template: &WorkflowTemplate,
        step: &WorkflowStep,
    ) {
        let Some(assignee) = execution
            .step(&step.id)
            .and_then(|r| r.assigned_to.clone())
        else {
            return;
        };
        let ctx = json!({
            "workflow": {"id": template.id, "name": template.name},
            "step": {"id": step.id, "name": step.name},
            "execution": {"id": execution.id},
        });
        let config = json!({
            "recipient": assignee,
            "template": "approval-required",
            "priority": "high",
        });
        if let Err(err) = self
            .actions
            .execute(ActionType::SendNotification, &config, &ctx)
            .await
        {
            warn!(execution_id = %execution.id, step_id = %step.id, %err, "approval notification failed");
        }
    }

    /// Bookkeeping once an execution reaches a terminal state.
    async fn finalize(&self, execution: &WorkflowExecution) {
        if !execution.status.is_terminal() {
            return;
        }
        self.locks.remove(&execution.id);
        info!(
            execution_id = %execution.id,
            status = status_label(execution.status),
            duration = execution.duration,
            "workflow execution finished"
        );
        if let Err(err) = self.refresh_success_rate(execution.workflow_id).await {
            warn!(workflow_id = %execution.workflow_id, %err, "success rate refresh failed");
        }
    }

    async fn refresh_success_rate(&self, workflow_id: Uuid) -> Result<(), AppError> {
        let executions = self
            .repo
            .list_executions(&ExecutionFilter {
                workflow_id: Some(workflow_id),
                ..Default::default()
            })
            .await?;
        let finished = executions.iter().filter(|e| e.status.is_terminal()).count();
        let completed = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .count();
        let rate = if finished == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / finished as f64
        };
        self.repo.set_success_rate(workflow_id, rate).await
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().value().clone()
    }

    /// Single-writer load-modify-save. Nothing is saved when `f` errors.
    async fn mutate<T, F>(&self, id: Uuid, f: F) -> Result<(WorkflowExecution, T), AppError>
    where
        F: FnOnce(&mut WorkflowExecution) -> Result<T, AppError> + Send,
        T: Send,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let mut execution = self
            .repo
            .find_execution(id)
            .await?
            .ok_or_else(|| AppError::not_found("workflow execution", id))?;
        let value = f(&mut execution)?;
        self.repo.save_execution(&execution).await?;
        Ok((execution, value))
    }
}

fn begin_step(exec: &mut WorkflowExecution, step: &WorkflowStep) {
    let now = OffsetDateTime::now_utc();
    let reuse = matches!(exec.step(&step.id), Some(r) if r.status == StepStatus::Pending);
    if !reuse {
        exec.executed_steps.push(ExecutedStep::pending(
            &step.id,
            &step.name,
            step.assigned_to.clone(),
        ));
    }
    if let Some(record) = exec.step_mut(&step.id) {
        record.status = StepStatus::Running;
        record.started_at = Some(now);
        record.completed_at = None;
        record.error = None;
        record.approvals.clear();
        record.attempts = 1;
    }
    exec.current_step = Some(step.id.clone());
    exec.log(
        LogLevel::Info,
        format!("Executing step {}", step.name),
        Some(&step.id),
        None,
    );
}

fn complete_step(
    exec: &mut WorkflowExecution,
    step: &WorkflowStep,
    attempts: u32,
    output: Value,
    condition: Option<bool>,
    verbose: bool,
) {
    if let Some(record) = exec.step_mut(&step.id) {
        record.status = StepStatus::Completed;
        record.completed_at = Some(OffsetDateTime::now_utc());
        record.attempts = attempts;
        record.output = Some(output.clone());
        record.error = None;
    }
    if let Value::Object(steps) = exec
        .variables
        .entry("steps")
        .or_insert_with(|| json!({}))
    {
        steps.insert(step.id.clone(), output.clone());
    }
    for next in successors(step, condition).into_iter().rev() {
        exec.pending_steps.push(next);
    }
    exec.log(
        LogLevel::Info,
        format!("Step {} completed", step.name),
        Some(&step.id),
        None,
    );
    if verbose {
        exec.log(
            LogLevel::Debug,
            format!("Step {} output", step.name),
            Some(&step.id),
            Some(output),
        );
    }
}

fn await_approval(exec: &mut WorkflowExecution, step: &WorkflowStep, attempts: u32) {
    let required = step.required_approvals.unwrap_or(1);
    if let Some(record) = exec.step_mut(&step.id) {
        record.attempts = attempts;
        if record.assigned_to.is_none() {
            record.assigned_to = step.assigned_to.clone();
        }
    }
    exec.status = ExecutionStatus::Paused;
    exec.log(
        LogLevel::Info,
        format!("Waiting for {required} approval(s) on {}", step.name),
        Some(&step.id),
        None,
    );
}

/// Marks the step failed and applies its error policy. `retry` has already
/// been exhausted by the caller and therefore stops like `stop`.
fn apply_failure(
    exec: &mut WorkflowExecution,
    step: &WorkflowStep,
    attempts: u32,
    err: &AppError,
) -> After {
    let message = err.to_string();
    if let Some(record) = exec.step_mut(&step.id) {
        record.status = StepStatus::Failed;
        record.completed_at = Some(OffsetDateTime::now_utc());
        record.attempts = attempts;
        record.error = Some(message.clone());
    }

    let policy = &step.error_handling;
    match (policy.on_error, policy.escalate_to.as_deref()) {
        (OnError::Continue, _) => {
            exec.status = ExecutionStatus::Running;
            for next in successors(step, None).into_iter().rev() {
                exec.pending_steps.push(next);
            }
            exec.log(
                LogLevel::Warning,
                format!("Step {} failed, continuing: {message}", step.name),
                Some(&step.id),
                None,
            );
            After::Continue
        }
        (OnError::Escalate, Some(escalate_to)) => {
            if let Some(record) = exec.step_mut(&step.id) {
                record.status = StepStatus::Pending;
                record.assigned_to = Some(escalate_to.to_string());
                record.completed_at = None;
            }
            exec.status = ExecutionStatus::Paused;
            exec.current_step = Some(step.id.clone());
            exec.log(
                LogLevel::Warning,
                format!("Step {} escalated to {escalate_to}: {message}", step.name),
                Some(&step.id),
                None,
            );
            After::Escalated
        }
        _ => {
            exec.log(
                LogLevel::Error,
                format!("Step {} failed: {message}", step.name),
                Some(&step.id),
                None,
            );
            exec.pending_steps.clear();
            exec.finish(
                ExecutionStatus::Failed,
                Some(format!("Step {} failed: {message}", step.name)),
            );
            After::Finished
        }
    }
}

/// Declared defaults overridden by call-site values. Undeclared values pass
/// through unchanged.
fn resolve_variables(
    template: &WorkflowTemplate,
    mut supplied: Map<String, Value>,
) -> Result<Map<String, Value>, AppError> {
    let mut errors = Vec::new();
    let mut resolved = Map::new();
    for declared in &template.variables {
        match supplied.remove(&declared.name) {
            Some(value) if !declared.var_type.accepts(&value) => errors.push(format!(
                "Variable `{}` has the wrong type",
                declared.name
            )),
            Some(value) => {
                resolved.insert(declared.name.clone(), value);
            }
            None => match &declared.default_value {
                Some(default) => {
                    resolved.insert(declared.name.clone(), default.clone());
                }
                None if declared.required => {
                    errors.push(format!("Variable `{}` is required", declared.name))
                }
                None => {}
            },
        }
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    resolved.extend(supplied);
    Ok(resolved)
}

/// Variables flattened at the top level, plus `variables`, `workflow` and
/// `execution` envelopes.
fn step_context(execution: &WorkflowExecution, template: &WorkflowTemplate) -> Value {
    let mut ctx = execution.variables.clone();
    ctx.insert(
        "variables".to_string(),
        Value::Object(execution.variables.clone()),
    );
    ctx.insert(
        "workflow".to_string(),
        json!({ "id": template.id, "name": template.name, "category": template.category }),
    );
    ctx.insert(
        "execution".to_string(),
        json!({ "id": execution.id, "triggeredBy": execution.triggered_by }),
    );
    Value::Object(ctx)
}

fn action_type(configuration: &Value) -> Result<ActionType, AppError> {
    let raw = configuration
        .get("action")
        .cloned()
        .ok_or_else(|| AppError::validation("Action step does not name an action"))?;
    serde_json::from_value(raw.clone())
        .map_err(|_| AppError::validation(format!("Unknown action {raw}")))
}

fn status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
        ExecutionStatus::Paused => "paused",
    }
}

fn decision_label(decision: ApprovalDecision) -> &'static str {
    match decision {
        ApprovalDecision::Approved => "approved",
        ApprovalDecision::Rejected => "rejected",
        ApprovalDecision::Pending => "pending",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryWorkflowRepository;
    use crate::engine::actions::MockActionExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine_with(mock: MockActionExecutor, limits: WorkflowLimits) -> Arc<WorkflowEngine> {
        Arc::new(WorkflowEngine::new(
            Arc::new(InMemoryWorkflowRepository::default()),
            Arc::new(mock),
            limits,
        ))
    }

    fn engine(mock: MockActionExecutor) -> Arc<WorkflowEngine> {
        engine_with(mock, WorkflowLimits::default())
    }

    fn ok_actions() -> MockActionExecutor {
        let mut mock = MockActionExecutor::new();
        mock.expect_execute()
            .returning(|action, _, _| Ok(json!({ "action": action.as_str() })));
        mock
    }

    async fn create(engine: &Arc<WorkflowEngine>, body: Value) -> WorkflowTemplate {
        let new: NewWorkflowTemplate = serde_json::from_value(body).unwrap();
        engine.create_workflow(new, "tester").await.unwrap()
    }

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn wait_for(
        engine: &Arc<WorkflowEngine>,
        id: Uuid,
        status: ExecutionStatus,
    ) -> WorkflowExecution {
        for _ in 0..200 {
            let execution = engine.get_execution(id).await.unwrap();
            if execution.status == status {
                return execution;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("execution {id} never reached {status:?}");
    }

    #[tokio::test]
    async fn linear_actions_complete_and_record_outputs() {
        let engine = engine(ok_actions());
        let template = create(
            &engine,
            json!({
                "name": "Kickoff",
                "category": "project",
                "variables": [{"name": "projectName", "type": "string", "required": true}],
                "steps": [
                    {"id": "task", "name": "Create task", "type": "action", "order": 1,
                     "configuration": {"action": "create_task", "config": {"title": "{{projectName}}"}},
                     "nextSteps": ["notify"]},
                    {"id": "notify", "name": "Notify", "type": "notification", "order": 2,
                     "configuration": {"recipient": "manager"}}
                ]
            }),
        )
        .await;

        let execution = engine
            .execute_workflow_inline(
                template.id,
                "user-1",
                TriggerType::Manual,
                vars(json!({"projectName": "Harbour"})),
            )
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.executed_steps.len(), 2);
        assert_eq!(execution.variables["steps"]["task"]["action"], "create_task");
        assert_eq!(
            execution.variables["steps"]["notify"]["action"],
            "send_notification"
        );
        assert_eq!(execution.logs[0].message, "Workflow execution started by user-1");
        assert!(execution.duration.is_some());

        let stored = engine.get_workflow(template.id).await.unwrap();
        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.success_rate, 100.0);
    }

    #[tokio::test]
    async fn condition_step_chooses_branch() {
        let mut mock = MockActionExecutor::new();
        mock.expect_execute()
            .withf(|_, config, _| config["title"] == "big")
            .times(1)
            .returning(|_, _, _| Ok(json!({})));
        mock.expect_execute()
            .withf(|_, config, _| config["title"] == "small")
            .never();
        let engine = engine(mock);
        let template = create(
            &engine,
            json!({
                "name": "Budget gate",
                "category": "approval",
                "steps": [
                    {"id": "check", "name": "Check", "type": "condition", "order": 1,
                     "conditions": [{"field": "variables.budget", "operator": "greater", "value": 100000}],
                     "nextSteps": ["big", "small"]},
                    {"id": "big", "name": "Big", "type": "action", "order": 2,
                     "configuration": {"action": "create_task", "config": {"title": "big"}}},
                    {"id": "small", "name": "Small", "type": "action", "order": 3,
                     "configuration": {"action": "create_task", "config": {"title": "small"}}}
                ]
            }),
        )
        .await;

        let execution = engine
            .execute_workflow_inline(
                template.id,
                "user-1",
                TriggerType::Manual,
                vars(json!({"budget": 250000})),
            )
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.variables["steps"]["check"]["result"], true);
        assert!(execution.step("small").is_none());
    }

    #[tokio::test]
    async fn stop_fails_execution_but_continue_proceeds() {
        let mut mock = MockActionExecutor::new();
        mock.expect_execute()
            .withf(|t, _, _| *t == ActionType::Webhook)
            .returning(|_, _, _| Err(AppError::Downstream("503".into())));
        mock.expect_execute()
            .withf(|t, _, _| *t == ActionType::CreateTask)
            .returning(|_, _, _| Ok(json!({"id": "t-1"})));
        let engine = engine(mock);

        let body = |on_error: &str| {
            json!({
                "name": format!("Sync ({on_error})"),
                "category": "custom",
                "steps": [
                    {"id": "push", "name": "Push", "type": "action", "order": 1,
                     "configuration": {"action": "webhook", "config": {"url": "https://x"}},
                     "errorHandling": {"onError": on_error},
                     "nextSteps": ["task"]},
                    {"id": "task", "name": "Task", "type": "action", "order": 2,
                     "configuration": {"action": "create_task"}}
                ]
            })
        };

        let stop = create(&engine, body("stop")).await;
        let failed = engine
            .execute_workflow_inline(stop.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("Push"));
        assert!(failed.step("task").is_none());
        assert_eq!(engine.get_workflow(stop.id).await.unwrap().success_rate, 0.0);

        let cont = create(&engine, body("continue")).await;
        let done = engine
            .execute_workflow_inline(cont.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.step("push").unwrap().status, StepStatus::Failed);
        assert_eq!(done.step("task").unwrap().status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn retry_policy_reattempts_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut mock = MockActionExecutor::new();
        mock.expect_execute().returning(move |_, _, _| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::Timeout("slow".into()))
            } else {
                Ok(json!({"ok": true}))
            }
        });
        let engine = engine(mock);
        let template = create(
            &engine,
            json!({
                "name": "Flaky",
                "category": "custom",
                "steps": [{"id": "a", "name": "A", "type": "action", "order": 1,
                    "configuration": {"action": "webhook"},
                    "errorHandling": {"onError": "retry", "retryCount": 2, "retryDelay": 0}}]
            }),
        )
        .await;

        let execution = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.step("a").unwrap().attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn escalation_pauses_and_resume_reruns_step() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut mock = MockActionExecutor::new();
        mock.expect_execute().returning(move |_, _, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Conflict("No available team member to assign".into()))
            } else {
                Ok(json!({"assignedTo": "user-9"}))
            }
        });
        let engine = engine(mock);
        let template = create(
            &engine,
            json!({
                "name": "Assign",
                "category": "task",
                "steps": [{"id": "assign", "name": "Assign", "type": "action", "order": 1,
                    "configuration": {"action": "assign_user"},
                    "errorHandling": {"onError": "escalate", "escalateTo": "manager-1"}}]
            }),
        )
        .await;

        let paused = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(paused.status, ExecutionStatus::Paused);
        let record = paused.step("assign").unwrap();
        assert_eq!(record.status, StepStatus::Pending);
        assert_eq!(record.assigned_to.as_deref(), Some("manager-1"));

        engine.resume_execution(paused.id).await.unwrap();
        let done = wait_for(&engine, paused.id, ExecutionStatus::Completed).await;
        assert_eq!(done.executed_steps.len(), 1);
        assert_eq!(done.variables["steps"]["assign"]["assignedTo"], "user-9");
    }

    fn approval_template(required: u32) -> Value {
        json!({
            "name": "Change order",
            "category": "approval",
            "steps": [
                {"id": "approve", "name": "Approve change", "type": "approval", "order": 1,
                 "requiredApprovals": required, "assignedTo": "pm-1", "nextSteps": ["record"]},
                {"id": "record", "name": "Record", "type": "action", "order": 2,
                 "configuration": {"action": "update_status"}}
            ]
        })
    }

    #[tokio::test]
    async fn approvals_gate_until_required_count() {
        let engine = engine(ok_actions());
        let template = create(&engine, approval_template(2)).await;
        let paused = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(paused.status, ExecutionStatus::Paused);
        assert_eq!(paused.current_step.as_deref(), Some("approve"));

        let after_one = engine
            .submit_approval(paused.id, "approve", "pm-1", "Pat", ApprovalDecision::Approved, None)
            .await
            .unwrap();
        assert_eq!(after_one.status, ExecutionStatus::Paused);

        let dup = engine
            .submit_approval(paused.id, "approve", "pm-1", "Pat", ApprovalDecision::Approved, None)
            .await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        engine
            .submit_approval(
                paused.id,
                "approve",
                "qs-2",
                "Quinn",
                ApprovalDecision::Approved,
                Some("fine".into()),
            )
            .await
            .unwrap();
        let done = wait_for(&engine, paused.id, ExecutionStatus::Completed).await;
        assert_eq!(done.variables["steps"]["approve"]["approvals"], 2);
        assert_eq!(done.step("record").unwrap().status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn rejection_fails_the_execution() {
        let engine = engine(ok_actions());
        let template = create(&engine, approval_template(1)).await;
        let paused = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        let failed = engine
            .submit_approval(paused.id, "approve", "pm-1", "Pat", ApprovalDecision::Rejected, None)
            .await
            .unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert!(failed.error.unwrap().contains("rejected by Pat"));
    }

    #[tokio::test(start_paused = true)]
    async fn approval_timeout_fails_waiting_step() {
        let engine = engine(ok_actions());
        let mut body = approval_template(1);
        body["steps"][0]["timeout"] = json!(60);
        let template = create(&engine, body).await;
        let paused = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(paused.status, ExecutionStatus::Paused);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let failed = wait_for(&engine, paused.id, ExecutionStatus::Failed).await;
        assert!(failed.error.unwrap().contains("did not arrive within 60s"));
    }

    #[tokio::test(start_paused = true)]
    async fn step_timeout_feeds_error_policy() {
        let engine = engine(ok_actions());
        let template = create(
            &engine,
            json!({
                "name": "Slow",
                "category": "custom",
                "steps": [{"id": "wait", "name": "Wait", "type": "delay", "order": 1,
                    "timeout": 1, "configuration": {"duration": 30}}]
            }),
        )
        .await;
        let execution = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.unwrap().contains("exceeded 1s"));
    }

    #[tokio::test]
    async fn cycles_stop_at_transition_budget() {
        let engine = engine_with(
            ok_actions(),
            WorkflowLimits {
                max_step_transitions: 10,
                ..Default::default()
            },
        );
        let template = create(
            &engine,
            json!({
                "name": "Ping pong",
                "category": "custom",
                "steps": [
                    {"id": "a", "name": "A", "type": "action", "order": 1,
                     "configuration": {"action": "create_task"}, "nextSteps": ["b"]},
                    {"id": "b", "name": "B", "type": "action", "order": 2,
                     "configuration": {"action": "create_task"}, "nextSteps": ["a"]}
                ]
            }),
        )
        .await;
        let execution = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.executed_steps.len(), 10);
        assert!(execution.error.unwrap().contains("Exceeded 10 step transitions"));
    }

    #[tokio::test]
    async fn loop_runs_body_per_item_and_parallel_runs_branches() {
        let mut mock = MockActionExecutor::new();
        mock.expect_execute()
            .withf(|t, _, ctx| *t == ActionType::CreateTask && ctx["loop"]["item"].is_string())
            .times(3)
            .returning(|_, _, ctx| Ok(json!({ "title": ctx["loop"]["item"].clone() })));
        mock.expect_execute()
            .withf(|t, _, _| *t == ActionType::SendNotification || *t == ActionType::SendEmail)
            .times(2)
            .returning(|t, _, _| Ok(json!({ "via": t.as_str() })));
        let engine = engine(mock);
        let template = create(
            &engine,
            json!({
                "name": "Punch list",
                "category": "quality",
                "variables": [{"name": "rooms", "type": "array", "defaultValue": ["L1", "L2", "L3"]}],
                "steps": [
                    {"id": "each", "name": "Each room", "type": "loop", "order": 1,
                     "configuration": {"items": "variables.rooms", "body": ["make"]},
                     "nextSteps": ["fanout"]},
                    {"id": "fanout", "name": "Fan out", "type": "parallel", "order": 2,
                     "configuration": {"branches": ["notify", "mail"]}},
                    {"id": "make", "name": "Make task", "type": "action", "order": 10,
                     "configuration": {"action": "create_task", "config": {"title": "{{loop.item}}"}}},
                    {"id": "notify", "name": "Notify", "type": "action", "order": 11,
                     "configuration": {"action": "send_notification"}},
                    {"id": "mail", "name": "Mail", "type": "action", "order": 12,
                     "configuration": {"action": "send_email"}}
                ]
            }),
        )
        .await;

        let execution = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let looped = &execution.variables["steps"]["each"];
        assert_eq!(looped["iterations"], 3);
        assert_eq!(looped["results"][2]["make"]["title"], "L3");
        let fanned = &execution.variables["steps"]["fanout"]["branches"];
        assert_eq!(fanned["notify"]["via"], "send_notification");
        assert_eq!(fanned["mail"]["via"], "send_email");
    }

    #[tokio::test]
    async fn cancel_is_terminal() {
        let engine = engine(ok_actions());
        let template = create(&engine, approval_template(1)).await;
        let paused = engine
            .execute_workflow_inline(template.id, "u", TriggerType::Manual, Map::new())
            .await
            .unwrap();

        let cancelled = engine.cancel_execution(paused.id).await.unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert_eq!(cancelled.step("approve").unwrap().status, StepStatus::Skipped);
        assert!(matches!(
            engine.cancel_execution(paused.id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            engine
                .submit_approval(paused.id, "approve", "pm-1", "Pat", ApprovalDecision::Approved, None)
                .await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn start_checks_activity_variables_and_capacity() {
        let engine = engine_with(
            ok_actions(),
            WorkflowLimits {
                max_concurrent: 0,
                ..Default::default()
            },
        );
        let template = create(
            &engine,
            json!({
                "name": "Needs input",
                "category": "project",
                "variables": [{"name": "projectId", "type": "string", "required": true}],
                "steps": [{"id": "a", "name": "A", "type": "action", "order": 1,
                    "configuration": {"action": "create_task"}}]
            }),
        )
        .await;
        assert!(matches!(
            engine
                .execute_workflow(template.id, "u", TriggerType::Manual, Map::new())
                .await,
            Err(AppError::Conflict(_))
        ));

        let engine = self::engine(ok_actions());
        let template = create(
            &engine,
            json!({
                "name": "Needs input",
                "category": "project",
                "variables": [{"name": "projectId", "type": "string", "required": true}],
                "steps": [{"id": "a", "name": "A", "type": "action", "order": 1,
                    "configuration": {"action": "create_task"}}]
            }),
        )
        .await;
        assert!(matches!(
            engine
                .execute_workflow(template.id, "u", TriggerType::Manual, Map::new())
                .await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            engine
                .execute_workflow(template.id, "u", TriggerType::Manual, vars(json!({"projectId": 7})))
                .await,
            Err(AppError::Validation(_))
        ));

        engine.set_workflow_active(template.id, false).await.unwrap();
        assert!(matches!(
            engine
                .execute_workflow(template.id, "u", TriggerType::Manual, vars(json!({"projectId": "p"})))
                .await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            engine
                .execute_workflow(Uuid::new_v4(), "u", TriggerType::Manual, Map::new())
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn event_triggers_start_listening_workflows() {
        let engine = engine(ok_actions());
        let listening = create(
            &engine,
            json!({
                "name": "Onboard project",
                "category": "project",
                "triggers": [{"id": "t", "type": "event", "configuration": {"event": "project.created"}}],
                "steps": [{"id": "a", "name": "A", "type": "action", "order": 1,
                    "configuration": {"action": "create_task"}}]
            }),
        )
        .await;
        create(
            &engine,
            json!({
                "name": "Unrelated",
                "category": "task",
                "triggers": [{"id": "t", "type": "event", "configuration": {"event": "task.assigned"}}],
                "steps": [{"id": "a", "name": "A", "type": "action", "order": 1,
                    "configuration": {"action": "create_task"}}]
            }),
        )
        .await;

        let event = IntegrationEvent::new("project.created", "projects", json!({"id": "p-1"}), None);
        assert_eq!(engine.trigger_event_workflows(&event).await.unwrap(), 1);

        let runs = engine
            .list_executions(&ExecutionFilter {
                workflow_id: Some(listening.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].triggered_by, "event:project.created");
        assert_eq!(runs[0].variables["id"], "p-1");
    }

    #[tokio::test]
    async fn metrics_summarize_templates_and_executions() {
        let engine = engine(ok_actions());
        let popular = create(
            &engine,
            json!({"name": "Popular", "category": "task",
                "steps": [{"id": "a", "name": "A", "type": "action", "order": 1,
                    "configuration": {"action": "create_task"}}]}),
        )
        .await;
        create(
            &engine,
            json!({"name": "Idle", "category": "safety", "isActive": false,
                "steps": [{"id": "a", "name": "A", "type": "action", "order": 1,
                    "configuration": {"action": "create_task"}}]}),
        )
        .await;
        for _ in 0..2 {
            engine
                .execute_workflow_inline(popular.id, "u", TriggerType::Manual, Map::new())
                .await
                .unwrap();
        }

        let metrics = engine.workflow_metrics().await.unwrap();
        assert_eq!(metrics.total_workflows, 2);
        assert_eq!(metrics.active_workflows, 1);
        assert_eq!(metrics.total_executions, 2);
        assert_eq!(metrics.successful_executions, 2);
        assert_eq!(metrics.top_workflows[0].name, "Popular");
        assert_eq!(metrics.performance_by_category[&WorkflowCategory::Task].executions, 2);
        assert_eq!(metrics.recent_executions.len(), 2);

        let listed = engine.list_workflows(None).await.unwrap();
        assert_eq!(listed[0].id, popular.id);
        assert_eq!(
            engine
                .list_workflows(Some(WorkflowCategory::Safety))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
