use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::workflow::WorkflowTemplate;
use crate::models::workflow_execution::{ExecutionFilter, WorkflowExecution};

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert_template(&self, template: WorkflowTemplate)
        -> Result<WorkflowTemplate, AppError>;

    async fn find_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, AppError>;

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, AppError>;

    async fn set_template_active(&self, id: Uuid, active: bool)
        -> Result<WorkflowTemplate, AppError>;

    async fn increment_usage(&self, id: Uuid) -> Result<WorkflowTemplate, AppError>;

    async fn set_success_rate(&self, id: Uuid, rate: f64) -> Result<(), AppError>;

    async fn insert_execution(&self, execution: WorkflowExecution)
        -> Result<WorkflowExecution, AppError>;

    async fn find_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, AppError>;

    /// Replaces the stored execution wholesale. Callers serialize writers per
    /// execution.
    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), AppError>;

    /// Newest first.
    async fn list_executions(&self, filter: &ExecutionFilter)
        -> Result<Vec<WorkflowExecution>, AppError>;
}
