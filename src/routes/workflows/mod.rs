mod crud;
mod executions;
mod prelude;
mod sse;

pub use crud::{create_workflow, execute_workflow, get_workflow, list_workflows, workflow_metrics};
pub use executions::{
    cancel_execution, get_execution, list_executions, resume_execution, submit_approval,
};
pub use sse::sse_execution_events;
