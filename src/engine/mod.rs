pub mod actions;
pub mod conditions;
mod executor;
pub(crate) mod graph;
pub mod rules;
pub(crate) mod templating;

pub use actions::{ActionExecutor, ServiceActionExecutor};
pub use executor::{WorkflowEngine, WorkflowLimits};
pub use rules::{DispatchSummary, RuleEngine};
