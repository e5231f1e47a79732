pub mod api_key;
pub mod automation_rule;
pub mod construction;
pub mod integration_event;
pub mod notification;
pub mod user;
pub mod webhook;
pub mod workflow;
pub mod workflow_execution;
