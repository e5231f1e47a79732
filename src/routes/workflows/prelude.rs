pub(crate) use std::{convert::Infallible, time::Duration};

pub(crate) use async_stream::stream;
pub(crate) use axum::response::sse::{Event, KeepAlive, Sse};
pub(crate) use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
pub(crate) use serde::Deserialize;
pub(crate) use serde_json::{json, Map, Value};
pub(crate) use tracing::info;
pub(crate) use uuid::Uuid;

pub(crate) use crate::{
    errors::AppError,
    models::workflow::{NewWorkflowTemplate, TriggerType, WorkflowCategory},
    models::workflow_execution::{ApprovalDecision, ExecutionFilter},
    routes::auth::session::AuthSession,
    state::AppState,
};
