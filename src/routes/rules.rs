use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    errors::AppError, models::automation_rule::NewAutomationRule,
    routes::auth::session::AuthSession, state::AppState,
};

pub async fn list_rules(
    State(state): State<AppState>,
    _session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let rules = state.rules.list_automation_rules().await?;
    Ok(Json(json!({ "success": true, "rules": rules })))
}

pub async fn create_rule(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
    Json(payload): Json<NewAutomationRule>,
) -> Result<impl IntoResponse, AppError> {
    let rule = state.rules.create_automation_rule(payload).await?;
    info!(rule_id = %rule.id, user_id = %claims.sub, "rule created via api");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "rule": rule })),
    ))
}

pub async fn get_rule(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let rule = state.rules.get_rule(id).await?;
    Ok(Json(json!({ "success": true, "rule": rule })))
}

/// Evaluates the rule against the posted context. `executed` is false when
/// the rule is disabled or its conditions do not hold.
pub async fn execute_rule(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
    payload: Option<Json<Value>>,
) -> Result<impl IntoResponse, AppError> {
    let context = payload.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    let executed = state.rules.execute_automation_rule(id, &context).await?;
    let rule = state.rules.get_rule(id).await?;
    Ok(Json(json!({ "success": true, "executed": executed, "rule": rule })))
}

pub async fn enable_rule(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let rule = state.rules.set_rule_enabled(id, true).await?;
    Ok(Json(json!({ "success": true, "rule": rule })))
}

pub async fn disable_rule(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let rule = state.rules.set_rule_enabled(id, false).await?;
    Ok(Json(json!({ "success": true, "rule": rule })))
}
