use super::prelude::*;

#[derive(Debug, Default, Deserialize)]
pub struct WorkflowListQuery {
    pub category: Option<WorkflowCategory>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteWorkflowPayload {
    #[serde(default)]
    pub variables: Map<String, Value>,
}

pub async fn list_workflows(
    State(state): State<AppState>,
    _session: AuthSession,
    Query(query): Query<WorkflowListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let workflows = state.workflows.list_workflows(query.category).await?;
    Ok(Json(json!({ "success": true, "workflows": workflows })))
}

pub async fn create_workflow(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
    Json(payload): Json<NewWorkflowTemplate>,
) -> Result<impl IntoResponse, AppError> {
    let workflow = state.workflows.create_workflow(payload, &claims.sub).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "workflow": workflow })),
    ))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let workflow = state.workflows.get_workflow(id).await?;
    Ok(Json(json!({ "success": true, "workflow": workflow })))
}

/// Starts a manual execution; the graph is driven in the background.
pub async fn execute_workflow(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
    Path(id): Path<Uuid>,
    payload: Option<Json<ExecuteWorkflowPayload>>,
) -> Result<impl IntoResponse, AppError> {
    let variables = payload.map(|Json(p)| p.variables).unwrap_or_default();
    let execution = state
        .workflows
        .execute_workflow(id, &claims.sub, TriggerType::Manual, variables)
        .await?;
    info!(workflow_id = %id, execution_id = %execution.id, user_id = %claims.sub, "manual workflow run");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "execution": execution })),
    ))
}

pub async fn workflow_metrics(
    State(state): State<AppState>,
    _session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let metrics = state.workflows.workflow_metrics().await?;
    Ok(Json(json!({ "success": true, "metrics": metrics })))
}
