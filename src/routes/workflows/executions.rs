use super::prelude::*;

#[derive(Debug, Deserialize)]
pub struct ApprovalPayload {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub comments: Option<String>,
}

pub async fn list_executions(
    State(state): State<AppState>,
    _session: AuthSession,
    Query(filter): Query<ExecutionFilter>,
) -> Result<impl IntoResponse, AppError> {
    let executions = state.workflows.list_executions(&filter).await?;
    Ok(Json(json!({ "success": true, "executions": executions })))
}

pub async fn get_execution(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let execution = state.workflows.get_execution(id).await?;
    Ok(Json(json!({ "success": true, "execution": execution })))
}

pub async fn cancel_execution(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let execution = state.workflows.cancel_execution(id).await?;
    info!(execution_id = %id, user_id = %claims.sub, "execution cancelled by user");
    Ok(Json(json!({ "success": true, "execution": execution })))
}

pub async fn resume_execution(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let execution = state.workflows.resume_execution(id).await?;
    Ok(Json(json!({ "success": true, "execution": execution })))
}

pub async fn submit_approval(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
    Path((id, step_id)): Path<(Uuid, String)>,
    Json(payload): Json<ApprovalPayload>,
) -> Result<impl IntoResponse, AppError> {
    let execution = state
        .workflows
        .submit_approval(
            id,
            &step_id,
            &claims.sub,
            &claims.name,
            payload.decision,
            payload.comments,
        )
        .await?;
    Ok(Json(json!({ "success": true, "execution": execution })))
}
