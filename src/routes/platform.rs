use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::AppError, models::webhook::NewWebhookEndpoint, routes::auth::session::AuthSession,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyPayload {
    pub name: String,
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    _session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let keys = state.platform.list_api_keys().await?;
    Ok(Json(json!({ "success": true, "apiKeys": keys })))
}

/// The response is the only place the full key is ever shown.
pub async fn create_api_key(
    State(state): State<AppState>,
    _session: AuthSession,
    Json(payload): Json<CreateApiKeyPayload>,
) -> Result<impl IntoResponse, AppError> {
    let key = state.platform.create_api_key(&payload.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "apiKey": key })),
    ))
}

pub async fn delete_api_key(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.platform.delete_api_key(id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    _session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let webhooks = state.platform.list_webhooks().await?;
    Ok(Json(json!({ "success": true, "webhooks": webhooks })))
}

pub async fn create_webhook(
    State(state): State<AppState>,
    _session: AuthSession,
    Json(payload): Json<NewWebhookEndpoint>,
) -> Result<impl IntoResponse, AppError> {
    let webhook = state.platform.create_webhook(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "webhook": webhook })),
    ))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.platform.delete_webhook(id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn test_webhook(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.platform.test_webhook(id).await?;
    Ok(Json(json!({ "success": true, "result": result })))
}
