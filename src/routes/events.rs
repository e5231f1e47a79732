use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::AppError, models::integration_event::PublishEvent,
    routes::auth::session::AuthSession, state::AppState,
};

/// Handling runs before the response; a failed handler still answers 202
/// with the retry bookkeeping on the returned event.
pub async fn publish_event(
    State(state): State<AppState>,
    _session: AuthSession,
    Json(payload): Json<PublishEvent>,
) -> Result<impl IntoResponse, AppError> {
    let event = state.bus.publish_event(payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "event": event })),
    ))
}

pub async fn list_events(
    State(state): State<AppState>,
    _session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let events = state.bus.list_events().await?;
    Ok(Json(json!({ "success": true, "events": events })))
}

pub async fn get_event(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event = state.bus.get_event(id).await?;
    Ok(Json(json!({ "success": true, "event": event })))
}

pub async fn list_dead_letters(
    State(state): State<AppState>,
    _session: AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let dead_letters = state.bus.list_dead_letters().await?;
    Ok(Json(json!({ "success": true, "deadLetters": dead_letters })))
}

pub async fn requeue_dead_letter(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event = state.bus.requeue_dead_letter(id).await?;
    Ok(Json(json!({ "success": true, "event": event })))
}
