use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::AppError, routes::auth::session::AuthSession,
    services::notifications::NotificationFilter, state::AppState,
};

pub async fn list_notifications(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
    Query(filter): Query<NotificationFilter>,
) -> impl IntoResponse {
    let page = state
        .services
        .notifications
        .list_for_user(&claims.sub, &filter);
    Json(json!({ "success": true, "page": page }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> impl IntoResponse {
    let count = state.services.notifications.unread_count(&claims.sub);
    Json(json!({ "success": true, "count": count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let notification = state.services.notifications.mark_as_read(id)?;
    Ok(Json(json!({ "success": true, "notification": notification })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> impl IntoResponse {
    let updated = state.services.notifications.mark_all_as_read(&claims.sub);
    Json(json!({ "success": true, "updated": updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.services.notifications.delete(id)?;
    Ok(Json(json!({ "success": true })))
}
