use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::claims::Claims;
use super::session::AuthSession;
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;
use crate::utils::password::verify_password;

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

pub(super) fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    let ttl = i64::from(state.config.app.security.session_timeout_minutes) * 60;
    let claims = Claims::new(
        user.id.to_string(),
        user.email.clone(),
        user.name.clone(),
        user.role,
        ttl,
    );
    state
        .jwt
        .create(claims)
        .map_err(|e| AppError::Downstream(format!("token generation failed: {e}")))
}

pub async fn handle_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .find_user_by_email(payload.email.trim())
        .await?
        .filter(|u| verify_password(&payload.password, &u.password_hash));
    let Some(user) = user else {
        warn!(email = %payload.email, "failed login");
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    let token = issue_token(&state, &user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(json!({ "success": true, "token": token, "user": user })))
}

pub async fn handle_me(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> Result<impl IntoResponse, AppError> {
    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id".to_string()))?;
    let user = state
        .users
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("user", id))?;
    Ok(Json(json!({ "success": true, "user": user })))
}
