use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::login::issue_token;
use crate::db::user_repository::NewUserRecord;
use crate::errors::AppError;
use crate::models::user::UserRole;
use crate::state::AppState;
use crate::utils::password::hash_password;
use crate::utils::validation::{
    combine_validations, validate_company_name, validate_email, validate_name,
    validate_password_with_min,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub name: String,
    pub company_name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

pub async fn handle_register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    let min_length = state.config.app.security.password_min_length;
    let checked = combine_validations([
        validate_email(payload.email.trim()),
        validate_password_with_min(&payload.password, min_length),
        validate_name(&payload.name),
        validate_company_name(&payload.company_name),
    ]);
    if !checked.is_valid {
        return Err(AppError::Validation(checked.errors));
    }

    let user = state
        .users
        .create_user(NewUserRecord {
            email: payload.email.trim().to_lowercase(),
            password_hash: hash_password(&payload.password)?,
            name: payload.name.trim().to_string(),
            company_name: payload.company_name.trim().to_string(),
            role: payload.role.unwrap_or(UserRole::CompanyAdmin),
        })
        .await?;
    let token = issue_token(&state, &user)?;
    info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "token": token, "user": user })),
    ))
}
