use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Client-safe slice of the application configuration. No credentials.
pub async fn get_public_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "success": true, "config": state.config.app.public_view() }))
}
