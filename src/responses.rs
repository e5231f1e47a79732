use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: String,
    pub success: bool,
    pub message: String,
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl JsonResponse {
    pub fn success(msg: &str) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(JsonResponse {
                status: "success".to_string(),
                success: true,
                message: msg.to_string(),
                code: None,
                errors: None,
            }),
        )
    }

    pub fn unauthorized(msg: &str) -> impl IntoResponse {
        Self::with_code(StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED")
    }

    pub fn too_many_requests(msg: &str) -> impl IntoResponse {
        Self::with_code(StatusCode::TOO_MANY_REQUESTS, msg, "RATE_LIMITED")
    }

    pub fn with_code(status: StatusCode, msg: &str, code: &str) -> impl IntoResponse {
        (
            status,
            Json(JsonResponse {
                status: "error".to_string(),
                success: false,
                message: msg.to_string(),
                code: Some(code.to_string()),
                errors: None,
            }),
        )
    }

    pub fn validation_errors(errors: &[String]) -> impl IntoResponse {
        (
            StatusCode::BAD_REQUEST,
            Json(JsonResponse {
                status: "error".to_string(),
                success: false,
                message: errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "Validation failed".to_string()),
                code: Some("VALIDATION_ERROR".to_string()),
                errors: Some(errors.to_vec()),
            }),
        )
    }
}
