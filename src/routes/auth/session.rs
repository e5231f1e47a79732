use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::errors::AppError;
use crate::routes::auth::claims::Claims;
use crate::state::AppState;

/// Claims of a caller holding a valid `Authorization: Bearer` token.
#[derive(Debug, PartialEq)]
pub struct AuthSession(pub Claims);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let data = state
            .jwt
            .decode(bearer.token())
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        Ok(AuthSession(data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use crate::state::test_support::{bearer, test_state};
    use axum::http::{header, Request};

    async fn extract(state: &AppState, auth: Option<String>) -> Result<AuthSession, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthSession::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn valid_token_is_extracted() {
        let state = test_state();
        let AuthSession(claims) = extract(&state, Some(bearer(&state, "user-42"))).await.unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.role, UserRole::ProjectManager);
    }

    #[tokio::test]
    async fn missing_or_bad_tokens_are_unauthorized() {
        let state = test_state();
        assert!(matches!(
            extract(&state, None).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&state, Some("Bearer not-a-jwt".into())).await,
            Err(AppError::Unauthorized(_))
        ));

        let expired = Claims::new(
            "user-1".into(),
            "a@b.co".into(),
            "A".into(),
            UserRole::Operative,
            -60,
        );
        let token = state.jwt.create(expired).unwrap();
        assert!(matches!(
            extract(&state, Some(format!("Bearer {token}"))).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
