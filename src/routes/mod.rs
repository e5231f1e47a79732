pub mod auth;
pub mod config;
pub mod events;
pub mod notifications;
pub mod platform;
pub mod rules;
pub mod workflows;

use axum::{
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};

use crate::{responses::JsonResponse, state::AppState};

async fn root() -> Response {
    JsonResponse::success("SiteFlow automation API").into_response()
}

async fn health() -> Response {
    JsonResponse::success("ok").into_response()
}

/// Every `/api` route except health, config and auth requires a bearer token;
/// the `AuthSession` extractor enforces it per handler.
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth::handle_login))
        .route("/register", post(auth::handle_register))
        .route("/me", get(auth::handle_me));

    let platform_routes = Router::new()
        .route(
            "/api-keys",
            get(platform::list_api_keys).post(platform::create_api_key),
        )
        .route("/api-keys/{id}", delete(platform::delete_api_key))
        .route(
            "/webhooks",
            get(platform::list_webhooks).post(platform::create_webhook),
        )
        .route("/webhooks/{id}", delete(platform::delete_webhook))
        .route("/webhooks/{id}/test", post(platform::test_webhook));

    let rule_routes = Router::new()
        .route("/", get(rules::list_rules).post(rules::create_rule))
        .route("/{id}", get(rules::get_rule))
        .route("/{id}/execute", post(rules::execute_rule))
        .route("/{id}/enable", post(rules::enable_rule))
        .route("/{id}/disable", post(rules::disable_rule));

    let workflow_routes = Router::new()
        .route(
            "/",
            get(workflows::list_workflows).post(workflows::create_workflow),
        )
        .route("/metrics", get(workflows::workflow_metrics))
        .route("/executions", get(workflows::list_executions))
        .route("/executions/{id}", get(workflows::get_execution))
        .route("/executions/{id}/cancel", post(workflows::cancel_execution))
        .route("/executions/{id}/resume", post(workflows::resume_execution))
        .route(
            "/executions/{id}/steps/{step_id}/approvals",
            post(workflows::submit_approval),
        )
        .route(
            "/executions/{id}/events",
            get(workflows::sse_execution_events),
        )
        .route("/{id}", get(workflows::get_workflow))
        .route("/{id}/execute", post(workflows::execute_workflow));

    let event_routes = Router::new()
        .route("/", get(events::list_events).post(events::publish_event))
        .route("/dead-letters", get(events::list_dead_letters))
        .route(
            "/dead-letters/{id}/requeue",
            post(events::requeue_dead_letter),
        )
        .route("/{id}", get(events::get_event));

    let notification_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/{id}", delete(notifications::delete_notification))
        .route("/{id}/read", post(notifications::mark_read));

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/config", get(config::get_public_config))
        .nest("/api/auth", auth_routes)
        .nest("/api/platform", platform_routes)
        .nest("/api/automation/rules", rule_routes)
        .nest("/api/workflows", workflow_routes)
        .nest("/api/events", event_routes)
        .nest("/api/notifications", notification_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{bearer, test_state};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `app.oneshot(...)`

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(request).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn public_routes_need_no_token() {
        let app = build_router(test_state());

        let (status, body) = call(&app, Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = call(&app, Method::GET, "/api/config", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["config"]["features"].is_object());
        assert!(body["config"].get("security").is_none());
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_token() {
        let app = build_router(test_state());
        for uri in ["/api/workflows", "/api/automation/rules", "/api/events"] {
            let (status, body) = call(&app, Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn register_then_fetch_profile() {
        let app = build_router(test_state());
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "Site.Lead@Example.com",
                "password": "hunter22",
                "name": "Site Lead",
                "companyName": "Northwind Build"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = format!("Bearer {}", body["token"].as_str().unwrap());

        let (status, body) = call(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "site.lead@example.com");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "site.lead@example.com", "password": "wrong-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rule_lifecycle_over_http() {
        let state = test_state();
        let token = bearer(&state, "user-9");
        let app = build_router(state);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/automation/rules",
            Some(&token),
            Some(json!({
                "name": "Notify on urgent tasks",
                "conditions": [{"field": "priority", "operator": "equals", "value": "urgent"}],
                "actions": [{"type": "send_notification", "order": 1, "configuration": {
                    "recipient": "user-9", "title": "Urgent task", "message": "Check the board"
                }}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["rule"]["id"].as_str().unwrap().to_string();

        let execute = format!("/api/automation/rules/{id}/execute");
        let (status, body) = call(
            &app,
            Method::POST,
            &execute,
            Some(&token),
            Some(json!({"priority": "low"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["executed"], false);
        assert_eq!(body["rule"]["executionCount"], 0);

        let (_, body) = call(
            &app,
            Method::POST,
            &execute,
            Some(&token),
            Some(json!({"priority": "urgent"})),
        )
        .await;
        assert_eq!(body["executed"], true);
        assert_eq!(body["rule"]["successCount"], 1);

        let (_, body) = call(
            &app,
            Method::GET,
            "/api/notifications/unread-count",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["count"], 1);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/automation/rules/{id}/disable"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rule"]["enabled"], false);
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let state = test_state();
        let token = bearer(&state, "user-1");
        let app = build_router(state);
        let uri = format!("/api/workflows/{}", uuid::Uuid::new_v4());
        let (status, body) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn invalid_event_is_rejected() {
        let state = test_state();
        let token = bearer(&state, "user-1");
        let app = build_router(state);
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/events",
            Some(&token),
            Some(json!({"type": "", "source": "mobile"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
