use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::{json, Value};

use super::require_str;
use crate::errors::AppError;

/// Calls an arbitrary endpoint. Only http(s) URLs are accepted; a non-2xx
/// response is a downstream failure.
pub(super) async fn call_webhook(
    client: &Client,
    timeout: Duration,
    config: &Value,
) -> Result<Value, AppError> {
    let url = require_str(config, "url", "Webhook url")?;
    let parsed = reqwest::Url::parse(&url)
        .map_err(|e| AppError::validation(format!("Invalid webhook url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::validation("Only http/https schemes are allowed"));
    }

    let method = config
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("POST")
        .to_ascii_uppercase();
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| AppError::validation(format!("Unsupported HTTP method `{method}`")))?;

    let mut headers = HeaderMap::new();
    if let Some(map) = config.get("headers").and_then(Value::as_object) {
        for (k, v) in map {
            let Some(v) = v.as_str() else { continue };
            if let (Ok(name), Ok(val)) = (HeaderName::try_from(k.as_str()), HeaderValue::from_str(v)) {
                headers.append(name, val);
            }
        }
    }

    let mut request = client
        .request(method.clone(), parsed)
        .headers(headers)
        .timeout(timeout);
    if method != Method::GET {
        if let Some(body) = config.get("body") {
            request = request.json(body);
        }
    }

    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(AppError::Downstream(format!(
            "webhook returned {}",
            status.as_u16()
        )));
    }
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok(json!({ "status": status.as_u16(), "body": body }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn posts_json_body_with_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hooks/site")
                    .header("x-project", "p-1")
                    .json_body(json!({"status": "done"}));
                then.status(200).json_body(json!({"ok": true}));
            })
            .await;

        let out = call_webhook(
            &Client::new(),
            Duration::from_secs(5),
            &json!({
                "url": server.url("/hooks/site"),
                "headers": {"x-project": "p-1"},
                "body": {"status": "done"}
            }),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(out["status"], 200);
        assert_eq!(out["body"]["ok"], true);
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/down");
                then.status(503);
            })
            .await;

        let err = call_webhook(
            &Client::new(),
            Duration::from_secs(5),
            &json!({"url": server.url("/down"), "method": "get"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Downstream(_)));
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let err = call_webhook(
            &Client::new(),
            Duration::from_secs(5),
            &json!({"url": "file:///etc/passwd"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
