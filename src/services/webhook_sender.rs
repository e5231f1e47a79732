use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Siteflow-Signature";
pub const EVENT_HEADER: &str = "X-Siteflow-Event";

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookDelivery {
    pub url: String,
    pub secret: String,
    pub event_type: String,
    pub payload: Value,
}

/// Posts signed payloads to subscriber URLs. Any HTTP response, including a
/// non-2xx one, is `Ok(status)`; only transport failures are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn deliver(&self, delivery: WebhookDelivery) -> Result<u16, AppError>;
}

/// `sha256=<hex HMAC-SHA256(secret, body)>`
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Downstream(format!("cannot key webhook signature: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub struct HttpWebhookSender {
    client: Client,
    timeout: Duration,
}

impl HttpWebhookSender {
    pub fn new(client: Client, timeout: Duration) -> Self {
        HttpWebhookSender { client, timeout }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn deliver(&self, delivery: WebhookDelivery) -> Result<u16, AppError> {
        let body = serde_json::to_vec(&delivery.payload)
            .map_err(|e| AppError::Downstream(format!("cannot encode webhook payload: {e}")))?;
        let signature = sign_payload(&delivery.secret, &body)?;

        let response = self
            .client
            .post(&delivery.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, &delivery.event_type)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(url = %delivery.url, status, event = %delivery.event_type, "webhook delivered");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn delivery(url: String) -> WebhookDelivery {
        WebhookDelivery {
            url,
            secret: "whsec_test".into(),
            event_type: "task.assigned".into(),
            payload: json!({"event": "task.assigned", "data": {"id": "t1"}}),
        }
    }

    #[test]
    fn signature_is_hex_hmac() {
        let sig = sign_payload("key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            sig,
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[tokio::test]
    async fn posts_signed_payload_with_event_header() {
        let server = MockServer::start();
        let body = serde_json::to_vec(&json!({"event": "task.assigned", "data": {"id": "t1"}}))
            .unwrap();
        let expected_sig = sign_payload("whsec_test", &body).unwrap();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/hooks/siteflow")
                .header(EVENT_HEADER, "task.assigned")
                .header(SIGNATURE_HEADER, expected_sig.as_str());
            then.status(202);
        });

        let sender = HttpWebhookSender::new(Client::new(), Duration::from_secs(5));
        let status = sender
            .deliver(delivery(server.url("/hooks/siteflow")))
            .await
            .unwrap();
        assert_eq!(status, 202);
        mock.assert();
    }

    #[tokio::test]
    async fn non_success_status_is_reported_not_raised() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/down");
            then.status(500);
        });
        let sender = HttpWebhookSender::new(Client::new(), Duration::from_secs(5));
        let status = sender.deliver(delivery(server.url("/down"))).await.unwrap();
        assert_eq!(status, 500);
    }
}
