use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DeliveryError;
use crate::domain::ports::webhook_sender::WebhookSender;
use crate::domain::services::webhook_signature::SIGNATURE_HEADER;

/// Webhook delivery over reqwest with a hard per-request timeout
pub struct ReqwestWebhookSender {
    client: reqwest::Client,
}

impl ReqwestWebhookSender {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }
}

#[async_trait]
impl WebhookSender for ReqwestWebhookSender {
    async fn deliver(
        &self,
        url: &str,
        body: &str,
        signature: Option<&str>,
    ) -> Result<u16, DeliveryError> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Event", "conversation_summary")
            .body(body.to_owned());
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Transient(format!("timeout: {}", e))
            } else if e.is_connect() || e.is_request() {
                DeliveryError::Transient(format!("connection error: {}", e))
            } else if e.is_builder() {
                DeliveryError::Permanent(format!("invalid request: {}", e))
            } else {
                DeliveryError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(DeliveryError::from_status(
            status.as_u16(),
            format!("HTTP {}: {}", status.as_u16(), detail),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_success_returns_status() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hook")
                    .header("x-webhook-signature", "sha256=abc");
                then.status(202);
            })
            .await;

        let sender = ReqwestWebhookSender::new(Duration::from_secs(5));
        let status = sender
            .deliver(&server.url("/hook"), "{}", Some("sha256=abc"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(status, 202);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hook");
                then.status(500);
            })
            .await;

        let sender = ReqwestWebhookSender::new(Duration::from_secs(5));
        let err = sender
            .deliver(&server.url("/hook"), "{}", None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hook");
                then.status(404);
            })
            .await;

        let sender = ReqwestWebhookSender::new(Duration::from_secs(5));
        let err = sender
            .deliver(&server.url("/hook"), "{}", None)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hook");
                then.status(429);
            })
            .await;

        let sender = ReqwestWebhookSender::new(Duration::from_secs(5));
        let err = sender
            .deliver(&server.url("/hook"), "{}", None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
