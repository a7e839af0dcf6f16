use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::ports::channel_adapter::{ChannelAdapter, DeliveryReceipt, OutboundMessage};

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    message_id: Option<String>,
}

/// Hands outbound messages to the messaging gateway that owns the channel connections
pub struct HttpChannelAdapter {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChannelAdapter {
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn send_url(&self) -> String {
        format!("{}/messages", self.base_url)
    }
}

#[async_trait]
impl ChannelAdapter for HttpChannelAdapter {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, String> {
        let mut request = self
            .client
            .post(self.send_url())
            .header("Idempotency-Key", &message.idempotency_key)
            .json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Gateway request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Gateway returned HTTP {}: {}", status.as_u16(), body));
        }

        // Gateways that answer with an empty body are still a successful send
        let raw = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<GatewayResponse>(&raw).ok();
        Ok(DeliveryReceipt {
            provider_message_id: parsed.and_then(|r| r.message_id),
        })
    }

    fn name(&self) -> &str {
        "http_gateway"
    }
}
