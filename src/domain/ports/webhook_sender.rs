use async_trait::async_trait;

use crate::domain::errors::DeliveryError;

#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// POST a JSON body. Returns the 2xx status on success.
    async fn deliver(
        &self,
        url: &str,
        body: &str,
        signature: Option<&str>,
    ) -> Result<u16, DeliveryError>;
}
