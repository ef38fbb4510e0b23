use crate::payments::error::PaymentResult;
use crate::payments::types::{
    InitializeRequest, InitializeResponse, ProviderName, VerificationResponse, WebhookEvent,
    WebhookVerificationResult,
};
use async_trait::async_trait;

/// Payment sub-gateway seam. One implementation per gateway, chosen at startup.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse>;

    async fn verify(&self, reference: &str) -> PaymentResult<VerificationResponse>;

    fn name(&self) -> ProviderName;

    /// Checks the signature over the raw, unparsed body
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;
}
