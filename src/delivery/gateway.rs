use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::delivery::error::{DeliveryError, DeliveryResultOf};
use crate::delivery::provider::DataDeliveryProvider;
use crate::delivery::types::{BalanceInfo, DeliveryRequest, DeliveryResult, StatusResult};
use crate::logging::mask_phone;

/// Single entry point to the configured VTU provider.
///
/// `deliver` never returns an error: timeouts and transport failures are
/// folded into a failed `DeliveryResult`, so callers handle one shape.
#[derive(Clone)]
pub struct DeliveryGateway {
    provider: Arc<dyn DataDeliveryProvider>,
    timeout: Duration,
}

impl DeliveryGateway {
    pub fn new(provider: Arc<dyn DataDeliveryProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.kind().as_str()
    }

    pub async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult {
        let provider = self.provider_name();
        info!(
            provider,
            reference = %request.reference,
            network = %request.network,
            phone = %mask_phone(&request.recipient_phone),
            "Sending data bundle"
        );

        let outcome = match timeout(self.timeout, self.provider.purchase_data(request)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                provider: provider.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(result) => {
                if result.success {
                    info!(provider, reference = %request.reference, "Delivery accepted by provider");
                } else {
                    warn!(
                        provider,
                        reference = %request.reference,
                        message = %result.message,
                        "Delivery rejected by provider"
                    );
                }
                result
            }
            Err(err) => {
                warn!(provider, reference = %request.reference, error = %err, "Delivery call failed");
                DeliveryResult::failed(err.to_string(), err.raw())
            }
        }
    }

    pub async fn check_balance(&self) -> DeliveryResultOf<BalanceInfo> {
        self.bounded(self.provider.check_balance()).await
    }

    pub async fn query_status(&self, reference: &str) -> DeliveryResultOf<StatusResult> {
        self.bounded(self.provider.query_status(reference)).await
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = DeliveryResultOf<T>>,
    ) -> DeliveryResultOf<T> {
        timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(DeliveryError::Timeout {
                    provider: self.provider_name().to_string(),
                    timeout_secs: self.timeout.as_secs(),
                })
            })
    }
}
