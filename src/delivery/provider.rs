use async_trait::async_trait;

use crate::delivery::error::DeliveryResultOf;
use crate::delivery::factory::DeliveryProviderKind;
use crate::delivery::types::{BalanceInfo, DeliveryRequest, DeliveryResult, StatusResult};

#[async_trait]
pub trait DataDeliveryProvider: Send + Sync {
    /// Send a bundle. Business rejections come back as `success == false`;
    /// `Err` is reserved for transport problems.
    async fn purchase_data(&self, request: &DeliveryRequest) -> DeliveryResultOf<DeliveryResult>;

    async fn check_balance(&self) -> DeliveryResultOf<BalanceInfo>;

    async fn query_status(&self, reference: &str) -> DeliveryResultOf<StatusResult>;

    fn kind(&self) -> DeliveryProviderKind;
}
