use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{decimal_field, http_client, read_json, str_field};
use crate::delivery::error::{DeliveryError, DeliveryResultOf};
use crate::delivery::factory::{DeliveryConfig, DeliveryProviderKind};
use crate::delivery::provider::DataDeliveryProvider;
use crate::delivery::types::{BalanceInfo, DeliveryRequest, DeliveryResult, StatusResult};
use crate::services::network_detector::normalize_phone;

const PROVIDER: &str = "vtpass";
const SUCCESS_CODE: &str = "000";

pub struct VtPassProvider {
    client: Client,
    authorization: String,
    base_url: String,
    timeout: Duration,
}

impl VtPassProvider {
    pub fn new(config: &DeliveryConfig) -> DeliveryResultOf<Self> {
        let user_id = config.user_id.as_deref().ok_or_else(|| {
            DeliveryError::Configuration("VTU_USER_ID is required for vtpass".to_string())
        })?;
        let credentials = STANDARD.encode(format!("{}:{}", user_id, config.api_key));

        Ok(Self {
            client: http_client(PROVIDER, config.timeout())?,
            authorization: format!("Basic {}", credentials),
            base_url: config.base_url(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl DataDeliveryProvider for VtPassProvider {
    async fn purchase_data(&self, request: &DeliveryRequest) -> DeliveryResultOf<DeliveryResult> {
        let phone = normalize_phone(&request.recipient_phone);
        let payload = json!({
            "serviceID": DeliveryProviderKind::VtPass.network_code(request.network),
            "billersCode": phone,
            "variation_code": request.plan_code,
            "phone": phone,
            "request_id": request.reference,
        });
        debug!(provider = PROVIDER, reference = %request.reference, "POST /pay");

        let sent = self
            .client
            .post(format!("{}/pay", self.base_url))
            .header("Authorization", &self.authorization)
            .json(&payload)
            .send()
            .await;
        let body = read_json(PROVIDER, self.timeout, sent).await?;

        let code = str_field(&body, &["code"]);
        let txn_status = str_field(&body, &["content", "transactions", "status"]);
        if code.as_deref() == Some(SUCCESS_CODE) || txn_status.as_deref() == Some("delivered") {
            let transaction_id = str_field(&body, &["content", "transactions", "transactionId"])
                .or_else(|| str_field(&body, &["requestId"]));
            let message = str_field(&body, &["response_description"])
                .unwrap_or_else(|| "Data sent successfully".to_string());
            return Ok(DeliveryResult::delivered(transaction_id, message, body));
        }

        let message = str_field(&body, &["response_description"])
            .unwrap_or_else(|| "Transaction failed".to_string());
        Ok(DeliveryResult::failed(message, body))
    }

    async fn check_balance(&self) -> DeliveryResultOf<BalanceInfo> {
        let sent = self
            .client
            .get(format!("{}/balance", self.base_url))
            .header("Authorization", &self.authorization)
            .send()
            .await;
        let body = read_json(PROVIDER, self.timeout, sent).await?;

        Ok(BalanceInfo {
            provider: PROVIDER.to_string(),
            balance: decimal_field(&body, &["contents", "balance"]),
            currency: Some("NGN".to_string()),
        })
    }

    async fn query_status(&self, reference: &str) -> DeliveryResultOf<StatusResult> {
        let sent = self
            .client
            .post(format!("{}/requery", self.base_url))
            .header("Authorization", &self.authorization)
            .json(&json!({ "request_id": reference }))
            .send()
            .await;
        let raw = read_json(PROVIDER, self.timeout, sent).await?;

        Ok(StatusResult {
            provider: PROVIDER.to_string(),
            reference: reference.to_string(),
            raw,
        })
    }

    fn kind(&self) -> DeliveryProviderKind {
        DeliveryProviderKind::VtPass
    }
}
