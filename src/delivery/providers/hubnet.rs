use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{decimal_field, http_client, read_json, str_field, url_with_params};
use crate::delivery::error::DeliveryResultOf;
use crate::delivery::factory::{DeliveryConfig, DeliveryProviderKind};
use crate::delivery::provider::DataDeliveryProvider;
use crate::delivery::types::{BalanceInfo, DeliveryRequest, DeliveryResult, StatusResult};
use crate::services::network_detector::normalize_phone;

const PROVIDER: &str = "hubnet";

/// hubnet.com.gh, authenticated by an `api_key` field on every call
pub struct HubnetProvider {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl HubnetProvider {
    pub fn new(config: &DeliveryConfig) -> DeliveryResultOf<Self> {
        Ok(Self {
            client: http_client(PROVIDER, config.timeout())?,
            api_key: config.api_key.clone(),
            base_url: config.base_url(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl DataDeliveryProvider for HubnetProvider {
    async fn purchase_data(&self, request: &DeliveryRequest) -> DeliveryResultOf<DeliveryResult> {
        let payload = json!({
            "api_key": self.api_key,
            "network": DeliveryProviderKind::Hubnet.network_code(request.network),
            "phone": normalize_phone(&request.recipient_phone),
            "plan_id": request.plan_code,
            "reference": request.reference,
        });
        debug!(provider = PROVIDER, reference = %request.reference, "POST /data/purchase");

        let sent = self
            .client
            .post(format!("{}/data/purchase", self.base_url))
            .json(&payload)
            .send()
            .await;
        let body = read_json(PROVIDER, self.timeout, sent).await?;

        let status = str_field(&body, &["status"]).unwrap_or_default();
        if status == "success" || status == "pending" {
            let transaction_id = str_field(&body, &["transaction_id"])
                .or_else(|| str_field(&body, &["reference"]));
            let message = str_field(&body, &["message"])
                .unwrap_or_else(|| "Data bundle sent successfully".to_string());
            return Ok(DeliveryResult::delivered(transaction_id, message, body));
        }

        let message =
            str_field(&body, &["message"]).unwrap_or_else(|| "Failed to deliver data".to_string());
        Ok(DeliveryResult::failed(message, body))
    }

    async fn check_balance(&self) -> DeliveryResultOf<BalanceInfo> {
        let url = url_with_params(
            PROVIDER,
            &format!("{}/balance", self.base_url),
            &[("api_key", self.api_key.as_str())],
        )?;
        let sent = self.client.get(url).send().await;
        let body = read_json(PROVIDER, self.timeout, sent).await?;

        Ok(BalanceInfo {
            provider: PROVIDER.to_string(),
            balance: decimal_field(&body, &["balance"]),
            currency: Some("GHS".to_string()),
        })
    }

    async fn query_status(&self, reference: &str) -> DeliveryResultOf<StatusResult> {
        let url = url_with_params(
            PROVIDER,
            &format!("{}/transaction/status", self.base_url),
            &[("api_key", self.api_key.as_str()), ("reference", reference)],
        )?;
        let sent = self.client.get(url).send().await;
        let raw = read_json(PROVIDER, self.timeout, sent).await?;

        Ok(StatusResult {
            provider: PROVIDER.to_string(),
            reference: reference.to_string(),
            raw,
        })
    }

    fn kind(&self) -> DeliveryProviderKind {
        DeliveryProviderKind::Hubnet
    }
}
