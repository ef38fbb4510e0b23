use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{decimal_field, http_client, read_json, str_field, url_with_params};
use crate::delivery::error::{DeliveryError, DeliveryResultOf};
use crate::delivery::factory::{DeliveryConfig, DeliveryProviderKind};
use crate::delivery::provider::DataDeliveryProvider;
use crate::delivery::types::{BalanceInfo, DeliveryRequest, DeliveryResult, StatusResult};
use crate::services::network_detector::normalize_phone;

const PROVIDER: &str = "clubkonnect";

pub struct ClubKonnectProvider {
    client: Client,
    user_id: String,
    api_key: String,
    callback_url: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl ClubKonnectProvider {
    pub fn new(config: &DeliveryConfig) -> DeliveryResultOf<Self> {
        let user_id = config.user_id.clone().ok_or_else(|| {
            DeliveryError::Configuration("VTU_USER_ID is required for clubkonnect".to_string())
        })?;

        Ok(Self {
            client: http_client(PROVIDER, config.timeout())?,
            user_id,
            api_key: config.api_key.clone(),
            callback_url: config.callback_url.clone(),
            base_url: config.base_url(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl DataDeliveryProvider for ClubKonnectProvider {
    async fn purchase_data(&self, request: &DeliveryRequest) -> DeliveryResultOf<DeliveryResult> {
        let payload = json!({
            "UserID": self.user_id,
            "APIKey": self.api_key,
            "MobileNetwork": DeliveryProviderKind::ClubKonnect.network_code(request.network),
            "DataPlan": request.plan_code,
            "MobileNumber": normalize_phone(&request.recipient_phone),
            "RequestID": request.reference,
            "CallBackURL": self.callback_url,
        });
        debug!(provider = PROVIDER, reference = %request.reference, "POST /data");

        let sent = self
            .client
            .post(format!("{}/data", self.base_url))
            .json(&payload)
            .send()
            .await;
        let body = read_json(PROVIDER, self.timeout, sent).await?;

        let status = str_field(&body, &["status"]).unwrap_or_default();
        if status == "successful" || status == "ORDER_RECEIVED" {
            let transaction_id = str_field(&body, &["transactionId"])
                .or_else(|| str_field(&body, &["orderid"]));
            let message = str_field(&body, &["message"])
                .unwrap_or_else(|| "Data sent successfully".to_string());
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
            &[("UserID", self.user_id.as_str()), ("APIKey", self.api_key.as_str())],
        )?;
        let sent = self.client.get(url).send().await;
        let body = read_json(PROVIDER, self.timeout, sent).await?;

        Ok(BalanceInfo {
            provider: PROVIDER.to_string(),
            balance: decimal_field(&body, &["balance"]),
            currency: None,
        })
    }

    async fn query_status(&self, reference: &str) -> DeliveryResultOf<StatusResult> {
        let url = url_with_params(
            PROVIDER,
            &format!("{}/query", self.base_url),
            &[
                ("UserID", self.user_id.as_str()),
                ("APIKey", self.api_key.as_str()),
                ("RequestID", reference),
            ],
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
        DeliveryProviderKind::ClubKonnect
    }
}
