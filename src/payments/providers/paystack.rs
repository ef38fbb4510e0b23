use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    InitializeRequest, InitializeResponse, PaymentState, ProviderName, VerificationResponse,
    WebhookEvent, WebhookEventKind, WebhookVerificationResult,
};
use crate::payments::utils::{to_minor_units, verify_hmac_sha512_hex, PaymentHttpClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";
pub const CHARGE_FAILED_EVENT: &str = "charge.failed";

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub public_key: Option<String>,
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 0,
        }
    }
}

impl PaystackConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("PAYSTACK_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "PAYSTACK_SECRET_KEY environment variable is required".to_string(),
                field: Some("PAYSTACK_SECRET_KEY".to_string()),
            })?;

        Ok(Self {
            public_key: std::env::var("PAYSTACK_PUBLIC_KEY").ok(),
            webhook_secret: std::env::var("PAYSTACK_WEBHOOK_SECRET").ok(),
            base_url: std::env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            timeout_secs: std::env::var("PAYSTACK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("PAYSTACK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0),
            secret_key,
        })
    }

    /// Webhooks are signed with the secret key unless a dedicated secret is set
    pub fn signing_secret(&self) -> &str {
        self.webhook_secret.as_deref().unwrap_or(&self.secret_key)
    }
}

pub struct PaystackProvider {
    config: PaystackConfig,
    http: PaymentHttpClient,
}

impl PaystackProvider {
    pub fn new(config: PaystackConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(PaystackConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn rejected(message: String) -> PaymentError {
        PaymentError::ProviderError {
            provider: "paystack".to_string(),
            message,
            provider_code: None,
            retryable: false,
        }
    }
}

#[async_trait]
impl PaymentProvider for PaystackProvider {
    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        if request.amount <= rust_decimal::Decimal::ZERO {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }
        if request.customer.email.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "customer.email is required for paystack initialization".to_string(),
                field: Some("customer.email".to_string()),
            });
        }

        let payload = serde_json::json!({
            "email": request.customer.email,
            "amount": to_minor_units(request.amount)?,
            "currency": request.currency,
            "reference": request.reference,
            "callback_url": request.callback_url,
            "channels": request.channels,
            "metadata": request.metadata,
        });

        let raw: PaystackEnvelope<PaystackInitializeData> = self
            .http
            .request_json_once(
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
                Some(&self.config.secret_key),
                Some(&payload),
            )
            .await?;

        if !raw.status {
            return Err(Self::rejected(raw.message));
        }
        let data = raw.data.ok_or_else(|| Self::rejected("missing data".to_string()))?;
        info!(reference = %data.reference, "paystack payment initialized");

        Ok(InitializeResponse {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            gateway_reference: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<VerificationResponse> {
        if reference.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "reference is required".to_string(),
                field: Some("reference".to_string()),
            });
        }

        let raw: JsonValue = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", reference)),
                Some(&self.config.secret_key),
                None,
            )
            .await?;

        let envelope: PaystackEnvelope<PaystackChargeData> = serde_json::from_value(raw.clone())
            .map_err(|e| Self::rejected(format!("invalid verify response: {}", e)))?;
        if !envelope.status {
            return Err(Self::rejected(envelope.message));
        }
        let data = envelope
            .data
            .ok_or_else(|| Self::rejected("missing data".to_string()))?;

        Ok(data.into_report(reference, raw.get("data").cloned().unwrap_or(JsonValue::Null)))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Paystack
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha512_hex(payload, self.config.signing_secret(), signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid paystack signature".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        parse_paystack_event(payload)
    }
}

/// Decode a Paystack webhook body. Only call after the signature has passed.
pub fn parse_paystack_event(payload: &[u8]) -> PaymentResult<WebhookEvent> {
    let parsed: JsonValue =
        serde_json::from_slice(payload).map_err(|e| PaymentError::ValidationError {
            message: format!("invalid webhook JSON payload: {}", e),
            field: Some("body".to_string()),
        })?;

    let event_type = parsed
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let kind = match event_type.as_str() {
        CHARGE_SUCCESS_EVENT => WebhookEventKind::PaymentSucceeded,
        CHARGE_FAILED_EVENT => WebhookEventKind::PaymentFailed,
        _ => WebhookEventKind::Unrecognized,
    };

    let data = parsed.get("data").cloned().unwrap_or(JsonValue::Null);
    let reference = data
        .get("reference")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());
    // Paystack sends numeric ids, tolerate strings as well
    let event_id = data.get("id").and_then(|v| match v {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => Some(s.clone()),
        _ => None,
    });

    let report = match (kind, reference.as_deref()) {
        (WebhookEventKind::Unrecognized, _) | (_, None) => None,
        (_, Some(reference)) => {
            let mut report = serde_json::from_value::<PaystackChargeData>(data.clone())
                .map(|charge| charge.into_report(reference, data.clone()))
                .unwrap_or_else(|_| VerificationResponse {
                    status: PaymentState::Unknown,
                    reference: reference.to_string(),
                    amount_minor: None,
                    currency: None,
                    channel: None,
                    gateway_message: None,
                    paid_at: None,
                    raw: data.clone(),
                });
            // The event type is authoritative for the outcome
            report.status = match kind {
                WebhookEventKind::PaymentSucceeded => PaymentState::Success,
                _ => PaymentState::Failed,
            };
            Some(report)
        }
    };

    Ok(WebhookEvent {
        provider: ProviderName::Paystack,
        kind,
        event_type,
        event_id,
        reference,
        report,
        payload: parsed,
        received_at: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackInitializeData {
    authorization_url: String,
    #[serde(default)]
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackChargeData {
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
}

impl PaystackChargeData {
    fn into_report(self, reference: &str, raw: JsonValue) -> VerificationResponse {
        VerificationResponse {
            status: PaymentState::from_paystack(&self.status),
            reference: reference.to_string(),
            amount_minor: self.amount,
            currency: self.currency,
            channel: self.channel,
            gateway_message: self.gateway_response,
            paid_at: self
                .paid_at
                .as_deref()
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|v| v.with_timezone(&Utc)),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::compute_hmac_sha512_hex;

    fn provider() -> PaystackProvider {
        PaystackProvider::new(PaystackConfig {
            public_key: Some("pk_test".to_string()),
            secret_key: "sk_test".to_string(),
            webhook_secret: Some("whsec_test".to_string()),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        })
        .expect("provider init should succeed")
    }

    #[test]
    fn webhook_signature_validation() {
        let provider = provider();
        let payload = br#"{"event":"charge.success"}"#;
        let result = provider
            .verify_webhook(payload, "invalid_signature")
            .expect("verification should not error");
        assert!(!result.valid);

        let signature = compute_hmac_sha512_hex(payload, "whsec_test").unwrap();
        assert!(provider.verify_webhook(payload, &signature).unwrap().valid);
    }

    #[test]
    fn parses_charge_success_event() {
        let payload = serde_json::json!({
            "event": "charge.success",
            "data": {
                "id": 302961,
                "reference": "OE-LX1-ABC123",
                "status": "success",
                "amount": 1800,
                "currency": "GHS",
                "channel": "mobile_money",
                "paid_at": "2026-01-10T09:30:00.000Z"
            }
        });
        let event = parse_paystack_event(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind, WebhookEventKind::PaymentSucceeded);
        assert_eq!(event.event_id.as_deref(), Some("302961"));
        let report = event.report.unwrap();
        assert_eq!(report.status, PaymentState::Success);
        assert_eq!(report.amount_minor, Some(1800));
        assert_eq!(report.channel.as_deref(), Some("mobile_money"));
        assert!(report.paid_at.is_some());
    }

    #[test]
    fn unknown_events_are_unrecognized() {
        let payload = br#"{"event":"transfer.success","data":{"reference":"T1"}}"#;
        let event = parse_paystack_event(payload).unwrap();
        assert_eq!(event.kind, WebhookEventKind::Unrecognized);
        assert!(event.report.is_none());
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(parse_paystack_event(b"not json").is_err());
    }
}
