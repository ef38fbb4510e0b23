use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::services::network_detector::Carrier;

/// One data-bundle delivery instruction
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub network: Carrier,
    pub recipient_phone: String,
    pub plan_code: String,
    /// Provider-side idempotency key
    pub reference: String,
}

/// Normalized outcome of a delivery attempt, whatever the provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub provider_transaction_id: Option<String>,
    pub message: String,
    pub raw: JsonValue,
}

impl DeliveryResult {
    pub fn delivered(
        provider_transaction_id: Option<String>,
        message: impl Into<String>,
        raw: JsonValue,
    ) -> Self {
        Self {
            success: true,
            provider_transaction_id,
            message: message.into(),
            raw,
        }
    }

    pub fn failed(message: impl Into<String>, raw: JsonValue) -> Self {
        Self {
            success: false,
            provider_transaction_id: None,
            message: message.into(),
            raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceInfo {
    pub provider: String,
    pub balance: Decimal,
    pub currency: Option<String>,
}

/// Provider's own view of a past delivery, returned verbatim for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResult {
    pub provider: String,
    pub reference: String,
    pub raw: JsonValue,
}
