use crate::payments::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Paystack,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Paystack => "paystack",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "paystack" => Ok(ProviderName::Paystack),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// Gateway-reported outcome of a charge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Success,
    Failed,
    Abandoned,
    Reversed,
    Unknown,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Success => "success",
            PaymentState::Failed => "failed",
            PaymentState::Abandoned => "abandoned",
            PaymentState::Reversed => "reversed",
            PaymentState::Unknown => "unknown",
        }
    }

    pub fn from_paystack(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "success" => PaymentState::Success,
            "pending" | "ongoing" | "processing" | "queued" => PaymentState::Pending,
            "failed" => PaymentState::Failed,
            "abandoned" => PaymentState::Abandoned,
            "reversed" => PaymentState::Reversed,
            _ => PaymentState::Unknown,
        }
    }

    /// Terminal failure as far as settlement is concerned
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PaymentState::Failed | PaymentState::Abandoned | PaymentState::Reversed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub email: String,
    pub phone: Option<String>,
}

/// Charge initialization. `amount` is in major units; conversion to the
/// gateway's minor units happens inside the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub customer: CustomerContact,
    pub amount: Decimal,
    pub currency: String,
    pub reference: String,
    pub callback_url: Option<String>,
    pub channels: Vec<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub gateway_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub status: PaymentState,
    pub reference: String,
    /// Amount charged in minor units as reported by the gateway
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub channel: Option<String>,
    pub gateway_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub raw: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed,
    /// Event type this service does not act on
    Unrecognized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: ProviderName,
    pub kind: WebhookEventKind,
    pub event_type: String,
    /// Gateway's own id for the event's subject, used for de-duplication
    pub event_id: Option<String>,
    pub reference: Option<String>,
    pub report: Option<VerificationResponse>,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn initialize_request_serializes_to_json() {
        let request = InitializeRequest {
            customer: CustomerContact {
                email: "user@example.com".to_string(),
                phone: None,
            },
            amount: dec!(18.00),
            currency: "GHS".to_string(),
            reference: "OE-ABC-123456".to_string(),
            callback_url: Some("https://example.com/payment/callback".to_string()),
            channels: vec!["mobile_money".to_string()],
            metadata: Some(serde_json::json!({"transaction_type":"data_purchase"})),
        };
        let json = serde_json::to_value(&request).expect("serialization should succeed");
        assert_eq!(json["currency"], "GHS");
        assert_eq!(json["reference"], "OE-ABC-123456");
    }

    #[test]
    fn paystack_status_strings_map_to_states() {
        assert_eq!(PaymentState::from_paystack("success"), PaymentState::Success);
        assert_eq!(PaymentState::from_paystack("abandoned"), PaymentState::Abandoned);
        assert_eq!(PaymentState::from_paystack("ongoing"), PaymentState::Pending);
        assert_eq!(PaymentState::from_paystack("??"), PaymentState::Unknown);
        assert!(PaymentState::Reversed.is_failure());
        assert!(!PaymentState::Pending.is_failure());
        assert!(!PaymentState::Unknown.is_failure());
    }
}
