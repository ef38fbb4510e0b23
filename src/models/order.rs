//! Order record: one purchase attempt and its three status axes.
//!
//! Orders are never deleted. Every state change goes through a versioned
//! write so concurrent entry points cannot both act on the same transition.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::logging::mask_phone;
use crate::models::bundle::Bundle;
use crate::services::network_detector::Carrier;

pub const ORDER_REFERENCE_PREFIX: &str = "OE";
pub const TOPUP_REFERENCE_PREFIX: &str = "TOPUP";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ---------------------------------------------------------------------------
// Status axes
// ---------------------------------------------------------------------------

/// Overall lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "failed" => Some(OrderStatus::Failed),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// Delivery axis. `Processing` marks a claimed, in-flight provider call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeliveryStatus::Pending),
            "processing" => Some(DeliveryStatus::Processing),
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "mobile_money" | "momo" => Ok(PaymentMethod::MobileMoney),
            "wallet" => Ok(PaymentMethod::Wallet),
            other => Err(format!("unsupported payment method: {}", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reference: String,
    pub gateway_reference: Option<String>,
    pub user_id: Option<Uuid>,
    pub bundle_id: Uuid,
    pub recipient_phone: String,
    pub network: Carrier,
    pub data_amount: String,
    pub amount: Decimal,
    pub currency: String,
    pub carrier_plan_code: String,
    pub payment_method: PaymentMethod,
    pub payment_channel: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,
    pub retry_count: i32,
    pub provider_transaction_id: Option<String>,
    pub provider_response: Option<JsonValue>,
    pub payment_response: Option<JsonValue>,
    pub error_message: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// New pending order with the bundle's price and plan code captured
    pub fn new(
        user_id: Option<Uuid>,
        bundle: &Bundle,
        recipient_phone: String,
        payment_method: PaymentMethod,
        currency: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference: generate_reference(ORDER_REFERENCE_PREFIX),
            gateway_reference: None,
            user_id,
            bundle_id: bundle.id,
            recipient_phone,
            network: bundle.network,
            data_amount: bundle.data_amount.clone(),
            amount: bundle.retail_price,
            currency: currency.to_string(),
            carrier_plan_code: bundle.carrier_plan_code.clone(),
            payment_method,
            payment_channel: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            delivery_status: DeliveryStatus::Pending,
            retry_count: 0,
            provider_transaction_id: None,
            provider_response: None,
            payment_response: None,
            error_message: None,
            delivered_at: None,
            refunded_at: None,
            refund_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status == OrderStatus::Completed
            && self.payment_status == PaymentStatus::Success
            && self.delivery_status == DeliveryStatus::Delivered
    }

    pub fn refund_issued(&self) -> bool {
        self.status == OrderStatus::Refunded || self.refunded_at.is_some()
    }

    /// Payment confirmed and the delivery slot claimed by the caller
    pub fn confirm_payment(&mut self, channel: Option<String>, response: Option<JsonValue>) {
        self.payment_status = PaymentStatus::Success;
        self.status = OrderStatus::Processing;
        if channel.is_some() {
            self.payment_channel = channel;
        }
        if response.is_some() {
            self.payment_response = response;
        }
        self.error_message = None;
    }

    pub fn mark_payment_failed(&mut self, message: impl Into<String>, response: Option<JsonValue>) {
        self.payment_status = PaymentStatus::Failed;
        self.status = OrderStatus::Failed;
        self.error_message = Some(message.into());
        if response.is_some() {
            self.payment_response = response;
        }
    }

    pub fn claim_delivery(&mut self) {
        self.delivery_status = DeliveryStatus::Processing;
    }

    /// True when an in-flight claim is old enough to be considered abandoned
    pub fn delivery_claim_is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.delivery_status == DeliveryStatus::Processing && now - self.updated_at >= stale_after
    }

    pub fn record_delivery_success(
        &mut self,
        provider_transaction_id: Option<String>,
        raw: JsonValue,
        retry: bool,
    ) {
        self.status = OrderStatus::Completed;
        self.delivery_status = DeliveryStatus::Delivered;
        self.delivered_at = Some(Utc::now());
        self.provider_transaction_id = provider_transaction_id;
        self.provider_response = Some(raw);
        self.error_message = None;
        if retry {
            self.retry_count += 1;
        }
    }

    /// Leaves `status` at processing: payment is held pending reconciliation
    pub fn record_delivery_failure(&mut self, message: impl Into<String>, raw: JsonValue, retry: bool) {
        self.status = OrderStatus::Processing;
        self.delivery_status = DeliveryStatus::Failed;
        self.provider_response = Some(raw);
        self.error_message = Some(message.into());
        if retry {
            self.retry_count += 1;
        }
    }

    pub fn record_refund(&mut self, status: OrderStatus, reason: impl Into<String>) {
        self.status = status;
        self.refunded_at = Some(Utc::now());
        self.refund_reason = Some(reason.into());
    }

    /// Provider idempotency reference for the next delivery attempt
    pub fn delivery_reference(&self, retry: bool) -> String {
        if retry {
            format!("{}-R{}", self.reference, self.retry_count + 1)
        } else {
            self.reference.clone()
        }
    }

    /// User-facing summary derived only from the order's state
    pub fn status_message(&self) -> &'static str {
        match (self.status, self.payment_status, self.delivery_status) {
            (OrderStatus::Completed, _, _) => "Data bundle delivered successfully",
            (OrderStatus::Refunded, _, _) => "Order refunded to wallet",
            (OrderStatus::Failed, PaymentStatus::Failed, _) => "Payment failed",
            (OrderStatus::Failed, _, DeliveryStatus::Failed) if self.refunded_at.is_some() => {
                "Data delivery failed. Your wallet has been refunded"
            }
            (OrderStatus::Failed, _, _) => "Order failed",
            (_, PaymentStatus::Success, DeliveryStatus::Failed) => {
                "Payment received but data delivery failed. Our team will complete it shortly"
            }
            (_, PaymentStatus::Success, _) => "Payment received. Delivering your data bundle",
            _ => "Awaiting payment confirmation",
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Client-facing view of an order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub reference: String,
    pub network: Carrier,
    pub data_amount: String,
    pub amount: Decimal,
    pub currency: String,
    pub recipient_phone: String,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            reference: order.reference.clone(),
            network: order.network,
            data_amount: order.data_amount.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            recipient_phone: order.recipient_phone.clone(),
            payment_method: order.payment_method,
            status: order.status,
            payment_status: order.payment_status,
            delivery_status: order.delivery_status,
            retry_count: order.retry_count,
            error_message: order.error_message.clone(),
            refund_reason: order.refund_reason.clone(),
            created_at: order.created_at,
            delivered_at: order.delivered_at,
            refunded_at: order.refunded_at,
        }
    }
}

impl OrderView {
    /// Variant safe for unauthenticated tracking lookups
    pub fn masked(mut self) -> Self {
        self.recipient_phone = mask_phone(&self.recipient_phone);
        self.error_message = None;
        self
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// `PREFIX-<base36 millis>-<6 random base36>`, uppercased
pub fn generate_reference(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, to_base36(millis), suffix).to_uppercase()
}

pub fn is_topup_reference(reference: &str) -> bool {
    reference.starts_with(TOPUP_REFERENCE_PREFIX)
}
