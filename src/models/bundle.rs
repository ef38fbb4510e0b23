use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::network_detector::Carrier;

/// Catalog entry. Read-only from the settlement core's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: Uuid,
    pub network: Carrier,
    pub name: String,
    pub data_amount: String,
    pub validity: String,
    pub retail_price: Decimal,
    /// Plan identifier understood by the delivery provider
    pub carrier_plan_code: String,
    pub is_active: bool,
}
