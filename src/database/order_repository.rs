use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{OrderRepository, Page};
use crate::models::order::{DeliveryStatus, Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::services::network_detector::Carrier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, reference, gateway_reference, user_id, bundle_id, recipient_phone, \
     network, data_amount, amount, currency, carrier_plan_code, payment_method, payment_channel, \
     status, payment_status, delivery_status, retry_count, provider_transaction_id, \
     provider_response, payment_response, error_message, delivered_at, refunded_at, \
     refund_reason, version, created_at, updated_at";

/// Raw `orders` row, enums stored as text
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: Uuid,
    reference: String,
    gateway_reference: Option<String>,
    user_id: Option<Uuid>,
    bundle_id: Uuid,
    recipient_phone: String,
    network: String,
    data_amount: String,
    amount: Decimal,
    currency: String,
    carrier_plan_code: String,
    payment_method: String,
    payment_channel: Option<String>,
    status: String,
    payment_status: String,
    delivery_status: String,
    retry_count: i32,
    provider_transaction_id: Option<String>,
    provider_response: Option<serde_json::Value>,
    payment_response: Option<serde_json::Value>,
    error_message: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    refund_reason: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let bad = |column: &str, value: &str| {
            DatabaseError::decode(format!("orders.{} has unexpected value '{}'", column, value))
        };

        Ok(Order {
            network: row
                .network
                .parse::<Carrier>()
                .map_err(|_| bad("network", &row.network))?,
            payment_method: row
                .payment_method
                .parse::<PaymentMethod>()
                .map_err(|_| bad("payment_method", &row.payment_method))?,
            status: OrderStatus::from_db(&row.status).ok_or_else(|| bad("status", &row.status))?,
            payment_status: PaymentStatus::from_db(&row.payment_status)
                .ok_or_else(|| bad("payment_status", &row.payment_status))?,
            delivery_status: DeliveryStatus::from_db(&row.delivery_status)
                .ok_or_else(|| bad("delivery_status", &row.delivery_status))?,
            id: row.id,
            reference: row.reference,
            gateway_reference: row.gateway_reference,
            user_id: row.user_id,
            bundle_id: row.bundle_id,
            recipient_phone: row.recipient_phone,
            data_amount: row.data_amount,
            amount: row.amount,
            currency: row.currency,
            carrier_plan_code: row.carrier_plan_code,
            payment_channel: row.payment_channel,
            retry_count: row.retry_count,
            provider_transaction_id: row.provider_transaction_id,
            provider_response: row.provider_response,
            payment_response: row.payment_response,
            error_message: row.error_message,
            delivered_at: row.delivered_at,
            refunded_at: row.refunded_at,
            refund_reason: row.refund_reason,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL order store with version-checked updates
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<Order, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders
             (id, reference, gateway_reference, user_id, bundle_id, recipient_phone, network,
              data_amount, amount, currency, carrier_plan_code, payment_method, payment_channel,
              status, payment_status, delivery_status, retry_count, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.reference)
        .bind(&order.gateway_reference)
        .bind(order.user_id)
        .bind(order.bundle_id)
        .bind(&order.recipient_phone)
        .bind(order.network.as_str())
        .bind(&order.data_amount)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.carrier_plan_code)
        .bind(order.payment_method.as_str())
        .bind(&order.payment_channel)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.delivery_status.as_str())
        .bind(order.retry_count)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE reference = $1",
            ORDER_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Order::try_from)
        .transpose()
    }

    async fn update_if_version(&self, order: &Order) -> Result<Option<Order>, DatabaseError> {
        let updated = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders
             SET gateway_reference = $3, payment_channel = $4, status = $5, payment_status = $6,
                 delivery_status = $7, retry_count = $8, provider_transaction_id = $9,
                 provider_response = $10, payment_response = $11, error_message = $12,
                 delivered_at = $13, refunded_at = $14, refund_reason = $15,
                 version = version + 1, updated_at = NOW()
             WHERE id = $1 AND version = $2
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(order.version)
        .bind(&order.gateway_reference)
        .bind(&order.payment_channel)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.delivery_status.as_str())
        .bind(order.retry_count)
        .bind(&order.provider_transaction_id)
        .bind(&order.provider_response)
        .bind(&order.payment_response)
        .bind(&order.error_message)
        .bind(order.delivered_at)
        .bind(order.refunded_at)
        .bind(&order.refund_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match updated {
            Some(row) => Ok(Some(row.try_into()?)),
            None => {
                // Distinguish a lost race from a missing row
                let exists: Option<(i64,)> =
                    sqlx::query_as("SELECT version FROM orders WHERE id = $1")
                        .bind(order.id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(DatabaseError::from_sqlx)?;
                match exists {
                    Some(_) => Ok(None),
                    None => Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                        entity: "Order".to_string(),
                        id: order.reference.clone(),
                    })),
                }
            }
        }
    }

    async fn list_for_user(&self, user_id: Uuid, page: Page) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(Order::try_from)
        .collect()
    }
}
