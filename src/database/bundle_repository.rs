use crate::database::error::DatabaseError;
use crate::database::repository::BundleCatalog;
use crate::models::bundle::Bundle;
use crate::services::network_detector::Carrier;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct BundleRow {
    id: Uuid,
    network: String,
    name: String,
    data_amount: String,
    validity: String,
    retail_price: Decimal,
    carrier_plan_code: String,
    is_active: bool,
}

/// Read-only view over the `bundles` catalog table
pub struct PgBundleCatalog {
    pool: PgPool,
}

impl PgBundleCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BundleCatalog for PgBundleCatalog {
    async fn get_bundle(&self, id: Uuid) -> Result<Option<Bundle>, DatabaseError> {
        let row = sqlx::query_as::<_, BundleRow>(
            "SELECT id, network, name, data_amount, validity, retail_price, carrier_plan_code, is_active
             FROM bundles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(|row| {
            let network = row.network.parse::<Carrier>().map_err(|_| {
                DatabaseError::decode(format!("bundles.network has unexpected value '{}'", row.network))
            })?;
            Ok(Bundle {
                id: row.id,
                network,
                name: row.name,
                data_amount: row.data_amount,
                validity: row.validity,
                retail_price: row.retail_price,
                carrier_plan_code: row.carrier_plan_code,
                is_active: row.is_active,
            })
        })
        .transpose()
    }
}
