use crate::database::error::DatabaseError;
use crate::database::repository::{WebhookEventRepository, WebhookInsert};
use crate::models::webhook::{WebhookEventRecord, WebhookEventStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, event_key, provider, event_type, reference, payload, signature, \
     status, attempts, last_error, created_at, processed_at";

#[derive(Debug, Clone, FromRow)]
struct WebhookEventRow {
    id: Uuid,
    event_key: String,
    provider: String,
    event_type: String,
    reference: Option<String>,
    payload: serde_json::Value,
    signature: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DatabaseError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let status = WebhookEventStatus::from_db(&row.status).ok_or_else(|| {
            DatabaseError::decode(format!("webhook_events.status has unexpected value '{}'", row.status))
        })?;
        Ok(WebhookEventRecord {
            id: row.id,
            event_key: row.event_key,
            provider: row.provider,
            event_type: row.event_type,
            reference: row.reference,
            payload: row.payload,
            signature: row.signature,
            status,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

/// Durable webhook inbox, de-duplicated on `event_key`
pub struct PgWebhookEventRepository {
    pool: PgPool,
}

impl PgWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for PgWebhookEventRepository {
    async fn record(&self, event: &WebhookEventRecord) -> Result<WebhookInsert, DatabaseError> {
        let inserted = sqlx::query_as::<_, WebhookEventRow>(&format!(
            "INSERT INTO webhook_events
             (id, event_key, provider, event_type, reference, payload, signature, status, attempts, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9)
             ON CONFLICT (event_key) DO NOTHING
             RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(&event.event_key)
        .bind(&event.provider)
        .bind(&event.event_type)
        .bind(&event.reference)
        .bind(&event.payload)
        .bind(&event.signature)
        .bind(event.status.as_str())
        .bind(event.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(row) = inserted {
            return Ok(WebhookInsert::Inserted(row.try_into()?));
        }

        let existing = sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {} FROM webhook_events WHERE event_key = $1",
            EVENT_COLUMNS
        ))
        .bind(&event.event_key)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(WebhookInsert::Duplicate(existing.try_into()?))
    }

    async fn find(&self, id: Uuid) -> Result<Option<WebhookEventRecord>, DatabaseError> {
        sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {} FROM webhook_events WHERE id = $1",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(WebhookEventRecord::try_from)
        .transpose()
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE webhook_events
             SET status = 'completed', attempts = attempts + 1, last_error = NULL, processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE webhook_events
             SET status = 'failed', attempts = attempts + 1, last_error = $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn pending_events(
        &self,
        limit: i64,
        max_attempts: i32,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<WebhookEventRecord>, DatabaseError> {
        sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {} FROM webhook_events
             WHERE status IN ('pending', 'failed') AND attempts < $2 AND created_at < $3
             ORDER BY created_at ASC
             LIMIT $1",
            EVENT_COLUMNS
        ))
        .bind(limit)
        .bind(max_attempts)
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(WebhookEventRecord::try_from)
        .collect()
    }
}
