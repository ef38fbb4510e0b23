use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    Pending,
    Completed,
    Failed,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventStatus::Pending => "pending",
            WebhookEventStatus::Completed => "completed",
            WebhookEventStatus::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(WebhookEventStatus::Pending),
            "completed" => Some(WebhookEventStatus::Completed),
            "failed" => Some(WebhookEventStatus::Failed),
            _ => None,
        }
    }
}

/// A verified inbound webhook, persisted before it is acknowledged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    /// De-duplication key, unique across all stored events
    pub event_key: String,
    pub provider: String,
    pub event_type: String,
    pub reference: Option<String>,
    pub payload: JsonValue,
    pub signature: String,
    pub status: WebhookEventStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEventRecord {
    pub fn new(
        event_key: String,
        provider: &str,
        event_type: &str,
        reference: Option<String>,
        payload: JsonValue,
        signature: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_key,
            provider: provider.to_string(),
            event_type: event_type.to_string(),
            reference,
            payload,
            signature: signature.to_string(),
            status: WebhookEventStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}
