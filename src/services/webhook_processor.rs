use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::repository::{WebhookEventRepository, WebhookInsert};
use crate::error::{AppError, AppErrorKind, AuthenticationError};
use crate::models::order::is_topup_reference;
use crate::models::webhook::WebhookEventRecord;
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{WebhookEvent, WebhookEventKind};
use crate::services::settlement::{SettlementError, SettlementPipeline};
use crate::services::wallet_ledger::LedgerError;
use crate::services::wallet_topup::WalletTopupService;

/// Events younger than this are left to the task spawned at ingest time
const RETRY_GRACE_SECS: i64 = 30;
const RETRY_BATCH_SIZE: i64 = 50;

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Missing signature")]
    MissingSignature,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Processing error: {0}")]
    Processing(String),
}

impl From<WebhookProcessorError> for AppError {
    fn from(err: WebhookProcessorError) -> Self {
        match err {
            WebhookProcessorError::MissingSignature => {
                AppError::new(AppErrorKind::Authentication(AuthenticationError::MissingCredentials))
            }
            WebhookProcessorError::InvalidSignature => {
                AppError::new(AppErrorKind::Authentication(AuthenticationError::InvalidSignature))
            }
            WebhookProcessorError::MalformedPayload(reason) => AppError::validation("body", reason),
            WebhookProcessorError::Database(err) => err.into(),
            WebhookProcessorError::Processing(message) => AppError::internal(message),
        }
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// Stored and ready for dispatch
    Accepted(WebhookEventRecord),
    /// Same event seen before; nothing to do
    Duplicate,
    /// Event type we do not act on
    Ignored { event_type: String },
}

pub struct WebhookProcessor {
    events: Arc<dyn WebhookEventRepository>,
    payments: Arc<dyn PaymentProvider>,
    settlement: Arc<SettlementPipeline>,
    topups: Arc<WalletTopupService>,
    max_attempts: i32,
}

impl WebhookProcessor {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        payments: Arc<dyn PaymentProvider>,
        settlement: Arc<SettlementPipeline>,
        topups: Arc<WalletTopupService>,
        max_attempts: i32,
    ) -> Self {
        Self {
            events,
            payments,
            settlement,
            topups,
            max_attempts,
        }
    }

    /// Verify the signature over the raw body, then persist the event.
    /// Nothing is parsed before the signature passes.
    pub async fn ingest(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestOutcome, WebhookProcessorError> {
        let provider = self.payments.name();
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                warn!(provider = %provider, "Webhook rejected: missing signature");
                WebhookProcessorError::MissingSignature
            })?;

        let valid = match self.payments.verify_webhook(body, signature) {
            Ok(verification) => verification.valid,
            Err(e) => {
                warn!(provider = %provider, error = %e, "Webhook signature check errored");
                false
            }
        };
        if !valid {
            warn!(provider = %provider, "Webhook rejected: invalid signature");
            return Err(WebhookProcessorError::InvalidSignature);
        }

        let event = self
            .payments
            .parse_webhook_event(body)
            .map_err(|e| WebhookProcessorError::MalformedPayload(e.to_string()))?;

        if event.kind == WebhookEventKind::Unrecognized {
            info!(provider = %provider, event_type = %event.event_type, "Ignoring webhook event type");
            return Ok(IngestOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let record = WebhookEventRecord::new(
            event_key(&event, body),
            provider.as_str(),
            &event.event_type,
            event.reference.clone(),
            event.payload.clone(),
            signature,
        );

        match self.events.record(&record).await? {
            WebhookInsert::Inserted(stored) => {
                info!(
                    event_key = %stored.event_key,
                    event_type = %stored.event_type,
                    reference = ?stored.reference,
                    "Webhook event accepted"
                );
                Ok(IngestOutcome::Accepted(stored))
            }
            WebhookInsert::Duplicate(existing) => {
                info!(event_key = %existing.event_key, "Duplicate webhook event ignored");
                Ok(IngestOutcome::Duplicate)
            }
        }
    }

    /// Run a stored event through settlement and record the result
    pub async fn dispatch(&self, record: &WebhookEventRecord) -> Result<(), WebhookProcessorError> {
        let outcome = match serde_json::to_vec(&record.payload) {
            Ok(body) => match self.payments.parse_webhook_event(&body) {
                Ok(event) => self.process_event(&event).await,
                Err(e) => Err(WebhookProcessorError::MalformedPayload(e.to_string())),
            },
            Err(e) => Err(WebhookProcessorError::MalformedPayload(e.to_string())),
        };

        match outcome {
            Ok(()) => {
                self.events.mark_processed(record.id).await?;
                info!(event_key = %record.event_key, "Webhook processed successfully");
                Ok(())
            }
            Err(e) => {
                warn!(event_key = %record.event_key, error = %e, "Webhook processing failed");
                self.events.record_failure(record.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Dispatch on a background task so the acknowledgement is not held up
    pub fn spawn_dispatch(self: &Arc<Self>, record: WebhookEventRecord) {
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = processor.dispatch(&record).await {
                error!(event_key = %record.event_key, error = %e, "Background webhook dispatch failed");
            }
        });
    }

    /// Re-dispatch events left pending or failed. Returns how many settled.
    pub async fn retry_pending(&self) -> Result<usize, WebhookProcessorError> {
        let cutoff = Utc::now() - Duration::seconds(RETRY_GRACE_SECS);
        let pending = self
            .events
            .pending_events(RETRY_BATCH_SIZE, self.max_attempts, cutoff)
            .await?;

        let mut processed = 0;
        for record in &pending {
            if self.dispatch(record).await.is_ok() {
                processed += 1;
            }
        }
        if !pending.is_empty() {
            info!(found = pending.len(), processed, "Webhook retry pass finished");
        }
        Ok(processed)
    }

    async fn process_event(&self, event: &WebhookEvent) -> Result<(), WebhookProcessorError> {
        let Some(reference) = event.reference.as_deref() else {
            warn!(event_type = %event.event_type, "Webhook event without reference");
            return Ok(());
        };

        if is_topup_reference(reference) {
            let Some(report) = &event.report else {
                return Ok(());
            };
            return match self.topups.apply_report(reference, report).await {
                Ok(_) => Ok(()),
                Err(SettlementError::Ledger(LedgerError::EntryNotFound(_))) => {
                    warn!(reference = %reference, "Webhook for unknown top-up");
                    Ok(())
                }
                Err(e) => Err(WebhookProcessorError::Processing(e.to_string())),
            };
        }

        self.settlement
            .handle_payment_event(event)
            .await
            .map(|_| ())
            .map_err(|e| WebhookProcessorError::Processing(e.to_string()))
    }
}

/// Gateway event id when present, otherwise a digest of the exact body
fn event_key(event: &WebhookEvent, body: &[u8]) -> String {
    match &event.event_id {
        Some(id) => format!("{}:{}:{}", event.provider, event.event_type, id),
        None => format!("{}:sha256:{}", event.provider, hex::encode(Sha256::digest(body))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::ProviderName;

    fn event(event_id: Option<&str>) -> WebhookEvent {
        WebhookEvent {
            provider: ProviderName::Paystack,
            kind: WebhookEventKind::PaymentSucceeded,
            event_type: "charge.success".to_string(),
            event_id: event_id.map(str::to_string),
            reference: Some("OE-1".to_string()),
            report: None,
            payload: serde_json::json!({}),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn event_key_prefers_gateway_id() {
        assert_eq!(
            event_key(&event(Some("4099260516")), b"{}"),
            "paystack:charge.success:4099260516"
        );
    }

    #[test]
    fn event_key_falls_back_to_body_digest() {
        let a = event_key(&event(None), b"{\"a\":1}");
        let b = event_key(&event(None), b"{\"a\":1}");
        let c = event_key(&event(None), b"{\"a\":2}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("paystack:sha256:"));
    }

    #[test]
    fn signature_errors_map_to_401() {
        let err: AppError = WebhookProcessorError::InvalidSignature.into();
        assert_eq!(err.status_code(), 401);
        let err: AppError = WebhookProcessorError::MissingSignature.into();
        assert_eq!(err.status_code(), 401);
    }
}
