use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::api::AppState;
use crate::error::AppError;
use crate::middleware::error::tag_request_id;
use crate::services::webhook_processor::IngestOutcome;

pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// POST /api/payments/webhook
///
/// The body is taken as raw bytes: the signature covers the exact bytes the
/// gateway sent. Acknowledges as soon as the event is stored; settlement
/// runs on a background task.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(PAYSTACK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .webhooks
        .ingest(&body, signature)
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;

    match outcome {
        IngestOutcome::Accepted(record) => state.webhooks.spawn_dispatch(record),
        IngestOutcome::Duplicate => {}
        IngestOutcome::Ignored { event_type } => {
            info!(event_type = %event_type, "Webhook acknowledged without action");
        }
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "status": "success" })),
    )
        .into_response())
}
