use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::error::{AppError, AppErrorKind, ExternalError, InfrastructureError};

pub type DeliveryResultOf<T> = Result<T, DeliveryError>;

/// Transport-level delivery failures. The gateway folds these into a failed
/// `DeliveryResult` before they reach the settlement pipeline.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} did not respond within {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("{provider} rejected the request (HTTP {status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
        body: JsonValue,
    },

    #[error("{provider} returned an unreadable response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("Delivery configuration error: {0}")]
    Configuration(String),
}

impl DeliveryError {
    /// Provider payload worth keeping for audit, when one came back
    pub fn raw(&self) -> JsonValue {
        match self {
            DeliveryError::Rejected { body, .. } => body.clone(),
            other => serde_json::json!({ "error": other.to_string() }),
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        let kind = match err {
            DeliveryError::Timeout {
                provider,
                timeout_secs,
            } => AppErrorKind::External(ExternalError::Timeout {
                service: provider,
                timeout_secs,
            }),
            DeliveryError::Configuration(message) => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            }
            DeliveryError::Transport { ref provider, .. }
            | DeliveryError::Rejected { ref provider, .. }
            | DeliveryError::InvalidResponse { ref provider, .. } => {
                AppErrorKind::External(ExternalError::DeliveryProvider {
                    provider: provider.clone(),
                    message: err.to_string(),
                })
            }
        };
        AppError::new(kind)
    }
}
