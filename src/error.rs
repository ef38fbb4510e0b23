//! Unified error handling for the data-bundle backend
//!
//! Module errors (payments, delivery, ledger, settlement, persistence) convert
//! into `AppError`, which carries the HTTP status mapping, a machine-readable
//! code and a user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "INSUFFICIENT_WALLET_BALANCE")]
    InsufficientWalletBalance,
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "BUNDLE_NOT_FOUND")]
    BundleNotFound,
    #[serde(rename = "WALLET_NOT_FOUND")]
    WalletNotFound,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "INVALID_ORDER_STATE")]
    InvalidOrderState,
    #[serde(rename = "ALREADY_REFUNDED")]
    AlreadyRefunded,

    // Validation errors (400)
    #[serde(rename = "CARRIER_MISMATCH")]
    CarrierMismatch,
    #[serde(rename = "BUNDLE_UNAVAILABLE")]
    BundleUnavailable,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,

    // Authentication errors (401, 403)
    #[serde(rename = "AUTHENTICATION_FAILED")]
    AuthenticationFailed,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "CONCURRENCY_CONFLICT")]
    ConcurrencyConflict,

    // External errors (502, 504)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "DELIVERY_PROVIDER_ERROR")]
    DeliveryProviderError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Wallet balance cannot cover the debit
    InsufficientBalance {
        required: String,
        available: String,
        shortfall: String,
    },
    OrderNotFound { reference: String },
    BundleNotFound { bundle_id: String },
    WalletNotFound { user_id: String },
    TransactionNotFound { reference: String },
    /// Operator action not permitted from the order's current state
    InvalidOrderState {
        reference: String,
        action: String,
        reason: String,
    },
    AlreadyRefunded { reference: String },
}

/// Infrastructure-level errors (database, configuration, contention)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
    /// Optimistic update lost too many races
    Conflict { resource: String },
}

/// External service errors (payment gateway, delivery provider)
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    DeliveryProvider { provider: String, message: String },
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Recipient number belongs to a different carrier than the bundle
    CarrierMismatch { detected: String, expected: String },
    BundleUnavailable { bundle_id: String },
    InvalidField { field: String, reason: String },
    MissingField { field: String },
    InvalidAmount { amount: String, reason: String },
}

#[derive(Debug, Clone)]
pub enum AuthenticationError {
    InvalidSignature,
    MissingCredentials,
    Forbidden,
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
    Authentication(AuthenticationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: message.into(),
            is_retryable: false,
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => 422,
                DomainError::OrderNotFound { .. } => 404,
                DomainError::BundleNotFound { .. } => 404,
                DomainError::WalletNotFound { .. } => 404,
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::InvalidOrderState { .. } => 409,
                DomainError::AlreadyRefunded { .. } => 409,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
                InfrastructureError::Conflict { .. } => 503,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 502,
                ExternalError::DeliveryProvider { .. } => 502,
                ExternalError::RateLimit { .. } => 429,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Authentication(err) => match err {
                AuthenticationError::Forbidden => 403,
                _ => 401,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => ErrorCode::InsufficientWalletBalance,
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::BundleNotFound { .. } => ErrorCode::BundleNotFound,
                DomainError::WalletNotFound { .. } => ErrorCode::WalletNotFound,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::InvalidOrderState { .. } => ErrorCode::InvalidOrderState,
                DomainError::AlreadyRefunded { .. } => ErrorCode::AlreadyRefunded,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Conflict { .. } => ErrorCode::ConcurrencyConflict,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
                ExternalError::DeliveryProvider { .. } => ErrorCode::DeliveryProviderError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::CarrierMismatch { .. } => ErrorCode::CarrierMismatch,
                ValidationError::BundleUnavailable { .. } => ErrorCode::BundleUnavailable,
                _ => ErrorCode::ValidationError,
            },
            AppErrorKind::Authentication(err) => match err {
                AuthenticationError::Forbidden => ErrorCode::Forbidden,
                _ => ErrorCode::AuthenticationFailed,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance {
                    required,
                    available,
                    ..
                } => format!(
                    "Insufficient wallet balance. Available: {}, Required: {}",
                    available, required
                ),
                DomainError::OrderNotFound { reference } => {
                    format!("Order '{}' not found", reference)
                }
                DomainError::BundleNotFound { bundle_id } => {
                    format!("Bundle '{}' not found", bundle_id)
                }
                DomainError::WalletNotFound { .. } => "Wallet not found".to_string(),
                DomainError::TransactionNotFound { reference } => {
                    format!("Transaction '{}' not found", reference)
                }
                DomainError::InvalidOrderState {
                    reference,
                    action,
                    reason,
                } => format!("Cannot {} order '{}': {}", action, reference, reason),
                DomainError::AlreadyRefunded { reference } => {
                    format!("Order '{}' has already been refunded", reference)
                }
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Conflict { .. } => {
                    "The order is being updated by another request. Please retry".to_string()
                }
                _ => "Service temporarily unavailable. Please try again later".to_string(),
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => {
                    if *is_retryable {
                        "Payment provider is temporarily unavailable. Please try again".to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::DeliveryProvider { .. } => {
                    "Data delivery provider is unavailable. Please try again later".to_string()
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => match retry_after {
                    Some(secs) => format!(
                        "Rate limit exceeded for {}. Please try again in {} seconds",
                        service, secs
                    ),
                    None => format!("Rate limit exceeded for {}. Please try again later", service),
                },
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => format!(
                    "{} request timed out after {} seconds. Please try again",
                    service, timeout_secs
                ),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::CarrierMismatch { detected, expected } => format!(
                    "Phone number belongs to {} but the bundle is for {}",
                    detected, expected
                ),
                ValidationError::BundleUnavailable { .. } => {
                    "This bundle is not available for purchase".to_string()
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid '{}': {}", field, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
            },
            AppErrorKind::Authentication(err) => match err {
                AuthenticationError::Forbidden => "Access denied".to_string(),
                _ => "Authentication failed".to_string(),
            },
        }
    }

    /// Structured extras surfaced in the error body
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AppErrorKind::Domain(DomainError::InsufficientBalance {
                required,
                available,
                shortfall,
            }) => Some(serde_json::json!({
                "required": required,
                "available": available,
                "shortfall": shortfall,
            })),
            AppErrorKind::Validation(ValidationError::CarrierMismatch { detected, expected }) => {
                Some(serde_json::json!({
                    "detected_network": detected,
                    "bundle_network": expected,
                }))
            }
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Conflict { .. } => true,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
                ExternalError::DeliveryProvider { .. } => true,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
            AppErrorKind::Authentication(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs; the other module errors carry
// their conversions next to their definitions.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::InsufficientBalance {
            required: "18.00".to_string(),
            available: "10.00".to_string(),
            shortfall: "8.00".to_string(),
        }));

        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), ErrorCode::InsufficientWalletBalance);
        assert!(error.user_message().contains("Insufficient wallet balance"));
        assert!(!error.is_retryable());

        let details = error.details().unwrap();
        assert_eq!(details["shortfall"], "8.00");
    }

    #[test]
    fn test_carrier_mismatch_error() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::CarrierMismatch {
            detected: "TELECEL".to_string(),
            expected: "MTN".to_string(),
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::CarrierMismatch);
        assert!(error.user_message().contains("TELECEL"));
    }

    #[test]
    fn test_conflict_is_transient() {
        let error = AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Conflict {
            resource: "order".to_string(),
        }));

        assert_eq!(error.status_code(), 503);
        assert_eq!(error.error_code(), ErrorCode::ConcurrencyConflict);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_authentication_errors() {
        let unauthorized =
            AppError::new(AppErrorKind::Authentication(AuthenticationError::InvalidSignature));
        assert_eq!(unauthorized.status_code(), 401);
        assert_eq!(unauthorized.user_message(), "Authentication failed");

        let forbidden = AppError::new(AppErrorKind::Authentication(AuthenticationError::Forbidden));
        assert_eq!(forbidden.status_code(), 403);
    }

    #[test]
    fn test_invalid_order_state() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::AlreadyRefunded {
            reference: "OE-1".to_string(),
        }));
        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::AlreadyRefunded);
    }
}
