use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::Timeout { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::WebhookVerificationError { .. } => false,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::NetworkError { .. } => 502,
            PaymentError::Timeout { .. } => 504,
            PaymentError::RateLimitError { .. } => 429,
            PaymentError::WebhookVerificationError { .. } => 401,
            PaymentError::ProviderError { .. } => 502,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::NetworkError { .. } | PaymentError::Timeout { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::RateLimitError { .. } => {
                "Too many requests to payment provider. Please retry shortly".to_string()
            }
            PaymentError::WebhookVerificationError { .. } => {
                "Invalid webhook signature".to_string()
            }
            PaymentError::ProviderError { .. } => "Payment provider returned an error".to_string(),
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, AuthenticationError, ExternalError};

        let kind = match &err {
            PaymentError::ValidationError { field, message } => {
                let field = field.clone().unwrap_or_else(|| "payment".to_string());
                return AppError::validation(field, message.clone());
            }
            PaymentError::WebhookVerificationError { .. } => {
                AppErrorKind::Authentication(AuthenticationError::InvalidSignature)
            }
            PaymentError::Timeout { timeout_secs } => AppErrorKind::External(ExternalError::Timeout {
                service: "Payment provider".to_string(),
                timeout_secs: *timeout_secs,
            }),
            PaymentError::RateLimitError {
                retry_after_seconds,
                ..
            } => AppErrorKind::External(ExternalError::RateLimit {
                service: "payment provider".to_string(),
                retry_after: *retry_after_seconds,
            }),
            _ => AppErrorKind::External(ExternalError::PaymentProvider {
                provider: "paystack".to_string(),
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::ValidationError {
                message: "bad".to_string(),
                field: None
            }
            .http_status_code(),
            400
        );
        assert_eq!(PaymentError::Timeout { timeout_secs: 30 }.http_status_code(), 504);
        assert_eq!(
            PaymentError::WebhookVerificationError {
                message: "mismatch".to_string()
            }
            .http_status_code(),
            401
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "reset".to_string()
        }
        .is_retryable());
        assert!(!PaymentError::ProviderError {
            provider: "paystack".to_string(),
            message: "Invalid key".to_string(),
            provider_code: None,
            retryable: false,
        }
        .is_retryable());
    }

    #[test]
    fn converts_to_app_error_status() {
        let app: crate::error::AppError = PaymentError::Timeout { timeout_secs: 30 }.into();
        assert_eq!(app.status_code(), 504);

        let app: crate::error::AppError = PaymentError::WebhookVerificationError {
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(app.status_code(), 401);
    }
}
