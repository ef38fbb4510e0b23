//! Payment gateway integration
//!
//! The settlement core only sees `PaymentProvider`; gateway field names and
//! minor-unit amounts stay inside the concrete provider.

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::{PaymentFactoryConfig, PaymentProviderFactory};
pub use provider::PaymentProvider;
pub use providers::{PaystackConfig, PaystackProvider};
pub use types::{
    CustomerContact, InitializeRequest, InitializeResponse, PaymentState, ProviderName,
    VerificationResponse, WebhookEvent, WebhookEventKind, WebhookVerificationResult,
};
