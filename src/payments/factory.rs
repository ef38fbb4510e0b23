use crate::payments::error::PaymentResult;
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{PaystackConfig, PaystackProvider};
use crate::payments::types::ProviderName;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PaymentFactoryConfig {
    pub provider: ProviderName,
    pub paystack: PaystackConfig,
}

impl PaymentFactoryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let provider =
            std::env::var("PAYMENT_PROVIDER").unwrap_or_else(|_| "paystack".to_string());

        Ok(Self {
            provider: ProviderName::from_str(&provider)?,
            paystack: PaystackConfig::from_env()?,
        })
    }
}

/// Builds the process-wide payment provider once at startup
pub struct PaymentProviderFactory {
    config: PaymentFactoryConfig,
}

impl PaymentProviderFactory {
    pub fn with_config(config: PaymentFactoryConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> PaymentResult<Self> {
        Ok(Self::with_config(PaymentFactoryConfig::from_env()?))
    }

    pub fn build(&self) -> PaymentResult<Arc<dyn PaymentProvider>> {
        match self.config.provider {
            ProviderName::Paystack => Ok(Arc::new(PaystackProvider::new(
                self.config.paystack.clone(),
            )?)),
        }
    }
}
