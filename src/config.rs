//! Application configuration module
//! Loads settings from the environment (and `.env`), one struct per concern.

use std::env;
use std::str::FromStr;

use crate::delivery::error::DeliveryError;
use crate::delivery::factory::DeliveryConfig;
use crate::payments::error::PaymentError;
use crate::payments::factory::PaymentFactoryConfig;
use crate::payments::providers::PaystackConfig;
use crate::payments::types::ProviderName;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when running with `SKIP_EXTERNALS=true`
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub payments: PaymentFactoryConfig,
    pub delivery: DeliveryConfig,
    pub settlement: SettlementConfig,
    pub workers: WorkerConfig,
    pub skip_externals: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Knobs for the purchase settlement pipeline
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Base URL the payment page redirects back to
    pub frontend_url: String,
    pub currency: String,
    pub conflict_retry_limit: u32,
    pub stale_delivery_claim_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub webhook_retry_enabled: bool,
    pub webhook_retry_interval_secs: u64,
    pub webhook_max_attempts: i32,
    pub notification_queue_capacity: usize,
}

fn parse_env<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn flag_env(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();
        let skip_externals = flag_env("SKIP_EXTERNALS", false);

        let database = if skip_externals {
            None
        } else {
            Some(DatabaseConfig::from_env()?)
        };

        let payments = match PaymentFactoryConfig::from_env() {
            Ok(config) => config,
            Err(_) if skip_externals => PaymentFactoryConfig {
                provider: ProviderName::Paystack,
                paystack: PaystackConfig::default(),
            },
            Err(e) => return Err(e.into()),
        };

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database,
            logging: LoggingConfig::from_env()?,
            payments,
            delivery: DeliveryConfig::from_env()?,
            settlement: SettlementConfig::from_env()?,
            workers: WorkerConfig::from_env()?,
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.settlement.validate()?;
        self.settlement
            .validate_claim_window(self.delivery.timeout_secs)?;
        self.workers.validate()?;
        if !self.skip_externals {
            self.delivery.validate()?;
            if self.payments.paystack.secret_key.trim().is_empty() {
                return Err(ConfigError::MissingVariable("PAYSTACK_SECRET_KEY".to_string()));
            }
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_env("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_env("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_env("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: flag_env("RUN_MIGRATIONS", true),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SettlementConfig {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "GHS".to_string()),
            conflict_retry_limit: parse_env("CONFLICT_RETRY_LIMIT", "3")?,
            stale_delivery_claim_secs: parse_env("STALE_DELIVERY_CLAIM_SECS", "300")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frontend_url.starts_with("http://") && !self.frontend_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "FRONTEND_URL must be a valid URL".to_string(),
            ));
        }
        if self.currency.len() != 3 {
            return Err(ConfigError::InvalidValue("CURRENCY".to_string()));
        }
        if self.conflict_retry_limit == 0 {
            return Err(ConfigError::InvalidValue("CONFLICT_RETRY_LIMIT".to_string()));
        }
        Ok(())
    }

    /// A delivery claim must outlive the provider call it guards, or an
    /// operator retry could take over a delivery that is still in flight
    pub fn validate_claim_window(&self, delivery_timeout_secs: u64) -> Result<(), ConfigError> {
        if self.stale_delivery_claim_secs <= delivery_timeout_secs {
            return Err(ConfigError::InvalidValue(format!(
                "STALE_DELIVERY_CLAIM_SECS ({}) must exceed VTU_TIMEOUT_SECS ({})",
                self.stale_delivery_claim_secs, delivery_timeout_secs
            )));
        }
        Ok(())
    }

    /// Where the payment page sends the customer afterwards
    pub fn callback_url(&self) -> String {
        format!("{}/payment/callback", self.frontend_url.trim_end_matches('/'))
    }

    pub fn wallet_callback_url(&self) -> String {
        format!("{}/wallet/callback", self.frontend_url.trim_end_matches('/'))
    }

    pub fn stale_claim_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_delivery_claim_secs as i64)
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            currency: "GHS".to_string(),
            conflict_retry_limit: 3,
            stale_delivery_claim_secs: 300,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WorkerConfig {
            webhook_retry_enabled: flag_env("WEBHOOK_RETRY_ENABLED", true),
            webhook_retry_interval_secs: parse_env("WEBHOOK_RETRY_INTERVAL_SECS", "60")?,
            webhook_max_attempts: parse_env("WEBHOOK_MAX_ATTEMPTS", "5")?,
            notification_queue_capacity: parse_env("NOTIFICATION_QUEUE_CAPACITY", "256")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook_retry_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "WEBHOOK_RETRY_INTERVAL_SECS".to_string(),
            ));
        }
        if self.webhook_max_attempts <= 0 {
            return Err(ConfigError::InvalidValue("WEBHOOK_MAX_ATTEMPTS".to_string()));
        }
        if self.notification_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "NOTIFICATION_QUEUE_CAPACITY".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            webhook_retry_enabled: true,
            webhook_retry_interval_secs: 60,
            webhook_max_attempts: 5,
            notification_queue_capacity: 256,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Payment configuration: {0}")]
    Payment(#[from] PaymentError),

    #[error("Delivery configuration: {0}")]
    Delivery(#[from] DeliveryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.address(), "127.0.0.1:8000");
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_host_validation() {
        let config = ServerConfig {
            host: "".to_string(),
            port: 8000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn callback_url_is_built_from_frontend_url() {
        let config = SettlementConfig {
            frontend_url: "https://bundles.example.com/".to_string(),
            ..SettlementConfig::default()
        };
        assert_eq!(
            config.callback_url(),
            "https://bundles.example.com/payment/callback"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stale_claim_window_must_exceed_delivery_timeout() {
        let config = SettlementConfig {
            stale_delivery_claim_secs: 10,
            ..SettlementConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_claim_window(30),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(config.validate_claim_window(10).is_err());
        assert!(SettlementConfig::default().validate_claim_window(30).is_ok());
    }

    #[test]
    fn rejects_bad_settlement_values() {
        let config = SettlementConfig {
            conflict_retry_limit: 0,
            ..SettlementConfig::default()
        };
        assert!(config.validate().is_err());
        let config = SettlementConfig {
            frontend_url: "localhost".to_string(),
            ..SettlementConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_level_validation() {
        assert!(LoggingConfig::default().validate().is_ok());
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Json,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn database_connection_bounds() {
        let config = DatabaseConfig {
            url: "postgres://localhost/databundle".to_string(),
            max_connections: 2,
            min_connections: 5,
            connection_timeout: 30,
            idle_timeout: None,
            run_migrations: false,
        };
        assert!(config.validate().is_err());
    }
}
