//! Persistence layer
//!
//! Store traits live in `repository`; `memory` backs tests and
//! `SKIP_EXTERNALS=true` runs, the PostgreSQL stores need the `database` feature.

pub mod error;
pub mod memory;
pub mod repository;

#[cfg(feature = "database")]
pub mod bundle_repository;
#[cfg(feature = "database")]
pub mod order_repository;
#[cfg(feature = "database")]
pub mod wallet_repository;
#[cfg(feature = "database")]
pub mod webhook_repository;

#[cfg(feature = "database")]
pub use pool::*;

#[cfg(feature = "database")]
mod pool {
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::time::Duration;
    use tracing::{error as log_error, info, warn};

    use super::error::{DatabaseError, DatabaseErrorKind};
    use crate::config::DatabaseConfig;

    /// Database pool configuration
    #[derive(Debug, Clone)]
    pub struct PoolConfig {
        pub max_connections: u32,
        pub min_connections: u32,
        pub connection_timeout: Duration,
        pub idle_timeout: Duration,
        pub max_lifetime: Duration,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                max_connections: 20,
                min_connections: 5,
                connection_timeout: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(600),
                max_lifetime: Duration::from_secs(1800),
            }
        }
    }

    impl From<&DatabaseConfig> for PoolConfig {
        fn from(config: &DatabaseConfig) -> Self {
            Self {
                max_connections: config.max_connections,
                min_connections: config.min_connections,
                connection_timeout: Duration::from_secs(config.connection_timeout),
                idle_timeout: Duration::from_secs(config.idle_timeout.unwrap_or(600)),
                ..Self::default()
            }
        }
    }

    /// Initialize the database connection pool
    pub async fn init_pool(
        database_url: &str,
        config: Option<PoolConfig>,
    ) -> Result<PgPool, DatabaseError> {
        let config = config.unwrap_or_default();

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connection_timeout = ?config.connection_timeout,
            "Initializing database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| {
                log_error!("Failed to initialize database pool: {}", e);
                DatabaseError::from_sqlx(e)
            })?;

        pool.acquire().await.map_err(|e| {
            log_error!("Failed to acquire test connection: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        info!("Database pool initialized successfully");
        Ok(pool)
    }

    /// Initialize the pool from application configuration, running migrations when asked
    pub async fn init_pool_from_config(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let pool = init_pool(&config.url, Some(PoolConfig::from(config))).await?;
        if config.run_migrations {
            run_migrations(&pool).await?;
        }
        Ok(pool)
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
            log_error!("Migration failed: {}", e);
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("migration failed: {}", e),
            })
        })
    }

    /// Connection pool health check
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
            warn!("Health check failed: {}", e);
            DatabaseError::from_sqlx(e)
        })?;
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn default_pool_config() {
            let config = PoolConfig::default();
            assert_eq!(config.max_connections, 20);
            assert_eq!(config.min_connections, 5);
            assert_eq!(config.connection_timeout, Duration::from_secs(30));
        }

        #[test]
        fn pool_config_follows_database_config() {
            let config = DatabaseConfig {
                url: "postgres://localhost/databundle".to_string(),
                max_connections: 8,
                min_connections: 1,
                connection_timeout: 5,
                idle_timeout: None,
                run_migrations: false,
            };
            let pool = PoolConfig::from(&config);
            assert_eq!(pool.max_connections, 8);
            assert_eq!(pool.connection_timeout, Duration::from_secs(5));
            assert_eq!(pool.idle_timeout, Duration::from_secs(600));
        }
    }
}
