//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
#[cfg(feature = "database")]
use std::time::{Duration, Instant};
#[cfg(feature = "database")]
use tokio::time::timeout;
#[cfg(feature = "database")]
use tracing::{error, info};

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone, Default)]
pub struct HealthChecker {
    #[cfg(feature = "database")]
    db_pool: Option<sqlx::PgPool>,
}

impl HealthChecker {
    /// Checker for a process running on the in-memory stores
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[cfg(feature = "database")]
    pub fn with_database(db_pool: sqlx::PgPool) -> Self {
        Self {
            db_pool: Some(db_pool),
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        #[cfg(feature = "database")]
        if let Some(pool) = &self.db_pool {
            let start = Instant::now();
            match timeout(Duration::from_secs(5), crate::database::health_check(pool)).await {
                Ok(Ok(())) => {
                    let response_time = start.elapsed().as_millis();
                    health_status
                        .checks
                        .insert("database".to_string(), ComponentHealth::up(Some(response_time)));
                    info!("Database health check: OK ({}ms)", response_time);
                }
                Ok(Err(e)) => {
                    health_status.status = HealthState::Unhealthy;
                    health_status
                        .checks
                        .insert("database".to_string(), ComponentHealth::down(Some(e.to_string())));
                    error!("Database health check failed: {}", e);
                }
                Err(_) => {
                    health_status.status = HealthState::Unhealthy;
                    health_status.checks.insert(
                        "database".to_string(),
                        ComponentHealth::down(Some("Timeout".to_string())),
                    );
                    error!("Database health check timed out");
                }
            }
            return health_status;
        }

        health_status.checks.insert(
            "database".to_string(),
            ComponentHealth::warning(None, Some("in-memory stores".to_string())),
        );
        health_status.status = HealthState::Degraded;
        health_status
    }
}
