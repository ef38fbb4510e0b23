//! HTTP surface
//!
//! Handlers stay thin: extract, call a service, wrap the result in the
//! `{success, data}` envelope. Errors travel as `AppError`.

pub mod admin;
pub mod auth;
pub mod network;
pub mod orders;
pub mod purchase;
pub mod wallet;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use crate::database::repository::Page;
use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::middleware::error::{json_error_response, ErrorResponse};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::models::order::{Order, OrderView};
use crate::services::settlement::SettlementPipeline;
use crate::services::wallet_ledger::WalletLedger;
use crate::services::wallet_topup::WalletTopupService;
use crate::services::webhook_processor::WebhookProcessor;

#[derive(Clone)]
pub struct AppState {
    pub settlement: Arc<SettlementPipeline>,
    pub topups: Arc<WalletTopupService>,
    pub ledger: WalletLedger,
    pub webhooks: Arc<WebhookProcessor>,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/api/network/detect", get(network::detect))
        .route("/api/purchase/initialize", post(purchase::initialize))
        .route("/api/purchase/verify/{reference}", get(purchase::verify))
        .route("/api/payments/webhook", post(webhooks::paystack_webhook))
        .route("/api/wallet/balance", get(wallet::balance))
        .route("/api/wallet/transactions", get(wallet::transactions))
        .route("/api/wallet/purchase", post(wallet::purchase))
        .route("/api/wallet/topup", post(wallet::topup))
        .route(
            "/api/wallet/topup/verify/{reference}",
            get(wallet::verify_topup),
        )
        .route("/api/orders", get(orders::list))
        .route("/api/orders/{reference}", get(orders::track))
        .route("/api/admin/orders/{id}/retry", post(admin::retry))
        .route("/api/admin/orders/{id}/refund", post(admin::refund))
        .route(
            "/api/admin/orders/{id}/delivery-status",
            get(admin::delivery_status),
        )
        .route("/api/admin/delivery/balance", get(admin::delivery_balance))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// `?page=&limit=` on list endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }

    pub fn meta(&self) -> PageMeta {
        let page = self.page();
        PageMeta {
            page: (page.offset / page.limit) as u32 + 1,
            limit: page.limit as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
}

/// Order projection plus the state-derived message
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order: OrderView,
    pub message: &'static str,
}

impl OrderResponse {
    pub fn full(order: &Order) -> Self {
        Self {
            order: OrderView::from(order),
            message: order.status_message(),
        }
    }

    pub fn masked(order: &Order) -> Self {
        Self {
            order: OrderView::from(order).masked(),
            message: order.status_message(),
        }
    }
}

async fn root() -> &'static str {
    "Data bundle backend"
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<ErrorResponse>)> {
    let health_status = state.health.check_health().await;
    if health_status.status == HealthState::Unhealthy {
        error!("Health check failed - service unhealthy");
        return Err(json_error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable",
            None,
        ));
    }
    info!(status = ?health_status.status, "Health check passed");
    Ok(Json(health_status))
}

async fn liveness() -> &'static str {
    "OK"
}
