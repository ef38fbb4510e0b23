//! Operator endpoints. Every handler requires the admin role.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::api::auth::AdminUser;
use crate::api::{AppState, OrderResponse};
use crate::error::AppError;
use crate::middleware::error::{success_response, tag_request_id};
use crate::services::settlement::OrderKey;

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: String,
}

/// POST /api/admin/orders/{id}/retry
pub async fn retry(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    info!(admin_id = %admin.id, order = %id, "Operator delivery retry");
    let order = state
        .settlement
        .retry_delivery(&OrderKey::parse(&id))
        .await
        .map_err(|e| tag_request_id(&headers)(AppError::from(e).with_context(format!("retry {}", id))))?;
    Ok(success_response(OrderResponse::full(&order)))
}

/// POST /api/admin/orders/{id}/refund
pub async fn refund(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> Result<Response, AppError> {
    info!(admin_id = %admin.id, order = %id, "Operator refund");
    let order = state
        .settlement
        .refund_order(&OrderKey::parse(&id), &request.reason)
        .await
        .map_err(|e| tag_request_id(&headers)(AppError::from(e).with_context(format!("refund {}", id))))?;
    Ok(success_response(OrderResponse::full(&order)))
}

/// GET /api/admin/orders/{id}/delivery-status
pub async fn delivery_status(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let status = state
        .settlement
        .delivery_status(&OrderKey::parse(&id))
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;
    Ok(success_response(status))
}

/// GET /api/admin/delivery/balance
pub async fn delivery_balance(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let balance = state
        .settlement
        .delivery_balance()
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;
    Ok(success_response(balance))
}
