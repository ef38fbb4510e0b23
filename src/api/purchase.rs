use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::api::auth::MaybeUser;
use crate::api::{AppState, OrderResponse};
use crate::error::AppError;
use crate::middleware::error::{success_response, tag_request_id};
use crate::services::settlement::{PurchaseRequest, Purchaser};

#[derive(Debug, Serialize)]
pub struct InitializeResponse {
    pub order_id: Uuid,
    pub reference: String,
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub gateway_reference: String,
    pub amount: Decimal,
    pub currency: String,
}

/// POST /api/purchase/initialize
pub async fn initialize(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    Json(request): Json<PurchaseRequest>,
) -> Result<Response, AppError> {
    let tag = tag_request_id(&headers);
    let purchaser = Purchaser {
        user_id: user.as_ref().map(|u| u.id),
        email: user.and_then(|u| u.email),
    };

    let initialized = state
        .settlement
        .initialize_purchase(&purchaser, &request)
        .await
        .map_err(|e| tag(e.into()))?;

    Ok(success_response(InitializeResponse {
        order_id: initialized.order.id,
        reference: initialized.order.reference.clone(),
        authorization_url: initialized.authorization_url,
        access_code: initialized.access_code,
        gateway_reference: initialized.gateway_reference,
        amount: initialized.order.amount,
        currency: initialized.order.currency,
    }))
}

/// GET /api/purchase/verify/{reference}
///
/// Safe to call repeatedly; once payment has settled this only reads.
pub async fn verify(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let tag = tag_request_id(&headers);
    let order = state
        .settlement
        .verify_payment(&reference)
        .await
        .map_err(|e| tag(e.into()))?;

    let owner = order.user_id.is_some() && order.user_id == user.map(|u| u.id);
    let body = if owner || order.user_id.is_none() {
        OrderResponse::full(&order)
    } else {
        OrderResponse::masked(&order)
    };
    Ok(success_response(body))
}
