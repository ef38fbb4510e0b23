use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
};

use crate::api::auth::{AuthUser, MaybeUser};
use crate::api::{AppState, OrderResponse, PageQuery};
use crate::error::AppError;
use crate::middleware::error::{success_response, success_response_with_meta, tag_request_id};
use crate::models::order::OrderView;
use crate::services::settlement::OrderKey;

/// GET /api/orders
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let orders = state
        .settlement
        .orders_for_user(user.id, query.page())
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;

    let views: Vec<OrderView> = orders.iter().map(OrderView::from).collect();
    Ok(success_response_with_meta(views, query.meta()))
}

/// GET /api/orders/{reference}
///
/// Public tracking. Anyone holding the reference sees the masked view;
/// the owner sees everything.
pub async fn track(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let order = state
        .settlement
        .find_order(&OrderKey::Reference(reference))
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;

    let is_owner = matches!((order.user_id, &user), (Some(owner), Some(u)) if owner == u.id);
    let body = if is_owner {
        OrderResponse::full(&order)
    } else {
        OrderResponse::masked(&order)
    };
    Ok(success_response(body))
}
