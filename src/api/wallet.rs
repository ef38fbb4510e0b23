use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::auth::AuthUser;
use crate::api::{AppState, OrderResponse, PageQuery};
use crate::error::AppError;
use crate::middleware::error::{success_response, success_response_with_meta, tag_request_id};
use crate::models::wallet::{EntryStatus, LedgerEntry};
use crate::services::settlement::WalletPurchaseRequest;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WalletPurchaseResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub delivered: bool,
    pub wallet_balance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    pub amount: Decimal,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TopupResponse {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TopupStatusResponse {
    pub reference: String,
    pub status: EntryStatus,
    pub amount: Decimal,
    pub balance: Option<Decimal>,
}

impl From<LedgerEntry> for TopupStatusResponse {
    fn from(entry: LedgerEntry) -> Self {
        let completed = entry.status == EntryStatus::Completed;
        Self {
            reference: entry.reference,
            status: entry.status,
            amount: entry.amount,
            balance: completed.then_some(entry.balance_after),
        }
    }
}

/// GET /api/wallet/balance
pub async fn balance(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let balance = state
        .ledger
        .balance(user.id)
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;
    Ok(success_response(BalanceResponse { balance }))
}

/// GET /api/wallet/transactions
pub async fn transactions(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let entries = state
        .ledger
        .history(user.id, query.page())
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;
    Ok(success_response_with_meta(entries, query.meta()))
}

/// POST /api/wallet/purchase
///
/// Answers synchronously: the debit and the delivery attempt have both
/// finished by the time this returns.
pub async fn purchase(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(request): Json<WalletPurchaseRequest>,
) -> Result<Response, AppError> {
    let order = state
        .settlement
        .purchase_with_wallet(user.id, &request)
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;

    let wallet_balance = match state.ledger.balance(user.id).await {
        Ok(balance) => Some(balance),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Could not read balance after wallet purchase");
            None
        }
    };

    Ok(success_response(WalletPurchaseResponse {
        delivered: order.is_settled(),
        order: OrderResponse::full(&order),
        wallet_balance,
    }))
}

/// POST /api/wallet/topup
pub async fn topup(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(request): Json<TopupRequest>,
) -> Result<Response, AppError> {
    let tag = tag_request_id(&headers);
    let email = user
        .email
        .clone()
        .or(request.email)
        .ok_or_else(|| tag(AppError::validation("email", "a valid email is required")))?;

    let initialized = state
        .topups
        .initialize(user.id, &email, request.amount)
        .await
        .map_err(|e| tag(e.into()))?;

    Ok(success_response(TopupResponse {
        reference: initialized.reference,
        authorization_url: initialized.authorization_url,
        access_code: initialized.access_code,
        amount: initialized.amount,
    }))
}

/// GET /api/wallet/topup/verify/{reference}
pub async fn verify_topup(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let entry = state
        .topups
        .verify(user.id, &reference)
        .await
        .map_err(|e| tag_request_id(&headers)(e.into()))?;
    Ok(success_response(TopupStatusResponse::from(entry)))
}
