//! HTTP surface, driven through the router with `oneshot`

mod common;

use axum::body::{to_bytes, Body};
use common::{charge_event, sign, Harness, MTN_PHONE, TELECEL_PHONE};
use databundle_backend::api::auth::{USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use databundle_backend::api::router;
use databundle_backend::api::webhooks::PAYSTACK_SIGNATURE_HEADER;
use databundle_backend::payments::types::PaymentState;
use http::{Request, StatusCode};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(h.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

fn post_json(uri: &str) -> http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
}

#[tokio::test]
async fn liveness_and_health() {
    let h = Harness::new().await;
    let response = router(h.state.clone())
        .oneshot(get("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let (status, body) = send(&h, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Degraded");
}

#[tokio::test]
async fn network_detection_endpoint() {
    let h = Harness::new().await;
    let (status, body) = send(
        &h,
        get("/api/network/detect?phone=0241234567")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["network"], "MTN");
    assert_eq!(body["data"]["phone"], "233241234567");
    assert_eq!(body["data"]["valid"], true);

    let (status, _) = send(&h, get("/api/network/detect").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn guest_purchase_initialize_and_verify() {
    let h = Harness::new().await;
    let payload = json!({
        "bundle_id": h.mtn_bundle.id,
        "recipient_phone": MTN_PHONE,
        "payment_method": "mobile_money",
        "email": "guest@example.com"
    });

    let (status, body) = send(
        &h,
        post_json("/api/purchase/initialize")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reference = body["data"]["reference"].as_str().unwrap().to_string();
    assert!(body["data"]["authorization_url"].as_str().unwrap().starts_with("https://"));
    assert_eq!(body["data"]["amount"], "18.00");
    assert_eq!(body["data"]["currency"], "GHS");

    h.payments.report(&reference, PaymentState::Success, Some(1800));
    let uri = format!("/api/purchase/verify/{}", reference);
    let (status, first) = send(&h, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["order"]["status"], "completed");
    assert_eq!(first["data"]["order"]["delivery_status"], "delivered");

    let (_, second) = send(&h, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(first["data"], second["data"]);
    assert_eq!(h.delivery.calls(), 1);
}

#[tokio::test]
async fn carrier_mismatch_is_a_400() {
    let h = Harness::new().await;
    let payload = json!({
        "bundle_id": h.mtn_bundle.id,
        "recipient_phone": TELECEL_PHONE,
        "email": "guest@example.com"
    });
    let (status, body) = send(
        &h,
        post_json("/api/purchase/initialize")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("TELECEL"));
}

#[tokio::test]
async fn unknown_order_is_a_404() {
    let h = Harness::new().await;
    let (status, _) = send(
        &h,
        get("/api/purchase/verify/OE-NOPE-000000")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wallet_endpoints_require_identity() {
    let h = Harness::new().await;
    let (status, _) = send(&h, get("/api/wallet/balance").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &h,
        get("/api/wallet/balance")
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wallet_purchase_is_synchronous() {
    let h = Harness::new().await;
    let user = h.funded_user(dec!(20.00)).await;
    let payload = json!({ "bundle_id": h.mtn_bundle.id, "recipient_phone": MTN_PHONE });

    let (status, body) = send(
        &h,
        post_json("/api/wallet/purchase")
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["delivered"], true);
    assert_eq!(body["data"]["wallet_balance"], "2.00");
    assert_eq!(body["data"]["order"]["payment_method"], "wallet");

    let (status, body) = send(
        &h,
        post_json("/api/wallet/purchase")
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["shortfall"], "16.00");

    let (status, body) = send(
        &h,
        get("/api/wallet/transactions?limit=10")
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["limit"], 10);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn topup_flow() {
    let h = Harness::new().await;
    let user = h.funded_user(dec!(0)).await;

    let (status, _) = send(
        &h,
        post_json("/api/wallet/topup")
            .header(USER_ID_HEADER, user.to_string())
            .header(USER_EMAIL_HEADER, "owner@example.com")
            .body(Body::from(json!({ "amount": "0.50" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body_ok) = send(
        &h,
        post_json("/api/wallet/topup")
            .header(USER_ID_HEADER, user.to_string())
            .header(USER_EMAIL_HEADER, "owner@example.com")
            .body(Body::from(json!({ "amount": "40.00" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body_ok}");
    let reference = body_ok["data"]["reference"].as_str().unwrap().to_string();
    assert!(reference.starts_with("TOPUP-"));

    h.payments.report(&reference, PaymentState::Success, Some(4000));
    let uri = format!("/api/wallet/topup/verify/{}", reference);
    let (status, body) = send(
        &h,
        get(&uri)
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["balance"], "40.00");

    // Someone else's reference reads as unknown
    let (status, _) = send(
        &h,
        get(&uri)
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_tracking_masks_for_strangers() {
    let h = Harness::new().await;
    let user = h.funded_user(dec!(20.00)).await;
    let order = h
        .state
        .settlement
        .purchase_with_wallet(
            user,
            &databundle_backend::services::settlement::WalletPurchaseRequest {
                bundle_id: h.mtn_bundle.id,
                recipient_phone: MTN_PHONE.to_string(),
            },
        )
        .await
        .unwrap();
    let uri = format!("/api/orders/{}", order.reference);

    let (_, owner) = send(
        &h,
        get(&uri)
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(owner["data"]["order"]["recipient_phone"], "233241234567");

    let (_, stranger) = send(&h, get(&uri).body(Body::empty()).unwrap()).await;
    assert_ne!(stranger["data"]["order"]["recipient_phone"], "233241234567");
    assert_eq!(stranger["data"]["order"]["status"], "completed");

    let (status, list) = send(
        &h,
        get("/api/orders")
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
    assert_eq!(list["meta"]["page"], 1);
}

#[tokio::test]
async fn admin_routes_check_role() {
    let h = Harness::new().await;
    let user = h.funded_user(dec!(20.00)).await;
    h.delivery.script(&[false]);
    let order = h
        .state
        .settlement
        .purchase_with_wallet(
            user,
            &databundle_backend::services::settlement::WalletPurchaseRequest {
                bundle_id: h.mtn_bundle.id,
                recipient_phone: MTN_PHONE.to_string(),
            },
        )
        .await
        .unwrap();

    let uri = format!("/api/admin/orders/{}/refund", order.id);
    let (status, _) = send(
        &h,
        post_json(&uri)
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::from(json!({ "reason": "x" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Auto-compensated already: an operator refund would pay twice
    let admin = Uuid::new_v4().to_string();
    let (status, _) = send(
        &h,
        post_json(&uri)
            .header(USER_ID_HEADER, &admin)
            .header(USER_ROLE_HEADER, "admin")
            .body(Body::from(json!({ "reason": "x" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.balance(user).await, dec!(20.00));

    let (status, body) = send(
        &h,
        get("/api/admin/delivery/balance")
            .header(USER_ID_HEADER, &admin)
            .header(USER_ROLE_HEADER, "admin")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], "1250.00");
}

#[tokio::test]
async fn admin_retry_over_http() {
    let h = Harness::new().await;
    h.delivery.script(&[false]);
    let init = h
        .state
        .settlement
        .initialize_purchase(
            &databundle_backend::services::settlement::Purchaser::default(),
            &databundle_backend::services::settlement::PurchaseRequest {
                bundle_id: h.mtn_bundle.id,
                recipient_phone: MTN_PHONE.to_string(),
                payment_method: databundle_backend::models::order::PaymentMethod::Card,
                email: Some("guest@example.com".to_string()),
            },
        )
        .await
        .unwrap();
    h.payments
        .report(&init.order.reference, PaymentState::Success, Some(1800));
    h.state
        .settlement
        .verify_payment(&init.order.reference)
        .await
        .unwrap();

    let (status, body) = send(
        &h,
        post_json(&format!("/api/admin/orders/{}/retry", init.order.reference))
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(USER_ROLE_HEADER, "admin")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["status"], "completed");
    assert_eq!(body["data"]["order"]["retry_count"], 1);
}

#[tokio::test]
async fn webhook_endpoint_acks_and_rejects() {
    let h = Harness::new().await;
    let body = charge_event("charge.success", 1, "OE-NOPE-000000", 1800);

    let (status, _) = send(
        &h,
        post_json("/api/payments/webhook")
            .header(PAYSTACK_SIGNATURE_HEADER, "bogus")
            .body(Body::from(body.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, ack) = send(
        &h,
        post_json("/api/payments/webhook")
            .header(PAYSTACK_SIGNATURE_HEADER, sign(&body))
            .body(Body::from(body.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "success");
    assert_eq!(h.events.all().await.len(), 1);
}
