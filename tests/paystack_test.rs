//! Paystack adapter against a mocked API

use databundle_backend::payments::types::{CustomerContact, InitializeRequest, PaymentState};
use databundle_backend::payments::{PaymentError, PaymentProvider, PaystackConfig, PaystackProvider};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer, max_retries: u32) -> PaystackProvider {
    PaystackProvider::new(PaystackConfig {
        public_key: None,
        secret_key: "sk_test_mock".to_string(),
        webhook_secret: None,
        base_url: server.uri(),
        timeout_secs: 5,
        max_retries,
    })
    .unwrap()
}

fn charge(reference: &str, amount: rust_decimal::Decimal) -> InitializeRequest {
    InitializeRequest {
        customer: CustomerContact {
            email: "ama@example.com".to_string(),
            phone: Some("0241234567".to_string()),
        },
        amount,
        currency: "GHS".to_string(),
        reference: reference.to_string(),
        callback_url: Some("http://localhost:3000/payment/callback".to_string()),
        channels: vec!["mobile_money".to_string(), "card".to_string()],
        metadata: Some(json!({"order_reference": reference})),
    }
}

#[tokio::test]
async fn initialize_posts_minor_units_with_bearer_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(header("Authorization", "Bearer sk_test_mock"))
        .and(body_partial_json(json!({
            "email": "ama@example.com",
            "amount": 1800,
            "currency": "GHS",
            "reference": "OE-3001",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc",
                "access_code": "abc",
                "reference": "OE-3001",
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = provider(&server, 0)
        .initialize(charge("OE-3001", dec!(18.00)))
        .await
        .unwrap();

    assert_eq!(page.authorization_url, "https://checkout.paystack.com/abc");
    assert_eq!(page.access_code.as_deref(), Some("abc"));
    assert_eq!(page.gateway_reference, "OE-3001");
}

#[tokio::test]
async fn initialize_rejects_bad_input_without_calling_out() {
    let server = MockServer::start().await;
    let paystack = provider(&server, 0);

    let err = paystack
        .initialize(charge("OE-3002", dec!(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ValidationError { .. }));

    let mut no_email = charge("OE-3002", dec!(5));
    no_email.customer.email = "  ".to_string();
    assert!(paystack.initialize(no_email).await.is_err());

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn initialize_surfaces_gateway_message_on_4xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": false,
            "message": "Duplicate Transaction Reference",
        })))
        .mount(&server)
        .await;

    let err = provider(&server, 0)
        .initialize(charge("OE-3003", dec!(9.50)))
        .await
        .unwrap_err();

    match err {
        PaymentError::ProviderError { message, .. } => {
            assert_eq!(message, "Duplicate Transaction Reference")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn verify_maps_charge_data_into_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/OE-3004"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "id": 4099260516u64,
                "status": "success",
                "reference": "OE-3004",
                "amount": 1800,
                "currency": "GHS",
                "channel": "mobile_money",
                "gateway_response": "Approved",
                "paid_at": "2026-10-19T09:15:00.000Z",
            }
        })))
        .mount(&server)
        .await;

    let report = provider(&server, 0).verify("OE-3004").await.unwrap();

    assert_eq!(report.status, PaymentState::Success);
    assert_eq!(report.amount_minor, Some(1800));
    assert_eq!(report.channel.as_deref(), Some("mobile_money"));
    assert_eq!(report.gateway_message.as_deref(), Some("Approved"));
    assert!(report.paid_at.is_some());
    assert_eq!(report.raw["id"], json!(4099260516u64));
}

#[tokio::test]
async fn verify_reads_abandoned_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/OE-3005"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {"status": "abandoned", "reference": "OE-3005", "amount": 950}
        })))
        .mount(&server)
        .await;

    let report = provider(&server, 0).verify("OE-3005").await.unwrap();
    assert_eq!(report.status, PaymentState::Abandoned);
    assert!(report.status.is_failure());
}

#[tokio::test]
async fn server_errors_are_retried_up_to_the_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/OE-3006"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/OE-3006"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {"status": "pending", "reference": "OE-3006"}
        })))
        .mount(&server)
        .await;

    let report = provider(&server, 1).verify("OE-3006").await.unwrap();
    assert_eq!(report.status, PaymentState::Pending);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn initialize_is_sent_once_even_with_retries_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = provider(&server, 2)
        .initialize(charge("OE-3007", dec!(18.00)))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ProviderError { .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[test]
fn retries_are_off_by_default() {
    assert_eq!(PaystackConfig::default().max_retries, 0);
}

#[tokio::test]
async fn truncated_body_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{\"status\":",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    let provider = PaystackProvider::new(PaystackConfig {
        public_key: None,
        secret_key: "sk_test_mock".to_string(),
        webhook_secret: None,
        base_url: format!("http://{}", addr),
        timeout_secs: 5,
        max_retries: 0,
    })
    .unwrap();

    let err = provider.verify("OE-3008").await.unwrap_err();
    assert!(matches!(err, PaymentError::NetworkError { .. }), "{:?}", err);
}
