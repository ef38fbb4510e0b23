//! Shared fixtures for integration tests: scripted payment and delivery
//! providers over the in-memory stores.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use databundle_backend::api::AppState;
use databundle_backend::app::{build_state, Providers, Stores};
use databundle_backend::config::{SettlementConfig, WorkerConfig};
use databundle_backend::database::error::DatabaseError;
use databundle_backend::database::memory::{
    InMemoryBundleCatalog, InMemoryOrderRepository, InMemoryWalletRepository,
    InMemoryWebhookEventRepository,
};
use databundle_backend::database::repository::{
    LedgerWrite, Page, PendingSettlement, WalletRepository,
};
use databundle_backend::delivery::{
    BalanceInfo, DataDeliveryProvider, DeliveryGateway, DeliveryProviderKind, DeliveryRequest,
    DeliveryResult, DeliveryResultOf, StatusResult,
};
use databundle_backend::health::HealthChecker;
use databundle_backend::models::bundle::Bundle;
use databundle_backend::models::wallet::{EntryStatus, LedgerCategory, LedgerEntry, NewLedgerEntry};
use databundle_backend::payments::error::{PaymentError, PaymentResult};
use databundle_backend::payments::provider::PaymentProvider;
use databundle_backend::payments::providers::paystack::parse_paystack_event;
use databundle_backend::payments::types::{
    InitializeRequest, InitializeResponse, PaymentState, ProviderName, VerificationResponse,
    WebhookEvent, WebhookVerificationResult,
};
use databundle_backend::payments::utils::{compute_hmac_sha512_hex, verify_hmac_sha512_hex};
use databundle_backend::services::network_detector::Carrier;
use databundle_backend::services::notification::{NotificationDispatcher, NotificationEvent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const MTN_PHONE: &str = "0241234567";
pub const TELECEL_PHONE: &str = "0201234567";

// ---------------------------------------------------------------------------
// Payment gateway
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakePayments {
    reports: Mutex<HashMap<String, VerificationResponse>>,
    initialized: Mutex<Vec<InitializeRequest>>,
    pub verify_calls: AtomicUsize,
    pub fail_initialize: AtomicBool,
}

impl FakePayments {
    /// Script what the gateway reports for a reference
    pub fn report(&self, reference: &str, status: PaymentState, amount_minor: Option<i64>) {
        self.reports.lock().unwrap().insert(
            reference.to_string(),
            gateway_report(reference, status, amount_minor),
        );
    }

    pub fn initialized(&self) -> Vec<InitializeRequest> {
        self.initialized.lock().unwrap().clone()
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

pub fn gateway_report(
    reference: &str,
    status: PaymentState,
    amount_minor: Option<i64>,
) -> VerificationResponse {
    VerificationResponse {
        status,
        reference: reference.to_string(),
        amount_minor,
        currency: Some("GHS".to_string()),
        channel: Some("mobile_money".to_string()),
        gateway_message: None,
        paid_at: None,
        raw: serde_json::json!({ "reference": reference, "status": status.as_str() }),
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(PaymentError::NetworkError {
                message: "gateway unreachable".to_string(),
            });
        }
        let reference = request.reference.clone();
        self.initialized.lock().unwrap().push(request);
        Ok(InitializeResponse {
            authorization_url: format!("https://checkout.paystack.test/{}", reference),
            access_code: Some(format!("ac_{}", reference)),
            gateway_reference: reference,
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<VerificationResponse> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .reports
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or_else(|| gateway_report(reference, PaymentState::Pending, None)))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Paystack
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha512_hex(payload, WEBHOOK_SECRET, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: (!valid).then(|| "bad signature".to_string()),
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        parse_paystack_event(payload)
    }
}

pub fn sign(body: &[u8]) -> String {
    compute_hmac_sha512_hex(body, WEBHOOK_SECRET).expect("hmac")
}

pub fn charge_event(event: &str, id: i64, reference: &str, amount_minor: i64) -> Vec<u8> {
    serde_json::json!({
        "event": event,
        "data": {
            "id": id,
            "reference": reference,
            "status": if event == "charge.success" { "success" } else { "failed" },
            "amount": amount_minor,
            "currency": "GHS",
            "channel": "mobile_money",
            "paid_at": "2026-01-10T09:30:00.000Z"
        }
    })
    .to_string()
    .into_bytes()
}

// ---------------------------------------------------------------------------
// VTU provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDelivery {
    outcomes: Mutex<VecDeque<bool>>,
    references: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeDelivery {
    /// Queue outcomes for the next calls; unscripted calls succeed
    pub fn script(&self, outcomes: &[bool]) {
        self.outcomes.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.references.lock().unwrap().len()
    }

    pub fn references(&self) -> Vec<String> {
        self.references.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataDeliveryProvider for FakeDelivery {
    async fn purchase_data(&self, request: &DeliveryRequest) -> DeliveryResultOf<DeliveryResult> {
        self.references.lock().unwrap().push(request.reference.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let success = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        let raw = serde_json::json!({ "reference": request.reference, "ok": success });
        Ok(if success {
            DeliveryResult::delivered(Some(format!("VTU-{}", request.reference)), "Delivered", raw)
        } else {
            DeliveryResult::failed("Insufficient provider float", raw)
        })
    }

    async fn check_balance(&self) -> DeliveryResultOf<BalanceInfo> {
        Ok(BalanceInfo {
            provider: "hubnet".to_string(),
            balance: dec!(1250.00),
            currency: Some("GHS".to_string()),
        })
    }

    async fn query_status(&self, reference: &str) -> DeliveryResultOf<StatusResult> {
        Ok(StatusResult {
            provider: "hubnet".to_string(),
            reference: reference.to_string(),
            raw: serde_json::json!({ "reference": reference, "status": "delivered" }),
        })
    }

    fn kind(&self) -> DeliveryProviderKind {
        DeliveryProviderKind::Hubnet
    }
}

// ---------------------------------------------------------------------------
// Wallet store
// ---------------------------------------------------------------------------

/// In-memory wallet whose credits under one reference prefix take a while
pub struct SlowCredits {
    inner: Arc<InMemoryWalletRepository>,
    prefix: &'static str,
    delay: Duration,
}

#[async_trait]
impl WalletRepository for SlowCredits {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, DatabaseError> {
        self.inner.balance(user_id).await
    }

    async fn apply_entry(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError> {
        if entry.reference.starts_with(self.prefix) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.apply_entry(entry).await
    }

    async fn record_pending(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError> {
        self.inner.record_pending(entry).await
    }

    async fn settle_pending(
        &self,
        reference: &str,
        outcome: EntryStatus,
    ) -> Result<PendingSettlement, DatabaseError> {
        self.inner.settle_pending(reference, outcome).await
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, DatabaseError> {
        self.inner.find_by_reference(reference).await
    }

    async fn history(&self, user_id: Uuid, page: Page) -> Result<Vec<LedgerEntry>, DatabaseError> {
        self.inner.history(user_id, page).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Knobs for building a harness that differs from the defaults
pub struct HarnessOptions {
    pub delivery_timeout: Duration,
    pub settlement: SettlementConfig,
    /// Reference prefix and delay for slowed wallet credits
    pub slow_credits: Option<(&'static str, Duration)>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(5),
            settlement: SettlementConfig::default(),
            slow_credits: None,
        }
    }
}

pub struct Harness {
    pub state: AppState,
    pub orders: Arc<InMemoryOrderRepository>,
    pub wallets: Arc<InMemoryWalletRepository>,
    pub catalog: Arc<InMemoryBundleCatalog>,
    pub events: Arc<InMemoryWebhookEventRepository>,
    pub payments: Arc<FakePayments>,
    pub delivery: Arc<FakeDelivery>,
    pub notifications: mpsc::Receiver<NotificationEvent>,
    pub mtn_bundle: Bundle,
    pub telecel_bundle: Bundle,
    pub retired_bundle: Bundle,
}

pub fn bundle(network: Carrier, data_amount: &str, price: Decimal, active: bool) -> Bundle {
    Bundle {
        id: Uuid::new_v4(),
        network,
        name: format!("{} {}", network, data_amount),
        data_amount: data_amount.to_string(),
        validity: "30 days".to_string(),
        retail_price: price,
        carrier_plan_code: format!("{}-{}", network, data_amount),
        is_active: active,
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(HarnessOptions::default()).await
    }

    pub async fn with_delivery_timeout(delivery_timeout: Duration) -> Self {
        Self::with_options(HarnessOptions {
            delivery_timeout,
            ..HarnessOptions::default()
        })
        .await
    }

    pub async fn with_options(options: HarnessOptions) -> Self {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let wallets = Arc::new(InMemoryWalletRepository::new());
        let catalog = Arc::new(InMemoryBundleCatalog::new());
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let payments = Arc::new(FakePayments::default());
        let delivery = Arc::new(FakeDelivery::default());

        let mtn_bundle = bundle(Carrier::Mtn, "5GB", dec!(18.00), true);
        let telecel_bundle = bundle(Carrier::Telecel, "2GB", dec!(9.50), true);
        let retired_bundle = bundle(Carrier::Mtn, "1GB", dec!(5.00), false);
        for b in [&mtn_bundle, &telecel_bundle, &retired_bundle] {
            catalog.insert(b.clone()).await;
        }

        let wallet_store: Arc<dyn WalletRepository> = match options.slow_credits {
            Some((prefix, delay)) => Arc::new(SlowCredits {
                inner: wallets.clone(),
                prefix,
                delay,
            }),
            None => wallets.clone() as Arc<dyn WalletRepository>,
        };
        let stores = Stores {
            orders: orders.clone(),
            wallets: wallet_store,
            catalog: catalog.clone(),
            webhook_events: events.clone(),
        };
        let providers = Providers {
            payments: payments.clone(),
            delivery: DeliveryGateway::new(delivery.clone(), options.delivery_timeout),
        };
        let (dispatcher, notifications) = NotificationDispatcher::channel(64);
        let state = build_state(
            stores,
            providers,
            dispatcher,
            options.settlement,
            &WorkerConfig::default(),
            HealthChecker::in_memory(),
        );

        Self {
            state,
            orders,
            wallets,
            catalog,
            events,
            payments,
            delivery,
            notifications,
            mtn_bundle,
            telecel_bundle,
            retired_bundle,
        }
    }

    /// Open a wallet and seed it with a bonus credit
    pub async fn funded_user(&self, amount: Decimal) -> Uuid {
        let user = Uuid::new_v4();
        self.wallets.open_wallet(user).await;
        if amount > Decimal::ZERO {
            self.state
                .ledger
                .credit(
                    user,
                    amount,
                    LedgerCategory::Bonus,
                    &format!("SEED-{}", user),
                    "Test funding",
                )
                .await
                .expect("seed credit");
        }
        user
    }

    pub async fn balance(&self, user: Uuid) -> Decimal {
        self.state.ledger.balance(user).await.expect("balance")
    }

    /// Everything emitted so far, without waiting
    pub fn drain_notifications(&mut self) -> Vec<NotificationEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.notifications.try_recv() {
            seen.push(event);
        }
        seen
    }
}
