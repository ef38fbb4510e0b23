//! Wiring of stores, providers and services into the HTTP state

use std::sync::Arc;

use crate::api::AppState;
use crate::config::{SettlementConfig, WorkerConfig};
use crate::database::memory::{
    InMemoryBundleCatalog, InMemoryOrderRepository, InMemoryWalletRepository,
    InMemoryWebhookEventRepository,
};
use crate::database::repository::{
    BundleCatalog, OrderRepository, WalletRepository, WebhookEventRepository,
};
use crate::delivery::DeliveryGateway;
use crate::health::HealthChecker;
use crate::payments::provider::PaymentProvider;
use crate::services::notification::NotificationDispatcher;
use crate::services::settlement::SettlementPipeline;
use crate::services::wallet_ledger::WalletLedger;
use crate::services::wallet_topup::WalletTopupService;
use crate::services::webhook_processor::WebhookProcessor;

#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderRepository>,
    pub wallets: Arc<dyn WalletRepository>,
    pub catalog: Arc<dyn BundleCatalog>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryOrderRepository::new()),
            wallets: Arc::new(InMemoryWalletRepository::new()),
            catalog: Arc::new(InMemoryBundleCatalog::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
        }
    }

    #[cfg(feature = "database")]
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        use crate::database::bundle_repository::PgBundleCatalog;
        use crate::database::order_repository::PgOrderRepository;
        use crate::database::wallet_repository::PgWalletRepository;
        use crate::database::webhook_repository::PgWebhookEventRepository;

        Self {
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            wallets: Arc::new(PgWalletRepository::new(pool.clone())),
            catalog: Arc::new(PgBundleCatalog::new(pool.clone())),
            webhook_events: Arc::new(PgWebhookEventRepository::new(pool)),
        }
    }
}

/// External collaborators, built once at startup
#[derive(Clone)]
pub struct Providers {
    pub payments: Arc<dyn PaymentProvider>,
    pub delivery: DeliveryGateway,
}

pub fn build_state(
    stores: Stores,
    providers: Providers,
    notifications: NotificationDispatcher,
    settlement: SettlementConfig,
    workers: &WorkerConfig,
    health: HealthChecker,
) -> AppState {
    let ledger = WalletLedger::new(stores.wallets.clone());

    let pipeline = Arc::new(SettlementPipeline::new(
        stores.orders.clone(),
        stores.catalog.clone(),
        ledger.clone(),
        providers.payments.clone(),
        providers.delivery,
        notifications.clone(),
        settlement.clone(),
    ));
    let topups = Arc::new(WalletTopupService::new(
        ledger.clone(),
        providers.payments.clone(),
        notifications,
        settlement,
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        stores.webhook_events.clone(),
        providers.payments,
        pipeline.clone(),
        topups.clone(),
        workers.webhook_max_attempts,
    ));

    AppState {
        settlement: pipeline,
        topups,
        ledger,
        webhooks,
        health,
    }
}
