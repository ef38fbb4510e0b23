use std::net::SocketAddr;
use std::time::Duration;

use databundle_backend::api;
use databundle_backend::app::{build_state, Providers, Stores};
use databundle_backend::config::AppConfig;
use databundle_backend::delivery::DeliveryGateway;
use databundle_backend::health::HealthChecker;
use databundle_backend::logging::init_tracing;
use databundle_backend::payments::factory::PaymentProviderFactory;
use databundle_backend::services::notification::{LogNotifier, NotificationDispatcher};
use databundle_backend::workers::WebhookRetryWorker;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        skip_externals = config.skip_externals,
        delivery_provider = config.delivery.provider.as_str(),
        "🚀 Starting data bundle backend"
    );

    // Stores
    let (stores, health) = match &config.database {
        #[cfg(feature = "database")]
        Some(db_config) => {
            let pool = databundle_backend::database::init_pool_from_config(db_config).await?;
            info!("✅ Database connected");
            (Stores::postgres(pool.clone()), HealthChecker::with_database(pool))
        }
        #[cfg(not(feature = "database"))]
        Some(_) => {
            anyhow::bail!("DATABASE_URL is set but the `database` feature is disabled");
        }
        None => {
            warn!("⏭️  Using in-memory stores (SKIP_EXTERNALS=true), data is lost on restart");
            (Stores::in_memory(), HealthChecker::in_memory())
        }
    };

    // Providers
    let payments = PaymentProviderFactory::with_config(config.payments.clone()).build()?;
    let mut delivery_config = config.delivery.clone();
    if config.skip_externals && delivery_config.api_key.trim().is_empty() {
        warn!("VTU_API_KEY not set, delivery calls will be rejected by the provider");
        delivery_config.api_key = "unset".to_string();
        delivery_config.user_id.get_or_insert_with(|| "unset".to_string());
    }
    let delivery = DeliveryGateway::from_config(&delivery_config)?;
    info!(provider = delivery.provider_name(), "✅ Delivery provider configured");

    let (notifications, notification_handle) = NotificationDispatcher::spawn(
        LogNotifier,
        config.workers.notification_queue_capacity,
    );

    let state = build_state(
        stores,
        Providers { payments, delivery },
        notifications,
        config.settlement.clone(),
        &config.workers,
        health,
    );

    // Workers
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let retry_handle = if config.workers.webhook_retry_enabled {
        let worker = WebhookRetryWorker::from_config(state.webhooks.clone(), &config.workers);
        Some(tokio::spawn(worker.run(worker_shutdown_rx)))
    } else {
        info!("Webhook retry worker disabled");
        None
    };

    let app = api::router(state);

    let addr: SocketAddr = config.server.address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = retry_handle {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for webhook retry worker shutdown");
        }
    }
    // Dropping the router released the last dispatcher handles; let the queue drain
    if tokio::time::timeout(Duration::from_secs(5), notification_handle)
        .await
        .is_err()
    {
        warn!("Notification queue did not drain before shutdown");
    }

    info!("👋 Server shutdown complete");
    Ok(())
}
