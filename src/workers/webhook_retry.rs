use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info};

use crate::config::WorkerConfig;
use crate::services::webhook_processor::WebhookProcessor;

/// Re-dispatches webhook events whose background processing did not finish
pub struct WebhookRetryWorker {
    processor: Arc<WebhookProcessor>,
    interval_secs: u64,
}

impl WebhookRetryWorker {
    pub fn new(processor: Arc<WebhookProcessor>, interval_secs: u64) -> Self {
        Self {
            processor,
            interval_secs,
        }
    }

    pub fn from_config(processor: Arc<WebhookProcessor>, config: &WorkerConfig) -> Self {
        Self::new(processor, config.webhook_retry_interval_secs)
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs.max(1)));
        info!(
            interval_secs = self.interval_secs,
            "Webhook retry worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Webhook retry worker stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.processor.retry_pending().await {
                        Ok(count) => {
                            if count > 0 {
                                info!(processed = count, "Retried pending webhooks");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to retry pending webhooks");
                        }
                    }
                }
            }
        }
    }
}
