//! Customer notifications
//!
//! Settlement code enqueues events without waiting on delivery of the
//! message itself. A bounded queue is drained by one spawned worker; when the
//! queue is full or closed the event is dropped with a warning.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::logging::mask_phone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderConfirmed {
        reference: String,
        user_id: Option<Uuid>,
        recipient_phone: String,
        data_amount: String,
    },
    DeliveryFailed {
        reference: String,
        user_id: Option<Uuid>,
        reason: String,
    },
    OrderRefunded {
        reference: String,
        user_id: Uuid,
        amount: Decimal,
    },
    WalletCredited {
        reference: String,
        user_id: Uuid,
        amount: Decimal,
        balance: Decimal,
    },
}

impl NotificationEvent {
    pub fn reference(&self) -> &str {
        match self {
            NotificationEvent::OrderConfirmed { reference, .. }
            | NotificationEvent::DeliveryFailed { reference, .. }
            | NotificationEvent::OrderRefunded { reference, .. }
            | NotificationEvent::WalletCredited { reference, .. } => reference,
        }
    }
}

/// Outbound channel (SMS, email, push)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &NotificationEvent);
}

/// Writes notifications to the log. Used until a real channel is wired in.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &NotificationEvent) {
        match event {
            NotificationEvent::OrderConfirmed {
                reference,
                recipient_phone,
                data_amount,
                ..
            } => {
                info!(
                    reference = %reference,
                    phone = %mask_phone(recipient_phone),
                    "🔔 NOTIFICATION: Data bundle delivered - {}", data_amount
                );
            }
            NotificationEvent::DeliveryFailed { reference, reason, .. } => {
                warn!(
                    reference = %reference,
                    "🔔 NOTIFICATION: Data delivery failed - {}", reason
                );
            }
            NotificationEvent::OrderRefunded {
                reference,
                user_id,
                amount,
            } => {
                info!(
                    reference = %reference,
                    user_id = %user_id,
                    amount = %amount,
                    "🔔 NOTIFICATION: Order refunded to wallet"
                );
            }
            NotificationEvent::WalletCredited {
                reference,
                user_id,
                amount,
                balance,
            } => {
                info!(
                    reference = %reference,
                    user_id = %user_id,
                    amount = %amount,
                    balance = %balance,
                    "🔔 NOTIFICATION: Wallet topped up"
                );
            }
        }
    }
}

/// Producer side of the notification queue
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<NotificationEvent>,
}

impl NotificationDispatcher {
    /// Start the drain worker
    pub fn spawn<N>(notifier: N, capacity: usize) -> (Self, JoinHandle<()>)
    where
        N: Notifier + 'static,
    {
        let (dispatcher, mut receiver) = Self::channel(capacity);
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                notifier.send(&event).await;
            }
            info!("Notification queue closed");
        });
        (dispatcher, handle)
    }

    /// Dispatcher plus the raw receiving end, for callers that drain it themselves
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Best effort enqueue, never blocks the caller
    pub fn emit(&self, event: NotificationEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(reference = %event.reference(), "Notification queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(reference = %event.reference(), "Notification queue closed, event dropped");
            }
        }
    }
}
