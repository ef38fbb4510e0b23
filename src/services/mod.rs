//! Services module for business logic and integrations

pub mod network_detector;
pub mod notification;
pub mod settlement;
pub mod wallet_ledger;
pub mod wallet_topup;
pub mod webhook_processor;

pub use network_detector::Carrier;
pub use notification::{LogNotifier, NotificationDispatcher, NotificationEvent, Notifier};
pub use settlement::{
    OrderKey, PurchaseInitialized, PurchaseRequest, Purchaser, SettlementError,
    SettlementPipeline, WalletPurchaseRequest,
};
pub use wallet_ledger::{LedgerError, LedgerReceipt, WalletLedger};
pub use wallet_topup::{TopupInitialized, WalletTopupService};
pub use webhook_processor::{IngestOutcome, WebhookProcessor, WebhookProcessorError};
