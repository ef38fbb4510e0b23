//! Background workers started by the binary

pub mod webhook_retry;

pub use webhook_retry::WebhookRetryWorker;
