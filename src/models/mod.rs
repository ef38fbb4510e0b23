pub mod bundle;
pub mod order;
pub mod wallet;
pub mod webhook;

pub use bundle::Bundle;
pub use order::{DeliveryStatus, Order, OrderStatus, OrderView, PaymentMethod, PaymentStatus};
pub use wallet::{EntryDirection, EntryStatus, LedgerCategory, LedgerEntry, NewLedgerEntry};
pub use webhook::{WebhookEventRecord, WebhookEventStatus};
