//! In-memory stores
//!
//! Used by tests and by `SKIP_EXTERNALS=true` runs. Each store keeps its state
//! behind a single lock so every trait method is atomic, and no lock is held
//! across anything but in-process bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    BundleCatalog, LedgerWrite, OrderRepository, Page, PendingSettlement, WalletRepository,
    WebhookEventRepository, WebhookInsert,
};
use crate::models::bundle::Bundle;
use crate::models::order::Order;
use crate::models::wallet::{EntryDirection, EntryStatus, LedgerEntry, NewLedgerEntry};
use crate::models::webhook::{WebhookEventRecord, WebhookEventStatus};

fn paginate<T: Clone>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect()
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) || orders.values().any(|o| o.reference == order.reference)
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "orders_reference_key".to_string(),
            }));
        }
        orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.reference == reference)
            .cloned())
    }

    async fn update_if_version(&self, order: &Order) -> Result<Option<Order>, DatabaseError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Order".to_string(),
                id: order.reference.clone(),
            })
        })?;
        if stored.version != order.version {
            return Ok(None);
        }
        let mut next = order.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(Some(next))
    }

    async fn list_for_user(&self, user_id: Uuid, page: Page) -> Result<Vec<Order>, DatabaseError> {
        let mut owned: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(owned, page))
    }
}

// ---------------------------------------------------------------------------
// Wallets
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WalletState {
    balances: HashMap<Uuid, Decimal>,
    entries: Vec<LedgerEntry>,
}

impl WalletState {
    fn existing(&self, reference: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.reference == reference)
    }
}

#[derive(Default)]
pub struct InMemoryWalletRepository {
    state: Mutex<WalletState>,
}

impl InMemoryWalletRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zero-balance wallet for a user; existing wallets are left alone
    pub async fn open_wallet(&self, user_id: Uuid) {
        self.state
            .lock()
            .await
            .balances
            .entry(user_id)
            .or_insert(Decimal::ZERO);
    }
}

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, DatabaseError> {
        Ok(self.state.lock().await.balances.get(&user_id).copied())
    }

    async fn apply_entry(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.existing(&entry.reference) {
            return Ok(LedgerWrite::for_existing(existing.clone(), &entry));
        }
        let Some(balance) = state.balances.get(&entry.user_id).copied() else {
            return Ok(LedgerWrite::WalletNotFound);
        };
        if entry.direction == EntryDirection::Debit && balance < entry.amount {
            return Ok(LedgerWrite::InsufficientFunds { available: balance });
        }

        let user_id = entry.user_id;
        let stored = entry.into_entry(balance, EntryStatus::Completed);
        state.balances.insert(user_id, stored.balance_after);
        state.entries.push(stored.clone());
        Ok(LedgerWrite::Applied(stored))
    }

    async fn record_pending(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.existing(&entry.reference) {
            return Ok(LedgerWrite::for_existing(existing.clone(), &entry));
        }
        let Some(balance) = state.balances.get(&entry.user_id).copied() else {
            return Ok(LedgerWrite::WalletNotFound);
        };

        let stored = entry.into_entry(balance, EntryStatus::Pending);
        state.entries.push(stored.clone());
        Ok(LedgerWrite::Applied(stored))
    }

    async fn settle_pending(
        &self,
        reference: &str,
        outcome: EntryStatus,
    ) -> Result<PendingSettlement, DatabaseError> {
        let mut state = self.state.lock().await;

        let Some(index) = state.entries.iter().position(|e| e.reference == reference) else {
            return Ok(PendingSettlement::NotFound);
        };
        let current = state.entries[index].clone();
        if current.status != EntryStatus::Pending {
            return Ok(PendingSettlement::AlreadySettled(current));
        }

        let balance = state
            .balances
            .get(&current.user_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let now = Utc::now();
        let mut settled = current;
        settled.status = outcome;
        settled.balance_before = balance;
        let overdraws = settled.direction == EntryDirection::Debit && balance < settled.amount;
        if outcome == EntryStatus::Completed && overdraws {
            settled.status = EntryStatus::Failed;
            settled.balance_after = balance;
        } else if outcome == EntryStatus::Completed {
            settled.balance_after = settled.direction.apply(balance, settled.amount);
            settled.completed_at = Some(now);
            state.balances.insert(settled.user_id, settled.balance_after);
        } else {
            settled.balance_after = balance;
        }
        state.entries[index] = settled.clone();
        Ok(PendingSettlement::Settled(settled))
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, DatabaseError> {
        Ok(self.state.lock().await.existing(reference).cloned())
    }

    async fn history(&self, user_id: Uuid, page: Page) -> Result<Vec<LedgerEntry>, DatabaseError> {
        let state = self.state.lock().await;
        // Insertion order is chronological
        let entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        Ok(paginate(entries, page))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryBundleCatalog {
    bundles: RwLock<HashMap<Uuid, Bundle>>,
}

impl InMemoryBundleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bundle: Bundle) {
        self.bundles.write().await.insert(bundle.id, bundle);
    }
}

#[async_trait]
impl BundleCatalog for InMemoryBundleCatalog {
    async fn get_bundle(&self, id: Uuid) -> Result<Option<Bundle>, DatabaseError> {
        Ok(self.bundles.read().await.get(&id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Webhook events
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    events: RwLock<Vec<WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<WebhookEventRecord> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn record(&self, event: &WebhookEventRecord) -> Result<WebhookInsert, DatabaseError> {
        let mut events = self.events.write().await;
        if let Some(existing) = events.iter().find(|e| e.event_key == event.event_key) {
            return Ok(WebhookInsert::Duplicate(existing.clone()));
        }
        events.push(event.clone());
        Ok(WebhookInsert::Inserted(event.clone()))
    }

    async fn find(&self, id: Uuid) -> Result<Option<WebhookEventRecord>, DatabaseError> {
        Ok(self.events.read().await.iter().find(|e| e.id == id).cloned())
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut events = self.events.write().await;
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.status = WebhookEventStatus::Completed;
            event.attempts += 1;
            event.last_error = None;
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError> {
        let mut events = self.events.write().await;
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.status = WebhookEventStatus::Failed;
            event.attempts += 1;
            event.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn pending_events(
        &self,
        limit: i64,
        max_attempts: i32,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<WebhookEventRecord>, DatabaseError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.status != WebhookEventStatus::Completed)
            .filter(|e| e.attempts < max_attempts && e.created_at < older_than)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
