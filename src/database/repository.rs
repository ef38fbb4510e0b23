//! Store seams used by the settlement core
//!
//! Every trait has a PostgreSQL implementation (feature `database`) and an
//! in-memory one with the same atomicity guarantees.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::models::bundle::Bundle;
use crate::models::order::Order;
use crate::models::wallet::{EntryStatus, LedgerEntry, NewLedgerEntry};
use crate::models::webhook::WebhookEventRecord;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Offset pagination, 1-based page numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = page.unwrap_or(1).max(1);
        Self {
            limit: limit as i64,
            offset: (page as i64 - 1) * limit as i64,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<Order, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, DatabaseError>;

    /// Compare-and-swap write. Persists `order` only when the stored version
    /// still equals `order.version` and returns the stored row with the
    /// version bumped; `None` means another writer got there first.
    async fn update_if_version(&self, order: &Order) -> Result<Option<Order>, DatabaseError>;

    /// Newest first
    async fn list_for_user(&self, user_id: Uuid, page: Page) -> Result<Vec<Order>, DatabaseError>;
}

/// Outcome of an atomic balance mutation
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    Applied(LedgerEntry),
    /// An entry with this reference already exists for the same movement
    Replayed(LedgerEntry),
    InsufficientFunds { available: Decimal },
    WalletNotFound,
    /// Reference already used by a different movement
    ReferenceConflict(LedgerEntry),
}

impl LedgerWrite {
    /// Classify a request whose reference is already taken
    pub fn for_existing(existing: LedgerEntry, requested: &NewLedgerEntry) -> Self {
        if existing.user_id == requested.user_id
            && existing.direction == requested.direction
            && existing.amount == requested.amount
        {
            LedgerWrite::Replayed(existing)
        } else {
            LedgerWrite::ReferenceConflict(existing)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingSettlement {
    Settled(LedgerEntry),
    AlreadySettled(LedgerEntry),
    NotFound,
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, DatabaseError>;

    /// Update the balance and append a completed entry in one atomic step.
    /// Debits never take the balance below zero.
    async fn apply_entry(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError>;

    /// Append a pending entry without touching the balance
    async fn record_pending(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError>;

    /// Flip a pending entry to completed (applying it to the balance) or failed
    async fn settle_pending(
        &self,
        reference: &str,
        outcome: EntryStatus,
    ) -> Result<PendingSettlement, DatabaseError>;

    async fn find_by_reference(&self, reference: &str)
        -> Result<Option<LedgerEntry>, DatabaseError>;

    /// Newest first
    async fn history(&self, user_id: Uuid, page: Page) -> Result<Vec<LedgerEntry>, DatabaseError>;
}

#[async_trait]
pub trait BundleCatalog: Send + Sync {
    async fn get_bundle(&self, id: Uuid) -> Result<Option<Bundle>, DatabaseError>;
}

#[derive(Debug, Clone)]
pub enum WebhookInsert {
    Inserted(WebhookEventRecord),
    Duplicate(WebhookEventRecord),
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Insert unless an event with the same key exists
    async fn record(&self, event: &WebhookEventRecord) -> Result<WebhookInsert, DatabaseError>;

    async fn find(&self, id: Uuid) -> Result<Option<WebhookEventRecord>, DatabaseError>;

    async fn mark_processed(&self, id: Uuid) -> Result<(), DatabaseError>;

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError>;

    /// Events still pending or failed, under the attempt cap, created before `older_than`
    async fn pending_events(
        &self,
        limit: i64,
        max_attempts: i32,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<WebhookEventRecord>, DatabaseError>;
}
