//! PostgreSQL wallet store
//!
//! Balance changes run inside one transaction that locks the owning `users`
//! row, so the floor check and the write can never interleave with another
//! movement on the same wallet.

use crate::database::error::DatabaseError;
use crate::database::repository::{LedgerWrite, Page, PendingSettlement, WalletRepository};
use crate::models::wallet::{
    EntryDirection, EntryStatus, LedgerCategory, LedgerEntry, NewLedgerEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "id, user_id, direction, amount, balance_before, balance_after, \
     category, reference, order_id, description, status, created_at, completed_at";

#[derive(Debug, Clone, FromRow)]
struct LedgerRow {
    id: Uuid,
    user_id: Uuid,
    direction: String,
    amount: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    category: String,
    reference: String,
    order_id: Option<Uuid>,
    description: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DatabaseError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let bad = |column: &str, value: &str| {
            DatabaseError::decode(format!(
                "wallet_transactions.{} has unexpected value '{}'",
                column, value
            ))
        };

        Ok(LedgerEntry {
            direction: EntryDirection::from_db(&row.direction)
                .ok_or_else(|| bad("direction", &row.direction))?,
            category: LedgerCategory::from_db(&row.category)
                .ok_or_else(|| bad("category", &row.category))?,
            status: EntryStatus::from_db(&row.status).ok_or_else(|| bad("status", &row.status))?,
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            reference: row.reference,
            order_id: row.order_id,
            description: row.description,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_balance(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<Option<Decimal>, DatabaseError> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT wallet_balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(|(balance,)| balance))
    }

    async fn entry_by_reference(
        tx: &mut Transaction<'_, Postgres>,
        reference: &str,
        for_update: bool,
    ) -> Result<Option<LedgerEntry>, DatabaseError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {} FROM wallet_transactions WHERE reference = $1{}",
            ENTRY_COLUMNS, lock
        ))
        .bind(reference)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(LedgerEntry::try_from)
        .transpose()
    }

    async fn insert_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<LedgerEntry, DatabaseError> {
        sqlx::query_as::<_, LedgerRow>(&format!(
            "INSERT INTO wallet_transactions
             (id, user_id, direction, amount, balance_before, balance_after, category,
              reference, order_id, description, status, created_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.direction.as_str())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.category.as_str())
        .bind(&entry.reference)
        .bind(entry.order_id)
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .bind(entry.completed_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .try_into()
    }

    async fn set_balance(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        balance: Decimal,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET wallet_balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(balance)
            .execute(&mut **tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Shared path for completed and pending writes
    async fn write_entry(
        &self,
        entry: NewLedgerEntry,
        status: EntryStatus,
    ) -> Result<LedgerWrite, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let Some(balance) = Self::lock_balance(&mut tx, entry.user_id).await? else {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(LedgerWrite::WalletNotFound);
        };

        if let Some(existing) = Self::entry_by_reference(&mut tx, &entry.reference, false).await? {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(LedgerWrite::for_existing(existing, &entry));
        }

        if status == EntryStatus::Completed
            && entry.direction == EntryDirection::Debit
            && balance < entry.amount
        {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(LedgerWrite::InsufficientFunds { available: balance });
        }

        let requested = entry.clone();
        let materialized = entry.into_entry(balance, status);
        let stored = match Self::insert_entry(&mut tx, &materialized).await {
            Ok(stored) => stored,
            Err(err) if err.is_unique_violation() => {
                // Same reference committed concurrently by another wallet
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return match self.find_by_reference(&requested.reference).await? {
                    Some(existing) => Ok(LedgerWrite::for_existing(existing, &requested)),
                    None => Err(err),
                };
            }
            Err(err) => return Err(err),
        };

        if status == EntryStatus::Completed {
            Self::set_balance(&mut tx, stored.user_id, stored.balance_after).await?;
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(LedgerWrite::Applied(stored))
    }
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, DatabaseError> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT wallet_balance FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(|(balance,)| balance))
    }

    async fn apply_entry(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError> {
        self.write_entry(entry, EntryStatus::Completed).await
    }

    async fn record_pending(&self, entry: NewLedgerEntry) -> Result<LedgerWrite, DatabaseError> {
        self.write_entry(entry, EntryStatus::Pending).await
    }

    async fn settle_pending(
        &self,
        reference: &str,
        outcome: EntryStatus,
    ) -> Result<PendingSettlement, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let Some(current) = Self::entry_by_reference(&mut tx, reference, true).await? else {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(PendingSettlement::NotFound);
        };
        if current.status != EntryStatus::Pending {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(PendingSettlement::AlreadySettled(current));
        }

        let balance = Self::lock_balance(&mut tx, current.user_id)
            .await?
            .unwrap_or(Decimal::ZERO);
        let overdraws = current.direction == EntryDirection::Debit && balance < current.amount;
        let (status, balance_after) = match outcome {
            EntryStatus::Completed if !overdraws => (
                EntryStatus::Completed,
                current.direction.apply(balance, current.amount),
            ),
            _ => (EntryStatus::Failed, balance),
        };

        let settled: LedgerEntry = sqlx::query_as::<_, LedgerRow>(&format!(
            "UPDATE wallet_transactions
             SET status = $2, balance_before = $3, balance_after = $4,
                 completed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE NULL END
             WHERE id = $1
             RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(current.id)
        .bind(status.as_str())
        .bind(balance)
        .bind(balance_after)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .try_into()?;

        if status == EntryStatus::Completed {
            Self::set_balance(&mut tx, settled.user_id, balance_after).await?;
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(PendingSettlement::Settled(settled))
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, DatabaseError> {
        sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {} FROM wallet_transactions WHERE reference = $1",
            ENTRY_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(LedgerEntry::try_from)
        .transpose()
    }

    async fn history(&self, user_id: Uuid, page: Page) -> Result<Vec<LedgerEntry>, DatabaseError> {
        sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {} FROM wallet_transactions WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(LedgerEntry::try_from)
        .collect()
    }
}
