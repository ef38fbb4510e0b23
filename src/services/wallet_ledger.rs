//! Wallet ledger service
//!
//! Thin policy layer over [`WalletRepository`]: validates amounts, turns
//! store outcomes into typed errors and logs every balance movement. The
//! atomic debit/credit itself lives in the store.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::{LedgerWrite, Page, PendingSettlement, WalletRepository};
use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};
use crate::models::wallet::{EntryStatus, LedgerCategory, LedgerEntry, NewLedgerEntry};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient wallet balance: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
        shortfall: Decimal,
    },

    #[error("wallet not found for user {0}")]
    WalletNotFound(Uuid),

    #[error("reference {0} already belongs to a different wallet movement")]
    ReferenceConflict(String),

    #[error("wallet transaction {0} not found")]
    EntryNotFound(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let kind = match err {
            LedgerError::InsufficientFunds {
                required,
                available,
                shortfall,
            } => AppErrorKind::Domain(DomainError::InsufficientBalance {
                required: required.to_string(),
                available: available.to_string(),
                shortfall: shortfall.to_string(),
            }),
            LedgerError::WalletNotFound(user_id) => {
                AppErrorKind::Domain(DomainError::WalletNotFound {
                    user_id: user_id.to_string(),
                })
            }
            LedgerError::EntryNotFound(reference) => {
                AppErrorKind::Domain(DomainError::TransactionNotFound { reference })
            }
            LedgerError::ReferenceConflict(reference) => {
                AppErrorKind::Infrastructure(InfrastructureError::Conflict {
                    resource: format!("wallet transaction {}", reference),
                })
            }
            LedgerError::InvalidAmount(reason) => return AppError::validation("amount", reason),
            LedgerError::Database(err) => return err.into(),
        };
        AppError::new(kind)
    }
}

/// Result of a balance movement
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReceipt {
    pub entry: LedgerEntry,
    /// The reference had already been applied; nothing moved this time
    pub replayed: bool,
}

#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<dyn WalletRepository>,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn WalletRepository>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, LedgerError> {
        self.store
            .balance(user_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(user_id))
    }

    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        category: LedgerCategory,
        reference: &str,
        description: impl Into<String>,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(
            NewLedgerEntry::credit(user_id, amount, category, reference)
                .with_description(description),
        )
        .await
    }

    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        category: LedgerCategory,
        reference: &str,
        description: impl Into<String>,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(
            NewLedgerEntry::debit(user_id, amount, category, reference)
                .with_description(description),
        )
        .await
    }

    /// Apply a completed movement. Replaying a reference returns the
    /// original entry without moving the balance again.
    pub async fn apply(&self, entry: NewLedgerEntry) -> Result<LedgerReceipt, LedgerError> {
        validate_amount(entry.amount)?;
        let user_id = entry.user_id;
        let amount = entry.amount;
        let reference = entry.reference.clone();

        match self.store.apply_entry(entry).await? {
            LedgerWrite::Applied(entry) => {
                info!(
                    user_id = %entry.user_id,
                    reference = %entry.reference,
                    direction = entry.direction.as_str(),
                    category = entry.category.as_str(),
                    amount = %entry.amount,
                    balance_after = %entry.balance_after,
                    "Wallet balance updated"
                );
                Ok(LedgerReceipt {
                    entry,
                    replayed: false,
                })
            }
            LedgerWrite::Replayed(entry) => {
                info!(reference = %entry.reference, "Wallet movement already applied");
                Ok(LedgerReceipt {
                    entry,
                    replayed: true,
                })
            }
            LedgerWrite::InsufficientFunds { available } => {
                warn!(
                    user_id = %user_id,
                    reference = %reference,
                    required = %amount,
                    available = %available,
                    "Wallet debit rejected: insufficient balance"
                );
                Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available,
                    shortfall: amount - available,
                })
            }
            LedgerWrite::WalletNotFound => Err(LedgerError::WalletNotFound(user_id)),
            LedgerWrite::ReferenceConflict(_) => Err(LedgerError::ReferenceConflict(reference)),
        }
    }

    /// Pending credit awaiting an external confirmation (top-ups)
    pub async fn record_pending_credit(
        &self,
        entry: NewLedgerEntry,
    ) -> Result<LedgerEntry, LedgerError> {
        validate_amount(entry.amount)?;
        let user_id = entry.user_id;
        let reference = entry.reference.clone();

        match self.store.record_pending(entry).await? {
            LedgerWrite::Applied(entry) | LedgerWrite::Replayed(entry) => Ok(entry),
            LedgerWrite::WalletNotFound => Err(LedgerError::WalletNotFound(user_id)),
            LedgerWrite::ReferenceConflict(_) => Err(LedgerError::ReferenceConflict(reference)),
            LedgerWrite::InsufficientFunds { .. } => Err(LedgerError::InvalidAmount(
                "pending entries never check the balance".to_string(),
            )),
        }
    }

    /// Settle a pending entry as completed. Settling twice returns the
    /// already-settled entry with `replayed` set.
    pub async fn complete_pending(&self, reference: &str) -> Result<LedgerReceipt, LedgerError> {
        self.settle(reference, EntryStatus::Completed).await
    }

    pub async fn fail_pending(&self, reference: &str) -> Result<LedgerReceipt, LedgerError> {
        self.settle(reference, EntryStatus::Failed).await
    }

    async fn settle(
        &self,
        reference: &str,
        outcome: EntryStatus,
    ) -> Result<LedgerReceipt, LedgerError> {
        match self.store.settle_pending(reference, outcome).await? {
            PendingSettlement::Settled(entry) => {
                info!(
                    user_id = %entry.user_id,
                    reference = %entry.reference,
                    status = entry.status.as_str(),
                    balance_after = %entry.balance_after,
                    "Pending wallet transaction settled"
                );
                Ok(LedgerReceipt {
                    entry,
                    replayed: false,
                })
            }
            PendingSettlement::AlreadySettled(entry) => Ok(LedgerReceipt {
                entry,
                replayed: true,
            }),
            PendingSettlement::NotFound => Err(LedgerError::EntryNotFound(reference.to_string())),
        }
    }

    pub async fn find(&self, reference: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.store.find_by_reference(reference).await?)
    }

    pub async fn history(&self, user_id: Uuid, page: Page) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.history(user_id, page).await?)
    }
}

fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    if amount.round_dp(2) != amount {
        return Err(LedgerError::InvalidAmount(format!(
            "{} has more than two decimal places",
            amount
        )));
    }
    Ok(())
}
