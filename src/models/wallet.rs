//! Wallet ledger entries
//!
//! One entry per balance-affecting event. `balance_after` is always
//! `balance_before` plus or minus `amount` according to `direction`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Credit => "credit",
            EntryDirection::Debit => "debit",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "credit" => Some(EntryDirection::Credit),
            "debit" => Some(EntryDirection::Debit),
            _ => None,
        }
    }

    /// Balance after applying `amount` in this direction
    pub fn apply(&self, balance: Decimal, amount: Decimal) -> Decimal {
        match self {
            EntryDirection::Credit => balance + amount,
            EntryDirection::Debit => balance - amount,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCategory {
    Topup,
    Purchase,
    Refund,
    Referral,
    Bonus,
    Withdrawal,
}

impl LedgerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerCategory::Topup => "topup",
            LedgerCategory::Purchase => "purchase",
            LedgerCategory::Refund => "refund",
            LedgerCategory::Referral => "referral",
            LedgerCategory::Bonus => "bonus",
            LedgerCategory::Withdrawal => "withdrawal",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "topup" => Some(LedgerCategory::Topup),
            "purchase" => Some(LedgerCategory::Purchase),
            "refund" => Some(LedgerCategory::Refund),
            "referral" => Some(LedgerCategory::Referral),
            "bonus" => Some(LedgerCategory::Bonus),
            "withdrawal" => Some(LedgerCategory::Withdrawal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(EntryStatus::Pending),
            "completed" => Some(EntryStatus::Completed),
            "failed" => Some(EntryStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub direction: EntryDirection,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub category: LedgerCategory,
    pub reference: String,
    pub order_id: Option<Uuid>,
    pub description: Option<String>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Entry whose balance snapshot satisfies the before/after identity
    pub fn is_balanced(&self) -> bool {
        self.direction.apply(self.balance_before, self.amount) == self.balance_after
    }
}

/// Write request for a ledger movement, balances are filled in by the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub direction: EntryDirection,
    pub amount: Decimal,
    pub category: LedgerCategory,
    pub reference: String,
    pub order_id: Option<Uuid>,
    pub description: Option<String>,
}

impl NewLedgerEntry {
    pub fn credit(
        user_id: Uuid,
        amount: Decimal,
        category: LedgerCategory,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            direction: EntryDirection::Credit,
            amount,
            category,
            reference: reference.into(),
            order_id: None,
            description: None,
        }
    }

    pub fn debit(
        user_id: Uuid,
        amount: Decimal,
        category: LedgerCategory,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            direction: EntryDirection::Debit,
            ..Self::credit(user_id, amount, category, reference)
        }
    }

    pub fn for_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Materialize against the live balance
    pub fn into_entry(self, balance_before: Decimal, status: EntryStatus) -> LedgerEntry {
        let now = Utc::now();
        let completed = status == EntryStatus::Completed;
        LedgerEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            direction: self.direction,
            amount: self.amount,
            balance_before,
            balance_after: if completed {
                self.direction.apply(balance_before, self.amount)
            } else {
                balance_before
            },
            category: self.category,
            reference: self.reference,
            order_id: self.order_id,
            description: self.description,
            status,
            created_at: now,
            completed_at: completed.then_some(now),
        }
    }
}
