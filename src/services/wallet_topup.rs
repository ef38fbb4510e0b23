//! Wallet funding through the payment gateway
//!
//! A top-up is recorded as a pending credit before the payment page is
//! opened, so a confirmation can never arrive for an entry we do not have.
//! The verify endpoint and the `charge.success` webhook both complete it.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SettlementConfig;
use crate::middleware::logging::log_external_call;
use crate::models::order::{generate_reference, TOPUP_REFERENCE_PREFIX};
use crate::models::wallet::{EntryStatus, LedgerCategory, LedgerEntry, NewLedgerEntry};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{CustomerContact, InitializeRequest, PaymentState, VerificationResponse};
use crate::payments::utils::to_minor_units;
use crate::services::notification::{NotificationDispatcher, NotificationEvent};
use crate::services::settlement::SettlementError;
use crate::services::wallet_ledger::{LedgerError, WalletLedger};

pub const MIN_TOPUP_AMOUNT: Decimal = Decimal::ONE;

#[derive(Debug, Clone)]
pub struct TopupInitialized {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub amount: Decimal,
}

pub struct WalletTopupService {
    ledger: WalletLedger,
    payments: Arc<dyn PaymentProvider>,
    notifications: NotificationDispatcher,
    config: SettlementConfig,
}

impl WalletTopupService {
    pub fn new(
        ledger: WalletLedger,
        payments: Arc<dyn PaymentProvider>,
        notifications: NotificationDispatcher,
        config: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            payments,
            notifications,
            config,
        }
    }

    pub async fn initialize(
        &self,
        user_id: Uuid,
        email: &str,
        amount: Decimal,
    ) -> Result<TopupInitialized, SettlementError> {
        if amount < MIN_TOPUP_AMOUNT {
            return Err(SettlementError::Validation {
                field: "amount",
                reason: format!("Minimum top-up amount is {} {:.2}", self.config.currency, MIN_TOPUP_AMOUNT),
            });
        }
        if !email.contains('@') {
            return Err(SettlementError::Validation {
                field: "email",
                reason: "a valid email is required".to_string(),
            });
        }

        let reference = generate_reference(TOPUP_REFERENCE_PREFIX);
        let pending = self
            .ledger
            .record_pending_credit(
                NewLedgerEntry::credit(user_id, amount, LedgerCategory::Topup, reference.clone())
                    .with_description("Wallet top-up via Paystack"),
            )
            .await?;

        let request = InitializeRequest {
            customer: CustomerContact {
                email: email.to_string(),
                phone: None,
            },
            amount,
            currency: self.config.currency.clone(),
            reference: reference.clone(),
            callback_url: Some(self.config.wallet_callback_url()),
            channels: vec!["card".to_string(), "mobile_money".to_string()],
            metadata: Some(serde_json::json!({
                "user_id": user_id,
                "transaction_type": "wallet_topup",
            })),
        };

        match log_external_call("payment", "initialize", self.payments.initialize(request)).await {
            Ok(response) => {
                info!(user_id = %user_id, reference = %reference, amount = %amount, "Wallet top-up initialized");
                Ok(TopupInitialized {
                    reference,
                    authorization_url: response.authorization_url,
                    access_code: response.access_code,
                    amount: pending.amount,
                })
            }
            Err(err) => {
                if let Err(settle_err) = self.ledger.fail_pending(&reference).await {
                    warn!(reference = %reference, error = %settle_err, "Could not close abandoned top-up");
                }
                Err(err.into())
            }
        }
    }

    /// Client-driven confirmation. Entries of other users are reported as
    /// not found.
    pub async fn verify(&self, user_id: Uuid, reference: &str) -> Result<LedgerEntry, SettlementError> {
        let entry = self
            .ledger
            .find(reference)
            .await?
            .filter(|entry| entry.user_id == user_id && entry.category == LedgerCategory::Topup)
            .ok_or_else(|| LedgerError::EntryNotFound(reference.to_string()))?;
        if entry.status != EntryStatus::Pending {
            return Ok(entry);
        }

        let report = log_external_call("payment", "verify", self.payments.verify(reference)).await?;
        self.apply_report(reference, &report).await
    }

    /// Settle a pending top-up from a gateway report (verify or webhook)
    pub async fn apply_report(
        &self,
        reference: &str,
        report: &VerificationResponse,
    ) -> Result<LedgerEntry, SettlementError> {
        let entry = self
            .ledger
            .find(reference)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(reference.to_string()))?;
        if entry.status != EntryStatus::Pending {
            return Ok(entry);
        }

        match report.status {
            PaymentState::Success if self.covers(&entry, report)? => {
                let receipt = self.ledger.complete_pending(reference).await?;
                if !receipt.replayed && receipt.entry.status == EntryStatus::Completed {
                    self.notifications.emit(NotificationEvent::WalletCredited {
                        reference: receipt.entry.reference.clone(),
                        user_id: receipt.entry.user_id,
                        amount: receipt.entry.amount,
                        balance: receipt.entry.balance_after,
                    });
                }
                Ok(receipt.entry)
            }
            PaymentState::Success => {
                warn!(reference = %reference, "Top-up payment does not cover the requested amount");
                Ok(self.ledger.fail_pending(reference).await?.entry)
            }
            state if state.is_failure() => {
                info!(reference = %reference, status = state.as_str(), "Top-up payment failed");
                Ok(self.ledger.fail_pending(reference).await?.entry)
            }
            _ => Ok(entry),
        }
    }

    fn covers(&self, entry: &LedgerEntry, report: &VerificationResponse) -> Result<bool, SettlementError> {
        if let Some(currency) = &report.currency {
            if !currency.eq_ignore_ascii_case(&self.config.currency) {
                return Ok(false);
            }
        }
        match report.amount_minor {
            Some(paid) => Ok(paid >= to_minor_units(entry.amount)?),
            None => Ok(true),
        }
    }
}
