//! Purchase settlement pipeline
//!
//! Turns a confirmed payment into a delivered bundle, or into a refund.
//! Entry points:
//!
//! - verify path: the client polls after the payment page redirect
//! - webhook path: the gateway pushes a charge event
//! - wallet path: the wallet debit is the payment, delivery follows at once
//! - retry and refund: operator actions on orders whose delivery failed
//!
//! Every order write is a compare-and-swap on `Order::version`. A decision
//! is recomputed from fresh state when the swap loses, and a delivery is
//! only attempted by the writer that moved `delivery_status` to
//! `processing`. No lock is held across a provider call.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SettlementConfig;
use crate::database::error::DatabaseError;
use crate::database::repository::{BundleCatalog, OrderRepository, Page};
use crate::delivery::{BalanceInfo, DeliveryError, DeliveryGateway, DeliveryRequest, StatusResult};
use crate::error::{
    AppError, AppErrorKind, DomainError, InfrastructureError, ValidationError,
};
use crate::logging::{mask_email, mask_phone};
use crate::middleware::logging::log_external_call;
use crate::models::bundle::Bundle;
use crate::models::order::{DeliveryStatus, Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::models::wallet::{LedgerCategory, NewLedgerEntry};
use crate::payments::error::PaymentError;
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    CustomerContact, InitializeRequest, PaymentState, VerificationResponse, WebhookEvent,
    WebhookEventKind,
};
use crate::payments::utils::to_minor_units;
use crate::services::network_detector::{detect_network, is_valid_ghana_phone, normalize_phone};
use crate::services::notification::{NotificationDispatcher, NotificationEvent};
use crate::services::wallet_ledger::{LedgerError, WalletLedger};

/// Reference prefix of the automatic credit after a failed wallet delivery
pub const WALLET_REFUND_PREFIX: &str = "REF-";
/// Reference prefix of an operator refund
pub const ADMIN_REFUND_PREFIX: &str = "REFUND-";

const AUTO_REFUND_REASON: &str = "Automatic refund: data delivery failed";
const RECONCILIATION_NOTE: &str = "gateway later reported success, manual reconciliation required";

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("bundle {0} not found")]
    BundleNotFound(Uuid),

    #[error("bundle {0} is not available")]
    BundleUnavailable(Uuid),

    #[error("recipient number is on {detected}, bundle is for {expected}")]
    CarrierMismatch { detected: String, expected: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("order {reference} cannot be {action}: {reason}")]
    InvalidState {
        reference: String,
        action: &'static str,
        reason: String,
    },

    #[error("order {0} has already been refunded")]
    AlreadyRefunded(String),

    #[error("order {0} kept changing underneath the update")]
    Conflict(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl SettlementError {
    fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        SettlementError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        let kind = match err {
            SettlementError::OrderNotFound(reference) => {
                AppErrorKind::Domain(DomainError::OrderNotFound { reference })
            }
            SettlementError::BundleNotFound(id) => AppErrorKind::Domain(DomainError::BundleNotFound {
                bundle_id: id.to_string(),
            }),
            SettlementError::BundleUnavailable(id) => {
                AppErrorKind::Validation(ValidationError::BundleUnavailable {
                    bundle_id: id.to_string(),
                })
            }
            SettlementError::CarrierMismatch { detected, expected } => {
                AppErrorKind::Validation(ValidationError::CarrierMismatch { detected, expected })
            }
            SettlementError::Validation { field, reason } => {
                return AppError::validation(field, reason)
            }
            SettlementError::InvalidState {
                reference,
                action,
                reason,
            } => AppErrorKind::Domain(DomainError::InvalidOrderState {
                reference,
                action: action.to_string(),
                reason,
            }),
            SettlementError::AlreadyRefunded(reference) => {
                AppErrorKind::Domain(DomainError::AlreadyRefunded { reference })
            }
            SettlementError::Conflict(resource) => {
                AppErrorKind::Infrastructure(InfrastructureError::Conflict { resource })
            }
            SettlementError::Payment(err) => return err.into(),
            SettlementError::Delivery(err) => return err.into(),
            SettlementError::Ledger(err) => return err.into(),
            SettlementError::Database(err) => return err.into(),
        };
        AppError::new(kind)
    }
}

/// How an order is addressed by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Id(Uuid),
    Reference(String),
}

impl OrderKey {
    /// Path segments may carry either the UUID or the public reference
    pub fn parse(value: &str) -> Self {
        match Uuid::parse_str(value) {
            Ok(id) => OrderKey::Id(id),
            Err(_) => OrderKey::Reference(value.trim().to_string()),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKey::Id(id) => write!(f, "{}", id),
            OrderKey::Reference(reference) => write!(f, "{}", reference),
        }
    }
}

/// Outcome of one decision over a freshly loaded order
enum Step<T> {
    /// Persist the mutated order
    Commit(T),
    /// Nothing to write
    Keep(T),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub bundle_id: Uuid,
    pub recipient_phone: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    /// Receipt address for guests; signed-in users default to their own
    pub email: Option<String>,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::MobileMoney
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletPurchaseRequest {
    pub bundle_id: Uuid,
    pub recipient_phone: String,
}

/// Caller identity as supplied by the auth collaborator
#[derive(Debug, Clone, Default)]
pub struct Purchaser {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PurchaseInitialized {
    pub order: Order,
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub gateway_reference: String,
}

pub struct SettlementPipeline {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn BundleCatalog>,
    ledger: WalletLedger,
    payments: Arc<dyn PaymentProvider>,
    delivery: DeliveryGateway,
    notifications: NotificationDispatcher,
    config: SettlementConfig,
}

impl SettlementPipeline {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn BundleCatalog>,
        ledger: WalletLedger,
        payments: Arc<dyn PaymentProvider>,
        delivery: DeliveryGateway,
        notifications: NotificationDispatcher,
        config: SettlementConfig,
    ) -> Self {
        Self {
            orders,
            catalog,
            ledger,
            payments,
            delivery,
            notifications,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Gateway purchase
    // ------------------------------------------------------------------

    /// Create a pending order and open a payment page for it
    pub async fn initialize_purchase(
        &self,
        purchaser: &Purchaser,
        request: &PurchaseRequest,
    ) -> Result<PurchaseInitialized, SettlementError> {
        if request.payment_method == PaymentMethod::Wallet {
            return Err(SettlementError::validation(
                "payment_method",
                "wallet purchases use the wallet purchase endpoint",
            ));
        }
        let email = purchaser
            .email
            .clone()
            .or_else(|| request.email.clone())
            .filter(|email| email.contains('@'))
            .ok_or_else(|| SettlementError::validation("email", "a valid email is required"))?;

        let bundle = self
            .checked_bundle(request.bundle_id, &request.recipient_phone)
            .await?;
        let order = Order::new(
            purchaser.user_id,
            &bundle,
            normalize_phone(&request.recipient_phone),
            request.payment_method,
            &self.config.currency,
        );
        let order = self.orders.insert(&order).await?;
        info!(
            reference = %order.reference,
            order_id = %order.id,
            network = %order.network,
            phone = %mask_phone(&order.recipient_phone),
            email = %mask_email(&email),
            amount = %order.amount,
            "Order created"
        );

        let channels = match request.payment_method {
            PaymentMethod::Card => vec!["card".to_string(), "mobile_money".to_string()],
            _ => vec!["mobile_money".to_string()],
        };
        let init = InitializeRequest {
            customer: CustomerContact {
                email,
                phone: Some(order.recipient_phone.clone()),
            },
            amount: order.amount,
            currency: order.currency.clone(),
            reference: order.reference.clone(),
            callback_url: Some(self.config.callback_url()),
            channels,
            metadata: Some(serde_json::json!({
                "user_id": order.user_id,
                "transaction_type": "data_purchase",
                "bundle_id": order.bundle_id,
                "recipient_phone": order.recipient_phone,
            })),
        };

        let key = OrderKey::Id(order.id);
        match log_external_call("payment", "initialize", self.payments.initialize(init)).await {
            Ok(response) => {
                let gateway_reference = response.gateway_reference.clone();
                let (order, _) = self
                    .transition(&key, |order| {
                        order.gateway_reference = Some(gateway_reference.clone());
                        Ok(Step::Commit(()))
                    })
                    .await?;
                Ok(PurchaseInitialized {
                    order,
                    authorization_url: response.authorization_url,
                    access_code: response.access_code,
                    gateway_reference: response.gateway_reference,
                })
            }
            Err(err) => {
                let message = format!("Payment initialization failed: {}", err.user_message());
                self.transition(&key, |order| {
                    order.mark_payment_failed(message.clone(), None);
                    Ok(Step::Commit(()))
                })
                .await?;
                Err(err.into())
            }
        }
    }

    /// Verify path. Only asks the gateway while payment is still pending.
    pub async fn verify_payment(&self, reference: &str) -> Result<Order, SettlementError> {
        let key = OrderKey::Reference(reference.to_string());
        let order = self.load(&key).await?;
        if order.payment_status != PaymentStatus::Pending
            || order.payment_method == PaymentMethod::Wallet
        {
            return Ok(order);
        }

        let lookup = order
            .gateway_reference
            .clone()
            .unwrap_or_else(|| order.reference.clone());
        match log_external_call("payment", "verify", self.payments.verify(&lookup)).await {
            Ok(report) => self.apply_payment_report(&order.reference, &report).await,
            Err(err) => {
                let message = format!("Payment verification failed: {}", err.user_message());
                self.transition(&key, |order| {
                    if order.payment_status != PaymentStatus::Pending {
                        return Ok(Step::Keep(()));
                    }
                    order.error_message = Some(message.clone());
                    Ok(Step::Commit(()))
                })
                .await?;
                Err(err.into())
            }
        }
    }

    /// Webhook path. Unknown references are logged and skipped.
    pub async fn handle_payment_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<Order>, SettlementError> {
        let (Some(reference), Some(report)) = (&event.reference, &event.report) else {
            warn!(event_type = %event.event_type, "Payment event without reference or data");
            return Ok(None);
        };
        if event.kind == WebhookEventKind::Unrecognized {
            return Ok(None);
        }

        match self.apply_payment_report(reference, report).await {
            Ok(order) => Ok(Some(order)),
            Err(SettlementError::OrderNotFound(_)) => {
                warn!(reference = %reference, "Payment event for unknown order");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Branch on a gateway report, shared by the verify and webhook paths
    pub async fn apply_payment_report(
        &self,
        reference: &str,
        report: &VerificationResponse,
    ) -> Result<Order, SettlementError> {
        let key = OrderKey::Reference(reference.to_string());
        let (order, claimed) = self
            .transition(&key, |order| {
                if order.payment_method == PaymentMethod::Wallet {
                    return Ok(Step::Keep(false));
                }
                match order.payment_status {
                    PaymentStatus::Success => return Ok(Step::Keep(false)),
                    PaymentStatus::Failed => {
                        let noted = order
                            .error_message
                            .as_deref()
                            .is_some_and(|m| m.contains(RECONCILIATION_NOTE));
                        if report.status != PaymentState::Success || noted {
                            return Ok(Step::Keep(false));
                        }
                        warn!(
                            reference = %order.reference,
                            "Success reported for an order whose payment already failed"
                        );
                        order.error_message = Some(match order.error_message.take() {
                            Some(previous) => format!("{}; {}", previous, RECONCILIATION_NOTE),
                            None => RECONCILIATION_NOTE.to_string(),
                        });
                        return Ok(Step::Commit(false));
                    }
                    PaymentStatus::Pending => {}
                }

                match report.status {
                    PaymentState::Success => {
                        if let Some(reason) = amount_mismatch(order, report)? {
                            warn!(reference = %order.reference, reason = %reason, "Payment rejected");
                            order.mark_payment_failed(reason, Some(report.raw.clone()));
                            return Ok(Step::Commit(false));
                        }
                        order.confirm_payment(report.channel.clone(), Some(report.raw.clone()));
                        order.claim_delivery();
                        Ok(Step::Commit(true))
                    }
                    state if state.is_failure() => {
                        order.mark_payment_failed(
                            payment_failure_message(report),
                            Some(report.raw.clone()),
                        );
                        Ok(Step::Commit(false))
                    }
                    _ => Ok(Step::Keep(false)),
                }
            })
            .await?;

        if !claimed {
            return Ok(order);
        }
        info!(
            reference = %order.reference,
            channel = ?order.payment_channel,
            phase = "payment",
            "Payment confirmed"
        );
        self.deliver(order, false).await
    }

    // ------------------------------------------------------------------
    // Wallet purchase
    // ------------------------------------------------------------------

    /// Debit first, then deliver. A failed delivery is compensated with an
    /// equal credit and the order ends `failed`.
    pub async fn purchase_with_wallet(
        &self,
        user_id: Uuid,
        request: &WalletPurchaseRequest,
    ) -> Result<Order, SettlementError> {
        let bundle = self
            .checked_bundle(request.bundle_id, &request.recipient_phone)
            .await?;

        // Early rejection only; the debit below is the real floor check
        let available = self.ledger.balance(user_id).await?;
        if available < bundle.retail_price {
            return Err(LedgerError::InsufficientFunds {
                required: bundle.retail_price,
                available,
                shortfall: bundle.retail_price - available,
            }
            .into());
        }

        let order = Order::new(
            Some(user_id),
            &bundle,
            normalize_phone(&request.recipient_phone),
            PaymentMethod::Wallet,
            &self.config.currency,
        );
        let order = self.orders.insert(&order).await?;
        let key = OrderKey::Id(order.id);
        info!(
            reference = %order.reference,
            user_id = %user_id,
            amount = %order.amount,
            "Wallet order created"
        );

        let debit = NewLedgerEntry::debit(
            user_id,
            order.amount,
            LedgerCategory::Purchase,
            order.reference.clone(),
        )
        .for_order(order.id)
        .with_description(format!(
            "Data purchase: {} {} for {}",
            order.data_amount,
            order.network,
            mask_phone(&order.recipient_phone)
        ));
        if let Err(err) = self.ledger.apply(debit).await {
            let message = match &err {
                LedgerError::InsufficientFunds { .. } => "Insufficient wallet balance".to_string(),
                other => format!("Wallet debit failed: {}", other),
            };
            self.transition(&key, |order| {
                order.mark_payment_failed(message.clone(), None);
                Ok(Step::Commit(()))
            })
            .await?;
            return Err(err.into());
        }

        let (order, claimed) = self
            .transition(&key, |order| {
                if order.payment_status != PaymentStatus::Pending {
                    return Ok(Step::Keep(false));
                }
                order.confirm_payment(Some("wallet".to_string()), None);
                order.claim_delivery();
                Ok(Step::Commit(true))
            })
            .await?;

        if claimed {
            self.deliver(order, false).await
        } else {
            Ok(order)
        }
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    /// Call the provider for an order whose delivery slot we hold, then
    /// record the outcome. Never called without a fresh claim.
    async fn deliver(&self, claimed: Order, retry: bool) -> Result<Order, SettlementError> {
        let request = DeliveryRequest {
            network: claimed.network,
            recipient_phone: claimed.recipient_phone.clone(),
            plan_code: claimed.carrier_plan_code.clone(),
            reference: claimed.delivery_reference(retry),
        };
        info!(
            reference = %claimed.reference,
            delivery_reference = %request.reference,
            provider = self.delivery.provider_name(),
            phone = %mask_phone(&request.recipient_phone),
            retry,
            phase = "delivery",
            "Delivering data bundle"
        );
        let result = self.delivery.deliver(&request).await;

        let owes_refund = !result.success
            && !retry
            && claimed.payment_method == PaymentMethod::Wallet
            && claimed.user_id.is_some();

        // Nothing else writes an order while its delivery is claimed, so a
        // moved version means another caller re-claimed it
        let claim_version = claimed.version;
        let (order, (recorded, refund_reserved)) = self
            .transition(&OrderKey::Id(claimed.id), |order| {
                if order.delivery_status != DeliveryStatus::Processing
                    || order.version != claim_version
                {
                    return Ok(Step::Keep((false, false)));
                }
                let refunded_status = order.refund_issued().then_some(order.status);
                if result.success {
                    order.record_delivery_success(
                        result.provider_transaction_id.clone(),
                        result.raw.clone(),
                        retry,
                    );
                } else {
                    order.record_delivery_failure(
                        format!("Data delivery failed: {}", result.message),
                        result.raw.clone(),
                        retry,
                    );
                }
                if let Some(status) = refunded_status {
                    // Money already went back; the outcome must not reopen the order
                    order.status = status;
                    return Ok(Step::Commit((true, false)));
                }
                if owes_refund {
                    order.record_refund(OrderStatus::Failed, AUTO_REFUND_REASON);
                    return Ok(Step::Commit((true, true)));
                }
                Ok(Step::Commit((true, false)))
            })
            .await?;

        if !recorded {
            warn!(reference = %order.reference, "Delivery outcome arrived after the claim was resolved");
            return Ok(order);
        }
        if result.success && order.status != OrderStatus::Completed {
            error!(
                reference = %order.reference,
                status = %order.status,
                "Data delivered on an order that was already refunded, manual reconciliation required"
            );
            return Ok(order);
        }

        let (order, compensated) = if refund_reserved {
            if self.compensate_wallet(&order, &result.message).await {
                (order, true)
            } else {
                (self.release_compensation(order).await?, false)
            }
        } else {
            (order, false)
        };

        if result.success {
            info!(
                reference = %order.reference,
                provider_transaction_id = ?order.provider_transaction_id,
                retry_count = order.retry_count,
                "Data bundle delivered"
            );
            self.notifications.emit(NotificationEvent::OrderConfirmed {
                reference: order.reference.clone(),
                user_id: order.user_id,
                recipient_phone: order.recipient_phone.clone(),
                data_amount: order.data_amount.clone(),
            });
        } else {
            warn!(
                reference = %order.reference,
                message = %result.message,
                retry_count = order.retry_count,
                refunded = compensated,
                "Data delivery failed"
            );
            self.notifications.emit(NotificationEvent::DeliveryFailed {
                reference: order.reference.clone(),
                user_id: order.user_id,
                reason: result.message.clone(),
            });
            if let (true, Some(user_id)) = (compensated, order.user_id) {
                self.notifications.emit(NotificationEvent::OrderRefunded {
                    reference: order.reference.clone(),
                    user_id,
                    amount: order.amount,
                });
            }
        }
        Ok(order)
    }

    /// Return a wallet debit after a failed delivery. A failure here leaves
    /// the order refundable by an operator.
    async fn compensate_wallet(&self, order: &Order, reason: &str) -> bool {
        let Some(user_id) = order.user_id else {
            return false;
        };
        let credit = NewLedgerEntry::credit(
            user_id,
            order.amount,
            LedgerCategory::Refund,
            format!("{}{}", WALLET_REFUND_PREFIX, order.reference),
        )
        .for_order(order.id)
        .with_description(format!("Refund for failed delivery: {}", reason));

        match self.ledger.apply(credit).await {
            Ok(receipt) => {
                info!(
                    reference = %order.reference,
                    balance_after = %receipt.entry.balance_after,
                    "Wallet debit reversed"
                );
                true
            }
            Err(err) => {
                error!(
                    reference = %order.reference,
                    error = %err,
                    "Automatic wallet refund failed, order left for operator"
                );
                false
            }
        }
    }

    /// Reopen an order whose automatic refund could not be credited
    async fn release_compensation(&self, marked: Order) -> Result<Order, SettlementError> {
        let (order, _) = self
            .transition(&OrderKey::Id(marked.id), |order| {
                if order.status != OrderStatus::Failed
                    || order.refund_reason.as_deref() != Some(AUTO_REFUND_REASON)
                {
                    return Ok(Step::Keep(()));
                }
                order.status = OrderStatus::Processing;
                order.refunded_at = None;
                order.refund_reason = None;
                Ok(Step::Commit(()))
            })
            .await?;
        Ok(order)
    }

    /// Operator retry of a failed delivery. Payment is never re-verified.
    pub async fn retry_delivery(&self, key: &OrderKey) -> Result<Order, SettlementError> {
        let stale_after = self.config.stale_claim_after();
        let (order, claimed) = self
            .transition(key, |order| {
                if order.payment_status != PaymentStatus::Success {
                    return Err(invalid_state(order, "retried", "payment has not been confirmed"));
                }
                if order.delivery_status == DeliveryStatus::Delivered {
                    return Ok(Step::Keep(false));
                }
                if order.refund_issued() {
                    return Err(invalid_state(order, "retried", "order has been refunded"));
                }
                if order.delivery_status == DeliveryStatus::Processing
                    && !order.delivery_claim_is_stale(Utc::now(), stale_after)
                {
                    return Err(invalid_state(order, "retried", "a delivery is already in progress"));
                }
                order.claim_delivery();
                Ok(Step::Commit(true))
            })
            .await?;

        if claimed {
            info!(reference = %order.reference, retry_count = order.retry_count, "Delivery retry claimed");
            self.deliver(order, true).await
        } else {
            Ok(order)
        }
    }

    // ------------------------------------------------------------------
    // Refund
    // ------------------------------------------------------------------

    /// Mark the order refunded, then credit the amount back to the owner's
    /// wallet. The ledger reference makes the credit replay-safe, so a repeat
    /// call on an already refunded order re-applies a credit that an
    /// interrupted call never wrote and still reports `AlreadyRefunded`.
    pub async fn refund_order(&self, key: &OrderKey, reason: &str) -> Result<Order, SettlementError> {
        if reason.trim().is_empty() {
            return Err(SettlementError::validation("reason", "a refund reason is required"));
        }

        let (order, previous_status) = self
            .transition(key, |order| {
                if order.status == OrderStatus::Refunded {
                    return Ok(Step::Keep(None));
                }
                ensure_refundable(order)?;
                if order.user_id.is_none() {
                    return Err(SettlementError::validation(
                        "order",
                        "guest orders cannot be refunded to a wallet",
                    ));
                }
                let previous = order.status;
                order.record_refund(OrderStatus::Refunded, reason);
                Ok(Step::Commit(Some(previous)))
            })
            .await?;
        let Some(user_id) = order.user_id else {
            return Err(SettlementError::validation(
                "order",
                "guest orders cannot be refunded to a wallet",
            ));
        };

        let credit = NewLedgerEntry::credit(
            user_id,
            order.amount,
            LedgerCategory::Refund,
            format!("{}{}", ADMIN_REFUND_PREFIX, order.reference),
        )
        .for_order(order.id)
        .with_description(format!(
            "Refund: {}",
            order.refund_reason.as_deref().unwrap_or(reason)
        ));
        let receipt = match self.ledger.apply(credit).await {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Some(previous) = previous_status {
                    self.release_refund(&order, previous).await;
                }
                return Err(err.into());
            }
        };

        if previous_status.is_none() {
            if !receipt.replayed {
                warn!(reference = %order.reference, "Completed an interrupted refund credit");
            }
            return Err(SettlementError::AlreadyRefunded(order.reference.clone()));
        }

        info!(
            reference = %order.reference,
            user_id = %user_id,
            amount = %order.amount,
            balance_after = %receipt.entry.balance_after,
            "Order refunded"
        );
        self.notifications.emit(NotificationEvent::OrderRefunded {
            reference: order.reference.clone(),
            user_id,
            amount: order.amount,
        });
        Ok(order)
    }

    /// Undo a refund marker whose credit could not be written, leaving the
    /// order open to an operator again
    async fn release_refund(&self, marked: &Order, previous: OrderStatus) {
        let released = self
            .transition(&OrderKey::Id(marked.id), |order| {
                if order.refunded_at != marked.refunded_at {
                    return Ok(Step::Keep(()));
                }
                order.status = previous;
                order.refunded_at = None;
                order.refund_reason = None;
                Ok(Step::Commit(()))
            })
            .await;
        if let Err(err) = released {
            error!(
                reference = %marked.reference,
                error = %err,
                "Refund marker left on an order whose credit failed"
            );
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn find_order(&self, key: &OrderKey) -> Result<Order, SettlementError> {
        self.load(key).await
    }

    pub async fn orders_for_user(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> Result<Vec<Order>, SettlementError> {
        Ok(self.orders.list_for_user(user_id, page).await?)
    }

    /// Provider's view of the latest delivery attempt
    pub async fn delivery_status(&self, key: &OrderKey) -> Result<StatusResult, SettlementError> {
        let order = self.load(key).await?;
        if order.delivery_status == DeliveryStatus::Pending {
            return Err(invalid_state(&order, "queried", "no delivery has been attempted"));
        }
        let reference = if order.retry_count > 0 {
            format!("{}-R{}", order.reference, order.retry_count)
        } else {
            order.reference.clone()
        };
        Ok(self.delivery.query_status(&reference).await?)
    }

    pub async fn delivery_balance(&self) -> Result<BalanceInfo, SettlementError> {
        Ok(self.delivery.check_balance().await?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn load(&self, key: &OrderKey) -> Result<Order, SettlementError> {
        let found = match key {
            OrderKey::Id(id) => self.orders.find_by_id(*id).await?,
            OrderKey::Reference(reference) => self.orders.find_by_reference(reference).await?,
        };
        found.ok_or_else(|| SettlementError::OrderNotFound(key.to_string()))
    }

    /// Load, decide, compare-and-swap; reload and decide again on conflict
    async fn transition<T, F>(&self, key: &OrderKey, mut decide: F) -> Result<(Order, T), SettlementError>
    where
        F: FnMut(&mut Order) -> Result<Step<T>, SettlementError> + Send,
        T: Send,
    {
        let attempts = self.config.conflict_retry_limit.max(1);
        for attempt in 1..=attempts {
            let current = self.load(key).await?;
            let mut draft = current.clone();
            match decide(&mut draft)? {
                Step::Keep(value) => return Ok((current, value)),
                Step::Commit(value) => {
                    if let Some(stored) = self.orders.update_if_version(&draft).await? {
                        debug!(
                            reference = %stored.reference,
                            status = %stored.status,
                            payment_status = stored.payment_status.as_str(),
                            delivery_status = stored.delivery_status.as_str(),
                            "Order updated"
                        );
                        return Ok((stored, value));
                    }
                    debug!(order = %key, attempt, "Order version conflict, retrying");
                }
            }
        }
        warn!(order = %key, attempts, "Giving up on order update after repeated conflicts");
        Err(SettlementError::Conflict(key.to_string()))
    }

    /// Catalog checks done before any order exists
    async fn checked_bundle(&self, bundle_id: Uuid, phone: &str) -> Result<Bundle, SettlementError> {
        if !is_valid_ghana_phone(phone) {
            return Err(SettlementError::validation(
                "recipient_phone",
                "must be a valid Ghana phone number",
            ));
        }
        let bundle = self
            .catalog
            .get_bundle(bundle_id)
            .await?
            .ok_or(SettlementError::BundleNotFound(bundle_id))?;
        if !bundle.is_active {
            return Err(SettlementError::BundleUnavailable(bundle_id));
        }

        match detect_network(phone) {
            Some(carrier) if carrier == bundle.network => Ok(bundle),
            detected => {
                warn!(
                    phone = %mask_phone(phone),
                    detected = ?detected,
                    expected = %bundle.network,
                    "Carrier mismatch"
                );
                Err(SettlementError::CarrierMismatch {
                    detected: detected
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                    expected: bundle.network.to_string(),
                })
            }
        }
    }
}

fn invalid_state(order: &Order, action: &'static str, reason: &str) -> SettlementError {
    SettlementError::InvalidState {
        reference: order.reference.clone(),
        action,
        reason: reason.to_string(),
    }
}

fn ensure_refundable(order: &Order) -> Result<(), SettlementError> {
    if order.refund_issued() {
        return Err(SettlementError::AlreadyRefunded(order.reference.clone()));
    }
    if order.payment_status != PaymentStatus::Success {
        return Err(invalid_state(order, "refunded", "payment was never captured"));
    }
    match (order.status, order.delivery_status) {
        (OrderStatus::Completed, _)
        | (OrderStatus::Failed, _)
        | (OrderStatus::Processing, DeliveryStatus::Failed) => Ok(()),
        _ => Err(invalid_state(order, "refunded", "delivery is still in progress")),
    }
}

/// Reason to reject a success report that does not cover the order
fn amount_mismatch(
    order: &Order,
    report: &VerificationResponse,
) -> Result<Option<String>, SettlementError> {
    if let Some(currency) = &report.currency {
        if !currency.eq_ignore_ascii_case(&order.currency) {
            return Ok(Some(format!(
                "Payment currency mismatch: expected {}, received {}",
                order.currency, currency
            )));
        }
    }
    if let Some(paid) = report.amount_minor {
        let expected = to_minor_units(order.amount)?;
        if paid < expected {
            return Ok(Some(format!(
                "Payment amount mismatch: expected {}, received {}",
                expected, paid
            )));
        }
    }
    Ok(None)
}

fn payment_failure_message(report: &VerificationResponse) -> String {
    report
        .gateway_message
        .clone()
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("Payment {}", report.status.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::PaymentMethod;
    use crate::services::network_detector::Carrier;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        let bundle = Bundle {
            id: Uuid::new_v4(),
            network: Carrier::Mtn,
            name: "MTN 5GB".to_string(),
            data_amount: "5GB".to_string(),
            validity: "30 days".to_string(),
            retail_price: dec!(18.00),
            carrier_plan_code: "MTN-5GB".to_string(),
            is_active: true,
        };
        Order::new(None, &bundle, "233241234567".to_string(), PaymentMethod::Card, "GHS")
    }

    fn report(status: PaymentState, amount_minor: Option<i64>, currency: &str) -> VerificationResponse {
        VerificationResponse {
            status,
            reference: "OE-1".to_string(),
            amount_minor,
            currency: Some(currency.to_string()),
            channel: Some("mobile_money".to_string()),
            gateway_message: None,
            paid_at: None,
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn order_key_accepts_uuid_or_reference() {
        let id = Uuid::new_v4();
        assert_eq!(OrderKey::parse(&id.to_string()), OrderKey::Id(id));
        assert_eq!(
            OrderKey::parse("OE-ABC-123456"),
            OrderKey::Reference("OE-ABC-123456".to_string())
        );
    }

    #[test]
    fn underpayment_and_wrong_currency_are_mismatches() {
        let order = order();
        assert!(amount_mismatch(&order, &report(PaymentState::Success, Some(1800), "GHS"))
            .unwrap()
            .is_none());
        assert!(amount_mismatch(&order, &report(PaymentState::Success, Some(1799), "GHS"))
            .unwrap()
            .is_some());
        assert!(amount_mismatch(&order, &report(PaymentState::Success, Some(1800), "NGN"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn failure_message_prefers_gateway_text() {
        let mut abandoned = report(PaymentState::Abandoned, None, "GHS");
        assert_eq!(payment_failure_message(&abandoned), "Payment abandoned");
        abandoned.gateway_message = Some("Declined".to_string());
        assert_eq!(payment_failure_message(&abandoned), "Declined");
    }

    #[test]
    fn refund_eligibility_follows_order_state() {
        let mut order = order();
        assert!(matches!(
            ensure_refundable(&order),
            Err(SettlementError::InvalidState { .. })
        ));

        order.confirm_payment(None, None);
        order.claim_delivery();
        assert!(ensure_refundable(&order).is_err());

        order.record_delivery_failure("timeout", serde_json::json!({}), false);
        assert!(ensure_refundable(&order).is_ok());

        order.record_refund(OrderStatus::Refunded, "customer request");
        assert!(matches!(
            ensure_refundable(&order),
            Err(SettlementError::AlreadyRefunded(_))
        ));
    }
}
