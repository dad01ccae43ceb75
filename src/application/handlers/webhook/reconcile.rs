//! Reconciliation dispatcher - maps a classified notification onto the ledger.
//!
//! Runs inside the caller's `LedgerTx`, after the dedup insert. The match on
//! `ProviderNotification` is exhaustive; every notification ends in exactly
//! one of: a ledger operation, a payment leg update, a skip, or an error.
//!
//! Order resolution, first hit wins:
//! 1. explicit reference (Apple `appAccountToken`, wallet `out_trade_no`)
//! 2. payment leg by purchase token or provider transaction id
//! 3. app stores only: earliest leg sharing the original transaction id
//!    (heuristic, logged at `warn`)

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::application::handlers::order::refund_id_for;
use crate::application::ledger::{LedgerOutcome, OrderLedger, PaymentRecord, RefundRecord};
use crate::application::payment_confirmation::{apply_verification, Confirmation, PaymentConfirmer};
use crate::domain::foundation::{Money, OrderId, OrderNumber, Provider};
use crate::domain::notification::{
    AppleNotificationType, AppleRenewalInfo, AppleSubtype, AppleTransactionInfo,
    ClassifiedNotification, OneTimeNotificationType, ProviderNotification,
    SubscriptionNotificationType, TradeAmount, TradeNotification, TradeStatus, WebhookError,
};
use crate::domain::order::{
    GracePeriodStatus, Order, OrderError, OrderStatus, PaymentLeg, PaymentStatus,
};
use crate::domain::subscription::{CancelReason, SubscriptionSnapshot, SubscriptionState};
use crate::ports::{Clock, LedgerTx, ProviderRegistry, PurchaseState, VerificationResult};

pub const PROVIDER_CANCELLED: &str = "provider-cancelled";
pub const PROVIDER_REVOKED: &str = "provider-revoked";
pub const PROVIDER_CLOSED: &str = "provider-closed";

/// What reconciling one notification did.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// The notification was applied to an order.
    Applied {
        order_id: OrderId,
        action: &'static str,
        changed: bool,
    },

    /// Nothing to reconcile (test pings).
    Skipped(String),
}

impl Disposition {
    fn applied(order: &Order, action: &'static str, changed: bool) -> Self {
        Disposition::Applied {
            order_id: order.id,
            action,
            changed,
        }
    }

    fn from_outcome(outcome: &LedgerOutcome, action: &'static str) -> Self {
        Self::applied(outcome.order(), action, outcome.is_changed())
    }

    fn from_confirmation(confirmation: &Confirmation) -> Self {
        if confirmation.is_booked() {
            Self::from_outcome(&confirmation.outcome, "payment")
        } else {
            Self::applied(confirmation.outcome.order(), "leg_update", false)
        }
    }

    /// Summary stored on the processed webhook event.
    pub fn summary(&self) -> Value {
        match self {
            Disposition::Applied {
                order_id,
                action,
                changed,
            } => json!({
                "order_id": order_id.to_string(),
                "action": action,
                "changed": changed,
            }),
            Disposition::Skipped(reason) => json!({ "skipped": reason }),
        }
    }
}

/// Applies notifications to the ledger.
pub struct ReconcileDispatcher {
    ledger: Arc<OrderLedger>,
    confirmer: Arc<PaymentConfirmer>,
    providers: Arc<ProviderRegistry>,
    clock: Arc<dyn Clock>,
}

impl ReconcileDispatcher {
    pub fn new(
        ledger: Arc<OrderLedger>,
        confirmer: Arc<PaymentConfirmer>,
        providers: Arc<ProviderRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            confirmer,
            providers,
            clock,
        }
    }

    pub async fn dispatch(
        &self,
        tx: &mut dyn LedgerTx,
        classified: &ClassifiedNotification,
    ) -> Result<Disposition, WebhookError> {
        match &classified.notification {
            ProviderNotification::Test { provider } => {
                debug!(provider = %provider, event_id = %classified.event_id, "Test notification");
                Ok(Disposition::Skipped("test notification".to_string()))
            }
            ProviderNotification::OneTimeProduct {
                purchase_token,
                sku,
                notification_type,
            } => {
                self.one_time_product(tx, classified, purchase_token, sku, *notification_type)
                    .await
            }
            ProviderNotification::Subscription {
                purchase_token,
                subscription_id,
                notification_type,
            } => {
                self.subscription(tx, classified, purchase_token, subscription_id, *notification_type)
                    .await
            }
            ProviderNotification::AppleLifecycle {
                transaction_info,
                renewal_info,
                notification_type,
                subtype,
            } => {
                self.apple(
                    tx,
                    classified,
                    transaction_info,
                    renewal_info.as_ref(),
                    notification_type,
                    subtype.as_ref(),
                )
                .await
            }
            ProviderNotification::TradeStatus(trade) => self.trade(tx, classified, trade).await,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Google Play
    // ════════════════════════════════════════════════════════════════════════════

    async fn one_time_product(
        &self,
        tx: &mut dyn LedgerTx,
        classified: &ClassifiedNotification,
        purchase_token: &str,
        sku: &str,
        notification_type: OneTimeNotificationType,
    ) -> Result<Disposition, WebhookError> {
        if let OneTimeNotificationType::Unknown(_) = notification_type {
            return Err(unsupported(classified));
        }

        let order = self
            .resolve(tx, classified, Reference::PurchaseToken(purchase_token))
            .await?;
        match notification_type {
            OneTimeNotificationType::Purchased => {
                self.verify_and_confirm(tx, &order, purchase_token).await
            }
            OneTimeNotificationType::Canceled => {
                debug!(order_id = %order.id, sku, "One-time purchase cancelled");
                let outcome = self.ledger.cancel_in(tx, &order.id, PROVIDER_CANCELLED).await?;
                Ok(Disposition::from_outcome(&outcome, "cancel"))
            }
            OneTimeNotificationType::Unknown(_) => Err(unsupported(classified)),
        }
    }

    async fn subscription(
        &self,
        tx: &mut dyn LedgerTx,
        classified: &ClassifiedNotification,
        purchase_token: &str,
        subscription_id: &str,
        notification_type: SubscriptionNotificationType,
    ) -> Result<Disposition, WebhookError> {
        use SubscriptionNotificationType as T;

        if let T::Unknown(_) = notification_type {
            return Err(unsupported(classified));
        }

        let order = self
            .resolve(tx, classified, Reference::PurchaseToken(purchase_token))
            .await?;
        match notification_type {
            T::Purchased | T::Renewed | T::Recovered | T::Restarted => {
                self.verify_and_confirm(tx, &order, purchase_token).await
            }
            T::Canceled => {
                // The notification carries no reason; the subscription
                // resource does.
                let adapter = self.providers.get(order.provider)?;
                let verification = self
                    .confirmer
                    .verify(adapter.as_ref(), &order, Some(purchase_token.to_string()), None)
                    .await?;
                let mut leg = self.leg_for(tx, &order).await?;
                apply_verification(&mut leg, &verification, self.clock.now());
                leg.set_raw_status(notification_type.label(), self.clock.now());
                self.ledger.record_leg_in(tx, &leg).await?;

                let reason = verification
                    .subscription
                    .and_then(|s| s.cancel_reason)
                    .map_or(PROVIDER_CANCELLED, |r| r.as_str());
                let outcome = self.ledger.cancel_in(tx, &order.id, reason).await?;
                Ok(Disposition::from_outcome(&outcome, "cancel"))
            }
            T::Expired => {
                self.set_leg_state(tx, &order, &notification_type.label(), Some(SubscriptionState::Expired))
                    .await?;
                self.expire(tx, &order, PaymentStatus::Expired).await
            }
            T::Revoked => {
                let outcome = self.ledger.cancel_in(tx, &order.id, PROVIDER_REVOKED).await?;
                Ok(Disposition::from_outcome(&outcome, "cancel"))
            }
            T::InGracePeriod => {
                let now = self.clock.now();
                let mut leg = self.leg_for(tx, &order).await?;
                leg.grace_period_status = Some(GracePeriodStatus::InGracePeriod);
                leg.subscription_state = Some(SubscriptionState::InGracePeriod);
                leg.set_raw_status(notification_type.label(), now);
                self.ledger.record_leg_in(tx, &leg).await?;
                Ok(Disposition::applied(&order, "leg_update", false))
            }
            T::OnHold => {
                self.set_leg_state(tx, &order, &notification_type.label(), Some(SubscriptionState::OnHold))
                    .await?;
                Ok(Disposition::applied(&order, "leg_update", false))
            }
            T::Paused => {
                self.set_leg_state(tx, &order, &notification_type.label(), Some(SubscriptionState::Paused))
                    .await?;
                Ok(Disposition::applied(&order, "leg_update", false))
            }
            T::PriceChangeConfirmed
            | T::Deferred
            | T::PauseScheduleChanged
            | T::PendingPurchaseCanceled => {
                debug!(order_id = %order.id, subscription_id, "Informational subscription notification");
                self.set_leg_state(tx, &order, &notification_type.label(), None)
                    .await?;
                Ok(Disposition::applied(&order, "leg_update", false))
            }
            T::Unknown(_) => Err(unsupported(classified)),
        }
    }

    async fn verify_and_confirm(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        purchase_token: &str,
    ) -> Result<Disposition, WebhookError> {
        let adapter = self.providers.get(order.provider)?;
        let verification = self
            .confirmer
            .verify(adapter.as_ref(), order, Some(purchase_token.to_string()), None)
            .await?;
        let confirmation = self
            .confirmer
            .confirm_in(tx, order, adapter.as_ref(), verification)
            .await?;
        Ok(Disposition::from_confirmation(&confirmation))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // App Store
    // ════════════════════════════════════════════════════════════════════════════

    async fn apple(
        &self,
        tx: &mut dyn LedgerTx,
        classified: &ClassifiedNotification,
        info: &AppleTransactionInfo,
        renewal: Option<&AppleRenewalInfo>,
        notification_type: &AppleNotificationType,
        subtype: Option<&AppleSubtype>,
    ) -> Result<Disposition, WebhookError> {
        use AppleNotificationType as T;

        if let T::Unknown(_) = notification_type {
            return Err(unsupported(classified));
        }

        let order = self.resolve(tx, classified, Reference::Apple(info)).await?;
        let label = classified.event_type();
        let now = self.clock.now();

        match notification_type {
            T::Subscribed | T::DidRenew | T::OneTimeCharge | T::OfferRedeemed => {
                let adapter = self.providers.get(order.provider)?;
                let verification = apple_verification(info, renewal, &label);
                let confirmation = self
                    .confirmer
                    .confirm_in(tx, &order, adapter.as_ref(), verification)
                    .await?;
                Ok(Disposition::from_confirmation(&confirmation))
            }
            T::DidFailToRenew => {
                let mut leg = self.apple_leg(tx, &order, info, renewal, &label).await?;
                if subtype == Some(&AppleSubtype::GracePeriod) {
                    leg.grace_period_status = Some(GracePeriodStatus::InGracePeriod);
                    self.ledger.record_leg_in(tx, &leg).await?;
                    info!(order_id = %order.id, "Subscription entered grace period");
                    return Ok(Disposition::applied(&order, "leg_update", false));
                }

                leg.grace_period_status = Some(GracePeriodStatus::BillingRetry);
                self.ledger.record_leg_in(tx, &leg).await?;
                self.expire(tx, &order, PaymentStatus::Failed).await
            }
            T::Expired | T::GracePeriodExpired => {
                let mut leg = self.apple_leg(tx, &order, info, renewal, &label).await?;
                if *notification_type == T::GracePeriodExpired {
                    leg.grace_period_status = Some(GracePeriodStatus::GracePeriodExpired);
                }
                leg.subscription_state = Some(SubscriptionState::Expired);
                self.ledger.record_leg_in(tx, &leg).await?;
                self.expire(tx, &order, PaymentStatus::Expired).await
            }
            T::Refund => {
                let mut leg = self.leg_for(tx, &order).await?;
                leg.set_raw_status(label.as_str(), now);
                self.ledger.record_leg_in(tx, &leg).await?;
                let amount = info.amount().map(|m| m.amount());
                self.refund(tx, &order, None, amount, json!({ "transaction": info }))
                    .await
            }
            T::Revoke => {
                let outcome = self.ledger.cancel_in(tx, &order.id, PROVIDER_REVOKED).await?;
                Ok(Disposition::from_outcome(&outcome, "cancel"))
            }
            T::DidChangeRenewalStatus
            | T::DidChangeRenewalPref
            | T::RefundDeclined
            | T::RefundReversed
            | T::PriceIncrease
            | T::RenewalExtended
            | T::RenewalExtension
            | T::ConsumptionRequest
            | T::Test => {
                let leg = self.apple_leg(tx, &order, info, renewal, &label).await?;
                self.ledger.record_leg_in(tx, &leg).await?;
                Ok(Disposition::applied(&order, "leg_update", false))
            }
            T::Unknown(_) => Err(unsupported(classified)),
        }
    }

    /// Leg refreshed from the signed transaction and renewal info.
    async fn apple_leg(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        info: &AppleTransactionInfo,
        renewal: Option<&AppleRenewalInfo>,
        label: &str,
    ) -> Result<PaymentLeg, WebhookError> {
        let now = self.clock.now();
        let mut leg = self.leg_for(tx, order).await?;
        leg.provider_transaction_id = Some(info.transaction_id.clone());
        leg.original_transaction_id = Some(info.original_transaction_id.clone());
        if info.product_id.is_some() {
            leg.product_id = info.product_id.clone();
        }
        if info.expires_date.is_some() || renewal.is_some() {
            leg.apply_snapshot(&apple_snapshot(info, renewal), now);
        }
        leg.set_raw_status(label, now);
        Ok(leg)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Alipay / WeChat Pay
    // ════════════════════════════════════════════════════════════════════════════

    async fn trade(
        &self,
        tx: &mut dyn LedgerTx,
        classified: &ClassifiedNotification,
        trade: &TradeNotification,
    ) -> Result<Disposition, WebhookError> {
        if let TradeStatus::Unknown(_) = trade.status {
            return Err(unsupported(classified));
        }

        let order = self.resolve(tx, classified, Reference::Trade(trade)).await?;
        let now = self.clock.now();
        let mut leg = self.leg_for(tx, &order).await?;
        if trade.trade_no.is_some() {
            leg.provider_transaction_id = trade.trade_no.clone();
        }
        leg.set_raw_status(trade.raw_status.as_str(), now);
        self.ledger.record_leg_in(tx, &leg).await?;

        let refund_amount = match &trade.refund_amount {
            Some(amount) => Some(to_minor(amount, &order)?),
            None => None,
        };

        match &trade.status {
            TradeStatus::Success | TradeStatus::Finished => {
                let transaction_id = trade
                    .trade_no
                    .clone()
                    .unwrap_or_else(|| trade.out_trade_no.clone());
                let mut payment = PaymentRecord::new(transaction_id, trade_data(trade));
                if let Some(total) = &trade.total_amount {
                    let minor = to_minor(total, &order)?;
                    payment = payment.with_amount(
                        Money::new(minor, order.amount.currency().clone()).map_err(OrderError::from)?,
                    );
                }
                let outcome = self.ledger.mark_paid_in(tx, &order.id, payment, None).await?;
                Ok(Disposition::from_outcome(&outcome, "payment"))
            }
            TradeStatus::Refunded => {
                self.refund(tx, &order, trade.refund_id.clone(), refund_amount, trade_data(trade))
                    .await
            }
            TradeStatus::Closed
                if refund_amount.is_some()
                    && matches!(order.status, OrderStatus::Paid | OrderStatus::Refunded) =>
            {
                self.refund(tx, &order, trade.refund_id.clone(), refund_amount, trade_data(trade))
                    .await
            }
            TradeStatus::Closed => {
                let outcome = self.ledger.cancel_in(tx, &order.id, PROVIDER_CLOSED).await?;
                Ok(Disposition::from_outcome(&outcome, "cancel"))
            }
            TradeStatus::WaitBuyerPay | TradeStatus::PayError => {
                Ok(Disposition::applied(&order, "leg_update", false))
            }
            TradeStatus::Unknown(_) => Err(unsupported(classified)),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Shared steps
    // ════════════════════════════════════════════════════════════════════════════

    /// Provider-reported refund. An order that is already refunded is left
    /// alone whatever refund id the provider reports.
    async fn refund(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        refund_id: Option<String>,
        amount: Option<i64>,
        provider_data: Value,
    ) -> Result<Disposition, WebhookError> {
        if order.status == OrderStatus::Refunded {
            debug!(order_id = %order.id, "Refund already booked");
            return Ok(Disposition::applied(order, "refund", false));
        }

        let full = order.amount.amount();
        let amount = match amount {
            Some(reported) if reported <= 0 || reported > full => {
                return Err(OrderError::AmountMismatch {
                    expected: full,
                    actual: reported,
                }
                .into());
            }
            Some(reported) => reported,
            None => full,
        };
        let record = RefundRecord {
            refund_id: refund_id.unwrap_or_else(|| refund_id_for(&order.order_number)),
            amount,
            reason: Some("provider-refund".to_string()),
            provider_data,
        };
        let outcome = self.ledger.refund_in(tx, &order.id, record).await?;
        Ok(Disposition::from_outcome(&outcome, "refund"))
    }

    /// Lapse of a subscription. A cancelled or refunded order keeps its
    /// status; the leg written by the caller is all that changes.
    async fn expire(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        payment_status: PaymentStatus,
    ) -> Result<Disposition, WebhookError> {
        if order.is_terminal() {
            debug!(order_id = %order.id, status = %order.status, "Expiry after terminal status");
            return Ok(Disposition::applied(order, "expire", false));
        }
        let outcome = self.ledger.expire_in(tx, &order.id, payment_status).await?;
        Ok(Disposition::from_outcome(&outcome, "expire"))
    }

    async fn leg_for(&self, tx: &mut dyn LedgerTx, order: &Order) -> Result<PaymentLeg, WebhookError> {
        Ok(match tx.find_payment_leg(&order.id).await? {
            Some(leg) => leg,
            None => PaymentLeg::new(order.id, order.provider, "", self.clock.now()),
        })
    }

    async fn set_leg_state(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        raw_status: &str,
        state: Option<SubscriptionState>,
    ) -> Result<(), WebhookError> {
        let mut leg = self.leg_for(tx, order).await?;
        if state.is_some() {
            leg.subscription_state = state;
        }
        leg.set_raw_status(raw_status, self.clock.now());
        self.ledger.record_leg_in(tx, &leg).await?;
        Ok(())
    }

    /// Finds and locks the order a notification refers to.
    async fn resolve(
        &self,
        tx: &mut dyn LedgerTx,
        classified: &ClassifiedNotification,
        reference: Reference<'_>,
    ) -> Result<Order, WebhookError> {
        let provider = classified.provider;

        // 1. Explicit reference
        let explicit = match &reference {
            Reference::Apple(info) => match info
                .app_account_token
                .as_deref()
                .and_then(|token| token.parse::<OrderId>().ok())
            {
                Some(order_id) => tx.lock_order(&order_id).await?,
                None => None,
            },
            Reference::Trade(trade) => match OrderNumber::new(trade.out_trade_no.as_str()) {
                Ok(number) => tx.lock_order_by_number(&number).await?,
                Err(_) => None,
            },
            Reference::PurchaseToken(_) => None,
        };
        if let Some(order) = explicit {
            return self.check_provider(order, classified);
        }

        // 2. Leg by token or transaction id
        let leg = match &reference {
            Reference::PurchaseToken(token) => {
                tx.find_leg_by_purchase_token(provider, token).await?
            }
            Reference::Apple(info) => {
                tx.find_leg_by_transaction_id(provider, &info.transaction_id)
                    .await?
            }
            Reference::Trade(trade) => match &trade.trade_no {
                Some(trade_no) => tx.find_leg_by_transaction_id(provider, trade_no).await?,
                None => None,
            },
        };

        // 3. Subscription lineage
        let leg = match (leg, &reference) {
            (Some(leg), _) => Some(leg),
            (None, Reference::Apple(info)) => {
                let earliest = tx
                    .find_earliest_leg_by_original_transaction(provider, &info.original_transaction_id)
                    .await?;
                if let Some(leg) = &earliest {
                    warn!(
                        event_id = %classified.event_id,
                        transaction_id = %info.transaction_id,
                        original_transaction_id = %info.original_transaction_id,
                        order_id = %leg.order_id,
                        "Order resolved through original transaction id"
                    );
                }
                earliest
            }
            (None, _) => None,
        };

        let order = match leg {
            Some(leg) => tx.lock_order(&leg.order_id).await?,
            None => None,
        };
        match order {
            Some(order) => self.check_provider(order, classified),
            None => {
                warn!(
                    event_id = %classified.event_id,
                    provider = %provider,
                    event_type = %classified.event_type(),
                    "No order matches notification"
                );
                Err(WebhookError::OrderNotFound(format!(
                    "no order for {} event {}",
                    provider, classified.event_id
                )))
            }
        }
    }

    fn check_provider(
        &self,
        order: Order,
        classified: &ClassifiedNotification,
    ) -> Result<Order, WebhookError> {
        if order.provider != classified.provider {
            warn!(
                order_id = %order.id,
                order_provider = %order.provider,
                provider = %classified.provider,
                "Notification references an order of another provider"
            );
            return Err(WebhookError::OrderNotFound(format!(
                "order {} does not belong to {}",
                order.order_number, classified.provider
            )));
        }
        Ok(order)
    }
}

enum Reference<'a> {
    PurchaseToken(&'a str),
    Apple(&'a AppleTransactionInfo),
    Trade(&'a TradeNotification),
}

fn unsupported(classified: &ClassifiedNotification) -> WebhookError {
    WebhookError::UnsupportedNotificationType(format!(
        "{} {}",
        classified.provider,
        classified.event_type()
    ))
}

fn to_minor(amount: &TradeAmount, order: &Order) -> Result<i64, WebhookError> {
    Ok(amount
        .to_minor(order.amount.currency())
        .map_err(OrderError::from)?)
}

fn trade_data(trade: &TradeNotification) -> Value {
    serde_json::to_value(trade).unwrap_or_default()
}

fn apple_snapshot(info: &AppleTransactionInfo, renewal: Option<&AppleRenewalInfo>) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        auto_renewing: renewal.map_or(false, AppleRenewalInfo::auto_renewing),
        expiry_time: info.expires_at(),
        cancel_reason: renewal
            .and_then(|r| r.expiration_intent)
            .map(CancelReason::from_apple_intent),
        grace_period_expiry: renewal.and_then(AppleRenewalInfo::grace_period_expires_at),
        payment_state: None,
    }
}

/// Signed App Store payloads stand in for a verification call.
fn apple_verification(
    info: &AppleTransactionInfo,
    renewal: Option<&AppleRenewalInfo>,
    label: &str,
) -> VerificationResult {
    VerificationResult {
        transaction_id: info.transaction_id.clone(),
        original_transaction_id: Some(info.original_transaction_id.clone()),
        purchase_token: None,
        product_id: info.product_id.clone(),
        purchase_state: PurchaseState::Purchased,
        acknowledged: true,
        amount: info.amount(),
        subscription: info
            .expires_date
            .map(|_| apple_snapshot(info, renewal)),
        raw_status: label.to_string(),
        raw: serde_json::to_value(info).unwrap_or_default(),
    }
}
