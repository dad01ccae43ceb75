//! PaymentConfirmer - books a verified purchase against its order.
//!
//! Shared by the synchronous process-payment path and the webhook
//! dispatcher, so both sources converge on the same ledger call and the same
//! acknowledgment rule: acknowledge once, only after a change was booked,
//! and never when the provider already reports the purchase acknowledged.
//!
//! For subscriptions the derived state decides whether anything is booked:
//! only a state that grants access (active, in grace, cancelled but not yet
//! lapsed) turns into a payment. Pending, on-hold, paused and expired
//! subscriptions only refresh the payment leg.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::foundation::Timestamp;
use crate::domain::order::{Order, OrderError, OrderKind, OrderStatus, PaymentLeg};
use crate::domain::subscription::SubscriptionState;
use crate::ports::{
    AcknowledgeRequest, Clock, LedgerTx, PaymentProvider, VerificationRequest, VerificationResult,
};

use super::ledger::{LedgerOutcome, OrderLedger, PaymentRecord};
use super::provider_call::with_deadline;

/// What confirming a purchase did.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub outcome: LedgerOutcome,
    pub transaction_id: String,

    /// Leg as written (or as found, when nothing changed).
    pub leg: PaymentLeg,

    /// True if this call acknowledged the purchase at the provider.
    pub acknowledged_now: bool,

    /// Subscription state that kept the payment from being booked.
    pub deferred: Option<SubscriptionState>,
}

impl Confirmation {
    pub fn is_booked(&self) -> bool {
        self.deferred.is_none()
    }
}

pub struct PaymentConfirmer {
    ledger: Arc<OrderLedger>,
    clock: Arc<dyn Clock>,
    provider_timeout: Duration,
}

impl PaymentConfirmer {
    pub fn new(ledger: Arc<OrderLedger>, clock: Arc<dyn Clock>, provider_timeout: Duration) -> Self {
        Self {
            ledger,
            clock,
            provider_timeout,
        }
    }

    pub fn ledger(&self) -> &Arc<OrderLedger> {
        &self.ledger
    }

    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    /// Looks the purchase up at the provider under the configured deadline.
    pub async fn verify(
        &self,
        adapter: &dyn PaymentProvider,
        order: &Order,
        purchase_token: Option<String>,
        transaction_id: Option<String>,
    ) -> Result<VerificationResult, OrderError> {
        let request = VerificationRequest {
            provider: order.provider,
            order_id: order.id,
            order_number: order.order_number.clone(),
            product_id: order.product_id.to_string(),
            kind: order.kind,
            purchase_token,
            transaction_id,
        };
        let result = with_deadline(
            order.provider,
            "verify",
            self.provider_timeout,
            adapter.verify(request),
        )
        .await?;
        Ok(result)
    }

    /// Books `verification` on the locked `order` inside `tx`.
    pub async fn confirm_in(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        adapter: &dyn PaymentProvider,
        verification: VerificationResult,
    ) -> Result<Confirmation, OrderError> {
        if !verification.is_purchased() {
            return Err(OrderError::PaymentNotCompleted(format!(
                "provider reports '{}'",
                verification.raw_status
            )));
        }

        let now = self.clock.now();
        let mut leg = match tx.find_payment_leg(&order.id).await? {
            Some(leg) => leg,
            None => PaymentLeg::new(order.id, order.provider, &verification.raw_status, now),
        };
        apply_verification(&mut leg, &verification, now);
        let transaction_id = verification.transaction_id.clone();

        if let Some(state) = billable_state(&leg, &verification) {
            if !state.grants_access() {
                info!(
                    order_id = %order.id,
                    subscription_state = state.as_str(),
                    "Subscription not billable, payment leg updated only"
                );
                self.ledger.record_leg_in(tx, &leg).await?;
                return Ok(Confirmation {
                    outcome: LedgerOutcome::Unchanged(order.clone()),
                    transaction_id,
                    leg,
                    acknowledged_now: false,
                    deferred: Some(state),
                });
            }
        }

        let period_end = verification.subscription.as_ref().and_then(|s| s.expiry_time);
        let mut payment = PaymentRecord::new(&verification.transaction_id, verification.raw.clone());
        if let Some(amount) = verification.amount.clone() {
            payment = payment.with_amount(amount);
        }

        let outcome = match (order.kind, order.status, period_end) {
            (_, OrderStatus::Created, _) => {
                self.ledger
                    .mark_paid_in(tx, &order.id, payment, period_end)
                    .await?
            }
            (OrderKind::Subscription, OrderStatus::Paid | OrderStatus::Expired, Some(end)) => {
                self.ledger.renew_in(tx, &order.id, payment, end).await?
            }
            // Replays resolve to Unchanged; anything else is an illegal transition.
            _ => self.ledger.mark_paid_in(tx, &order.id, payment, None).await?,
        };

        if !outcome.is_changed() {
            debug!(order_id = %order.id, transaction_id = %transaction_id, "Payment already booked");
            return Ok(Confirmation {
                outcome,
                transaction_id,
                leg,
                acknowledged_now: false,
                deferred: None,
            });
        }

        let mut acknowledged_now = false;
        if adapter.capabilities().acknowledge && !leg.acknowledged {
            if let Some(token) = leg.purchase_token.clone() {
                let request = AcknowledgeRequest {
                    provider: order.provider,
                    product_id: leg
                        .product_id
                        .clone()
                        .unwrap_or_else(|| order.product_id.to_string()),
                    purchase_token: token,
                    kind: order.kind,
                    developer_payload: order.developer_payload.clone(),
                };
                with_deadline(
                    order.provider,
                    "acknowledge",
                    self.provider_timeout,
                    adapter.acknowledge(request),
                )
                .await?;
                leg.mark_acknowledged(now);
                acknowledged_now = true;
                info!(order_id = %order.id, "Purchase acknowledged");
            }
        }

        self.ledger.record_leg_in(tx, &leg).await?;

        Ok(Confirmation {
            outcome,
            transaction_id,
            leg,
            acknowledged_now,
            deferred: None,
        })
    }
}

/// State derived from this verification's subscription snapshot, if any.
fn billable_state(leg: &PaymentLeg, verification: &VerificationResult) -> Option<SubscriptionState> {
    verification.subscription.as_ref().and(leg.subscription_state)
}

/// Copies provider-reported fields onto the leg.
pub fn apply_verification(leg: &mut PaymentLeg, verification: &VerificationResult, now: Timestamp) {
    if verification.purchase_token.is_some() {
        leg.purchase_token = verification.purchase_token.clone();
    }
    leg.provider_transaction_id = Some(verification.transaction_id.clone());
    if verification.original_transaction_id.is_some() {
        leg.original_transaction_id = verification.original_transaction_id.clone();
    }
    if verification.product_id.is_some() {
        leg.product_id = verification.product_id.clone();
    }
    if verification.acknowledged {
        leg.acknowledged = true;
    }
    leg.set_raw_status(&verification.raw_status, now);
    if let Some(snapshot) = &verification.subscription {
        leg.apply_snapshot(snapshot, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{OrderId, Provider};
    use crate::domain::subscription::{SubscriptionSnapshot, SubscriptionState};
    use crate::ports::PurchaseState;
    use serde_json::json;

    fn verification() -> VerificationResult {
        VerificationResult {
            transaction_id: "GPA.3345".into(),
            original_transaction_id: Some("GPA.3345".into()),
            purchase_token: Some("T1".into()),
            product_id: Some("vip_month".into()),
            purchase_state: PurchaseState::Purchased,
            acknowledged: false,
            amount: None,
            subscription: None,
            raw_status: "PURCHASED".into(),
            raw: json!({}),
        }
    }

    #[test]
    fn apply_verification_copies_identifiers() {
        let now = Timestamp::now();
        let mut leg = PaymentLeg::new(OrderId::new(), Provider::GooglePlay, "NEW", now);
        apply_verification(&mut leg, &verification(), now);

        assert_eq!(leg.purchase_token.as_deref(), Some("T1"));
        assert_eq!(leg.provider_transaction_id.as_deref(), Some("GPA.3345"));
        assert_eq!(leg.raw_status, "PURCHASED");
        assert!(leg.subscription_state.is_none());
    }

    #[test]
    fn apply_verification_derives_subscription_state() {
        let now = Timestamp::now();
        let mut leg = PaymentLeg::new(OrderId::new(), Provider::GooglePlay, "NEW", now);
        let mut result = verification();
        result.acknowledged = true;
        result.subscription = Some(SubscriptionSnapshot {
            auto_renewing: true,
            expiry_time: Some(now.plus_days(30)),
            ..SubscriptionSnapshot::default()
        });
        apply_verification(&mut leg, &result, now);

        assert!(leg.acknowledged);
        assert_eq!(leg.subscription_state, Some(SubscriptionState::Active));
        assert_eq!(leg.auto_renewing, Some(true));
    }
}
