//! Order aggregate.
//!
//! One order per purchase or subscription intent. The ledger is the only
//! writer; every mutation here validates the transition and stamps
//! `updated_at` with the caller's clock.
//!
//! # Invariants
//!
//! - `paid`/`completed` implies `paid_at` is set
//! - `refunded` implies `refund_at` and `refund_amount` are set
//! - `cancelled` and `refunded` are terminal

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    Money, OrderId, OrderNumber, ProductId, Provider, StateMachine, Timestamp, UserId,
    ValidationError,
};

use super::{OrderError, OrderStatus, PaymentStatus};

/// What the order buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Purchase,
    Subscription,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Purchase => "purchase",
            OrderKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(OrderKind::Purchase),
            "subscription" => Ok(OrderKind::Subscription),
            other => Err(ValidationError::invalid_format(
                "kind",
                format!("unknown order kind '{}'", other),
            )),
        }
    }
}

/// Caller-supplied fields for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub provider: Provider,
    pub kind: OrderKind,
    pub amount: Money,
    pub developer_payload: Option<String>,
}

/// Order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,

    /// Provider-facing trade reference.
    pub order_number: OrderNumber,

    pub user_id: UserId,
    pub product_id: ProductId,
    pub provider: Provider,
    pub kind: OrderKind,
    pub amount: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<Timestamp>,

    /// Payment deadline while `created`; end of the paid period once a
    /// subscription is active.
    pub expired_at: Option<Timestamp>,

    pub refund_at: Option<Timestamp>,
    pub refund_amount: Option<i64>,
    pub cancel_reason: Option<String>,
    pub developer_payload: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    /// Creates an order awaiting payment until `payment_deadline`.
    pub fn create(
        id: OrderId,
        order_number: OrderNumber,
        new_order: NewOrder,
        payment_deadline: Timestamp,
        now: Timestamp,
    ) -> Result<Self, OrderError> {
        if new_order.amount.amount() <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, new_order.amount.amount()).into());
        }
        Ok(Self {
            id,
            order_number,
            user_id: new_order.user_id,
            product_id: new_order.product_id,
            provider: new_order.provider,
            kind: new_order.kind,
            amount: new_order.amount,
            status: OrderStatus::Created,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
            expired_at: Some(payment_deadline),
            refund_at: None,
            refund_amount: None,
            cancel_reason: None,
            developer_payload: new_order.developer_payload,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Records the first successful payment.
    pub fn mark_paid(&mut self, period_end: Option<Timestamp>, now: Timestamp) -> Result<(), OrderError> {
        if self.status != OrderStatus::Created {
            return Err(OrderError::illegal(self.id, self.status, "mark paid"));
        }
        self.move_to(OrderStatus::Paid, PaymentStatus::Completed, "mark paid")?;
        self.paid_at = Some(now);
        // The unpaid deadline no longer applies once money arrived.
        self.expired_at = period_end;
        self.updated_at = now;
        Ok(())
    }

    /// Extends a paid or lapsed subscription to `period_end`.
    pub fn renew(&mut self, period_end: Timestamp, now: Timestamp) -> Result<(), OrderError> {
        if self.kind != OrderKind::Subscription
            || !matches!(self.status, OrderStatus::Paid | OrderStatus::Expired)
        {
            return Err(OrderError::illegal(self.id, self.status, "renew"));
        }
        self.move_to(OrderStatus::Paid, PaymentStatus::Completed, "renew")?;
        if self.paid_at.is_none() {
            self.paid_at = Some(now);
        }
        self.expired_at = Some(period_end);
        self.updated_at = now;
        Ok(())
    }

    /// Cancels the order. Legal from `created` and `paid`.
    pub fn cancel(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Created | OrderStatus::Paid) {
            return Err(OrderError::illegal(self.id, self.status, "cancel"));
        }
        self.move_to(OrderStatus::Cancelled, PaymentStatus::Cancelled, "cancel")?;
        self.cancel_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    /// Refunds `amount` minor units. Legal only from `paid`.
    pub fn refund(&mut self, amount: i64, now: Timestamp) -> Result<(), OrderError> {
        if self.status != OrderStatus::Paid {
            return Err(OrderError::illegal(self.id, self.status, "refund"));
        }
        if amount <= 0 || amount > self.amount.amount() {
            return Err(ValidationError::out_of_range("refund_amount", 1, self.amount.amount(), amount).into());
        }
        self.move_to(OrderStatus::Refunded, PaymentStatus::Refunded, "refund")?;
        self.refund_at = Some(now);
        self.refund_amount = Some(amount);
        self.updated_at = now;
        Ok(())
    }

    /// Expires an unpaid order or a lapsed subscription.
    ///
    /// `payment_status` is `Expired` for a plain lapse and `Failed` when a
    /// renewal charge failed.
    pub fn expire(&mut self, payment_status: PaymentStatus, now: Timestamp) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Created | OrderStatus::Paid) {
            return Err(OrderError::illegal(self.id, self.status, "expire"));
        }
        if !matches!(payment_status, PaymentStatus::Expired | PaymentStatus::Failed) {
            return Err(ValidationError::invalid_format(
                "payment_status",
                "expiry records either expired or failed",
            )
            .into());
        }
        self.move_to(OrderStatus::Expired, payment_status, "expire")?;
        self.updated_at = now;
        Ok(())
    }

    /// True when a `created` order has passed its payment deadline.
    pub fn is_payment_overdue(&self, now: Timestamp) -> bool {
        self.status == OrderStatus::Created
            && self.expired_at.map(|deadline| now >= deadline).unwrap_or(false)
    }

    /// Checks the cross-field invariants. Used by stores before writing.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        if (self.status == OrderStatus::Paid || self.payment_status == PaymentStatus::Completed)
            && self.paid_at.is_none()
        {
            return Err(ValidationError::invalid_format("paid_at", "paid order without paid_at"));
        }
        if self.status == OrderStatus::Refunded
            && (self.refund_at.is_none() || self.refund_amount.is_none())
        {
            return Err(ValidationError::invalid_format(
                "refund_at",
                "refunded order without refund timestamp or amount",
            ));
        }
        Ok(())
    }

    fn move_to(
        &mut self,
        status: OrderStatus,
        payment_status: PaymentStatus,
        attempted: &'static str,
    ) -> Result<(), OrderError> {
        let next_status = self
            .status
            .transition_to(status)
            .map_err(|_| OrderError::illegal(self.id, self.status, attempted))?;
        let next_payment = self
            .payment_status
            .transition_to(payment_status)
            .map_err(|_| OrderError::illegal(self.id, self.status, attempted))?;
        self.status = next_status;
        self.payment_status = next_payment;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Currency;

    fn now() -> Timestamp {
        Timestamp::from_unix_millis(1_750_000_000_000).unwrap()
    }

    fn order(kind: OrderKind) -> Order {
        Order::create(
            OrderId::new(),
            OrderNumber::new("20250615000000abcd").unwrap(),
            NewOrder {
                user_id: UserId::new("user-1").unwrap(),
                product_id: ProductId::new("gold_monthly").unwrap(),
                provider: Provider::GooglePlay,
                kind,
                amount: Money::new(2999, Currency::new("CNY").unwrap()).unwrap(),
                developer_payload: None,
            },
            now().plus_minutes(30),
            now(),
        )
        .unwrap()
    }

    fn paid(kind: OrderKind) -> Order {
        let mut o = order(kind);
        o.mark_paid(None, now()).unwrap();
        o
    }

    // ══════════════════════════════════════════════════════════════
    // Creation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn create_starts_created_and_pending_with_deadline() {
        let o = order(OrderKind::Purchase);
        assert_eq!(o.status, OrderStatus::Created);
        assert_eq!(o.payment_status, PaymentStatus::Pending);
        assert_eq!(o.expired_at, Some(now().plus_minutes(30)));
        assert!(o.check_invariants().is_ok());
    }

    #[test]
    fn create_rejects_zero_amount() {
        let result = Order::create(
            OrderId::new(),
            OrderNumber::new("n1").unwrap(),
            NewOrder {
                user_id: UserId::new("u").unwrap(),
                product_id: ProductId::new("p").unwrap(),
                provider: Provider::Alipay,
                kind: OrderKind::Purchase,
                amount: Money::new(0, Currency::new("CNY").unwrap()).unwrap(),
                developer_payload: None,
            },
            now(),
            now(),
        );
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    // ══════════════════════════════════════════════════════════════
    // Transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn mark_paid_sets_paid_completed_and_paid_at() {
        let o = paid(OrderKind::Purchase);
        assert_eq!(o.status, OrderStatus::Paid);
        assert_eq!(o.payment_status, PaymentStatus::Completed);
        assert_eq!(o.paid_at, Some(now()));
        assert!(o.check_invariants().is_ok());
    }

    #[test]
    fn mark_paid_twice_is_illegal() {
        let mut o = paid(OrderKind::Purchase);
        let err = o.mark_paid(None, now()).unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));
    }

    #[test]
    fn refund_only_from_paid() {
        let mut o = order(OrderKind::Purchase);
        assert!(matches!(
            o.refund(100, now()),
            Err(OrderError::IllegalTransition { .. })
        ));

        let mut o = paid(OrderKind::Purchase);
        o.refund(2999, now()).unwrap();
        assert_eq!(o.status, OrderStatus::Refunded);
        assert_eq!(o.payment_status, PaymentStatus::Refunded);
        assert_eq!(o.refund_amount, Some(2999));
        assert!(o.check_invariants().is_ok());
    }

    #[test]
    fn refund_rejects_amount_above_order_total() {
        let mut o = paid(OrderKind::Purchase);
        assert!(matches!(o.refund(3000, now()), Err(OrderError::Validation(_))));
        assert_eq!(o.status, OrderStatus::Paid);
    }

    #[test]
    fn cancel_from_created_and_paid() {
        let mut o = order(OrderKind::Purchase);
        o.cancel("user", now()).unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.cancel_reason.as_deref(), Some("user"));

        let mut o = paid(OrderKind::Purchase);
        o.cancel("provider-cancelled", now()).unwrap();
        assert_eq!(o.payment_status, PaymentStatus::Cancelled);
    }

    #[test]
    fn terminal_orders_reject_every_mutation() {
        let mut cancelled = order(OrderKind::Subscription);
        cancelled.cancel("user", now()).unwrap();
        let mut refunded = paid(OrderKind::Subscription);
        refunded.refund(1, now()).unwrap();

        for o in [&mut cancelled, &mut refunded] {
            let before = o.clone();
            assert!(o.mark_paid(None, now()).is_err());
            assert!(o.renew(now().plus_days(30), now()).is_err());
            assert!(o.cancel("again", now()).is_err());
            assert!(o.refund(1, now()).is_err());
            assert!(o.expire(PaymentStatus::Expired, now()).is_err());
            assert_eq!(*o, before);
        }
    }

    #[test]
    fn renew_extends_paid_subscription() {
        let mut o = paid(OrderKind::Subscription);
        o.renew(now().plus_days(30), now()).unwrap();
        assert_eq!(o.status, OrderStatus::Paid);
        assert_eq!(o.expired_at, Some(now().plus_days(30)));
    }

    #[test]
    fn renew_recovers_expired_subscription() {
        let mut o = paid(OrderKind::Subscription);
        o.expire(PaymentStatus::Failed, now()).unwrap();
        o.renew(now().plus_days(30), now()).unwrap();
        assert_eq!(o.status, OrderStatus::Paid);
        assert_eq!(o.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn renew_rejects_one_time_purchase() {
        let mut o = paid(OrderKind::Purchase);
        assert!(o.renew(now().plus_days(30), now()).is_err());
    }

    #[test]
    fn expire_with_failed_payment() {
        let mut o = paid(OrderKind::Subscription);
        o.expire(PaymentStatus::Failed, now()).unwrap();
        assert_eq!(o.status, OrderStatus::Expired);
        assert_eq!(o.payment_status, PaymentStatus::Failed);
        assert!(!o.is_terminal());
    }

    #[test]
    fn expire_rejects_non_expiry_payment_status() {
        let mut o = paid(OrderKind::Subscription);
        assert!(o.expire(PaymentStatus::Refunded, now()).is_err());
    }

    #[test]
    fn payment_overdue_only_for_created_orders_past_deadline() {
        let o = order(OrderKind::Purchase);
        assert!(!o.is_payment_overdue(now()));
        assert!(o.is_payment_overdue(now().plus_minutes(30)));
        assert!(!paid(OrderKind::Purchase).is_payment_overdue(now().plus_days(1)));
    }

    #[test]
    fn order_kind_parses() {
        assert_eq!("subscription".parse::<OrderKind>().unwrap(), OrderKind::Subscription);
        assert!("gift".parse::<OrderKind>().is_err());
    }
}
