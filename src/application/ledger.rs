//! OrderLedger - the single writer of orders, payment legs and transactions.
//!
//! Every operation locks the order row first and runs inside a `LedgerTx`.
//! The `*_in` variants join a caller's transaction (the webhook processor
//! and the payment handler use them so the dedup record or verification
//! outcome commits together with the order change); the plain variants open
//! and commit their own.
//!
//! Repeating a call that already took effect (same transaction id, same
//! refund id, already cancelled, already expired) returns
//! `LedgerOutcome::Unchanged` instead of an error.

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::foundation::{Money, OrderId, Timestamp};
use crate::domain::order::{
    NewOrder, Order, OrderError, OrderStatus, PaymentLeg, PaymentStatus, PaymentTransaction,
    TransactionKind,
};
use crate::ports::{Clock, IdGenerator, LedgerStore, LedgerTx, SaveResult};

/// Raw status of a wallet leg before the buyer pays.
pub const AWAITING_PAYMENT: &str = "WAIT_BUYER_PAY";

/// Result of a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The order changed and the change was written.
    Changed(Order),

    /// The operation had already taken effect; nothing was written.
    Unchanged(Order),
}

impl LedgerOutcome {
    pub fn order(&self) -> &Order {
        match self {
            LedgerOutcome::Changed(order) | LedgerOutcome::Unchanged(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            LedgerOutcome::Changed(order) | LedgerOutcome::Unchanged(order) => order,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, LedgerOutcome::Changed(_))
    }
}

/// A confirmed provider payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    /// Provider transaction id; unique across all orders.
    pub transaction_id: String,

    /// Amount the provider reported. Checked against the order on first
    /// payment; `None` books the order amount.
    pub amount: Option<Money>,

    pub provider_data: Value,
}

impl PaymentRecord {
    pub fn new(transaction_id: impl Into<String>, provider_data: Value) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            amount: None,
            provider_data,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// A refund, issued by us or reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundRecord {
    pub refund_id: String,

    /// Minor units, in the order's currency.
    pub amount: i64,

    pub reason: Option<String>,
    pub provider_data: Value,
}

/// Writes orders, payment legs and transactions.
pub struct OrderLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    order_expiry: Duration,
}

impl OrderLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        order_expiry: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            order_expiry,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Self-committing operations
    // ════════════════════════════════════════════════════════════════════════════

    pub async fn create_order(&self, new_order: NewOrder) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.create_order_in(tx.as_mut(), new_order).await;
        finish(tx, result).await
    }

    pub async fn mark_paid(
        &self,
        order_id: &OrderId,
        payment: PaymentRecord,
        period_end: Option<Timestamp>,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.mark_paid_in(tx.as_mut(), order_id, payment, period_end).await;
        finish(tx, result).await
    }

    pub async fn renew(
        &self,
        order_id: &OrderId,
        payment: PaymentRecord,
        period_end: Timestamp,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.renew_in(tx.as_mut(), order_id, payment, period_end).await;
        finish(tx, result).await
    }

    pub async fn cancel(&self, order_id: &OrderId, reason: &str) -> Result<LedgerOutcome, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.cancel_in(tx.as_mut(), order_id, reason).await;
        finish(tx, result).await
    }

    pub async fn refund(
        &self,
        order_id: &OrderId,
        refund: RefundRecord,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.refund_in(tx.as_mut(), order_id, refund).await;
        finish(tx, result).await
    }

    pub async fn expire(
        &self,
        order_id: &OrderId,
        payment_status: PaymentStatus,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.expire_in(tx.as_mut(), order_id, payment_status).await;
        finish(tx, result).await
    }

    pub async fn record_leg(&self, leg: &PaymentLeg) -> Result<(), OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.record_leg_in(tx.as_mut(), leg).await;
        finish(tx, result).await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Operations joining a caller's transaction
    // ════════════════════════════════════════════════════════════════════════════

    /// Creates an order awaiting payment. Wallet orders get their payment
    /// leg immediately, since the trade is opened server-side.
    pub async fn create_order_in(
        &self,
        tx: &mut dyn LedgerTx,
        new_order: NewOrder,
    ) -> Result<Order, OrderError> {
        let now = self.clock.now();
        let number = self.ids.order_number(now)?;
        let order = Order::create(
            self.ids.order_id(),
            number,
            new_order,
            now.plus(self.order_expiry),
            now,
        )?;
        tx.insert_order(&order).await?;

        if order.provider.is_server_initiated() {
            let leg = PaymentLeg::new(order.id, order.provider, AWAITING_PAYMENT, now);
            tx.upsert_payment_leg(&leg).await?;
        }

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            provider = %order.provider,
            amount = order.amount.amount(),
            "Order created"
        );
        Ok(order)
    }

    /// First payment. Legal only from `created`.
    pub async fn mark_paid_in(
        &self,
        tx: &mut dyn LedgerTx,
        order_id: &OrderId,
        payment: PaymentRecord,
        period_end: Option<Timestamp>,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut order = lock(tx, order_id).await?;
        if let Some(outcome) = replayed_payment(tx, &order, &payment.transaction_id).await? {
            return Ok(outcome);
        }

        let amount = match payment.amount {
            Some(reported) => {
                if reported != order.amount {
                    return Err(OrderError::AmountMismatch {
                        expected: order.amount.amount(),
                        actual: reported.amount(),
                    });
                }
                reported
            }
            None => order.amount.clone(),
        };

        let now = self.clock.now();
        order.mark_paid(period_end, now)?;
        tx.update_order(&order).await?;
        let transaction = PaymentTransaction::payment(
            order.id,
            payment.transaction_id,
            amount,
            payment.provider_data,
            now,
        );
        insert_transaction(tx, &order, &transaction).await?;

        info!(
            order_id = %order.id,
            transaction_id = %transaction.transaction_id,
            "Order paid"
        );
        Ok(LedgerOutcome::Changed(order))
    }

    /// Subscription renewal or recovery. Legal from `paid` and `expired`.
    pub async fn renew_in(
        &self,
        tx: &mut dyn LedgerTx,
        order_id: &OrderId,
        payment: PaymentRecord,
        period_end: Timestamp,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut order = lock(tx, order_id).await?;
        if let Some(outcome) = replayed_payment(tx, &order, &payment.transaction_id).await? {
            return Ok(outcome);
        }

        let now = self.clock.now();
        order.renew(period_end, now)?;
        tx.update_order(&order).await?;
        let amount = payment.amount.unwrap_or_else(|| order.amount.clone());
        let transaction = PaymentTransaction::payment(
            order.id,
            payment.transaction_id,
            amount,
            payment.provider_data,
            now,
        );
        insert_transaction(tx, &order, &transaction).await?;

        info!(
            order_id = %order.id,
            transaction_id = %transaction.transaction_id,
            period_end = %period_end,
            "Subscription renewed"
        );
        Ok(LedgerOutcome::Changed(order))
    }

    pub async fn cancel_in(
        &self,
        tx: &mut dyn LedgerTx,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut order = lock(tx, order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Ok(LedgerOutcome::Unchanged(order));
        }

        order.cancel(reason, self.clock.now())?;
        tx.update_order(&order).await?;

        info!(order_id = %order.id, reason, "Order cancelled");
        Ok(LedgerOutcome::Changed(order))
    }

    /// Refund of a paid order. The refund id doubles as the refund
    /// transaction's id, so a replayed refund is recognised.
    pub async fn refund_in(
        &self,
        tx: &mut dyn LedgerTx,
        order_id: &OrderId,
        refund: RefundRecord,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut order = lock(tx, order_id).await?;
        if order.status == OrderStatus::Refunded {
            let known = tx.find_transaction(&refund.refund_id).await?;
            if matches!(&known, Some(t) if t.order_id == order.id && t.kind == TransactionKind::Refund)
            {
                return Ok(LedgerOutcome::Unchanged(order));
            }
        }

        let now = self.clock.now();
        order.refund(refund.amount, now)?;
        tx.update_order(&order).await?;

        let mut provider_data = refund.provider_data;
        if let (Some(reason), Value::Object(map)) = (&refund.reason, &mut provider_data) {
            map.insert("reason".to_string(), Value::String(reason.clone()));
        }
        let transaction = PaymentTransaction::refund(
            order.id,
            refund.refund_id,
            Money::new(refund.amount, order.amount.currency().clone())?,
            provider_data,
            now,
        );
        insert_transaction(tx, &order, &transaction).await?;

        info!(
            order_id = %order.id,
            refund_id = %transaction.transaction_id,
            amount = refund.amount,
            "Order refunded"
        );
        Ok(LedgerOutcome::Changed(order))
    }

    /// Expires an unpaid order or lapsed subscription. `payment_status` is
    /// `Expired` for a lapse and `Failed` for a failed renewal charge.
    pub async fn expire_in(
        &self,
        tx: &mut dyn LedgerTx,
        order_id: &OrderId,
        payment_status: PaymentStatus,
    ) -> Result<LedgerOutcome, OrderError> {
        let mut order = lock(tx, order_id).await?;
        if order.status == OrderStatus::Expired {
            return Ok(LedgerOutcome::Unchanged(order));
        }

        order.expire(payment_status, self.clock.now())?;
        tx.update_order(&order).await?;

        info!(
            order_id = %order.id,
            payment_status = %order.payment_status,
            "Order expired"
        );
        Ok(LedgerOutcome::Changed(order))
    }

    /// Stores the leg snapshot. Never changes the order.
    pub async fn record_leg_in(
        &self,
        tx: &mut dyn LedgerTx,
        leg: &PaymentLeg,
    ) -> Result<(), OrderError> {
        tx.upsert_payment_leg(leg).await?;
        Ok(())
    }
}

async fn lock(tx: &mut dyn LedgerTx, order_id: &OrderId) -> Result<Order, OrderError> {
    tx.lock_order(order_id)
        .await?
        .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
}

/// `Some(Unchanged)` when `transaction_id` is already booked on this order,
/// `TransactionConflict` when it belongs to another one.
async fn replayed_payment(
    tx: &mut dyn LedgerTx,
    order: &Order,
    transaction_id: &str,
) -> Result<Option<LedgerOutcome>, OrderError> {
    match tx.find_transaction(transaction_id).await? {
        Some(existing) if existing.order_id == order.id => {
            Ok(Some(LedgerOutcome::Unchanged(order.clone())))
        }
        Some(existing) => Err(OrderError::TransactionConflict {
            transaction_id: transaction_id.to_string(),
            existing_order: existing.order_id,
        }),
        None => Ok(None),
    }
}

async fn insert_transaction(
    tx: &mut dyn LedgerTx,
    order: &Order,
    transaction: &PaymentTransaction,
) -> Result<(), OrderError> {
    match tx.insert_transaction(transaction).await? {
        SaveResult::Inserted => Ok(()),
        SaveResult::AlreadyExists => {
            let existing_order = tx
                .find_transaction(&transaction.transaction_id)
                .await?
                .map(|t| t.order_id)
                .unwrap_or(order.id);
            Err(OrderError::TransactionConflict {
                transaction_id: transaction.transaction_id.clone(),
                existing_order,
            })
        }
    }
}

/// Commits on success, rolls back on error.
pub(crate) async fn finish<T>(
    mut tx: Box<dyn LedgerTx>,
    result: Result<T, OrderError>,
) -> Result<T, OrderError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::{FixedClock, SequentialIdGenerator};
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::domain::foundation::{Currency, ProductId, Provider, UserId};
    use crate::domain::order::OrderKind;
    use crate::ports::OrderReader;
    use serde_json::json;

    struct Fixture {
        store: InMemoryLedgerStore,
        clock: Arc<FixedClock>,
        ledger: OrderLedger,
    }

    fn fixture() -> Fixture {
        let store = InMemoryLedgerStore::new();
        let clock = Arc::new(FixedClock::new(
            Timestamp::from_unix_millis(1_750_000_000_000).unwrap(),
        ));
        let ledger = OrderLedger::new(
            Arc::new(store.clone()),
            clock.clone(),
            Arc::new(SequentialIdGenerator::new()),
            Duration::minutes(30),
        );
        Fixture {
            store,
            clock,
            ledger,
        }
    }

    fn cny(amount: i64) -> Money {
        Money::new(amount, Currency::new("CNY").unwrap()).unwrap()
    }

    fn new_order(provider: Provider, kind: OrderKind) -> NewOrder {
        NewOrder {
            user_id: UserId::new("user-1").unwrap(),
            product_id: ProductId::new("vip_month").unwrap(),
            provider,
            kind,
            amount: cny(2999),
            developer_payload: None,
        }
    }

    fn payment(id: &str) -> PaymentRecord {
        PaymentRecord::new(id, json!({ "source": "test" }))
    }

    fn refund(id: &str, amount: i64) -> RefundRecord {
        RefundRecord {
            refund_id: id.to_string(),
            amount,
            reason: Some("requested".to_string()),
            provider_data: json!({}),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // create_order
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn create_sets_deadline_and_wallet_leg() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::Alipay, OrderKind::Purchase))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.expired_at, Some(f.clock.now().plus_minutes(30)));

        let leg = f.store.payment_leg(&order.id).await.unwrap().unwrap();
        assert_eq!(leg.raw_status, AWAITING_PAYMENT);
    }

    #[tokio::test]
    async fn app_store_order_has_no_leg_yet() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::AppStore, OrderKind::Subscription))
            .await
            .unwrap();
        assert!(f.store.payment_leg(&order.id).await.unwrap().is_none());
    }

    // ══════════════════════════════════════════════════════════════
    // mark_paid
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn mark_paid_books_one_transaction() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::GooglePlay, OrderKind::Purchase))
            .await
            .unwrap();

        let outcome = f.ledger.mark_paid(&order.id, payment("GPA.1"), None).await.unwrap();
        assert!(outcome.is_changed());
        assert_eq!(outcome.order().status, OrderStatus::Paid);
        assert!(outcome.order().paid_at.is_some());

        let transactions = f.store.transactions(&order.id).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].amount, cny(2999));
    }

    #[tokio::test]
    async fn mark_paid_with_same_transaction_is_unchanged() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::GooglePlay, OrderKind::Purchase))
            .await
            .unwrap();
        f.ledger.mark_paid(&order.id, payment("GPA.1"), None).await.unwrap();
        let writes = f.store.order_write_count();

        let outcome = f.ledger.mark_paid(&order.id, payment("GPA.1"), None).await.unwrap();
        assert!(!outcome.is_changed());
        assert_eq!(f.store.order_write_count(), writes);
        assert_eq!(f.store.transactions(&order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_paid_with_new_transaction_on_paid_order_is_illegal() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::GooglePlay, OrderKind::Purchase))
            .await
            .unwrap();
        f.ledger.mark_paid(&order.id, payment("GPA.1"), None).await.unwrap();

        let err = f.ledger.mark_paid(&order.id, payment("GPA.2"), None).await.unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn transaction_bound_to_another_order_conflicts() {
        let f = fixture();
        let first = f
            .ledger
            .create_order(new_order(Provider::GooglePlay, OrderKind::Purchase))
            .await
            .unwrap();
        let second = f
            .ledger
            .create_order(new_order(Provider::GooglePlay, OrderKind::Purchase))
            .await
            .unwrap();
        f.ledger.mark_paid(&first.id, payment("GPA.1"), None).await.unwrap();

        let err = f.ledger.mark_paid(&second.id, payment("GPA.1"), None).await.unwrap_err();
        assert_eq!(
            err,
            OrderError::TransactionConflict {
                transaction_id: "GPA.1".into(),
                existing_order: first.id,
            }
        );
    }

    #[tokio::test]
    async fn reported_amount_must_match() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::Alipay, OrderKind::Purchase))
            .await
            .unwrap();

        let err = f
            .ledger
            .mark_paid(&order.id, payment("2025A").with_amount(cny(100)), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::AmountMismatch {
                expected: 2999,
                actual: 100
            }
        );
        let stored = f.store.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let f = fixture();
        let err = f
            .ledger
            .mark_paid(&OrderId::new(), payment("X"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    // ══════════════════════════════════════════════════════════════
    // renew / expire
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn renewal_recovers_expired_subscription() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::AppStore, OrderKind::Subscription))
            .await
            .unwrap();
        let period_end = f.clock.now().plus_days(30);
        f.ledger.mark_paid(&order.id, payment("1000"), Some(period_end)).await.unwrap();
        f.ledger.expire(&order.id, PaymentStatus::Failed).await.unwrap();

        let next_end = period_end.plus_days(30);
        let outcome = f.ledger.renew(&order.id, payment("1001"), next_end).await.unwrap();
        assert_eq!(outcome.order().status, OrderStatus::Paid);
        assert_eq!(outcome.order().payment_status, PaymentStatus::Completed);
        assert_eq!(outcome.order().expired_at, Some(next_end));
        assert_eq!(f.store.transactions(&order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn expire_twice_is_unchanged() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::WechatPay, OrderKind::Purchase))
            .await
            .unwrap();
        assert!(f.ledger.expire(&order.id, PaymentStatus::Expired).await.unwrap().is_changed());
        assert!(!f.ledger.expire(&order.id, PaymentStatus::Expired).await.unwrap().is_changed());
    }

    // ══════════════════════════════════════════════════════════════
    // cancel / refund
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn cancelled_order_rejects_payment() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::Alipay, OrderKind::Purchase))
            .await
            .unwrap();
        f.ledger.cancel(&order.id, "user").await.unwrap();
        assert!(!f.ledger.cancel(&order.id, "user").await.unwrap().is_changed());

        let err = f.ledger.mark_paid(&order.id, payment("T"), None).await.unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn refund_is_idempotent_per_refund_id() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::WechatPay, OrderKind::Purchase))
            .await
            .unwrap();
        f.ledger.mark_paid(&order.id, payment("4200"), None).await.unwrap();

        let outcome = f.ledger.refund(&order.id, refund("R1", 2999)).await.unwrap();
        assert_eq!(outcome.order().status, OrderStatus::Refunded);
        assert_eq!(outcome.order().refund_amount, Some(2999));

        assert!(!f.ledger.refund(&order.id, refund("R1", 2999)).await.unwrap().is_changed());
        let err = f.ledger.refund(&order.id, refund("R2", 10)).await.unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));

        let transactions = f.store.transactions(&order.id).await.unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[1].kind, TransactionKind::Refund);
        assert_eq!(transactions[1].provider_data["reason"], "requested");
    }

    #[tokio::test]
    async fn refund_above_order_amount_is_rejected() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::WechatPay, OrderKind::Purchase))
            .await
            .unwrap();
        f.ledger.mark_paid(&order.id, payment("4200"), None).await.unwrap();

        let err = f.ledger.refund(&order.id, refund("R1", 3000)).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    // ══════════════════════════════════════════════════════════════
    // Transactions
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failed_commit_leaves_nothing_behind() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::GooglePlay, OrderKind::Purchase))
            .await
            .unwrap();
        f.store.fail_next_commit();

        assert!(f.ledger.mark_paid(&order.id, payment("GPA.1"), None).await.is_err());
        let stored = f.store.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
        assert!(f.store.transactions(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_leg_upserts() {
        let f = fixture();
        let order = f
            .ledger
            .create_order(new_order(Provider::GooglePlay, OrderKind::Subscription))
            .await
            .unwrap();
        let mut leg = PaymentLeg::new(order.id, Provider::GooglePlay, "PURCHASED", f.clock.now());
        f.ledger.record_leg(&leg).await.unwrap();
        leg.set_raw_status("ON_HOLD", f.clock.now());
        f.ledger.record_leg(&leg).await.unwrap();

        let stored = f.store.payment_leg(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.raw_status, "ON_HOLD");
    }
}
