//! In-memory ledger store.
//!
//! Implements the same ports as the Postgres store for tests and local runs.
//! A transaction holds one store-wide lock from `begin` until it commits or
//! is dropped, so transactions run strictly one after another. Writes go to
//! a working copy that replaces the committed state on `commit`.
//!
//! Reads through `OrderReader` / `WebhookEventRepository` take the same lock;
//! calling them while holding an open transaction on the same task would
//! wait forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::{
    DomainError, ErrorCode, OrderId, OrderNumber, Page, PageRequest, Provider, Timestamp, UserId,
    WebhookEventId,
};
use crate::domain::notification::{WebhookEvent, WebhookStatus};
use crate::domain::order::{Order, OrderStatus, PaymentLeg, PaymentTransaction};
use crate::ports::{
    LedgerStore, LedgerTx, OrderReader, SaveResult, WebhookEventRepository,
};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    orders: HashMap<OrderId, Order>,
    legs: HashMap<OrderId, PaymentLeg>,
    transactions: Vec<PaymentTransaction>,
    events: Vec<WebhookEvent>,
}

/// Ledger store backed by process memory.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    order_writes: Arc<AtomicUsize>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed order inserts and updates since creation.
    pub fn order_write_count(&self) -> usize {
        self.order_writes.load(Ordering::SeqCst)
    }

    /// Makes the next `commit` fail with a database error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// All webhook events in insertion order.
    pub async fn webhook_events(&self) -> Vec<WebhookEvent> {
        self.state.lock().await.events.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryLedgerTx {
            guard: Some(guard),
            working,
            order_writes: 0,
            store_order_writes: Arc::clone(&self.order_writes),
            fail_next_commit: Arc::clone(&self.fail_next_commit),
        }))
    }
}

/// Transaction over the in-memory store.
pub struct InMemoryLedgerTx {
    guard: Option<OwnedMutexGuard<LedgerState>>,
    working: LedgerState,
    order_writes: usize,
    store_order_writes: Arc<AtomicUsize>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryLedgerTx {
    fn state(&mut self) -> Result<&mut LedgerState, DomainError> {
        if self.guard.is_none() {
            return Err(closed());
        }
        Ok(&mut self.working)
    }
}

fn closed() -> DomainError {
    DomainError::new(ErrorCode::TransactionClosed, "transaction already finished")
}

fn find_leg<'a>(
    state: &'a LedgerState,
    predicate: impl Fn(&PaymentLeg) -> bool,
) -> Option<&'a PaymentLeg> {
    state.legs.values().find(|leg| predicate(leg))
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.state()?.orders.get(id).cloned())
    }

    async fn lock_order_by_number(
        &mut self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, DomainError> {
        Ok(self
            .state()?
            .orders
            .values()
            .find(|order| &order.order_number == number)
            .cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), DomainError> {
        order.check_invariants()?;
        let state = self.state()?;
        if state.orders.contains_key(&order.id)
            || state
                .orders
                .values()
                .any(|existing| existing.order_number == order.order_number)
        {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("order {} already exists", order.order_number),
            ));
        }
        state.orders.insert(order.id, order.clone());
        self.order_writes += 1;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        order.check_invariants()?;
        let state = self.state()?;
        match state.orders.get_mut(&order.id) {
            Some(existing) => *existing = order.clone(),
            None => {
                return Err(DomainError::new(
                    ErrorCode::OrderNotFound,
                    format!("order {} not found", order.id),
                ))
            }
        }
        self.order_writes += 1;
        Ok(())
    }

    async fn find_payment_leg(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        Ok(self.state()?.legs.get(order_id).cloned())
    }

    async fn find_leg_by_purchase_token(
        &mut self,
        provider: Provider,
        purchase_token: &str,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        let state = self.state()?;
        Ok(find_leg(state, |leg| {
            leg.provider == provider && leg.purchase_token.as_deref() == Some(purchase_token)
        })
        .cloned())
    }

    async fn find_leg_by_transaction_id(
        &mut self,
        provider: Provider,
        transaction_id: &str,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        let state = self.state()?;
        Ok(find_leg(state, |leg| {
            leg.provider == provider
                && leg.provider_transaction_id.as_deref() == Some(transaction_id)
        })
        .cloned())
    }

    async fn find_earliest_leg_by_original_transaction(
        &mut self,
        provider: Provider,
        original_transaction_id: &str,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        let state = self.state()?;
        Ok(state
            .legs
            .values()
            .filter(|leg| {
                leg.provider == provider
                    && leg.original_transaction_id.as_deref() == Some(original_transaction_id)
            })
            .min_by_key(|leg| leg.created_at)
            .cloned())
    }

    async fn upsert_payment_leg(&mut self, leg: &PaymentLeg) -> Result<(), DomainError> {
        let state = self.state()?;
        if !state.orders.contains_key(&leg.order_id) {
            return Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("payment leg for unknown order {}", leg.order_id),
            ));
        }
        state.legs.insert(leg.order_id, leg.clone());
        Ok(())
    }

    async fn find_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        Ok(self
            .state()?
            .transactions
            .iter()
            .find(|txn| txn.transaction_id == transaction_id)
            .cloned())
    }

    async fn insert_transaction(
        &mut self,
        transaction: &PaymentTransaction,
    ) -> Result<SaveResult, DomainError> {
        let state = self.state()?;
        if state
            .transactions
            .iter()
            .any(|txn| txn.transaction_id == transaction.transaction_id)
        {
            return Ok(SaveResult::AlreadyExists);
        }
        state.transactions.push(transaction.clone());
        Ok(SaveResult::Inserted)
    }

    async fn insert_webhook_event(
        &mut self,
        event: &WebhookEvent,
    ) -> Result<SaveResult, DomainError> {
        let state = self.state()?;
        if state
            .events
            .iter()
            .any(|e| e.provider == event.provider && e.event_id == event.event_id)
        {
            return Ok(SaveResult::AlreadyExists);
        }
        state.events.push(event.clone());
        Ok(SaveResult::Inserted)
    }

    async fn lock_webhook_event(
        &mut self,
        id: &WebhookEventId,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        Ok(self.state()?.events.iter().find(|e| &e.id == id).cloned())
    }

    async fn update_webhook_event(&mut self, event: &WebhookEvent) -> Result<(), DomainError> {
        let state = self.state()?;
        match state.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => {
                *existing = event.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::WebhookEventNotFound,
                format!("webhook event {} not found", event.id),
            )),
        }
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let mut guard = self.guard.take().ok_or_else(closed)?;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "commit failed (injected)",
            ));
        }
        *guard = std::mem::take(&mut self.working);
        self.store_order_writes
            .fetch_add(self.order_writes, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.guard.take().ok_or_else(closed)?;
        self.working = LedgerState::default();
        Ok(())
    }
}

#[async_trait]
impl OrderReader for InMemoryLedgerStore {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.state.lock().await.orders.get(id).cloned())
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .values()
            .find(|order| &order.order_number == number)
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| &order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = orders.len() as u64;
        let items = orders
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(Page::new(items, total, page))
    }

    async fn payment_leg(&self, order_id: &OrderId) -> Result<Option<PaymentLeg>, DomainError> {
        Ok(self.state.lock().await.legs.get(order_id).cloned())
    }

    async fn transactions(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<PaymentTransaction>, DomainError> {
        let state = self.state.lock().await;
        let mut transactions: Vec<PaymentTransaction> = state
            .transactions
            .iter()
            .filter(|txn| &txn.order_id == order_id)
            .cloned()
            .collect();
        transactions.sort_by_key(|txn| txn.created_at);
        Ok(transactions)
    }

    async fn list_overdue_unpaid(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<OrderId>, DomainError> {
        let state = self.state.lock().await;
        let mut overdue: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Created && order.is_payment_overdue(now))
            .collect();
        overdue.sort_by_key(|order| order.expired_at);
        Ok(overdue
            .into_iter()
            .take(limit as usize)
            .map(|order| order.id)
            .collect())
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryLedgerStore {
    async fn find_by_event_id(
        &self,
        provider: Provider,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .iter()
            .find(|e| e.provider == provider && e.event_id == event_id)
            .cloned())
    }

    async fn list_due_for_retry(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<WebhookEventId>, DomainError> {
        let state = self.state.lock().await;
        let mut due: Vec<&WebhookEvent> = state.events.iter().filter(|e| e.is_due(now)).collect();
        due.sort_by_key(|e| e.next_retry_at);
        Ok(due.into_iter().take(limit as usize).map(|e| e.id).collect())
    }

    async fn delete_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.state.lock().await;
        let len_before = state.events.len();
        state.events.retain(|e| {
            !(matches!(e.status, WebhookStatus::Processed | WebhookStatus::Skipped)
                && e.created_at < before)
        });
        Ok((len_before - state.events.len()) as u64)
    }
}
