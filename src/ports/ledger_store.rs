//! Ledger store port - Transactional write access to orders and events.
//!
//! Every write in the crate goes through a `LedgerTx`. An order is locked
//! (`SELECT ... FOR UPDATE` in Postgres) before it is read for a change, so
//! a transaction holding the lock is the single writer for that order. The
//! webhook dedup insert runs in the same transaction as the order changes,
//! which makes "event recorded" and "order changed" commit or roll back
//! together.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = store.begin().await?;
//! let order = tx.lock_order(&order_id).await?;
//! // ... mutate, update_order, insert_transaction ...
//! tx.commit().await?;
//! ```
//!
//! A transaction dropped without `commit` is rolled back.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OrderId, OrderNumber, Provider, WebhookEventId};
use crate::domain::notification::WebhookEvent;
use crate::domain::order::{Order, PaymentLeg, PaymentTransaction};

use super::SaveResult;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError>;
}

/// One open ledger transaction.
///
/// After `commit` or `rollback` every further call fails.
#[async_trait]
pub trait LedgerTx: Send {
    // Orders

    /// Loads and locks an order for the rest of the transaction.
    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, DomainError>;

    async fn lock_order_by_number(
        &mut self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, DomainError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), DomainError>;

    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError>;

    // Payment legs

    async fn find_payment_leg(&mut self, order_id: &OrderId)
        -> Result<Option<PaymentLeg>, DomainError>;

    async fn find_leg_by_purchase_token(
        &mut self,
        provider: Provider,
        purchase_token: &str,
    ) -> Result<Option<PaymentLeg>, DomainError>;

    async fn find_leg_by_transaction_id(
        &mut self,
        provider: Provider,
        transaction_id: &str,
    ) -> Result<Option<PaymentLeg>, DomainError>;

    /// Oldest leg of the subscription lineage `original_transaction_id`.
    async fn find_earliest_leg_by_original_transaction(
        &mut self,
        provider: Provider,
        original_transaction_id: &str,
    ) -> Result<Option<PaymentLeg>, DomainError>;

    async fn upsert_payment_leg(&mut self, leg: &PaymentLeg) -> Result<(), DomainError>;

    // Transactions

    async fn find_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Unique on the provider transaction id.
    async fn insert_transaction(
        &mut self,
        transaction: &PaymentTransaction,
    ) -> Result<SaveResult, DomainError>;

    // Webhook events

    /// Unique on `(provider, event_id)`; a duplicate leaves the stored row
    /// untouched.
    async fn insert_webhook_event(&mut self, event: &WebhookEvent)
        -> Result<SaveResult, DomainError>;

    /// Locks an event for replay. Returns `None` when the event does not
    /// exist or another transaction already holds it.
    async fn lock_webhook_event(
        &mut self,
        id: &WebhookEventId,
    ) -> Result<Option<WebhookEvent>, DomainError>;

    async fn update_webhook_event(&mut self, event: &WebhookEvent) -> Result<(), DomainError>;

    // Completion

    async fn commit(&mut self) -> Result<(), DomainError>;

    async fn rollback(&mut self) -> Result<(), DomainError>;
}
