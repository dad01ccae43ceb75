//! Order reader port (read side / CQRS queries).
//!
//! Plain reads outside any ledger transaction: API lookups, listings and the
//! expiry worker's scan. Nothing here takes a lock.

use async_trait::async_trait;

use crate::domain::foundation::{
    DomainError, OrderId, OrderNumber, Page, PageRequest, Timestamp, UserId,
};
use crate::domain::order::{Order, PaymentLeg, PaymentTransaction};

#[async_trait]
pub trait OrderReader: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, DomainError>;

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, DomainError>;

    /// Orders of one user, newest first.
    async fn list_by_user(
        &self,
        user_id: &UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError>;

    async fn payment_leg(&self, order_id: &OrderId) -> Result<Option<PaymentLeg>, DomainError>;

    /// Transactions of an order, oldest first.
    async fn transactions(&self, order_id: &OrderId) -> Result<Vec<PaymentTransaction>, DomainError>;

    /// Ids of `created` orders whose payment deadline is at or before `now`.
    async fn list_overdue_unpaid(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<OrderId>, DomainError>;
}
