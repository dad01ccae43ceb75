//! PostgreSQL implementation of OrderReader.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{
    DomainError, OrderId, OrderNumber, Page, PageRequest, Timestamp, UserId,
};
use crate::domain::order::{Order, PaymentLeg, PaymentTransaction};
use crate::ports::OrderReader;

use super::rows::{
    db_error, OrderRow, PaymentLegRow, TransactionRow, LEG_COLUMNS, ORDER_COLUMNS,
    TRANSACTION_COLUMNS,
};

/// PostgreSQL implementation of the OrderReader port.
#[derive(Clone)]
pub struct PostgresOrderReader {
    pool: PgPool,
}

impl PostgresOrderReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderReader for PostgresOrderReader {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch order", e))?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, DomainError> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch order", e))?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_by_user(
        &self,
        user_id: &UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count orders", e))?;

        let sql = format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id LIMIT $2 OFFSET $3",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id.as_str())
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list orders", e))?;

        let items = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn payment_leg(&self, order_id: &OrderId) -> Result<Option<PaymentLeg>, DomainError> {
        let sql = format!("SELECT {} FROM payment_legs WHERE order_id = $1", LEG_COLUMNS);
        sqlx::query_as::<_, PaymentLegRow>(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch payment leg", e))?
            .map(PaymentLeg::try_from)
            .transpose()
    }

    async fn transactions(&self, order_id: &OrderId) -> Result<Vec<PaymentTransaction>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE order_id = $1 ORDER BY created_at ASC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch transactions", e))?;

        rows.into_iter().map(PaymentTransaction::try_from).collect()
    }

    async fn list_overdue_unpaid(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<OrderId>, DomainError> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE status = 'created' AND expired_at IS NOT NULL AND expired_at <= $1
            ORDER BY expired_at ASC
            LIMIT $2
            "#,
        )
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to scan overdue orders", e))?;

        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }
}
