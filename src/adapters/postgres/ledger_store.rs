//! PostgreSQL implementation of LedgerStore.
//!
//! Each `PostgresLedgerTx` wraps one `sqlx::Transaction`. Orders are read
//! with `FOR UPDATE`, webhook events for replay with `FOR UPDATE SKIP
//! LOCKED`, and the two unique inserts (provider transaction id, provider
//! event id) use `ON CONFLICT DO NOTHING` so a duplicate is reported instead
//! of aborting the transaction.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::foundation::{
    DomainError, ErrorCode, OrderId, OrderNumber, Provider, WebhookEventId,
};
use crate::domain::notification::WebhookEvent;
use crate::domain::order::{Order, PaymentLeg, PaymentTransaction};
use crate::ports::{LedgerStore, LedgerTx, SaveResult};

use super::rows::{
    db_error, OrderRow, PaymentLegRow, TransactionRow, WebhookEventRow, EVENT_COLUMNS,
    LEG_COLUMNS, ORDER_COLUMNS, TRANSACTION_COLUMNS,
};

/// PostgreSQL implementation of the LedgerStore port.
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        Ok(Box::new(PostgresLedgerTx { tx: Some(tx) }))
    }
}

/// Open ledger transaction. Dropping it without `commit` rolls back.
pub struct PostgresLedgerTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresLedgerTx {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, DomainError> {
        self.tx.as_mut().ok_or_else(|| {
            DomainError::new(ErrorCode::TransactionClosed, "transaction already finished")
        })
    }

    async fn fetch_order(&mut self, sql: &str, bind: OrderKey<'_>) -> Result<Option<Order>, DomainError> {
        let conn = self.conn()?;
        let query = sqlx::query_as::<_, OrderRow>(sql);
        let query = match bind {
            OrderKey::Id(id) => query.bind(*id.as_uuid()),
            OrderKey::Number(number) => query.bind(number.as_str().to_string()),
        };
        query
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| db_error("Failed to lock order", e))?
            .map(Order::try_from)
            .transpose()
    }

    async fn fetch_leg(
        &mut self,
        filter: &str,
        provider: Option<Provider>,
        value: String,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        let sql = format!("SELECT {} FROM payment_legs WHERE {}", LEG_COLUMNS, filter);
        let conn = self.conn()?;
        let mut query = sqlx::query_as::<_, PaymentLegRow>(&sql);
        if let Some(provider) = provider {
            query = query.bind(provider.as_str());
        }
        query
            .bind(value)
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| db_error("Failed to load payment leg", e))?
            .map(PaymentLeg::try_from)
            .transpose()
    }
}

enum OrderKey<'a> {
    Id(&'a OrderId),
    Number(&'a OrderNumber),
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
        self.fetch_order(&sql, OrderKey::Id(id)).await
    }

    async fn lock_order_by_number(
        &mut self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, DomainError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE order_number = $1 FOR UPDATE",
            ORDER_COLUMNS
        );
        self.fetch_order(&sql, OrderKey::Number(number)).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), DomainError> {
        order.check_invariants()?;
        let conn = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, user_id, product_id, provider, kind, amount, currency,
                status, payment_status, paid_at, expired_at, refund_at, refund_amount,
                cancel_reason, developer_payload, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.user_id.as_str())
        .bind(order.product_id.as_str())
        .bind(order.provider.as_str())
        .bind(order.kind.as_str())
        .bind(order.amount.amount())
        .bind(order.amount.currency().as_str())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.paid_at.map(|t| *t.as_datetime()))
        .bind(order.expired_at.map(|t| *t.as_datetime()))
        .bind(order.refund_at.map(|t| *t.as_datetime()))
        .bind(order.refund_amount)
        .bind(&order.cancel_reason)
        .bind(&order.developer_payload)
        .bind(order.created_at.as_datetime())
        .bind(order.updated_at.as_datetime())
        .execute(&mut **conn)
        .await
        .map_err(|e| db_error("Failed to insert order", e))?;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        order.check_invariants()?;
        let conn = self.conn()?;
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $2,
                payment_status = $3,
                paid_at = $4,
                expired_at = $5,
                refund_at = $6,
                refund_amount = $7,
                cancel_reason = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.paid_at.map(|t| *t.as_datetime()))
        .bind(order.expired_at.map(|t| *t.as_datetime()))
        .bind(order.refund_at.map(|t| *t.as_datetime()))
        .bind(order.refund_amount)
        .bind(&order.cancel_reason)
        .bind(order.updated_at.as_datetime())
        .execute(&mut **conn)
        .await
        .map_err(|e| db_error("Failed to update order", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("order {} not found", order.id),
            ));
        }
        Ok(())
    }

    async fn find_payment_leg(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        let sql = format!("SELECT {} FROM payment_legs WHERE order_id = $1", LEG_COLUMNS);
        let conn = self.conn()?;
        sqlx::query_as::<_, PaymentLegRow>(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| db_error("Failed to load payment leg", e))?
            .map(PaymentLeg::try_from)
            .transpose()
    }

    async fn find_leg_by_purchase_token(
        &mut self,
        provider: Provider,
        purchase_token: &str,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        self.fetch_leg(
            "provider = $1 AND purchase_token = $2 LIMIT 1",
            Some(provider),
            purchase_token.to_string(),
        )
        .await
    }

    async fn find_leg_by_transaction_id(
        &mut self,
        provider: Provider,
        transaction_id: &str,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        self.fetch_leg(
            "provider = $1 AND provider_transaction_id = $2 LIMIT 1",
            Some(provider),
            transaction_id.to_string(),
        )
        .await
    }

    async fn find_earliest_leg_by_original_transaction(
        &mut self,
        provider: Provider,
        original_transaction_id: &str,
    ) -> Result<Option<PaymentLeg>, DomainError> {
        self.fetch_leg(
            "provider = $1 AND original_transaction_id = $2 ORDER BY created_at ASC LIMIT 1",
            Some(provider),
            original_transaction_id.to_string(),
        )
        .await
    }

    async fn upsert_payment_leg(&mut self, leg: &PaymentLeg) -> Result<(), DomainError> {
        let conn = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO payment_legs (
                order_id, provider, purchase_token, provider_transaction_id,
                original_transaction_id, product_id, raw_status, acknowledged, auto_renewing,
                expiry_time, grace_period_expiry, grace_period_status, cancel_reason,
                payment_state, subscription_state, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (order_id) DO UPDATE SET
                purchase_token = EXCLUDED.purchase_token,
                provider_transaction_id = EXCLUDED.provider_transaction_id,
                original_transaction_id = EXCLUDED.original_transaction_id,
                product_id = EXCLUDED.product_id,
                raw_status = EXCLUDED.raw_status,
                acknowledged = EXCLUDED.acknowledged,
                auto_renewing = EXCLUDED.auto_renewing,
                expiry_time = EXCLUDED.expiry_time,
                grace_period_expiry = EXCLUDED.grace_period_expiry,
                grace_period_status = EXCLUDED.grace_period_status,
                cancel_reason = EXCLUDED.cancel_reason,
                payment_state = EXCLUDED.payment_state,
                subscription_state = EXCLUDED.subscription_state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(leg.order_id.as_uuid())
        .bind(leg.provider.as_str())
        .bind(&leg.purchase_token)
        .bind(&leg.provider_transaction_id)
        .bind(&leg.original_transaction_id)
        .bind(&leg.product_id)
        .bind(&leg.raw_status)
        .bind(leg.acknowledged)
        .bind(leg.auto_renewing)
        .bind(leg.expiry_time.map(|t| *t.as_datetime()))
        .bind(leg.grace_period_expiry.map(|t| *t.as_datetime()))
        .bind(leg.grace_period_status.map(|s| s.as_str()))
        .bind(leg.cancel_reason.map(|r| r.as_str()))
        .bind(leg.payment_state.map(|s| s.as_str()))
        .bind(leg.subscription_state.map(|s| s.as_str()))
        .bind(leg.created_at.as_datetime())
        .bind(leg.updated_at.as_datetime())
        .execute(&mut **conn)
        .await
        .map_err(|e| db_error("Failed to save payment leg", e))?;
        Ok(())
    }

    async fn find_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE transaction_id = $1",
            TRANSACTION_COLUMNS
        );
        let conn = self.conn()?;
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| db_error("Failed to load transaction", e))?
            .map(PaymentTransaction::try_from)
            .transpose()
    }

    async fn insert_transaction(
        &mut self,
        transaction: &PaymentTransaction,
    ) -> Result<SaveResult, DomainError> {
        let conn = self.conn()?;
        let result = sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, order_id, kind, transaction_id, amount, currency, status, provider_data, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.order_id.as_uuid())
        .bind(transaction.kind.as_str())
        .bind(&transaction.transaction_id)
        .bind(transaction.amount.amount())
        .bind(transaction.amount.currency().as_str())
        .bind(transaction.status.as_str())
        .bind(&transaction.provider_data)
        .bind(transaction.created_at.as_datetime())
        .execute(&mut **conn)
        .await
        .map_err(|e| db_error("Failed to insert transaction", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn insert_webhook_event(
        &mut self,
        event: &WebhookEvent,
    ) -> Result<SaveResult, DomainError> {
        let conn = self.conn()?;
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, provider, event_id, event_type, payload, status, retry_count, next_retry_at,
                processed_at, processed_data, error_message, retryable, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.provider.as_str())
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(i32::try_from(event.retry_count).unwrap_or(i32::MAX))
        .bind(event.next_retry_at.map(|t| *t.as_datetime()))
        .bind(event.processed_at.map(|t| *t.as_datetime()))
        .bind(&event.processed_data)
        .bind(&event.error_message)
        .bind(event.retryable)
        .bind(event.created_at.as_datetime())
        .bind(event.updated_at.as_datetime())
        .execute(&mut **conn)
        .await
        .map_err(|e| db_error("Failed to insert webhook event", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn lock_webhook_event(
        &mut self,
        id: &WebhookEventId,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        let sql = format!(
            "SELECT {} FROM webhook_events WHERE id = $1 FOR UPDATE SKIP LOCKED",
            EVENT_COLUMNS
        );
        let conn = self.conn()?;
        sqlx::query_as::<_, WebhookEventRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| db_error("Failed to lock webhook event", e))?
            .map(WebhookEvent::try_from)
            .transpose()
    }

    async fn update_webhook_event(&mut self, event: &WebhookEvent) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = $2,
                retry_count = $3,
                next_retry_at = $4,
                processed_at = $5,
                processed_data = $6,
                error_message = $7,
                retryable = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.status.as_str())
        .bind(i32::try_from(event.retry_count).unwrap_or(i32::MAX))
        .bind(event.next_retry_at.map(|t| *t.as_datetime()))
        .bind(event.processed_at.map(|t| *t.as_datetime()))
        .bind(&event.processed_data)
        .bind(&event.error_message)
        .bind(event.retryable)
        .bind(event.updated_at.as_datetime())
        .execute(&mut **conn)
        .await
        .map_err(|e| db_error("Failed to update webhook event", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::WebhookEventNotFound,
                format!("webhook event {} not found", event.id),
            ));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let tx = self.tx.take().ok_or_else(|| {
            DomainError::new(ErrorCode::TransactionClosed, "transaction already finished")
        })?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        let tx = self.tx.take().ok_or_else(|| {
            DomainError::new(ErrorCode::TransactionClosed, "transaction already finished")
        })?;
        tx.rollback()
            .await
            .map_err(|e| db_error("Failed to roll back transaction", e))
    }
}
