//! Row types shared by the Postgres ledger adapters.
//!
//! Enums are stored as their `as_str()` text; amounts as `BIGINT` minor units
//! next to a `currency` column.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, Money, OrderId, OrderNumber, PaymentTransactionId, ProductId,
    Timestamp, UserId, ValidationError, WebhookEventId,
};
use crate::domain::notification::WebhookEvent;
use crate::domain::order::{Order, PaymentLeg, PaymentTransaction};

pub(super) const ORDER_COLUMNS: &str = "id, order_number, user_id, product_id, provider, kind, \
     amount, currency, status, payment_status, paid_at, expired_at, refund_at, refund_amount, \
     cancel_reason, developer_payload, created_at, updated_at";

pub(super) const LEG_COLUMNS: &str = "order_id, provider, purchase_token, provider_transaction_id, \
     original_transaction_id, product_id, raw_status, acknowledged, auto_renewing, expiry_time, \
     grace_period_expiry, grace_period_status, cancel_reason, payment_state, subscription_state, \
     created_at, updated_at";

pub(super) const TRANSACTION_COLUMNS: &str =
    "id, order_id, kind, transaction_id, amount, currency, status, provider_data, created_at";

pub(super) const EVENT_COLUMNS: &str = "id, provider, event_id, event_type, payload, status, \
     retry_count, next_retry_at, processed_at, processed_data, error_message, retryable, \
     created_at, updated_at";

pub(super) fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

fn parse<T>(column: &str, value: &str) -> Result<T, DomainError>
where
    T: FromStr<Err = ValidationError>,
{
    value.parse().map_err(|e: ValidationError| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("invalid {} in database: {}", column, e),
        )
    })
}

fn parse_opt<T>(column: &str, value: Option<String>) -> Result<Option<T>, DomainError>
where
    T: FromStr<Err = ValidationError>,
{
    value.map(|v| parse(column, &v)).transpose()
}

fn ts(value: DateTime<Utc>) -> Timestamp {
    Timestamp::from_datetime(value)
}

fn money(amount: i64, currency: &str) -> Result<Money, DomainError> {
    Ok(Money::new(amount, Currency::new(currency)?)?)
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: String,
    product_id: String,
    provider: String,
    kind: String,
    amount: i64,
    currency: String,
    status: String,
    payment_status: String,
    paid_at: Option<DateTime<Utc>>,
    expired_at: Option<DateTime<Utc>>,
    refund_at: Option<DateTime<Utc>>,
    refund_amount: Option<i64>,
    cancel_reason: Option<String>,
    developer_payload: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::from_uuid(row.id),
            order_number: OrderNumber::new(row.order_number)?,
            user_id: UserId::new(row.user_id)?,
            product_id: ProductId::new(row.product_id)?,
            provider: parse("provider", &row.provider)?,
            kind: parse("kind", &row.kind)?,
            amount: money(row.amount, &row.currency)?,
            status: parse("status", &row.status)?,
            payment_status: parse("payment_status", &row.payment_status)?,
            paid_at: row.paid_at.map(ts),
            expired_at: row.expired_at.map(ts),
            refund_at: row.refund_at.map(ts),
            refund_amount: row.refund_amount,
            cancel_reason: row.cancel_reason,
            developer_payload: row.developer_payload,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PaymentLegRow {
    order_id: Uuid,
    provider: String,
    purchase_token: Option<String>,
    provider_transaction_id: Option<String>,
    original_transaction_id: Option<String>,
    product_id: Option<String>,
    raw_status: String,
    acknowledged: bool,
    auto_renewing: Option<bool>,
    expiry_time: Option<DateTime<Utc>>,
    grace_period_expiry: Option<DateTime<Utc>>,
    grace_period_status: Option<String>,
    cancel_reason: Option<String>,
    payment_state: Option<String>,
    subscription_state: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentLegRow> for PaymentLeg {
    type Error = DomainError;

    fn try_from(row: PaymentLegRow) -> Result<Self, Self::Error> {
        Ok(PaymentLeg {
            order_id: OrderId::from_uuid(row.order_id),
            provider: parse("provider", &row.provider)?,
            purchase_token: row.purchase_token,
            provider_transaction_id: row.provider_transaction_id,
            original_transaction_id: row.original_transaction_id,
            product_id: row.product_id,
            raw_status: row.raw_status,
            acknowledged: row.acknowledged,
            auto_renewing: row.auto_renewing,
            expiry_time: row.expiry_time.map(ts),
            grace_period_expiry: row.grace_period_expiry.map(ts),
            grace_period_status: parse_opt("grace_period_status", row.grace_period_status)?,
            cancel_reason: parse_opt("cancel_reason", row.cancel_reason)?,
            payment_state: parse_opt("payment_state", row.payment_state)?,
            subscription_state: parse_opt("subscription_state", row.subscription_state)?,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TransactionRow {
    id: Uuid,
    order_id: Uuid,
    kind: String,
    transaction_id: String,
    amount: i64,
    currency: String,
    status: String,
    provider_data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(PaymentTransaction {
            id: PaymentTransactionId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            kind: parse("kind", &row.kind)?,
            transaction_id: row.transaction_id,
            amount: money(row.amount, &row.currency)?,
            status: parse("status", &row.status)?,
            provider_data: row.provider_data,
            created_at: ts(row.created_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct WebhookEventRow {
    id: Uuid,
    provider: String,
    event_id: String,
    event_type: String,
    payload: String,
    status: String,
    retry_count: i32,
    next_retry_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    processed_data: Option<serde_json::Value>,
    error_message: Option<String>,
    retryable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEvent {
            id: WebhookEventId::from_uuid(row.id),
            provider: parse("provider", &row.provider)?,
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            status: parse("status", &row.status)?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            next_retry_at: row.next_retry_at.map(ts),
            processed_at: row.processed_at.map(ts),
            processed_data: row.processed_data,
            error_message: row.error_message,
            retryable: row.retryable,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        })
    }
}
