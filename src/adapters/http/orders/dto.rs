//! HTTP DTOs for order endpoints.
//!
//! Amounts travel in minor units; timestamps as RFC 3339 strings.

use serde::{Deserialize, Serialize};

use crate::application::handlers::order::{OrderDetails, ProcessPaymentResult};
use crate::application::LedgerOutcome;
use crate::domain::foundation::{Page, Timestamp};
use crate::domain::order::{
    Order, OrderKind, OrderStatus, PaymentLeg, PaymentStatus, PaymentTransaction,
    TransactionKind, TransactionStatus,
};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub product_id: String,
    /// `google_play`, `app_store`, `alipay` or `wechat_pay`.
    pub provider: String,
    #[serde(default = "default_kind")]
    pub kind: OrderKind,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub developer_payload: Option<String>,
}

fn default_kind() -> OrderKind {
    OrderKind::Purchase
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Client-reported purchase for process-payment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessPaymentRequest {
    #[serde(default)]
    pub purchase_token: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundOrderRequest {
    /// Minor units; the full order amount when absent.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListOrdersParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub product_id: String,
    pub provider: String,
    pub kind: OrderKind,
    pub amount: i64,
    pub currency: String,
    /// Major units, e.g. `29.99`.
    pub display_amount: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<String>,
    pub expired_at: Option<String>,
    pub refund_at: Option<String>,
    pub refund_amount: Option<i64>,
    pub cancel_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn rfc3339(ts: Option<Timestamp>) -> Option<String> {
    ts.map(|t| t.to_string())
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.to_string(),
            user_id: order.user_id.to_string(),
            product_id: order.product_id.to_string(),
            provider: order.provider.to_string(),
            kind: order.kind,
            amount: order.amount.amount(),
            currency: order.amount.currency().to_string(),
            display_amount: order.amount.format_major(),
            status: order.status,
            payment_status: order.payment_status,
            paid_at: rfc3339(order.paid_at),
            expired_at: rfc3339(order.expired_at),
            refund_at: rfc3339(order.refund_at),
            refund_amount: order.refund_amount,
            cancel_reason: order.cancel_reason,
            created_at: order.created_at.to_string(),
            updated_at: order.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLegResponse {
    pub provider: String,
    pub raw_status: String,
    pub provider_transaction_id: Option<String>,
    pub original_transaction_id: Option<String>,
    pub acknowledged: bool,
    pub auto_renewing: Option<bool>,
    pub expiry_time: Option<String>,
    pub grace_period_expiry: Option<String>,
    pub subscription_state: Option<String>,
    pub updated_at: String,
}

impl From<PaymentLeg> for PaymentLegResponse {
    fn from(leg: PaymentLeg) -> Self {
        Self {
            provider: leg.provider.to_string(),
            raw_status: leg.raw_status,
            provider_transaction_id: leg.provider_transaction_id,
            original_transaction_id: leg.original_transaction_id,
            acknowledged: leg.acknowledged,
            auto_renewing: leg.auto_renewing,
            expiry_time: rfc3339(leg.expiry_time),
            grace_period_expiry: rfc3339(leg.grace_period_expiry),
            subscription_state: leg.subscription_state.map(|s| s.to_string()),
            updated_at: leg.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub created_at: String,
}

impl From<PaymentTransaction> for TransactionResponse {
    fn from(txn: PaymentTransaction) -> Self {
        Self {
            transaction_id: txn.transaction_id,
            kind: txn.kind,
            amount: txn.amount.amount(),
            currency: txn.amount.currency().to_string(),
            status: txn.status,
            created_at: txn.created_at.to_string(),
        }
    }
}

/// Order with its payment leg and ledger, as returned by `GET /orders/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetailsResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub payment_leg: Option<PaymentLegResponse>,
    pub transactions: Vec<TransactionResponse>,
}

impl From<OrderDetails> for OrderDetailsResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            order: details.order.into(),
            payment_leg: details.payment_leg.map(Into::into),
            transactions: details.transactions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of a state-changing call; `changed` is false for replays.
#[derive(Debug, Clone, Serialize)]
pub struct OrderMutationResponse {
    pub order: OrderResponse,
    pub changed: bool,
}

impl From<LedgerOutcome> for OrderMutationResponse {
    fn from(outcome: LedgerOutcome) -> Self {
        let changed = outcome.is_changed();
        Self {
            order: outcome.into_order().into(),
            changed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessPaymentResponse {
    pub order: OrderResponse,
    pub transaction_id: String,
    pub payment_leg: PaymentLegResponse,
    pub changed: bool,
}

impl From<ProcessPaymentResult> for ProcessPaymentResponse {
    fn from(result: ProcessPaymentResult) -> Self {
        Self {
            order: result.order.into(),
            transaction_id: result.transaction_id,
            payment_leg: result.payment_leg.into(),
            changed: result.changed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderListResponse {
    pub items: Vec<OrderResponse>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl From<Page<Order>> for OrderListResponse {
    fn from(page: Page<Order>) -> Self {
        let total_pages = page.total_pages();
        Self {
            items: page.items.into_iter().map(Into::into).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages,
        }
    }
}
