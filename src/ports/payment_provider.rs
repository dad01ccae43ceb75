//! Payment provider port.
//!
//! One adapter per payment network. Adapters own everything
//! provider-specific that needs credentials or network access: calling the
//! verification API, acknowledging purchases, issuing refunds, and checking
//! the signature of inbound notifications.
//!
//! # Capabilities
//!
//! | Provider | verify | acknowledge | refund |
//! |----------|--------|-------------|--------|
//! | Google Play | yes | yes | no |
//! | App Store | yes | no | no |
//! | Alipay | trade query | no | yes |
//! | WeChat Pay | trade query | no | yes |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::{Money, OrderId, OrderNumber, Provider};
use crate::domain::notification::WebhookError;
use crate::domain::order::{OrderError, OrderKind};
use crate::domain::subscription::SubscriptionSnapshot;

/// Request headers of an inbound notification, keys lowercased.
pub type NotificationHeaders = HashMap<String, String>;

/// Port for payment network integrations.
///
/// Every call may be retried by the caller; implementations must be
/// idempotent for the same request.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::for_provider(self.provider())
    }

    /// Looks the purchase (or trade) up at the provider.
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, PaymentError>;

    /// Confirms a verified purchase so the provider does not auto-refund it.
    async fn acknowledge(&self, request: AcknowledgeRequest) -> Result<(), PaymentError>;

    async fn refund(&self, request: RefundRequest) -> Result<RefundResult, PaymentError>;

    /// Authenticates an inbound notification and returns the payload the
    /// classifier should read (decrypted where the provider encrypts it).
    async fn open_notification(
        &self,
        body: &[u8],
        headers: &NotificationHeaders,
    ) -> Result<Vec<u8>, PaymentError>;
}

/// Operations an adapter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub verify: bool,
    pub acknowledge: bool,
    pub refund: bool,
}

impl ProviderCapabilities {
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::GooglePlay => Self {
                verify: true,
                acknowledge: true,
                refund: false,
            },
            Provider::AppStore => Self {
                verify: true,
                acknowledge: false,
                refund: false,
            },
            Provider::Alipay | Provider::WechatPay => Self {
                verify: true,
                acknowledge: false,
                refund: true,
            },
        }
    }
}

/// Purchase lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub provider: Provider,
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub product_id: String,
    pub kind: OrderKind,

    /// Google purchase token.
    pub purchase_token: Option<String>,

    /// Apple transaction id, or the wallet trade number if already known.
    pub transaction_id: Option<String>,
}

/// Purchase state as the provider reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    Purchased,
    Pending,
    Canceled,
}

/// Verified purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Provider transaction id; the idempotency anchor of the payment.
    pub transaction_id: String,
    pub original_transaction_id: Option<String>,
    pub purchase_token: Option<String>,
    pub product_id: Option<String>,
    pub purchase_state: PurchaseState,

    /// Already acknowledged at the provider.
    pub acknowledged: bool,

    pub amount: Option<Money>,

    /// Renewal fields, present for subscriptions.
    pub subscription: Option<SubscriptionSnapshot>,

    /// Provider's status string.
    pub raw_status: String,

    /// Provider response kept for audit.
    pub raw: serde_json::Value,
}

impl VerificationResult {
    pub fn is_purchased(&self) -> bool {
        self.purchase_state == PurchaseState::Purchased
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub provider: Provider,
    pub product_id: String,
    pub purchase_token: String,
    pub kind: OrderKind,
    pub developer_payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub provider: Provider,
    pub order_number: OrderNumber,

    /// Provider trade number of the payment being refunded.
    pub transaction_id: Option<String>,

    /// Our refund request id, echoed back in refund notifications.
    pub refund_id: String,

    pub amount: Money,

    /// Original order amount (WeChat requires it).
    pub total: Money,

    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    pub refund_id: String,
    pub amount: Money,
    pub raw: serde_json::Value,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::Timeout, message)
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidSignature, message)
    }

    pub fn invalid_purchase(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidPurchase, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn unsupported(provider: Provider, operation: &str) -> Self {
        Self::new(
            PaymentErrorCode::Unsupported,
            format!("{} does not support {}", provider, operation),
        )
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for OrderError {
    fn from(err: PaymentError) -> Self {
        if err.retryable {
            return OrderError::ProviderTransient(err.to_string());
        }
        match err.code {
            PaymentErrorCode::InvalidPurchase | PaymentErrorCode::NotFound => {
                OrderError::PaymentNotCompleted(err.message)
            }
            _ => OrderError::ProviderRejected(err.to_string()),
        }
    }
}

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            PaymentErrorCode::InvalidSignature | PaymentErrorCode::AuthenticationError => {
                WebhookError::InvalidSignature(err.message)
            }
            _ if err.retryable => WebhookError::ProviderTransient(err.to_string()),
            _ => WebhookError::ProviderRejected(err.to_string()),
        }
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,

    /// Call exceeded the configured deadline.
    Timeout,

    RateLimitExceeded,

    /// Provider answered 5xx.
    ProviderUnavailable,

    /// Our credentials were refused.
    AuthenticationError,

    /// Notification signature did not verify.
    InvalidSignature,

    /// Purchase token or trade is unknown, pending or not paid.
    InvalidPurchase,

    NotFound,
    Unsupported,
    ProviderError,
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::Timeout
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderUnavailable
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::Timeout => "timeout",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderUnavailable => "provider_unavailable",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::InvalidSignature => "invalid_signature",
            PaymentErrorCode::InvalidPurchase => "invalid_purchase",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::Unsupported => "unsupported",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
