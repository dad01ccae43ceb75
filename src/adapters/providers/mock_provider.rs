//! Mock payment provider for testing and local runs.
//!
//! Provides a configurable in-process implementation of `PaymentProvider`.
//! Supports:
//! - Pre-configured purchases keyed by token, transaction id or order number
//! - Error injection (one-shot or per method)
//! - Latency injection, for exercising provider deadlines
//! - Call tracking
//! - Notification authentication modes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::foundation::{Provider, Timestamp};
use crate::domain::order::OrderKind;
use crate::domain::subscription::SubscriptionSnapshot;
use crate::ports::{
    AcknowledgeRequest, NotificationHeaders, PaymentError, PaymentProvider, PurchaseState,
    RefundRequest, RefundResult, VerificationRequest, VerificationResult,
};

/// Mock payment provider.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new(Provider::GooglePlay);
/// mock.add_purchase("token-1", result);
/// mock.set_method_error("acknowledge", PaymentError::timeout("slow"));
/// ```
pub struct MockPaymentProvider {
    provider: Provider,
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Known purchases by purchase token, transaction id or order number.
    purchases: HashMap<String, VerificationResult>,

    /// Unknown purchases verify as purchased instead of not found.
    approve_unknown: bool,

    /// Error to return on next call.
    next_error: Option<PaymentError>,

    /// Specific errors by method name.
    method_errors: HashMap<String, PaymentError>,

    /// Added before every provider call.
    delay: Option<Duration>,

    call_log: Vec<MethodCall>,

    notification_mode: NotificationMode,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

#[derive(Default, Clone)]
enum NotificationMode {
    #[default]
    AcceptAll,

    /// Header must be present with this exact value.
    RequireHeader { name: String, value: String },

    AlwaysFail,
}

impl MockPaymentProvider {
    /// Strict mock: only purchases added with `add_purchase` verify.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Mock that verifies every purchase as paid.
    pub fn approving(provider: Provider) -> Self {
        let mock = Self::new(provider);
        mock.state().approve_unknown = true;
        mock
    }

    /// Mock whose notification authentication always fails.
    pub fn rejecting_notifications(provider: Provider) -> Self {
        let mock = Self::new(provider);
        mock.state().notification_mode = NotificationMode::AlwaysFail;
        mock
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Registers a purchase under `key`: a purchase token, a provider
    /// transaction id or an order number.
    pub fn add_purchase(&self, key: impl Into<String>, result: VerificationResult) {
        self.state().purchases.insert(key.into(), result);
    }

    /// Notifications must carry header `name` (lowercase) equal to `value`.
    pub fn require_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state().notification_mode = NotificationMode::RequireHeader {
            name: name.into(),
            value: value.into(),
        };
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Clear all configured errors and delays.
    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
        state.delay = None;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the call and applies injected latency and errors. The lock is
    /// released before sleeping.
    async fn enter(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        let delay = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: method.to_string(),
                args,
            });
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }

    fn approved(&self, request: &VerificationRequest) -> VerificationResult {
        let reference = request
            .transaction_id
            .clone()
            .or_else(|| request.purchase_token.clone())
            .unwrap_or_else(|| request.order_number.to_string());
        let subscription = (request.kind == OrderKind::Subscription).then(|| SubscriptionSnapshot {
            auto_renewing: true,
            expiry_time: Some(Timestamp::now().plus_days(30)),
            ..SubscriptionSnapshot::default()
        });

        VerificationResult {
            transaction_id: format!("mock-{}", reference),
            original_transaction_id: None,
            purchase_token: request.purchase_token.clone(),
            product_id: Some(request.product_id.clone()),
            purchase_state: PurchaseState::Purchased,
            acknowledged: false,
            amount: None,
            subscription,
            raw_status: "PURCHASED".to_string(),
            raw: json!({ "mock": true, "reference": reference }),
        }
    }
}

impl Clone for MockPaymentProvider {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider,
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, PaymentError> {
        self.enter(
            "verify",
            vec![
                request.order_number.to_string(),
                request.purchase_token.clone().unwrap_or_default(),
                request.transaction_id.clone().unwrap_or_default(),
            ],
        )
        .await?;

        if !self.capabilities().verify {
            return Err(PaymentError::unsupported(self.provider, "verify"));
        }

        let state = self.state();
        let keys = [
            request.purchase_token.as_deref(),
            request.transaction_id.as_deref(),
            Some(request.order_number.as_str()),
        ];
        if let Some(found) = keys
            .iter()
            .flatten()
            .find_map(|key| state.purchases.get(*key))
        {
            return Ok(found.clone());
        }
        if state.approve_unknown {
            drop(state);
            return Ok(self.approved(&request));
        }
        Err(PaymentError::invalid_purchase(format!(
            "no purchase recorded for order {}",
            request.order_number
        )))
    }

    async fn acknowledge(&self, request: AcknowledgeRequest) -> Result<(), PaymentError> {
        self.enter(
            "acknowledge",
            vec![request.product_id.clone(), request.purchase_token.clone()],
        )
        .await?;

        if !self.capabilities().acknowledge {
            return Err(PaymentError::unsupported(self.provider, "acknowledge"));
        }
        Ok(())
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundResult, PaymentError> {
        self.enter(
            "refund",
            vec![
                request.order_number.to_string(),
                request.refund_id.clone(),
                request.amount.amount().to_string(),
            ],
        )
        .await?;

        if !self.capabilities().refund {
            return Err(PaymentError::unsupported(self.provider, "refund"));
        }
        Ok(RefundResult {
            refund_id: request.refund_id.clone(),
            amount: request.amount.clone(),
            raw: json!({
                "out_trade_no": request.order_number.as_str(),
                "refund_id": request.refund_id,
                "amount": request.amount.amount(),
            }),
        })
    }

    async fn open_notification(
        &self,
        body: &[u8],
        headers: &NotificationHeaders,
    ) -> Result<Vec<u8>, PaymentError> {
        self.enter("open_notification", vec![body.len().to_string()])
            .await?;

        let mode = self.state().notification_mode.clone();
        match mode {
            NotificationMode::AcceptAll => Ok(body.to_vec()),
            NotificationMode::RequireHeader { name, value } => match headers.get(&name) {
                Some(actual) if *actual == value => Ok(body.to_vec()),
                Some(_) => Err(PaymentError::invalid_signature(format!(
                    "header {} does not match",
                    name
                ))),
                None => Err(PaymentError::invalid_signature(format!(
                    "missing header {}",
                    name
                ))),
            },
            NotificationMode::AlwaysFail => {
                Err(PaymentError::invalid_signature("signature rejected"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Currency, Money, OrderId, OrderNumber};
    use crate::ports::PaymentErrorCode;

    fn request(token: Option<&str>) -> VerificationRequest {
        VerificationRequest {
            provider: Provider::GooglePlay,
            order_id: OrderId::new(),
            order_number: OrderNumber::new("ORD0000000001").unwrap(),
            product_id: "gems_100".to_string(),
            kind: OrderKind::Purchase,
            purchase_token: token.map(str::to_string),
            transaction_id: None,
        }
    }

    fn purchase(transaction_id: &str) -> VerificationResult {
        VerificationResult {
            transaction_id: transaction_id.to_string(),
            original_transaction_id: None,
            purchase_token: Some("T1".to_string()),
            product_id: Some("gems_100".to_string()),
            purchase_state: PurchaseState::Purchased,
            acknowledged: false,
            amount: None,
            subscription: None,
            raw_status: "PURCHASED".to_string(),
            raw: json!({}),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Verification
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn strict_mock_rejects_unknown_purchases() {
        let mock = MockPaymentProvider::new(Provider::GooglePlay);
        let err = mock.verify(request(Some("T1"))).await.unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::InvalidPurchase);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn returns_registered_purchase_by_token() {
        let mock = MockPaymentProvider::new(Provider::GooglePlay);
        mock.add_purchase("T1", purchase("GPA.1"));
        let result = mock.verify(request(Some("T1"))).await.unwrap();
        assert_eq!(result.transaction_id, "GPA.1");
        assert_eq!(mock.call_count("verify"), 1);
    }

    #[tokio::test]
    async fn approving_mock_synthesizes_purchase() {
        let mock = MockPaymentProvider::approving(Provider::Alipay);
        let mut req = request(None);
        req.provider = Provider::Alipay;
        let result = mock.verify(req).await.unwrap();
        assert!(result.is_purchased());
        assert_eq!(result.transaction_id, "mock-ORD0000000001");
    }

    // ══════════════════════════════════════════════════════════════
    // Error Injection
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn one_shot_error_is_consumed() {
        let mock = MockPaymentProvider::approving(Provider::GooglePlay);
        mock.set_error(PaymentError::timeout("slow"));
        assert!(mock.verify(request(Some("T1"))).await.is_err());
        assert!(mock.verify(request(Some("T1"))).await.is_ok());
    }

    #[tokio::test]
    async fn method_error_persists() {
        let mock = MockPaymentProvider::approving(Provider::GooglePlay);
        mock.set_method_error("acknowledge", PaymentError::network("down"));
        let ack = AcknowledgeRequest {
            provider: Provider::GooglePlay,
            product_id: "gems_100".into(),
            purchase_token: "T1".into(),
            kind: OrderKind::Purchase,
            developer_payload: None,
        };
        assert!(mock.acknowledge(ack.clone()).await.is_err());
        assert!(mock.acknowledge(ack).await.is_err());
        assert_eq!(mock.call_count("acknowledge"), 2);
    }

    #[tokio::test]
    async fn unsupported_operations_fail() {
        let mock = MockPaymentProvider::approving(Provider::GooglePlay);
        let cny = Currency::new("CNY").unwrap();
        let err = mock
            .refund(RefundRequest {
                provider: Provider::GooglePlay,
                order_number: OrderNumber::new("ORD0000000001").unwrap(),
                transaction_id: None,
                refund_id: "R1".into(),
                amount: Money::new(100, cny.clone()).unwrap(),
                total: Money::new(100, cny).unwrap(),
                reason: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::Unsupported);
    }

    // ══════════════════════════════════════════════════════════════
    // Notification Authentication
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn required_header_is_checked() {
        let mock = MockPaymentProvider::new(Provider::WechatPay);
        mock.require_header("wechatpay-signature", "good");

        let mut headers = NotificationHeaders::new();
        assert!(mock.open_notification(b"{}", &headers).await.is_err());

        headers.insert("wechatpay-signature".into(), "good".into());
        assert_eq!(mock.open_notification(b"{}", &headers).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn rejecting_mock_fails_every_notification() {
        let mock = MockPaymentProvider::rejecting_notifications(Provider::Alipay);
        let err = mock
            .open_notification(b"a=b", &NotificationHeaders::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::InvalidSignature);
    }
}
