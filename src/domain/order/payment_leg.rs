//! Provider-specific payment detail attached one-to-one to an order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{OrderId, Provider, Timestamp, ValidationError};
use crate::domain::subscription::{
    derive_state, CancelReason, SubscriptionPaymentState, SubscriptionSnapshot, SubscriptionState,
};

/// Where a subscription stands after a failed renewal charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GracePeriodStatus {
    InGracePeriod,
    BillingRetry,
    GracePeriodExpired,
}

impl GracePeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GracePeriodStatus::InGracePeriod => "IN_GRACE_PERIOD",
            GracePeriodStatus::BillingRetry => "BILLING_RETRY",
            GracePeriodStatus::GracePeriodExpired => "GRACE_PERIOD_EXPIRED",
        }
    }
}

impl fmt::Display for GracePeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GracePeriodStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_GRACE_PERIOD" => Ok(GracePeriodStatus::InGracePeriod),
            "BILLING_RETRY" => Ok(GracePeriodStatus::BillingRetry),
            "GRACE_PERIOD_EXPIRED" => Ok(GracePeriodStatus::GracePeriodExpired),
            other => Err(ValidationError::invalid_format(
                "grace_period_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Provider-native identifiers and renewal fields for one order.
///
/// Created at order creation for server-initiated providers and at first
/// verification or notification for the app stores. Updated on every
/// notification, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLeg {
    pub order_id: OrderId,
    pub provider: Provider,

    /// Google purchase token.
    pub purchase_token: Option<String>,

    /// Latest provider transaction: Google order id, Apple transaction id,
    /// Alipay `trade_no`, WeChat `transaction_id`.
    pub provider_transaction_id: Option<String>,

    /// Apple/Google subscription lineage id shared by every renewal.
    pub original_transaction_id: Option<String>,

    pub product_id: Option<String>,

    /// Provider's own status string, stored verbatim for audit.
    pub raw_status: String,

    pub acknowledged: bool,
    pub auto_renewing: Option<bool>,
    pub expiry_time: Option<Timestamp>,
    pub grace_period_expiry: Option<Timestamp>,
    pub grace_period_status: Option<GracePeriodStatus>,
    pub cancel_reason: Option<CancelReason>,
    pub payment_state: Option<SubscriptionPaymentState>,
    pub subscription_state: Option<SubscriptionState>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PaymentLeg {
    pub fn new(order_id: OrderId, provider: Provider, raw_status: impl Into<String>, now: Timestamp) -> Self {
        Self {
            order_id,
            provider,
            purchase_token: None,
            provider_transaction_id: None,
            original_transaction_id: None,
            product_id: None,
            raw_status: raw_status.into(),
            acknowledged: false,
            auto_renewing: None,
            expiry_time: None,
            grace_period_expiry: None,
            grace_period_status: None,
            cancel_reason: None,
            payment_state: None,
            subscription_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Provider fields as the state calculator sees them.
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            auto_renewing: self.auto_renewing.unwrap_or(false),
            expiry_time: self.expiry_time,
            cancel_reason: self.cancel_reason,
            grace_period_expiry: self.grace_period_expiry,
            payment_state: self.payment_state,
        }
    }

    /// Stores fresh provider fields and re-derives the subscription state.
    pub fn apply_snapshot(&mut self, snapshot: &SubscriptionSnapshot, now: Timestamp) -> SubscriptionState {
        self.auto_renewing = Some(snapshot.auto_renewing);
        self.expiry_time = snapshot.expiry_time;
        self.cancel_reason = snapshot.cancel_reason;
        self.grace_period_expiry = snapshot.grace_period_expiry;
        self.payment_state = snapshot.payment_state;
        let state = derive_state(snapshot, now);
        self.subscription_state = Some(state);
        self.updated_at = now;
        state
    }

    pub fn set_raw_status(&mut self, raw_status: impl Into<String>, now: Timestamp) {
        self.raw_status = raw_status.into();
        self.updated_at = now;
    }

    pub fn mark_acknowledged(&mut self, now: Timestamp) {
        self.acknowledged = true;
        self.updated_at = now;
    }
}
