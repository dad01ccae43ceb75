//! Subscription state derivation.
//!
//! Providers report raw fields (expiry, auto-renew flag, cancel reason,
//! grace period end, payment state) rather than a state. `derive_state`
//! folds them into one canonical state as a pure function of those fields
//! and the supplied `now`, so a replayed notification always yields the same
//! answer as the original delivery.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, ValidationError};

/// Canonical subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Pending,
    Active,
    Cancelled,
    Expired,
    OnHold,
    Paused,
    InGracePeriod,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Pending => "pending",
            SubscriptionState::Active => "active",
            SubscriptionState::Cancelled => "cancelled",
            SubscriptionState::Expired => "expired",
            SubscriptionState::OnHold => "on_hold",
            SubscriptionState::Paused => "paused",
            SubscriptionState::InGracePeriod => "in_grace_period",
        }
    }

    /// True while the subscriber should keep their entitlement.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Active | SubscriptionState::Cancelled | SubscriptionState::InGracePeriod
        )
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionState::Pending),
            "active" => Ok(SubscriptionState::Active),
            "cancelled" => Ok(SubscriptionState::Cancelled),
            "expired" => Ok(SubscriptionState::Expired),
            "on_hold" => Ok(SubscriptionState::OnHold),
            "paused" => Ok(SubscriptionState::Paused),
            "in_grace_period" => Ok(SubscriptionState::InGracePeriod),
            other => Err(ValidationError::invalid_format(
                "subscription_state",
                format!("unknown state '{}'", other),
            )),
        }
    }
}

/// Why a subscription stopped renewing.
///
/// Google reports `cancelReason` codes, Apple reports `expirationIntent`;
/// both are normalized here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    UserCanceled,
    BillingError,
    Replaced,
    DeveloperCanceled,
    PriceIncreaseDeclined,
    ProductUnavailable,
    Other,
}

impl CancelReason {
    /// Maps a Google Play `cancelReason` code.
    pub fn from_google_code(code: i64) -> Self {
        match code {
            0 => CancelReason::UserCanceled,
            1 => CancelReason::BillingError,
            2 => CancelReason::Replaced,
            3 => CancelReason::DeveloperCanceled,
            _ => CancelReason::Other,
        }
    }

    /// Maps an App Store `expirationIntent` code.
    pub fn from_apple_intent(code: i64) -> Self {
        match code {
            1 => CancelReason::UserCanceled,
            2 => CancelReason::BillingError,
            3 => CancelReason::PriceIncreaseDeclined,
            4 => CancelReason::ProductUnavailable,
            _ => CancelReason::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::UserCanceled => "user_canceled",
            CancelReason::BillingError => "billing_error",
            CancelReason::Replaced => "replaced",
            CancelReason::DeveloperCanceled => "developer_canceled",
            CancelReason::PriceIncreaseDeclined => "price_increase_declined",
            CancelReason::ProductUnavailable => "product_unavailable",
            CancelReason::Other => "other",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CancelReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_canceled" => Ok(CancelReason::UserCanceled),
            "billing_error" => Ok(CancelReason::BillingError),
            "replaced" => Ok(CancelReason::Replaced),
            "developer_canceled" => Ok(CancelReason::DeveloperCanceled),
            "price_increase_declined" => Ok(CancelReason::PriceIncreaseDeclined),
            "product_unavailable" => Ok(CancelReason::ProductUnavailable),
            "other" => Ok(CancelReason::Other),
            other => Err(ValidationError::invalid_format(
                "cancel_reason",
                format!("unknown reason '{}'", other),
            )),
        }
    }
}

/// Payment state of the current billing period, as reported by Google Play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPaymentState {
    Pending,
    Received,
    FreeTrial,
    DeferredUpgrade,
}

impl SubscriptionPaymentState {
    /// Maps the Google Play `paymentState` code.
    pub fn from_google_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SubscriptionPaymentState::Pending),
            1 => Some(SubscriptionPaymentState::Received),
            2 => Some(SubscriptionPaymentState::FreeTrial),
            3 => Some(SubscriptionPaymentState::DeferredUpgrade),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPaymentState::Pending => "pending",
            SubscriptionPaymentState::Received => "received",
            SubscriptionPaymentState::FreeTrial => "free_trial",
            SubscriptionPaymentState::DeferredUpgrade => "deferred_upgrade",
        }
    }
}

impl FromStr for SubscriptionPaymentState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionPaymentState::Pending),
            "received" => Ok(SubscriptionPaymentState::Received),
            "free_trial" => Ok(SubscriptionPaymentState::FreeTrial),
            "deferred_upgrade" => Ok(SubscriptionPaymentState::DeferredUpgrade),
            other => Err(ValidationError::invalid_format(
                "payment_state",
                format!("unknown payment state '{}'", other),
            )),
        }
    }
}

/// Provider-reported subscription fields, the calculator's only input
/// besides `now`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub auto_renewing: bool,
    pub expiry_time: Option<Timestamp>,
    pub cancel_reason: Option<CancelReason>,
    pub grace_period_expiry: Option<Timestamp>,
    pub payment_state: Option<SubscriptionPaymentState>,
}

/// Derives the canonical state. First matching rule wins:
///
/// 1. inside the grace period → `InGracePeriod`
/// 2. cancelled and past expiry → `Expired`
/// 3. cancelled and not yet expired → `Cancelled`
/// 4. past expiry and not auto-renewing → `Expired`
/// 5. payment pending → `Pending`
/// 6. otherwise → `Active`
///
/// The grace check must precede the expiry checks, and the cancel checks
/// must precede the generic expiry check, or a cancelled subscription that
/// is still paid up would read as active.
pub fn derive_state(snapshot: &SubscriptionSnapshot, now: Timestamp) -> SubscriptionState {
    let expired = snapshot.expiry_time.map(|expiry| now >= expiry).unwrap_or(false);

    if let Some(grace_end) = snapshot.grace_period_expiry {
        if now < grace_end {
            return SubscriptionState::InGracePeriod;
        }
    }

    if snapshot.cancel_reason.is_some() {
        return if expired {
            SubscriptionState::Expired
        } else {
            SubscriptionState::Cancelled
        };
    }

    if expired && !snapshot.auto_renewing {
        return SubscriptionState::Expired;
    }

    if snapshot.payment_state == Some(SubscriptionPaymentState::Pending) {
        return SubscriptionState::Pending;
    }

    SubscriptionState::Active
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_unix_millis(1_750_000_000_000).unwrap()
    }

    fn snapshot() -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            auto_renewing: true,
            expiry_time: Some(now().plus_days(30)),
            ..Default::default()
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Rule precedence
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn renewing_subscription_before_expiry_is_active() {
        assert_eq!(derive_state(&snapshot(), now()), SubscriptionState::Active);
    }

    #[test]
    fn grace_period_wins_over_cancel() {
        let snap = SubscriptionSnapshot {
            cancel_reason: Some(CancelReason::UserCanceled),
            expiry_time: Some(now().minus_days(1)),
            grace_period_expiry: Some(now().plus_days(3)),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::InGracePeriod);
    }

    #[test]
    fn cancelled_before_expiry_is_cancelled_even_when_auto_renewing() {
        let snap = SubscriptionSnapshot {
            cancel_reason: Some(CancelReason::UserCanceled),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::Cancelled);
    }

    #[test]
    fn cancelled_after_expiry_is_expired() {
        let snap = SubscriptionSnapshot {
            cancel_reason: Some(CancelReason::BillingError),
            expiry_time: Some(now()),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::Expired);
    }

    #[test]
    fn past_expiry_without_auto_renew_is_expired() {
        let snap = SubscriptionSnapshot {
            auto_renewing: false,
            expiry_time: Some(now().minus_days(1)),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::Expired);
    }

    #[test]
    fn past_expiry_with_auto_renew_stays_active() {
        let snap = SubscriptionSnapshot {
            expiry_time: Some(now().minus_days(1)),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::Active);
    }

    #[test]
    fn pending_payment_is_pending() {
        let snap = SubscriptionSnapshot {
            payment_state: Some(SubscriptionPaymentState::Pending),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::Pending);
    }

    #[test]
    fn elapsed_grace_period_falls_through() {
        let snap = SubscriptionSnapshot {
            grace_period_expiry: Some(now().minus_days(1)),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::Active);
    }

    #[test]
    fn cancel_without_expiry_is_cancelled() {
        let snap = SubscriptionSnapshot {
            expiry_time: None,
            cancel_reason: Some(CancelReason::DeveloperCanceled),
            ..snapshot()
        };
        assert_eq!(derive_state(&snap, now()), SubscriptionState::Cancelled);
    }

    // ══════════════════════════════════════════════════════════════
    // Code mapping
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn google_cancel_codes_map_to_reasons() {
        assert_eq!(CancelReason::from_google_code(0), CancelReason::UserCanceled);
        assert_eq!(CancelReason::from_google_code(1), CancelReason::BillingError);
        assert_eq!(CancelReason::from_google_code(42), CancelReason::Other);
    }

    #[test]
    fn apple_expiration_intents_map_to_reasons() {
        assert_eq!(CancelReason::from_apple_intent(1), CancelReason::UserCanceled);
        assert_eq!(
            CancelReason::from_apple_intent(3),
            CancelReason::PriceIncreaseDeclined
        );
    }

    #[test]
    fn google_payment_state_codes_map() {
        assert_eq!(
            SubscriptionPaymentState::from_google_code(0),
            Some(SubscriptionPaymentState::Pending)
        );
        assert_eq!(SubscriptionPaymentState::from_google_code(9), None);
    }

    #[test]
    fn state_strings_roundtrip() {
        for state in [
            SubscriptionState::Pending,
            SubscriptionState::Active,
            SubscriptionState::Cancelled,
            SubscriptionState::Expired,
            SubscriptionState::OnHold,
            SubscriptionState::Paused,
            SubscriptionState::InGracePeriod,
        ] {
            assert_eq!(state.as_str().parse::<SubscriptionState>().unwrap(), state);
        }
    }
}
