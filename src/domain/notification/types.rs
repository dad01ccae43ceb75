//! Provider notification sum type.
//!
//! Every inbound envelope is decoded into exactly one `ProviderNotification`
//! variant. The reconciliation dispatcher matches on it exhaustively, so a
//! new shape cannot be added without deciding how it reconciles.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{Currency, Money, Provider, Timestamp, ValidationError};

// ══════════════════════════════════════════════════════════════
// Google Play
// ══════════════════════════════════════════════════════════════

/// `oneTimeProductNotification.notificationType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OneTimeNotificationType {
    Purchased,
    Canceled,
    Unknown(i64),
}

impl OneTimeNotificationType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => OneTimeNotificationType::Purchased,
            2 => OneTimeNotificationType::Canceled,
            other => OneTimeNotificationType::Unknown(other),
        }
    }

    pub fn label(&self) -> String {
        match self {
            OneTimeNotificationType::Purchased => "ONE_TIME_PRODUCT_PURCHASED".to_string(),
            OneTimeNotificationType::Canceled => "ONE_TIME_PRODUCT_CANCELED".to_string(),
            OneTimeNotificationType::Unknown(code) => format!("ONE_TIME_PRODUCT_UNKNOWN_{}", code),
        }
    }
}

/// `subscriptionNotification.notificationType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionNotificationType {
    Recovered,
    Renewed,
    Canceled,
    Purchased,
    OnHold,
    InGracePeriod,
    Restarted,
    PriceChangeConfirmed,
    Deferred,
    Paused,
    PauseScheduleChanged,
    Revoked,
    Expired,
    PendingPurchaseCanceled,
    Unknown(i64),
}

impl SubscriptionNotificationType {
    pub fn from_code(code: i64) -> Self {
        use SubscriptionNotificationType::*;
        match code {
            1 => Recovered,
            2 => Renewed,
            3 => Canceled,
            4 => Purchased,
            5 => OnHold,
            6 => InGracePeriod,
            7 => Restarted,
            8 => PriceChangeConfirmed,
            9 => Deferred,
            10 => Paused,
            11 => PauseScheduleChanged,
            12 => Revoked,
            13 => Expired,
            20 => PendingPurchaseCanceled,
            other => Unknown(other),
        }
    }

    pub fn label(&self) -> String {
        use SubscriptionNotificationType::*;
        let name = match self {
            Recovered => "RECOVERED",
            Renewed => "RENEWED",
            Canceled => "CANCELED",
            Purchased => "PURCHASED",
            OnHold => "ON_HOLD",
            InGracePeriod => "IN_GRACE_PERIOD",
            Restarted => "RESTARTED",
            PriceChangeConfirmed => "PRICE_CHANGE_CONFIRMED",
            Deferred => "DEFERRED",
            Paused => "PAUSED",
            PauseScheduleChanged => "PAUSE_SCHEDULE_CHANGED",
            Revoked => "REVOKED",
            Expired => "EXPIRED",
            PendingPurchaseCanceled => "PENDING_PURCHASE_CANCELED",
            Unknown(code) => return format!("SUBSCRIPTION_UNKNOWN_{}", code),
        };
        format!("SUBSCRIPTION_{}", name)
    }
}

// ══════════════════════════════════════════════════════════════
// App Store
// ══════════════════════════════════════════════════════════════

/// App Store Server Notifications V2 `notificationType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppleNotificationType {
    Subscribed,
    DidRenew,
    DidFailToRenew,
    DidChangeRenewalStatus,
    DidChangeRenewalPref,
    Expired,
    GracePeriodExpired,
    Refund,
    RefundDeclined,
    RefundReversed,
    Revoke,
    OneTimeCharge,
    OfferRedeemed,
    PriceIncrease,
    RenewalExtended,
    RenewalExtension,
    ConsumptionRequest,
    Test,
    Unknown(String),
}

impl AppleNotificationType {
    pub fn parse(value: &str) -> Self {
        use AppleNotificationType::*;
        match value {
            "SUBSCRIBED" => Subscribed,
            "DID_RENEW" => DidRenew,
            "DID_FAIL_TO_RENEW" => DidFailToRenew,
            "DID_CHANGE_RENEWAL_STATUS" => DidChangeRenewalStatus,
            "DID_CHANGE_RENEWAL_PREF" => DidChangeRenewalPref,
            "EXPIRED" => Expired,
            "GRACE_PERIOD_EXPIRED" => GracePeriodExpired,
            "REFUND" => Refund,
            "REFUND_DECLINED" => RefundDeclined,
            "REFUND_REVERSED" => RefundReversed,
            "REVOKE" => Revoke,
            "ONE_TIME_CHARGE" => OneTimeCharge,
            "OFFER_REDEEMED" => OfferRedeemed,
            "PRICE_INCREASE" => PriceIncrease,
            "RENEWAL_EXTENDED" => RenewalExtended,
            "RENEWAL_EXTENSION" => RenewalExtension,
            "CONSUMPTION_REQUEST" => ConsumptionRequest,
            "TEST" => Test,
            other => Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        use AppleNotificationType::*;
        match self {
            Subscribed => "SUBSCRIBED",
            DidRenew => "DID_RENEW",
            DidFailToRenew => "DID_FAIL_TO_RENEW",
            DidChangeRenewalStatus => "DID_CHANGE_RENEWAL_STATUS",
            DidChangeRenewalPref => "DID_CHANGE_RENEWAL_PREF",
            Expired => "EXPIRED",
            GracePeriodExpired => "GRACE_PERIOD_EXPIRED",
            Refund => "REFUND",
            RefundDeclined => "REFUND_DECLINED",
            RefundReversed => "REFUND_REVERSED",
            Revoke => "REVOKE",
            OneTimeCharge => "ONE_TIME_CHARGE",
            OfferRedeemed => "OFFER_REDEEMED",
            PriceIncrease => "PRICE_INCREASE",
            RenewalExtended => "RENEWAL_EXTENDED",
            RenewalExtension => "RENEWAL_EXTENSION",
            ConsumptionRequest => "CONSUMPTION_REQUEST",
            Test => "TEST",
            Unknown(value) => value,
        }
    }
}

/// App Store notification `subtype`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppleSubtype {
    InitialBuy,
    Resubscribe,
    Downgrade,
    Upgrade,
    AutoRenewEnabled,
    AutoRenewDisabled,
    Voluntary,
    BillingRetry,
    PriceIncrease,
    GracePeriod,
    BillingRecovery,
    Pending,
    Accepted,
    ProductNotForSale,
    Summary,
    Failure,
    Other(String),
}

impl AppleSubtype {
    pub fn parse(value: &str) -> Self {
        use AppleSubtype::*;
        match value {
            "INITIAL_BUY" => InitialBuy,
            "RESUBSCRIBE" => Resubscribe,
            "DOWNGRADE" => Downgrade,
            "UPGRADE" => Upgrade,
            "AUTO_RENEW_ENABLED" => AutoRenewEnabled,
            "AUTO_RENEW_DISABLED" => AutoRenewDisabled,
            "VOLUNTARY" => Voluntary,
            "BILLING_RETRY" => BillingRetry,
            "PRICE_INCREASE" => PriceIncrease,
            "GRACE_PERIOD" => GracePeriod,
            "BILLING_RECOVERY" => BillingRecovery,
            "PENDING" => Pending,
            "ACCEPTED" => Accepted,
            "PRODUCT_NOT_FOR_SALE" => ProductNotForSale,
            "SUMMARY" => Summary,
            "FAILURE" => Failure,
            other => Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        use AppleSubtype::*;
        match self {
            InitialBuy => "INITIAL_BUY",
            Resubscribe => "RESUBSCRIBE",
            Downgrade => "DOWNGRADE",
            Upgrade => "UPGRADE",
            AutoRenewEnabled => "AUTO_RENEW_ENABLED",
            AutoRenewDisabled => "AUTO_RENEW_DISABLED",
            Voluntary => "VOLUNTARY",
            BillingRetry => "BILLING_RETRY",
            PriceIncrease => "PRICE_INCREASE",
            GracePeriod => "GRACE_PERIOD",
            BillingRecovery => "BILLING_RECOVERY",
            Pending => "PENDING",
            Accepted => "ACCEPTED",
            ProductNotForSale => "PRODUCT_NOT_FOR_SALE",
            Summary => "SUMMARY",
            Failure => "FAILURE",
            Other(value) => value,
        }
    }
}

/// Decoded `signedTransactionInfo`. Dates are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleTransactionInfo {
    pub transaction_id: String,
    pub original_transaction_id: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<i64>,
    #[serde(default)]
    pub expires_date: Option<i64>,

    /// UUID the app attached at purchase time; we set it to our order id.
    #[serde(default)]
    pub app_account_token: Option<String>,

    /// Price in milli-units of `currency`.
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub revocation_date: Option<i64>,
    #[serde(default)]
    pub revocation_reason: Option<i64>,
    #[serde(default, rename = "type")]
    pub product_type: Option<String>,
}

impl AppleTransactionInfo {
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_date.and_then(Timestamp::from_unix_millis)
    }

    pub fn purchased_at(&self) -> Option<Timestamp> {
        self.purchase_date.and_then(Timestamp::from_unix_millis)
    }

    /// Price converted from milli-units to the currency's minor units.
    pub fn amount(&self) -> Option<Money> {
        let currency = Currency::new(self.currency.as_deref()?).ok()?;
        let price = self.price?;
        let divisor = 10_i64.pow(3_u32.saturating_sub(currency.minor_unit_digits()));
        Money::new(price / divisor, currency).ok()
    }
}

/// Decoded `signedRenewalInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleRenewalInfo {
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    #[serde(default)]
    pub auto_renew_product_id: Option<String>,

    /// 1 = on, 0 = off.
    #[serde(default)]
    pub auto_renew_status: Option<i64>,
    #[serde(default)]
    pub expiration_intent: Option<i64>,
    #[serde(default)]
    pub grace_period_expires_date: Option<i64>,
    #[serde(default)]
    pub is_in_billing_retry_period: Option<bool>,
}

impl AppleRenewalInfo {
    pub fn auto_renewing(&self) -> bool {
        self.auto_renew_status == Some(1)
    }

    pub fn grace_period_expires_at(&self) -> Option<Timestamp> {
        self.grace_period_expires_date.and_then(Timestamp::from_unix_millis)
    }
}

// ══════════════════════════════════════════════════════════════
// Wallets (Alipay / WeChat Pay)
// ══════════════════════════════════════════════════════════════

/// Trade status normalized across the wallet providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    WaitBuyerPay,
    Success,
    Finished,
    Closed,
    Refunded,
    PayError,
    Unknown(String),
}

impl TradeStatus {
    /// Alipay `trade_status`.
    pub fn from_alipay(value: &str) -> Self {
        match value {
            "WAIT_BUYER_PAY" => TradeStatus::WaitBuyerPay,
            "TRADE_SUCCESS" => TradeStatus::Success,
            "TRADE_FINISHED" => TradeStatus::Finished,
            "TRADE_CLOSED" => TradeStatus::Closed,
            other => TradeStatus::Unknown(other.to_string()),
        }
    }

    /// WeChat Pay `trade_state`.
    pub fn from_wechat(value: &str) -> Self {
        match value {
            "NOTPAY" | "USERPAYING" => TradeStatus::WaitBuyerPay,
            "SUCCESS" => TradeStatus::Success,
            "CLOSED" | "REVOKED" => TradeStatus::Closed,
            "REFUND" => TradeStatus::Refunded,
            "PAYERROR" => TradeStatus::PayError,
            other => TradeStatus::Unknown(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TradeStatus::WaitBuyerPay => "TRADE_WAIT_BUYER_PAY",
            TradeStatus::Success => "TRADE_SUCCESS",
            TradeStatus::Finished => "TRADE_FINISHED",
            TradeStatus::Closed => "TRADE_CLOSED",
            TradeStatus::Refunded => "TRADE_REFUNDED",
            TradeStatus::PayError => "TRADE_PAY_ERROR",
            TradeStatus::Unknown(value) => value,
        }
    }
}

/// Amount as the provider wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAmount {
    /// Decimal string in major units (Alipay `total_amount`).
    Major(String),
    /// Integer minor units (WeChat `amount.total`).
    Minor(i64),
}

impl TradeAmount {
    pub fn to_minor(&self, currency: &Currency) -> Result<i64, ValidationError> {
        match self {
            TradeAmount::Major(value) => Ok(Money::parse_major(value, currency.clone())?.amount()),
            TradeAmount::Minor(value) => Ok(*value),
        }
    }
}

/// Trade status change pushed by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeNotification {
    pub provider: Provider,

    /// Our order number, echoed back by the provider.
    pub out_trade_no: String,

    /// Provider's trade id.
    pub trade_no: Option<String>,

    pub status: TradeStatus,

    /// Provider's status string, unmodified.
    pub raw_status: String,

    pub total_amount: Option<TradeAmount>,
    pub refund_amount: Option<TradeAmount>,
    pub refund_id: Option<String>,
}

// ══════════════════════════════════════════════════════════════
// Sum type
// ══════════════════════════════════════════════════════════════

/// One decoded provider notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderNotification {
    /// Connectivity check sent from a provider console.
    Test { provider: Provider },

    /// Google Play one-time product.
    OneTimeProduct {
        purchase_token: String,
        sku: String,
        notification_type: OneTimeNotificationType,
    },

    /// Google Play subscription.
    Subscription {
        purchase_token: String,
        subscription_id: String,
        notification_type: SubscriptionNotificationType,
    },

    /// App Store lifecycle event with its decoded signed payloads.
    AppleLifecycle {
        transaction_info: AppleTransactionInfo,
        renewal_info: Option<AppleRenewalInfo>,
        notification_type: AppleNotificationType,
        subtype: Option<AppleSubtype>,
    },

    /// Alipay or WeChat Pay trade status change.
    TradeStatus(TradeNotification),
}

impl ProviderNotification {
    /// Type label stored on the webhook event.
    pub fn type_label(&self) -> String {
        match self {
            ProviderNotification::Test { .. } => "TEST".to_string(),
            ProviderNotification::OneTimeProduct {
                notification_type, ..
            } => notification_type.label(),
            ProviderNotification::Subscription {
                notification_type, ..
            } => notification_type.label(),
            ProviderNotification::AppleLifecycle {
                notification_type,
                subtype,
                ..
            } => match subtype {
                Some(subtype) => format!("{}.{}", notification_type.as_str(), subtype.as_str()),
                None => notification_type.as_str().to_string(),
            },
            ProviderNotification::TradeStatus(trade) => trade.status.label().to_string(),
        }
    }
}

/// Classifier output: the notification plus its envelope metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedNotification {
    /// Provider-assigned event id, the dedup key.
    pub event_id: String,
    pub provider: Provider,
    pub occurred_at: Option<Timestamp>,
    pub notification: ProviderNotification,
}

impl ClassifiedNotification {
    pub fn event_type(&self) -> String {
        self.notification.type_label()
    }
}

impl fmt::Display for ClassifiedNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.provider, self.event_id, self.event_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_codes_map_to_types() {
        assert_eq!(
            SubscriptionNotificationType::from_code(2),
            SubscriptionNotificationType::Renewed
        );
        assert_eq!(
            SubscriptionNotificationType::from_code(99),
            SubscriptionNotificationType::Unknown(99)
        );
        assert_eq!(
            OneTimeNotificationType::from_code(1),
            OneTimeNotificationType::Purchased
        );
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(SubscriptionNotificationType::Renewed.label(), "SUBSCRIPTION_RENEWED");
        assert_eq!(
            SubscriptionNotificationType::Unknown(42).label(),
            "SUBSCRIPTION_UNKNOWN_42"
        );
        assert_eq!(OneTimeNotificationType::Canceled.label(), "ONE_TIME_PRODUCT_CANCELED");
    }

    #[test]
    fn apple_types_roundtrip() {
        for name in ["DID_FAIL_TO_RENEW", "SUBSCRIBED", "REFUND", "TEST"] {
            assert_eq!(AppleNotificationType::parse(name).as_str(), name);
        }
        assert_eq!(
            AppleNotificationType::parse("SOMETHING_NEW"),
            AppleNotificationType::Unknown("SOMETHING_NEW".into())
        );
        assert_eq!(AppleSubtype::parse("GRACE_PERIOD"), AppleSubtype::GracePeriod);
    }

    #[test]
    fn apple_label_includes_subtype() {
        let notification = ProviderNotification::AppleLifecycle {
            transaction_info: AppleTransactionInfo::default(),
            renewal_info: None,
            notification_type: AppleNotificationType::DidFailToRenew,
            subtype: Some(AppleSubtype::GracePeriod),
        };
        assert_eq!(notification.type_label(), "DID_FAIL_TO_RENEW.GRACE_PERIOD");
    }

    #[test]
    fn apple_price_converts_from_milli_units() {
        let info = AppleTransactionInfo {
            price: Some(29_990),
            currency: Some("USD".into()),
            ..Default::default()
        };
        assert_eq!(info.amount().unwrap().amount(), 2999);
    }

    #[test]
    fn wallet_statuses_normalize() {
        assert_eq!(TradeStatus::from_alipay("TRADE_SUCCESS"), TradeStatus::Success);
        assert_eq!(TradeStatus::from_wechat("SUCCESS"), TradeStatus::Success);
        assert_eq!(TradeStatus::from_wechat("NOTPAY"), TradeStatus::WaitBuyerPay);
        assert_eq!(
            TradeStatus::from_alipay("ODD"),
            TradeStatus::Unknown("ODD".into())
        );
    }

    #[test]
    fn trade_amount_converts_both_forms() {
        let cny = Currency::new("CNY").unwrap();
        assert_eq!(TradeAmount::Major("29.99".into()).to_minor(&cny).unwrap(), 2999);
        assert_eq!(TradeAmount::Minor(2999).to_minor(&cny).unwrap(), 2999);
        assert!(TradeAmount::Major("x".into()).to_minor(&cny).is_err());
    }
}
