//! Notification module - Provider webhook classification.
//!
//! Decodes Google Play, App Store, Alipay and WeChat Pay envelopes into one
//! closed `ProviderNotification` type and tracks each delivery as a
//! `WebhookEvent`.

pub mod alipay;
pub mod apple;
pub mod classifier;
mod errors;
pub mod google;
mod retry;
mod types;
mod webhook_event;
pub mod wechat;

pub use classifier::{classify, extract_event_id};
pub use errors::WebhookError;
pub use retry::RetryPolicy;
pub use types::{
    AppleNotificationType, AppleRenewalInfo, AppleSubtype, AppleTransactionInfo,
    ClassifiedNotification, OneTimeNotificationType, ProviderNotification,
    SubscriptionNotificationType, TradeAmount, TradeNotification, TradeStatus,
};
pub use webhook_event::{WebhookEvent, WebhookStatus};
