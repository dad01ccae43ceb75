//! Notification classifier.
//!
//! Routes an authenticated envelope to the decoder for its provider. The
//! decoders are pure; nothing here touches storage.

use crate::domain::foundation::Provider;

use super::{alipay, apple, google, wechat, ClassifiedNotification, WebhookError};

/// Decodes `payload` into a `ClassifiedNotification`.
///
/// Unknown type codes still classify (as `Unknown(..)` types); only payloads
/// whose shape cannot be read at all fail with `UnrecognizedNotification`.
pub fn classify(provider: Provider, payload: &[u8]) -> Result<ClassifiedNotification, WebhookError> {
    match provider {
        Provider::GooglePlay => google::decode(payload),
        Provider::AppStore => apple::decode(payload),
        Provider::Alipay => alipay::decode(payload),
        Provider::WechatPay => wechat::decode(payload),
    }
}

/// Best-effort event id for payloads that fail classification, so the raw
/// payload can still be recorded under its provider id.
pub fn extract_event_id(provider: Provider, payload: &[u8]) -> Option<String> {
    match provider {
        Provider::GooglePlay => google::event_id(payload),
        Provider::AppStore => apple::event_id(payload),
        Provider::Alipay => alipay::event_id(payload),
        Provider::WechatPay => wechat::event_id(payload),
    }
}
